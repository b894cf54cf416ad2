//! The job execution contract (spec.md §3, §6.1).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::subject::SubjectSpecification;

fn default_timeout() -> u32 {
    120
}

/// The execution contract for one job. Deserializes directly from the
/// JSON shape a queue consumer hands the runner; defaults match the
/// original job-runner's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub subject: SubjectSpecification,

    /// Secondary subject supplying the code to *run*, for
    /// cross-project tests. Absent means "same as `subject`".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_subject: Option<SubjectSpecification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub secrets: Vec<String>,

    #[serde(default = "default_timeout")]
    pub timeout: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Issue template merged with `{title, body}` on a failure
    /// outcome; absence means "do not file an issue".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
}

impl Job {
    /// The subject that supplies the code to run, defaulting to the
    /// tested subject when no cross-project override is given.
    pub fn command_subject(&self) -> &SubjectSpecification {
        self.command_subject.as_ref().unwrap_or(&self.subject)
    }

    /// Default slug: `<repo>/<context-or-"job">/<sha-or-pull-or-branch>`,
    /// sanitized later by the object-store destination (`//` and `:`
    /// escaping is the destination's concern, not the job's).
    pub fn default_slug(&self, resolved_sha: &str) -> String {
        let context = self.context.as_deref().unwrap_or("job");
        format!("{}/{}/{}", self.subject.repo, context, resolved_sha)
    }

    pub fn slug(&self, resolved_sha: &str) -> String {
        self.slug.clone().unwrap_or_else(|| self.default_slug(resolved_sha))
    }

    pub fn title(&self, resolved_sha: &str) -> String {
        self.title.clone().unwrap_or_else(|| {
            format!(
                "{} @ {}",
                self.context.as_deref().unwrap_or(&self.subject.repo),
                resolved_sha
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_subject() -> SubjectSpecification {
        SubjectSpecification {
            forge: None,
            repo: "o/r".into(),
            sha: Some("a".repeat(40)),
            pull: None,
            branch: None,
            target: None,
        }
    }

    #[test]
    fn deserializes_minimal_job_with_defaults() {
        let json = r#"{"subject":{"repo":"o/r","sha":"deadbeef"}}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.timeout, 120);
        assert!(job.env.is_empty());
        assert!(job.secrets.is_empty());
        assert!(job.command_subject.is_none());
        assert!(job.report.is_none());
    }

    #[test]
    fn command_subject_defaults_to_subject() {
        let job = Job {
            subject: minimal_subject(),
            command_subject: None,
            container: None,
            command: None,
            env: BTreeMap::new(),
            secrets: vec![],
            timeout: 120,
            context: None,
            slug: None,
            title: None,
            report: None,
        };
        assert_eq!(job.command_subject().repo, "o/r");
    }

    #[test]
    fn default_slug_uses_context_and_sha() {
        let mut job = Job {
            subject: minimal_subject(),
            command_subject: None,
            container: None,
            command: None,
            env: BTreeMap::new(),
            secrets: vec![],
            timeout: 120,
            context: Some("fedora/nightly".into()),
            slug: None,
            title: None,
            report: None,
        };
        assert_eq!(job.slug("abc123"), "o/r/fedora/nightly/abc123");
        job.slug = Some("custom/slug".into());
        assert_eq!(job.slug("abc123"), "custom/slug");
    }

    #[test]
    fn report_template_round_trips_as_json_value() {
        let json = r#"{"subject":{"repo":"o/r","sha":"s"},"report":{"labels":["nightly"]}}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        let report = job.report.unwrap();
        assert_eq!(report["labels"][0], "nightly");
    }
}
