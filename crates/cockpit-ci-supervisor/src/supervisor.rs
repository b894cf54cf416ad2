//! The job supervisor (spec.md §4.8): resolves a job's subjects,
//! opens its log/attachments destination, runs the container task set
//! concurrently with a timeout and optional PR-change poll under
//! first-completion-wins cancellation, and reports the outcome to the
//! forge. Ported from `run_job()` in `lib/aio/job.py`.

use std::sync::Arc;

use cockpit_ci_core::domain::status::StatusState;
use cockpit_ci_core::Job;
use cockpit_ci_forge::Forge;
use cockpit_ci_log::Index;
use cockpit_ci_log::LogStreamer;
use cockpit_ci_runner::ContainerRunner;
use cockpit_ci_store::LogDestinations;
use serde_json::json;

use crate::cancel::CancellationToken;
use crate::error::{Result, SupervisorError, TaskError};
use crate::tasks;

/// The terminal result of one job's execution, mirroring the four
/// [`StatusState`] labels posted to the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A real test result: container non-zero exit, timeout, or a
    /// superseding/closing PR change.
    Failure(String),
}

pub struct JobSupervisor {
    forge: Arc<dyn Forge>,
    destinations: Arc<dyn LogDestinations>,
    runner: Arc<ContainerRunner>,
}

impl JobSupervisor {
    pub fn new(forge: Arc<dyn Forge>, destinations: Arc<dyn LogDestinations>, runner: Arc<ContainerRunner>) -> Self {
        Self { forge, destinations, runner }
    }

    /// Runs one job to completion. `cancel` lets an outside caller
    /// (process shutdown) tear the job down cleanly; it is distinct
    /// from the job's own timeout and PR-poll tasks.
    pub async fn run(&self, job: &Job, cancel: CancellationToken) -> Result<Outcome> {
        job.subject.validate()?;

        let tested_subject = self.forge.resolve_subject(&job.subject).await?;
        let command_subject = match &job.command_subject {
            None => tested_subject.clone(),
            Some(spec) => self.forge.resolve_subject(spec).await?,
        };

        let slug = job.slug(&tested_subject.sha);
        let title = job.title(&tested_subject.sha);

        let destination = self.destinations.open(&slug)?;
        let index = Arc::new(Index::new(destination.clone()));
        let log = LogStreamer::new(index.clone());

        let header = format!(
            "{title}\nWorker: {host}\n{spec}\n\n",
            host = hostname(),
            spec = serde_json::to_string_pretty(job).unwrap_or_default(),
        );
        log.start(&header)?;

        let status = self.forge.get_status(&job.subject.repo, &tested_subject.sha, job.context.as_deref(), &log.url());
        status.post(StatusState::Pending, "In progress").await.map_err(SupervisorError::Status)?;

        let mut task_set = vec![
            tasks::spawn_run_container(
                self.runner.clone(),
                self.forge.clone(),
                command_subject.clone(),
                job.container.clone(),
                job.env.clone(),
                job.secrets.clone(),
                job.command.clone(),
                log.clone(),
                index.clone(),
            ),
            tasks::spawn_cancellation_watch(cancel),
        ];
        // A zero timeout means "no timeout" (job.py:184's `if job.timeout:`),
        // not an instantly-expiring one.
        if job.timeout != 0 {
            task_set.push(tasks::spawn_timeout(job.timeout));
        }
        if let Some(pull_nr) = job.subject.pull {
            task_set.push(tasks::spawn_pr_poll(
                self.forge.clone(),
                job.subject.repo.clone(),
                pull_nr,
                tested_subject.sha.clone(),
            ));
        }

        let result = tasks::gather_and_cancel(task_set).await;
        let context = job.context.as_deref().unwrap_or(&title);

        // A failed status post is carried past the match rather than
        // returned with `?` there, so it can never skip the
        // unconditional cleanup below; it's still surfaced as this
        // call's error once that cleanup has run.
        let mut status_error = None;

        let outcome = match result {
            Ok(()) => {
                status_error = status.post(StatusState::Success, "Success").await.err().map(SupervisorError::Status);
                Ok(Outcome::Success)
            }
            Err(TaskError::Failure(message)) => {
                status_error = status.post(StatusState::Failure, &message).await.err().map(SupervisorError::Status);
                if let Err(error) = log.write(&format!("*** Failure: {message}\n")) {
                    tracing::warn!(%error, "failed to write failure line to log");
                }
                if let Some(report) = &job.report {
                    let template = json!({
                        "title": format!("{context} failed"),
                        "body": format!(
                            "The job {context} failed on commit {}. Log: {}",
                            tested_subject.sha,
                            log.url(),
                        ),
                    });
                    let merged = cockpit_ci_config::json_merge_patch(template, report.clone());
                    if let Err(error) = self.forge.open_issue(&job.subject.repo, merged).await {
                        tracing::warn!(%error, "failed to file an issue for the failed job");
                    }
                }
                Ok(Outcome::Failure(message))
            }
            Err(TaskError::Cancelled) => {
                status_error = status.post(StatusState::Error, "Cancelled").await.err().map(SupervisorError::Status);
                if let Err(error) = log.write("*** Cancelled\n") {
                    tracing::warn!(%error, "failed to write cancellation line to log");
                }
                Err(SupervisorError::Cancelled)
            }
            Err(TaskError::Infra(error)) => {
                status_error = status.post(StatusState::Error, "Internal error").await.err().map(SupervisorError::Status);
                if let Err(log_error) = log.write(&format!("*** Internal error: {error}\n")) {
                    tracing::warn!(error = %log_error, "failed to write internal-error line to log");
                }
                Err(error)
            }
        };

        if let Err(error) = log.close() {
            tracing::warn!(%error, "failed to close log streamer");
        }
        if let Err(error) = index.sync() {
            tracing::warn!(%error, "failed to sync attachments index");
        }
        if let Err(error) = destination.close().await {
            tracing::warn!(%error, "failed to drain upload queue on shutdown");
        }

        if let Some(error) = status_error {
            return Err(error);
        }

        outcome
    }
}

fn hostname() -> String {
    gethostname::gethostname().into_string().unwrap_or_else(|_| "unknown".to_string())
}
