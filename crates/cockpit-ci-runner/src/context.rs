//! Per-runner configuration, ported from the `[container]` section of
//! the original's `JobContext` (`lib/aio/jobcontext.py`).

use std::collections::BTreeMap;

/// Everything the container runner needs that isn't specific to one
/// job: the container runtime invocation, the secret-name-to-argument
/// mapping, and the default image.
#[derive(Debug, Clone)]
pub struct RunnerContext {
    /// The container runtime binary and any leading arguments, e.g.
    /// `["podman"]` or `["docker"]`.
    pub container_cmd: Vec<String>,
    /// Extra arguments passed to `<container_cmd> run`, before
    /// `--cidfile`.
    pub container_run_args: Vec<String>,
    /// Pre-tokenized argument groups, keyed by secret name. A secret
    /// name present in `Job::secrets` contributes its whole group to
    /// the container command; expansion is a flat-map, never shell
    /// interpolation (spec.md §9).
    pub secrets_args: BTreeMap<String, Vec<String>>,
    pub default_image: String,
    /// The built-in entrypoint invocation baked into every test
    /// image, e.g. `["checkout-and-run"]`. The program it names is an
    /// external collaborator (spec.md §1 Non-goals) — the runner only
    /// constructs the argv that invokes it.
    pub entrypoint: Vec<String>,
    /// Tee container output to the runner's own stdout, colorized when
    /// attached to a TTY (SPEC_FULL.md §2.2, ambient operability
    /// addition carried from the original's `ctx.debug`).
    pub debug: bool,
}

impl RunnerContext {
    /// The argument groups for every secret name in `secrets` that
    /// this context knows how to expand, in the context's configured
    /// order (not the job's).
    pub fn secret_groups<'a>(&'a self, secrets: &[String]) -> Vec<&'a str> {
        self.secrets_args
            .iter()
            .filter(|(name, _)| secrets.iter().any(|s| s == *name))
            .flat_map(|(_, args)| args.iter().map(String::as_str))
            .collect()
    }
}
