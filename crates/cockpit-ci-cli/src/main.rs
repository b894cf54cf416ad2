//! Binary entrypoint: loads configuration, resolves the configured
//! forge/log/container drivers into their concrete implementations,
//! runs one job to completion, and exits with a status reflecting its
//! outcome. Ported from the wiring in `JobContext.__aenter__`
//! (`lib/aio/jobcontext.py`); everything downstream of this file is a
//! library crate that never touches `anyhow` or the filesystem driver
//! lookup directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use cockpit_ci_config::{Config, ForgeDriverConfig, Loader, LogDriverConfig};
use cockpit_ci_core::Job;
use cockpit_ci_forge::{Forge, GitHub, GitHubConfig};
use cockpit_ci_runner::{ContainerRunner, RunnerContext};
use cockpit_ci_store::{FilesystemLogDestinations, LogDestinations, S3LogDestinations, S3Signer, Signer};
use cockpit_ci_supervisor::{CancellationToken, JobSupervisor, Outcome};

/// Runs a single job specification to completion against its
/// configured forge, log destination, and container runtime.
#[derive(Parser)]
#[command(name = "cockpit-ci", version, about = "Runs one CI job to completion")]
struct Cli {
    /// Path to the job specification (JSON), or `-` to read it from stdin.
    job: PathBuf,

    /// Configuration file, overriding $JOB_RUNNER_CONFIG and the user
    /// configuration path (spec.md §6.2's precedence chain).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit DEBUG-level logs.
    #[arg(short, long)]
    verbose: bool,

    /// Emit newline-delimited JSON log lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cockpit_ci_core::telemetry::init_tracing(cli.json, if cli.verbose { Level::DEBUG } else { Level::INFO });

    match run(cli).await? {
        Outcome::Success => Ok(()),
        Outcome::Failure(message) => {
            tracing::warn!(%message, "job reported failure");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let job_json = read_job_spec(&cli.job)?;
    let job: Job = serde_json::from_str(&job_json).context("parsing job specification")?;

    let config = load_config(cli.config.as_deref())?;
    let forge = build_forge(&config)?;
    let destinations = build_destinations(&config)?;
    let runner = Arc::new(ContainerRunner::new(container_context(&config)));

    let supervisor = JobSupervisor::new(forge, destinations, runner);
    let cancel = CancellationToken::new();
    let watch = spawn_interrupt_watch(cancel.clone());

    let outcome = supervisor.run(&job, cancel).await;
    watch.abort();
    Ok(outcome?)
}

fn read_job_spec(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading job specification from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading job specification from {}", path.display()))
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let loader = Loader::load(explicit, &user_config_path()).context("loading configuration")?;
    Config::from_value(loader.into_value()).context("validating configuration")
}

/// Mirrors the original's `xdg_config_home('cockpit-dev/job-runner.toml')`.
fn user_config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string())).join(".config"));
    base.join("cockpit-dev/job-runner.toml")
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string())).join(rest),
        None => PathBuf::from(path),
    }
}

fn container_context(config: &Config) -> RunnerContext {
    RunnerContext {
        container_cmd: config.container.command.clone(),
        container_run_args: config.container.run_args.clone(),
        secrets_args: config.container.secrets.clone(),
        default_image: config.container.default_image.clone(),
        // Baked into every test image; not configurable (spec.md §1 Non-goals).
        entrypoint: vec!["checkout-and-run".to_string()],
        debug: config.container.debug,
    }
}

fn build_forge(config: &Config) -> Result<Arc<dyn Forge>> {
    match config.forge.resolve().context("resolving [forge] driver")? {
        ForgeDriverConfig::Github(github) => {
            let ca_pem = github
                .ca
                .as_ref()
                .map(std::fs::read)
                .transpose()
                .context("reading forge.github.ca")?;
            let github_config = GitHubConfig {
                clone_url: reqwest::Url::parse(&github.clone_url).context("forge.github.clone-url")?,
                api_url: reqwest::Url::parse(&github.api_url).context("forge.github.api-url")?,
                content_url: reqwest::Url::parse(&github.content_url).context("forge.github.content-url")?,
                token: if github.token.is_empty() { None } else { Some(github.token.clone()) },
                post: github.post,
                ca_pem,
                user_agent: github.user_agent.clone(),
                cache_capacity: 0,
            };
            Ok(Arc::new(GitHub::new(github_config).context("constructing GitHub forge client")?))
        }
    }
}

fn build_destinations(config: &Config) -> Result<Arc<dyn LogDestinations>> {
    match config.logs.resolve().context("resolving [logs] driver")? {
        LogDriverConfig::Local(local) => {
            let link = reqwest::Url::parse(&local.link).context("logs.local.link")?;
            Ok(Arc::new(FilesystemLogDestinations::new(expand_home(&local.dir), link)))
        }
        LogDriverConfig::S3(s3) => {
            let url = reqwest::Url::parse(&s3.url).context("logs.s3.url")?;
            let proxy_url = match &s3.proxy_url {
                Some(proxy) => reqwest::Url::parse(proxy).context("logs.s3.proxy_url")?,
                None => url.clone(),
            };
            let (access_key, secret_key) = s3.key.access_secret();
            let signer: Arc<dyn Signer> = Arc::new(S3Signer::new(access_key, secret_key));
            Ok(Arc::new(S3LogDestinations::new(reqwest::Client::new(), signer, url, proxy_url, s3.acl.clone())))
        }
    }
}

/// Cancels the job cleanly on Ctrl-C/SIGINT rather than letting the
/// process die mid-upload (spec.md §7 kind 7, "Cancellation from
/// outside").
fn spawn_interrupt_watch(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt signal, cancelling the running job");
            cancel.cancel();
        }
    })
}
