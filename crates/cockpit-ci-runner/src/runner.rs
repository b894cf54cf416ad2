//! Runs one job's container, ported from `run_container()` in
//! `lib/aio/job.py`: resolve the image, build the argv the checkout
//! entrypoint expects, stream output into the log, pull attachments
//! out once the container has finished, and force-remove it no matter
//! how execution ended.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use cockpit_ci_core::Subject;
use cockpit_ci_forge::Forge;
use cockpit_ci_log::{Index, LogStreamer};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::context::RunnerContext;
use crate::decode::Utf8StreamDecoder;
use crate::error::{Result, RunnerError};

const ATTACHMENTS_MOUNT: &str = "/var/tmp/attachments";

/// One job's container, container image and command already decided
/// by the caller's [`cockpit_ci_core::domain::job::Job`]; this type
/// only knows how to run it.
pub struct ContainerRunner {
    ctx: RunnerContext,
}

impl ContainerRunner {
    pub fn new(ctx: RunnerContext) -> Self {
        Self { ctx }
    }

    /// Resolves the container image for this job: an explicit
    /// per-job override, then a `.cockpit-ci/container` file at the
    /// resolved revision, then the context's default.
    async fn resolve_image(
        &self,
        forge: &dyn Forge,
        subject: &Subject,
        job_container: Option<&str>,
    ) -> Result<String> {
        if let Some(image) = job_container {
            return Ok(image.trim().to_string());
        }
        if let Some(image) = forge.read_file(subject, ".cockpit-ci/container").await? {
            return Ok(image.trim().to_string());
        }
        Ok(self.ctx.default_image.trim().to_string())
    }

    /// Runs `job`'s container against `subject` (the resolved subject
    /// supplying the code to execute, which may differ from the
    /// subject under test via `command_subject`), streaming its
    /// combined stdout/stderr into `log` and uploading attachments
    /// through `index`.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        forge: &dyn Forge,
        subject: &Subject,
        job_container: Option<&str>,
        env: &std::collections::BTreeMap<String, String>,
        secrets: &[String],
        command: Option<&[String]>,
        log: &Arc<LogStreamer>,
        index: &Index,
    ) -> Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let cidfile = tmpdir.path().join("cidfile");
        let attachments = tmpdir.path().join("attachments");

        let image = self.resolve_image(forge, subject, job_container).await?;
        log.write(&format!("Using container image: {image}\n"))?;

        let mut args: Vec<String> = Vec::new();
        args.extend(self.ctx.container_cmd.iter().cloned());
        args.push("run".to_string());
        args.push("--init".to_string());
        args.extend(self.ctx.container_run_args.iter().cloned());
        args.push(format!("--cidfile={}", cidfile.display()));
        for (k, v) in env {
            args.push(format!("--env={k}={v}"));
        }
        args.push(format!("--env=TEST_ATTACHMENTS={ATTACHMENTS_MOUNT}"));
        args.push(format!("--env=COCKPIT_CI_LOG_URL={}", log.url()));
        args.extend(self.ctx.secret_groups(secrets).into_iter().map(str::to_string));

        args.push(image);

        args.extend(self.ctx.entrypoint.iter().cloned());

        args.extend(subject.revision_args());
        args.push(forge.clone_url_for(&subject.repo));

        if let Some(command) = command {
            args.push("--".to_string());
            args.extend(command.iter().cloned());
        }

        let command_name = args[0].clone();
        let mut child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn { command: command_name, source })?;

        // Guards the force-remove even when this task is the loser of
        // `gather_and_cancel`'s race and gets aborted mid-`drive`: an
        // aborted future is dropped at its current await point, so
        // nothing after `drive()` in this function would otherwise run.
        let _cid_guard = CidfileGuard { container_cmd: self.ctx.container_cmd.clone(), cidfile: cidfile.clone() };

        self.drive(&mut child, &cidfile, &attachments, log, index).await
    }

    async fn drive(
        &self,
        child: &mut tokio::process::Child,
        cidfile: &Path,
        attachments: &Path,
        log: &Arc<LogStreamer>,
        index: &Index,
    ) -> Result<()> {
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        // Piped separately rather than dup2'd onto one fd (the
        // original's `stderr=asyncio.subprocess.STDOUT`): tokio's
        // `Command` has no safe way to hand both streams the same
        // write end before spawn. Pumping them concurrently into the
        // same log still merges both into one sink; only their
        // byte-exact interleaving order isn't guaranteed.
        tokio::try_join!(self.pump(stdout, log), self.pump(stderr, log))?;

        // Only after EOF on the output can the cidfile be trusted: its
        // absence here means the container was never created, not
        // that the job merely failed (job.py's run_container comment).
        let cid = std::fs::read_to_string(cidfile).map_err(|_| RunnerError::ContainerCreateFailed)?;
        let cid = cid.trim();

        self.copy_attachments(cid, attachments).await?;
        self.upload_attachments(attachments, index)?;

        let status = child.wait().await?;
        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(RunnerError::Failure(format!("Container exited with code {code}"))),
            None => Err(RunnerError::Failure("Container terminated by signal".to_string())),
        }
    }

    /// Drains one of the container's output streams into `log` until
    /// EOF, decoding incrementally so a multi-byte character split
    /// across reads never becomes a stray replacement character.
    async fn pump(&self, mut stream: impl tokio::io::AsyncRead + Unpin, log: &Arc<LogStreamer>) -> Result<()> {
        let mut decoder = Utf8StreamDecoder::new();
        let mut buf = [0u8; 65536];

        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let text = decoder.decode(&buf[..n]);
            if !text.is_empty() {
                log.write(&text)?;
                if self.ctx.debug {
                    self.tee(&text);
                }
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            log.write(&tail)?;
            if self.ctx.debug {
                self.tee(&tail);
            }
        }
        Ok(())
    }

    fn tee(&self, text: &str) {
        use std::io::IsTerminal;
        if std::io::stdout().is_terminal() {
            print!("\u{1b}[34m{text}\u{1b}[0m");
        } else {
            print!("{text}");
        }
    }

    async fn copy_attachments(&self, cid: &str, attachments: &Path) -> Result<()> {
        let mut args = self.ctx.container_cmd.clone();
        args.push("cp".to_string());
        args.push("--".to_string());
        args.push(format!("{cid}:{ATTACHMENTS_MOUNT}/."));
        args.push(attachments.display().to_string());

        let status = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| RunnerError::Spawn { command: args[0].clone(), source })?;

        if !status.success() {
            tracing::warn!(?status, "container cp for attachments did not succeed; no attachments exist or the container produced none");
        }
        Ok(())
    }

    fn upload_attachments(&self, attachments: &Path, index: &Index) -> Result<()> {
        cockpit_ci_log::scan_attachments(index, attachments)?;
        Ok(())
    }
}

/// Unconditionally tears the container down on drop, including on the
/// abort path where nothing after the dropped await point would
/// otherwise run (`gather_and_cancel`'s loser), and including a
/// process exiting immediately after a `Failure` outcome, which races
/// and beats any cleanup left as an unawaited detached task. `Drop`
/// can't `.await`, so this blocks the current thread briefly on the
/// synchronous `std::process::Command`, rather than spawning work that
/// might never get polled before the process is gone. Errors are
/// logged, never propagated (job.py's `finally` block never lets
/// cleanup become the reported error).
struct CidfileGuard {
    container_cmd: Vec<String>,
    cidfile: std::path::PathBuf,
}

impl Drop for CidfileGuard {
    fn drop(&mut self) {
        let mut args = self.container_cmd.clone();
        args.push("rm".to_string());
        args.push("--force".to_string());
        args.push("--time=0".to_string());
        args.push(format!("--cidfile={}", self.cidfile.display()));

        let result = std::process::Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        if let Err(error) = result {
            tracing::warn!(%error, "failed to force-remove container");
        }
    }
}
