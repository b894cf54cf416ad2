//! The task set run concurrently for one job, ported from
//! `run_container`/`timeout_minutes`/`poll_pr` in `lib/aio/job.py` and
//! `gather_and_cancel` in `lib/aio/util.py`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cockpit_ci_core::Subject;
use cockpit_ci_forge::Forge;
use cockpit_ci_log::{Index, LogStreamer};
use cockpit_ci_runner::ContainerRunner;
use futures::future::select_all;
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::error::TaskError;

type TaskResult = std::result::Result<(), TaskError>;

#[allow(clippy::too_many_arguments)]
pub fn spawn_run_container(
    runner: Arc<ContainerRunner>,
    forge: Arc<dyn Forge>,
    subject: Subject,
    job_container: Option<String>,
    env: BTreeMap<String, String>,
    secrets: Vec<String>,
    command: Option<Vec<String>>,
    log: Arc<LogStreamer>,
    index: Arc<Index>,
) -> JoinHandle<TaskResult> {
    tokio::spawn(async move {
        runner
            .run(
                forge.as_ref(),
                &subject,
                job_container.as_deref(),
                &env,
                &secrets,
                command.as_deref(),
                &log,
                &index,
            )
            .await
            .map_err(TaskError::from)
    })
}

pub fn spawn_timeout(minutes: u32) -> JoinHandle<TaskResult> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60 * minutes as u64)).await;
        Err(TaskError::Failure(format!("Timeout after {minutes} minutes")))
    })
}

pub fn spawn_pr_poll(forge: Arc<dyn Forge>, repo: String, pull_nr: u64, expected_sha: String) -> JoinHandle<TaskResult> {
    tokio::spawn(async move {
        loop {
            if let Some(reason) = forge.check_pr_changed(&repo, pull_nr, &expected_sha).await {
                return Err(TaskError::Failure(reason));
            }
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    })
}

pub fn spawn_cancellation_watch(cancel: CancellationToken) -> JoinHandle<TaskResult> {
    tokio::spawn(async move {
        cancel.cancelled().await;
        Err(TaskError::Cancelled)
    })
}

/// Runs every handle in `tasks` to first completion, aborts the rest,
/// and awaits their cancellation before returning — the tokio
/// translation of `asyncio.wait(tasks, return_when=FIRST_COMPLETED)`
/// followed by cancelling and awaiting the remainder.
pub async fn gather_and_cancel(tasks: Vec<JoinHandle<TaskResult>>) -> TaskResult {
    let (winner, _index, remaining) = select_all(tasks).await;

    for handle in &remaining {
        handle.abort();
    }
    for handle in remaining {
        let _ = handle.await;
    }

    match winner {
        Ok(result) => result,
        Err(join_error) => Err(TaskError::Infra(crate::error::SupervisorError::Join(join_error))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_completion_wins_and_cancels_the_rest() {
        let fast = tokio::spawn(async { Ok(()) });
        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let result = gather_and_cancel(vec![fast, slow]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn a_failing_task_propagates_its_message() {
        let failing = tokio::spawn(async { Err(TaskError::Failure("boom".to_string())) });
        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let result = gather_and_cancel(vec![failing, slow]).await;
        match result {
            Err(TaskError::Failure(message)) => assert_eq!(message, "boom"),
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_token_wins_and_is_reported() {
        let cancel = CancellationToken::new();
        let watch = spawn_cancellation_watch(cancel.clone());
        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        cancel.cancel();
        let result = gather_and_cancel(vec![watch, slow]).await;
        assert!(matches!(result, Err(TaskError::Cancelled)));
    }
}
