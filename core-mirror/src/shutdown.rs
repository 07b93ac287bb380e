//! Process shutdown handling.
//!
//! Abnormal termination must never leave a task claiming `copying` across a
//! restart: the next run has to be able to detect the interruption and offer
//! resumption.

use core_store::repositories::task::TaskStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;

/// Flips every `copying` task to `interrupted`. Safe to call at any time;
/// returns how many tasks were flipped.
pub async fn interrupt_active_tasks(tasks: &dyn TaskStore) -> Result<u64> {
    Ok(tasks.interrupt_active().await?)
}

/// Installs a best-effort termination hook: waits for SIGINT (and SIGTERM on
/// unix), then marks in-flight tasks interrupted.
///
/// The returned handle completes once the flip is done; hosts typically
/// `select!` it against their main work and exit when it fires. Abort the
/// handle to uninstall.
pub fn install_interrupt_hook(tasks: Arc<dyn TaskStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination_signal().await;
        match interrupt_active_tasks(tasks.as_ref()).await {
            Ok(0) => info!("Shutdown: no copy tasks were in flight"),
            Ok(flipped) => info!(tasks = flipped, "Shutdown: marked in-flight copy tasks interrupted"),
            Err(e) => warn!(error = %e, "Shutdown: failed to mark tasks interrupted"),
        }
    })
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM; handling SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_store::models::TaskStatus;
    use core_store::{create_test_pool, SqliteTaskRepository};

    #[tokio::test]
    async fn interrupt_flips_only_copying_tasks() {
        let repo = SqliteTaskRepository::new(create_test_pool().await.unwrap());
        let copying = repo.create("a", "b").await.unwrap();
        let errored = repo.create("c", "d").await.unwrap();
        repo.set_status(errored.id, TaskStatus::Error).await.unwrap();

        assert_eq!(interrupt_active_tasks(&repo).await.unwrap(), 1);
        assert_eq!(
            repo.get(copying.id).await.unwrap().unwrap().status,
            TaskStatus::Interrupted
        );
        assert_eq!(
            repo.get(errored.id).await.unwrap().unwrap().status,
            TaskStatus::Error
        );

        // Idempotent: nothing left to flip.
        assert_eq!(interrupt_active_tasks(&repo).await.unwrap(), 0);
    }
}
