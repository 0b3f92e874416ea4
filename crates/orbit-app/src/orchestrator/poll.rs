//! Periodic bridge polling task

use std::sync::Arc;
use std::time::Duration;

use orbit_bridge::CommandExecutor;
use orbit_core::prelude::*;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Orchestrator;

/// Floor for the poll period
pub const POLL_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to a running poll loop
#[derive(Debug)]
pub struct PollHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop and wait up to `grace` for it
    ///
    /// Returns `false` if the loop had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => {
                debug!("Poll loop stopped");
                true
            }
            Err(_) => {
                warn!("Poll loop did not stop within {:?}, aborting", grace);
                self.task.abort();
                false
            }
        }
    }
}

/// Spawn the poll loop for `orchestrator`
///
/// The first poll runs immediately. Poll failures are logged by the
/// orchestrator and never end the loop; only the shutdown signal (or the
/// handle being dropped) does.
pub fn spawn_poll_loop<E>(orchestrator: Arc<Orchestrator<E>>, interval: Duration) -> PollHandle
where
    E: CommandExecutor + Sync + 'static,
{
    let interval = interval.max(POLL_MIN_INTERVAL);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Polling bridge devices every {:?}", interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = orchestrator.poll_bridge_devices().await {
                        trace!("Poll failed: {}", e);
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Poll loop: shutdown signal received");
                        break;
                    }
                }
            }
        }
    });

    PollHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use orbit_bridge::test_utils::{devices_output, ScriptedExecutor};
    use orbit_bridge::Tool;

    fn orchestrator(executor: &Arc<ScriptedExecutor>) -> Arc<Orchestrator<ScriptedExecutor>> {
        Arc::new(Orchestrator::new(Arc::clone(executor), Settings::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond_ok("devices", &devices_output(&[("ABC123", "device")]));
        let orchestrator = orchestrator(&executor);

        let handle = spawn_poll_loop(Arc::clone(&orchestrator), Duration::from_secs(3));
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(executor.calls_to(Tool::Bridge, "devices").len(), 3);
        assert_eq!(orchestrator.list_devices().await.len(), 1);

        assert!(handle.shutdown(Duration::from_secs(2)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_do_not_stop_loop() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orchestrator = orchestrator(&executor);

        let handle = spawn_poll_loop(Arc::clone(&orchestrator), Duration::from_secs(3));
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(executor.calls_to(Tool::Bridge, "devices").len(), 3);
        assert!(!handle.is_finished());
        assert!(handle.shutdown(Duration::from_secs(2)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_poll_is_aborted_after_grace() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond_ok("devices", &devices_output(&[]));
        executor.delay("devices", Duration::from_secs(3600));
        let orchestrator = orchestrator(&executor);

        let handle = spawn_poll_loop(Arc::clone(&orchestrator), Duration::from_secs(3));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.shutdown(Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_has_floor() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond_ok("devices", &devices_output(&[]));
        let orchestrator = orchestrator(&executor);

        let handle = spawn_poll_loop(Arc::clone(&orchestrator), Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(600)).await;

        // ticks at 0, 250 and 500 ms
        assert_eq!(executor.calls_to(Tool::Bridge, "devices").len(), 3);
        handle.shutdown(Duration::from_secs(1)).await;
    }
}
