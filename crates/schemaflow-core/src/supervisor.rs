// Timeout & Orphan Supervisor
// Per-task deadline timers plus a periodic sweep for stuck tasks

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use schemaflow_types::FailureReason;

use crate::registry::TaskRegistry;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Deadline for a single task; an active task older than this is failed
    /// with `TaskTimeout`
    pub task_timeout: Duration,
    /// How often the orphan sweep scans active tasks
    pub sweep_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl SupervisorConfig {
    /// Active tasks older than this are failed by the sweep even if their
    /// own deadline timer never fired
    pub fn orphan_age(&self) -> Duration {
        self.task_timeout * 2
    }
}

/// Arm one task's deadline. The timer only ever routes through the
/// registry's expiry path, which ignores it if the task has since been
/// completed, failed, or restarted under the same id.
pub(crate) fn spawn_deadline(
    registry: TaskRegistry,
    task_id: String,
    timer_id: u64,
    deadline: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                registry.expire_deadline(&task_id, timer_id).await;
            }
        }
    })
}

/// Recurring scan that force-fails tasks stuck past twice the task deadline.
/// Defense in depth: it fires even if a task's own timer inexplicably did
/// not.
pub struct OrphanSweeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl OrphanSweeper {
    pub fn spawn(registry: TaskRegistry, config: SupervisorConfig) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(config.sweep_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let orphan_age = config.orphan_age();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        for (task_id, started) in registry.active_started().await {
                            if started.elapsed() > orphan_age {
                                tracing::warn!(
                                    task_id = %task_id,
                                    age_secs = started.elapsed().as_secs(),
                                    "orphaned task detected"
                                );
                                registry.fail_task(&task_id, FailureReason::OrphanedTask).await;
                            }
                        }
                    }
                }
            }
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop the sweep. No tick may run after this returns.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for OrphanSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use schemaflow_types::TaskStatus;

    fn registry_with_timeout(task_timeout: Duration) -> TaskRegistry {
        TaskRegistry::new(
            EventBus::new(),
            SupervisorConfig {
                task_timeout,
                sweep_interval: Duration::from_secs(30),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_task_times_out_with_task_timeout_reason() {
        let reg = registry_with_timeout(Duration::from_secs(60));
        reg.initialize_session("s1").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();
        // Let the spawned deadline task poll once so its `sleep` registers
        // against the paused clock before we advance it.
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        let status = reg.status().await;
        assert_eq!(status.tasks[0].status, TaskStatus::Error);
        assert_eq!(status.tasks[0].error, Some(FailureReason::TaskTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_just_before_deadline_cancels_the_timer() {
        let reg = registry_with_timeout(Duration::from_secs(60));
        reg.initialize_session("s1").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        reg.complete_task("t1").await;

        // Push well past the original deadline; no late failure may fire.
        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        let status = reg.status().await;
        assert_eq!(status.tasks[0].status, TaskStatus::Completed);
        assert!(status.tasks[0].error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_same_id_leaves_no_dangling_timer() {
        let reg = registry_with_timeout(Duration::from_secs(60));
        reg.initialize_session("s1").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();

        // Just before the first deadline, restart the task under the same id.
        tokio::time::advance(Duration::from_secs(59)).await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();
        // Let the replacement's deadline task poll once so its `sleep`
        // registers against the paused clock before we advance it.
        tokio::task::yield_now().await;

        // Past the old deadline but well within the new one: the replacement
        // task must still be active.
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(reg.status().await.tasks[0].status, TaskStatus::Active);

        // The fresh timer still works.
        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(reg.status().await.tasks[0].status, TaskStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_cancels_previous_session_timers() {
        let reg = registry_with_timeout(Duration::from_secs(60));
        reg.initialize_session("s1").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();

        reg.initialize_session("s2").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();

        // The old session's deadline would have fired by now; the new
        // session's identically-named task must be untouched.
        tokio::time::advance(Duration::from_secs(59)).await;
        tokio::task::yield_now().await;
        assert_eq!(reg.status().await.tasks[0].status, TaskStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn orphan_sweep_fails_tasks_stuck_past_twice_the_deadline() {
        // Registry deadlines are effectively disabled so the sweep is the
        // only mechanism in play.
        let reg = registry_with_timeout(Duration::from_secs(3600));
        reg.initialize_session("s1").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();

        let sweep_config = SupervisorConfig {
            task_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        };
        let mut sweeper = OrphanSweeper::spawn(reg.clone(), sweep_config);

        // Orphan age is 20s; the sweep tick at t=25s is the first to see the
        // task strictly past it.
        tokio::time::advance(Duration::from_secs(26)).await;
        tokio::task::yield_now().await;

        let status = reg.status().await;
        assert_eq!(status.tasks[0].status, TaskStatus::Error);
        assert_eq!(status.tasks[0].error, Some(FailureReason::OrphanedTask));
        sweeper.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_leaves_young_tasks_alone() {
        let reg = registry_with_timeout(Duration::from_secs(3600));
        reg.initialize_session("s1").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();

        let sweep_config = SupervisorConfig {
            task_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        };
        let mut sweeper = OrphanSweeper::spawn(reg.clone(), sweep_config);

        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert_eq!(reg.status().await.tasks[0].status, TaskStatus::Active);
        sweeper.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_sweep() {
        let reg = registry_with_timeout(Duration::from_secs(3600));
        reg.initialize_session("s1").await;
        reg.start_task("t1", "Analysis", "a").await.unwrap();

        let sweep_config = SupervisorConfig {
            task_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        };
        let mut sweeper = OrphanSweeper::spawn(reg.clone(), sweep_config);
        sweeper.shutdown();

        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;

        // Stale sweep must not have fired against the session.
        assert_eq!(reg.status().await.tasks[0].status, TaskStatus::Active);
    }
}
