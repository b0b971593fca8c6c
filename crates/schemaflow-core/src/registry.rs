// Task Registry
// Single source of truth for task state and accumulated content

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use schemaflow_types::{
    FailureReason, SessionEvent, SessionSnapshot, SessionStatus, Task, TaskStatus,
};

use crate::error::{Result, SchemaflowError};
use crate::event_bus::EventBus;
use crate::supervisor::{self, SupervisorConfig};

struct ArmedTimer {
    timer_id: u64,
    handle: JoinHandle<()>,
}

struct RegistryInner {
    session_id: Option<String>,
    /// Insertion order preserved for deterministic iteration
    tasks: Vec<Task>,
    /// Monotonic start instants, kept registry-side so the orphan sweep can
    /// measure age against the tokio clock
    started: HashMap<String, Instant>,
    cancel: CancellationToken,
}

/// Owns the set of tasks for the active session. All other components read
/// it via snapshots or mutate it through these operations only.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    timers: Arc<StdMutex<HashMap<String, ArmedTimer>>>,
    timer_seq: Arc<AtomicU64>,
    bus: EventBus,
    config: SupervisorConfig,
}

impl TaskRegistry {
    pub fn new(bus: EventBus, config: SupervisorConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                session_id: None,
                tasks: Vec::new(),
                started: HashMap::new(),
                cancel: CancellationToken::new(),
            })),
            timers: Arc::new(StdMutex::new(HashMap::new())),
            timer_seq: Arc::new(AtomicU64::new(0)),
            bus,
            config,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Discard any existing tasks and timers and start a fresh session.
    /// Safe to call mid-flight: every pending timer of the previous session
    /// is cancelled before the task set is cleared.
    pub async fn initialize_session(&self, session_id: &str) {
        let mut inner = self.inner.write().await;
        inner.cancel.cancel();
        self.clear_timers();
        inner.tasks.clear();
        inner.started.clear();
        inner.session_id = Some(session_id.to_string());
        inner.cancel = CancellationToken::new();
        tracing::info!(session_id, "session initialized");
        self.bus.publish(SessionEvent::SessionInitialized {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Create (or replace) a task in active state with empty content and a
    /// fresh deadline timer. Replacing a live id clears its prior timer
    /// first, so no timer from the old incarnation can fire against the new
    /// one.
    pub async fn start_task(&self, task_id: &str, title: &str, agent: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.session_id.is_none() {
            return Err(SchemaflowError::InvalidState(
                "start_task called with no active session".to_string(),
            ));
        }
        self.disarm(task_id);

        let task = Task::new(task_id.to_string(), title.to_string(), agent.to_string());
        match inner.tasks.iter_mut().find(|t| t.id == task_id) {
            Some(existing) => *existing = task.clone(),
            None => inner.tasks.push(task.clone()),
        }
        inner.started.insert(task_id.to_string(), Instant::now());

        let timer_id = self.timer_seq.fetch_add(1, Ordering::Relaxed);
        let handle = supervisor::spawn_deadline(
            self.clone(),
            task_id.to_string(),
            timer_id,
            self.config.task_timeout,
            inner.cancel.child_token(),
        );
        if let Ok(mut timers) = self.timers.lock() {
            timers.insert(task_id.to_string(), ArmedTimer { timer_id, handle });
        }

        tracing::debug!(task_id, agent, "task started");
        self.bus.publish(SessionEvent::TaskStarted {
            task_id: task_id.to_string(),
            task,
        });
        Ok(())
    }

    /// Append a chunk to an active task's content. No-op if the task is
    /// absent; never resurrects a task that is not active.
    pub async fn append_content(&self, task_id: &str, chunk: &str) {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == task_id) else {
            return;
        };
        if task.status != TaskStatus::Active {
            return;
        }
        task.content.push_str(chunk);
        self.bus.publish(SessionEvent::ContentChunk {
            task_id: task_id.to_string(),
            content: chunk.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Freeze an active task as completed and disarm its deadline.
    pub async fn complete_task(&self, task_id: &str) {
        self.disarm(task_id);
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == task_id) else {
            return;
        };
        if task.status != TaskStatus::Active {
            return;
        }
        task.status = TaskStatus::Completed;
        task.ended_at = Some(Utc::now());
        let task = task.clone();
        tracing::debug!(task_id, "task completed");
        self.bus.publish(SessionEvent::TaskCompleted {
            task_id: task_id.to_string(),
            task,
        });
    }

    /// Freeze an active task as errored and disarm its deadline.
    pub async fn fail_task(&self, task_id: &str, reason: FailureReason) {
        self.disarm(task_id);
        self.fail_inner(task_id, reason).await;
    }

    /// Deadline expiry path, entered only from the task's own timer. The
    /// timer entry is removed without aborting (the timer is the caller);
    /// a stale timer whose id no longer matches is ignored.
    pub(crate) async fn expire_deadline(&self, task_id: &str, timer_id: u64) {
        let owned = match self.timers.lock() {
            Ok(mut timers) => match timers.get(task_id) {
                Some(armed) if armed.timer_id == timer_id => {
                    timers.remove(task_id);
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };
        if owned {
            tracing::warn!(task_id, "task deadline elapsed");
            self.fail_inner(task_id, FailureReason::TaskTimeout).await;
        }
    }

    async fn fail_inner(&self, task_id: &str, reason: FailureReason) {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == task_id) else {
            return;
        };
        if task.status != TaskStatus::Active {
            return;
        }
        task.status = TaskStatus::Error;
        task.ended_at = Some(Utc::now());
        task.error = Some(reason.clone());
        tracing::warn!(task_id, %reason, "task failed");
        self.bus.publish(SessionEvent::Error {
            task_id: Some(task_id.to_string()),
            error: reason,
            timestamp: Utc::now(),
        });
    }

    /// Immutable snapshot of all tasks for aggregation. Does not clear the
    /// registry.
    pub async fn close_session(&self) -> Result<SessionSnapshot> {
        let inner = self.inner.read().await;
        let session_id = inner.session_id.clone().ok_or_else(|| {
            SchemaflowError::InvalidState("close_session called with no active session".to_string())
        })?;
        Ok(SessionSnapshot {
            session_id,
            tasks: inner.tasks.clone(),
            captured_at: Utc::now(),
        })
    }

    /// Read-only summary of the current session
    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.read().await;
        let active_task = inner.tasks.iter().find(|t| t.is_active()).cloned();
        let completed_count = inner
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        SessionStatus {
            active_task,
            completed_count,
            total_count: inner.tasks.len(),
            tasks: inner.tasks.clone(),
        }
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.read().await.session_id.clone()
    }

    /// `(task_id, started)` for every active task; input to the orphan sweep
    pub(crate) async fn active_started(&self) -> Vec<(String, Instant)> {
        let inner = self.inner.read().await;
        inner
            .tasks
            .iter()
            .filter(|t| t.is_active())
            .filter_map(|t| inner.started.get(&t.id).map(|s| (t.id.clone(), *s)))
            .collect()
    }

    /// Cancel every outstanding timer and drop all session state without
    /// emitting events. Used on reset/teardown.
    pub async fn destroy(&self) {
        let mut inner = self.inner.write().await;
        inner.cancel.cancel();
        self.clear_timers();
        inner.tasks.clear();
        inner.started.clear();
        inner.session_id = None;
    }

    fn disarm(&self, task_id: &str) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(armed) = timers.remove(task_id) {
                armed.handle.abort();
            }
        }
    }

    fn clear_timers(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            for (_, armed) in timers.drain() {
                armed.handle.abort();
            }
        }
    }
}
