// Session Transition Controller
// idle -> streaming -> transitioning -> complete, with error and reset

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use schemaflow_types::{AggregationMode, FailureReason, FinalResult, SessionEvent};

use crate::aggregate::Aggregator;
use crate::error::{Result, SchemaflowError};
use crate::event_bus::EventBus;
use crate::registry::TaskRegistry;
use crate::supervisor::{OrphanSweeper, SupervisorConfig};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// The stream is considered quiescent once content has been observed, no
    /// task is active, and nothing has happened for this long. There is no
    /// explicit end-of-stream signal from the generation layer; this window
    /// is the documented completion contract.
    pub quiesce_grace: Duration,
    /// How often the quiescence condition is re-checked
    pub health_check_interval: Duration,
    pub supervisor: SupervisorConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            quiesce_grace: Duration::from_secs(2),
            health_check_interval: Duration::from_millis(500),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Caller-facing session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Streaming,
    Transitioning,
    Complete,
    Error,
}

struct ControllerState {
    stream_state: StreamState,
    session_id: Option<String>,
    result: Option<FinalResult>,
    error: Option<String>,
}

// ============================================================================
// Controller
// ============================================================================

/// The externally-facing state machine. Sequences the registry, supervision,
/// and aggregation in response to caller calls and bus notifications.
/// Explicitly constructed and caller-owned; independent controllers are
/// fully isolated from each other.
#[derive(Clone)]
pub struct SessionController {
    registry: TaskRegistry,
    bus: EventBus,
    aggregator: Arc<Aggregator>,
    config: ControllerConfig,
    state: Arc<RwLock<ControllerState>>,
    watcher: Arc<StdMutex<Option<JoinHandle<()>>>>,
    sweeper: Arc<StdMutex<Option<OrphanSweeper>>>,
}

impl SessionController {
    pub fn new(config: ControllerConfig) -> Self {
        let bus = EventBus::new();
        let registry = TaskRegistry::new(bus.clone(), config.supervisor);
        Self {
            registry,
            bus,
            aggregator: Arc::new(Aggregator::new()),
            config,
            state: Arc::new(RwLock::new(ControllerState {
                stream_state: StreamState::Idle,
                session_id: None,
                result: None,
                error: None,
            })),
            watcher: Arc::new(StdMutex::new(None)),
            sweeper: Arc::new(StdMutex::new(None)),
        }
    }

    /// The registry content/progress callbacks from the generation layer
    /// should be forwarded to
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub async fn state(&self) -> StreamState {
        self.state.read().await.stream_state
    }

    pub async fn final_result(&self) -> Option<FinalResult> {
        self.state.read().await.result.clone()
    }

    pub async fn error_message(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    /// idle -> streaming. Ignored while a stream is already in flight, and
    /// for a session that has already completed.
    pub async fn start_streaming(&self, session_id: &str) -> Result<()> {
        {
            let state = self.state.read().await;
            match state.stream_state {
                StreamState::Streaming | StreamState::Transitioning => return Ok(()),
                StreamState::Complete
                    if state.session_id.as_deref() == Some(session_id) =>
                {
                    return Ok(())
                }
                _ => {}
            }
        }

        self.stop_watcher();
        self.registry.initialize_session(session_id).await;

        {
            let mut state = self.state.write().await;
            state.stream_state = StreamState::Streaming;
            state.session_id = Some(session_id.to_string());
            state.result = None;
            state.error = None;
        }

        if let Ok(mut guard) = self.sweeper.lock() {
            // Dropping the previous sweeper shuts it down.
            *guard = Some(OrphanSweeper::spawn(
                self.registry.clone(),
                self.config.supervisor,
            ));
        }

        // Subscribe before returning so no event emitted after this call can
        // be missed by the watcher.
        let rx = self.bus.subscribe();
        let controller = self.clone();
        let handle = tokio::spawn(async move { controller.watch_quiescence(rx).await });
        if let Ok(mut guard) = self.watcher.lock() {
            *guard = Some(handle);
        }

        tracing::info!(session_id, "streaming started");
        Ok(())
    }

    /// Emergency path: aggregate whatever is currently captured and jump
    /// straight to complete.
    pub async fn force_complete(&self) -> Result<FinalResult> {
        {
            let state = self.state.read().await;
            if !matches!(
                state.stream_state,
                StreamState::Streaming | StreamState::Transitioning
            ) {
                return Err(SchemaflowError::InvalidState(format!(
                    "force_complete is only valid while streaming, state is {:?}",
                    state.stream_state
                )));
            }
        }
        self.stop_watcher();
        tracing::warn!("forcing session completion");
        self.finalize(AggregationMode::Forced).await
    }

    /// Clear all accumulated state and re-arm for a new session. Valid from
    /// any state.
    pub async fn reset(&self) {
        self.stop_watcher();
        self.stop_sweeper();
        self.registry.destroy().await;

        let mut state = self.state.write().await;
        state.stream_state = StreamState::Idle;
        state.session_id = None;
        state.result = None;
        state.error = None;
        tracing::info!("session controller reset");
    }

    /// Watch bus notifications for the quiescence condition: content has
    /// been observed, no task is active, and the grace window has elapsed
    /// since the last sign of life.
    async fn watch_quiescence(&self, mut rx: broadcast::Receiver<SessionEvent>) {
        let mut content_seen = false;
        let mut last_activity = Instant::now();
        let mut tick = tokio::time::interval(self.config.health_check_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(SessionEvent::ContentChunk { .. }) => {
                        content_seen = true;
                        last_activity = Instant::now();
                    }
                    Ok(SessionEvent::TaskStarted { .. })
                    | Ok(SessionEvent::TaskCompleted { .. })
                    | Ok(SessionEvent::Error { .. }) => {
                        last_activity = Instant::now();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "quiescence watcher lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = tick.tick() => {
                    let status = self.registry.status().await;
                    if !content_seen {
                        // Fall back to registry evidence in case a chunk
                        // notification was lost to bus lag.
                        content_seen = status.tasks.iter().any(|t| !t.content.is_empty());
                    }
                    if !content_seen {
                        continue;
                    }
                    if status.active_task.is_none()
                        && status.total_count > 0
                        && last_activity.elapsed() >= self.config.quiesce_grace
                    {
                        tracing::info!("stream quiescent, closing session");
                        let _ = self.finalize(AggregationMode::Auto).await;
                        break;
                    }
                }
            }
        }
    }

    /// streaming -> transitioning -> complete. Any failure lands in the
    /// error state with a human-readable message.
    async fn finalize(&self, mode: AggregationMode) -> Result<FinalResult> {
        {
            let mut state = self.state.write().await;
            if !matches!(
                state.stream_state,
                StreamState::Streaming | StreamState::Transitioning
            ) {
                return Err(SchemaflowError::InvalidState(format!(
                    "cannot finalize from {:?}",
                    state.stream_state
                )));
            }
            state.stream_state = StreamState::Transitioning;
        }

        match self.try_aggregate(mode).await {
            Ok(result) => {
                {
                    let mut state = self.state.write().await;
                    state.stream_state = StreamState::Complete;
                    state.result = Some(result.clone());
                }
                self.stop_sweeper();
                Ok(result)
            }
            Err(err) => {
                let message = err.to_string();
                {
                    let mut state = self.state.write().await;
                    state.stream_state = StreamState::Error;
                    state.error = Some(message.clone());
                }
                self.bus.publish(SessionEvent::Error {
                    task_id: None,
                    error: FailureReason::Generation { message },
                    timestamp: chrono::Utc::now(),
                });
                Err(err)
            }
        }
    }

    async fn try_aggregate(&self, mode: AggregationMode) -> Result<FinalResult> {
        let snapshot = self.registry.close_session().await?;
        let result = self.aggregator.aggregate(&snapshot, mode);
        self.bus.publish(SessionEvent::SessionCompleted {
            session_id: snapshot.session_id.clone(),
            final_results: result.clone(),
            summary: snapshot.progress(),
        });
        Ok(result)
    }

    fn stop_watcher(&self) {
        if let Ok(mut guard) = self.watcher.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    fn stop_sweeper(&self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(mut sweeper) = guard.take() {
                sweeper.shutdown();
            }
        }
    }
}
