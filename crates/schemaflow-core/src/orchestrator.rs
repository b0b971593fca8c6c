// Resilient Generation Orchestrator
// Pre-flight diagnostics -> bounded retries -> fallback path -> static content

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use schemaflow_providers::{
    prompts::{DesignPrompts, StaticContent},
    DesignProvider, GenerateError,
};
use schemaflow_types::{DesignDomain, Diagnostics, FailureReason, PhaseKind};

use crate::error::{Result, SchemaflowError};
use crate::registry::TaskRegistry;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Primary-path attempts before the fallback path takes over
    pub retry_attempts: u32,
    /// Deadline for a single generation attempt
    pub attempt_timeout: Duration,
    /// Fixed pause between attempts; deliberately not exponential to bound
    /// total latency
    pub retry_pause: Duration,
    /// Bound on the pre-flight reachability probe
    pub probe_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 2,
            attempt_timeout: Duration::from_secs(45),
            retry_pause: Duration::from_millis(750),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// A phase produced directly by a generation path, before aggregation
#[derive(Debug, Clone)]
pub struct GeneratedPhase {
    pub kind: PhaseKind,
    pub confidence: f64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub enum DesignOutput {
    /// Full multi-phase text from the primary path, classified later by the
    /// aggregator
    Primary { content: String },
    /// Synthetic analysis + design pair from the fallback path
    Fallback { phases: Vec<GeneratedPhase> },
}

#[derive(Debug, Clone)]
pub struct DesignOutcome {
    pub output: DesignOutput,
    pub fallback_used: bool,
    pub attempts_used: u32,
}

const PRIMARY_AGENT: &str = "design-architect";
const FALLBACK_AGENT: &str = "design-fallback";

const FALLBACK_ANALYSIS_CONFIDENCE: f64 = 0.85;
const FALLBACK_DESIGN_CONFIDENCE: f64 = 0.9;
const STATIC_ANALYSIS_CONFIDENCE: f64 = 0.7;
const STATIC_DESIGN_CONFIDENCE: f64 = 0.75;

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one task's generation attempts, tolerating failures of the
/// underlying call. Every attempt is tracked as its own registry task so
/// partial failures stay individually observable.
pub struct DesignOrchestrator {
    provider: Arc<dyn DesignProvider>,
    registry: TaskRegistry,
    config: OrchestratorConfig,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl DesignOrchestrator {
    /// Construct and run pre-flight diagnostics once. The result is cached;
    /// per-attempt metrics are layered on top as attempts run.
    pub async fn new(
        provider: Arc<dyn DesignProvider>,
        registry: TaskRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let credential_valid = credential_looks_valid(provider.credential().as_deref());
        let network_connected = matches!(
            tokio::time::timeout(config.probe_timeout, provider.probe()).await,
            Ok(Ok(()))
        );
        let diagnostics = Diagnostics {
            credential_valid,
            network_connected,
            // Responsiveness is inferred, not probed: a valid credential is
            // the only prerequisite the service itself enforces up front.
            service_responsive: credential_valid,
            last_error: None,
            metrics: Default::default(),
        };
        tracing::info!(
            credential_valid,
            network_connected,
            "orchestrator pre-flight complete"
        );
        Self {
            provider,
            registry,
            config,
            diagnostics: Arc::new(RwLock::new(diagnostics)),
        }
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    /// Produce design content for one session, trying the primary path and
    /// falling back automatically once it is exhausted.
    pub async fn generate_design(
        &self,
        session_id: &str,
        request: &str,
        domain: DesignDomain,
    ) -> Result<DesignOutcome> {
        {
            let diag = self.diagnostics.read().await;
            if !diag.credential_valid {
                return Err(SchemaflowError::Configuration(
                    "missing or malformed provider credential".to_string(),
                ));
            }
            if !diag.network_connected {
                return Err(SchemaflowError::Network(
                    "provider unreachable at pre-flight".to_string(),
                ));
            }
        }

        let prompt = DesignPrompts::primary(request, domain);
        let mut attempts_used = 0;

        for attempt in 1..=self.config.retry_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_pause).await;
            }
            attempts_used = attempt;

            let task_id = format!("{}_attempt_{}", session_id, attempt);
            self.registry
                .start_task(&task_id, &format!("Design Attempt {}", attempt), PRIMARY_AGENT)
                .await?;

            let started = Instant::now();
            let raced =
                tokio::time::timeout(self.config.attempt_timeout, self.provider.generate(&prompt))
                    .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match raced {
                Ok(Ok(content)) => {
                    self.registry.append_content(&task_id, &content).await;
                    self.registry.complete_task(&task_id).await;
                    self.record_attempt(elapsed_ms, None).await;
                    return Ok(DesignOutcome {
                        output: DesignOutput::Primary { content },
                        fallback_used: false,
                        attempts_used,
                    });
                }
                Ok(Err(err)) => {
                    self.registry
                        .fail_task(
                            &task_id,
                            FailureReason::Generation {
                                message: err.to_string(),
                            },
                        )
                        .await;
                    self.record_attempt(elapsed_ms, Some(err.to_string())).await;
                    if !err.is_retryable() {
                        return Err(err.into());
                    }
                    tracing::warn!(attempt, error = %err, "primary attempt failed");
                }
                Err(_) => {
                    let err = GenerateError::Timeout(self.config.attempt_timeout);
                    self.registry
                        .fail_task(
                            &task_id,
                            FailureReason::Generation {
                                message: err.to_string(),
                            },
                        )
                        .await;
                    self.record_attempt(elapsed_ms, Some(err.to_string())).await;
                    tracing::warn!(attempt, "primary attempt timed out");
                }
            }
        }

        self.diagnostics.write().await.metrics.fallback_triggered = true;
        tracing::info!(session_id, "primary path exhausted, entering fallback");
        self.run_fallback(session_id, request, domain, attempts_used)
            .await
    }

    /// Secondary strategy: a deliberately simpler request shape, reported as
    /// the same analysis/design phase pair observers see on the primary path.
    async fn run_fallback(
        &self,
        session_id: &str,
        request: &str,
        domain: DesignDomain,
        attempts_used: u32,
    ) -> Result<DesignOutcome> {
        let analysis_id = format!("{}_fallback_analysis", session_id);
        let analysis = StaticContent::analysis(request, domain);
        self.registry
            .start_task(&analysis_id, "Requirements Analysis", FALLBACK_AGENT)
            .await?;
        self.registry.append_content(&analysis_id, &analysis).await;
        self.registry.complete_task(&analysis_id).await;

        let design_id = format!("{}_fallback_design", session_id);
        self.registry
            .start_task(&design_id, "Schema Design", FALLBACK_AGENT)
            .await?;

        let prompt = DesignPrompts::fallback(request, domain);
        let started = Instant::now();
        let raced =
            tokio::time::timeout(self.config.attempt_timeout, self.provider.generate(&prompt))
                .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let design = match raced {
            Ok(Ok(content)) => content,
            Ok(Err(err)) => {
                self.registry
                    .fail_task(
                        &design_id,
                        FailureReason::Generation {
                            message: err.to_string(),
                        },
                    )
                    .await;
                self.record_attempt(elapsed_ms, Some(err.to_string())).await;
                return Err(SchemaflowError::AllAttemptsFailed {
                    attempts: attempts_used + 1,
                    fallback_used: true,
                    detail: err.to_string(),
                });
            }
            Err(_) => {
                let err = GenerateError::Timeout(self.config.attempt_timeout);
                self.registry
                    .fail_task(
                        &design_id,
                        FailureReason::Generation {
                            message: err.to_string(),
                        },
                    )
                    .await;
                self.record_attempt(elapsed_ms, Some(err.to_string())).await;
                return Err(SchemaflowError::AllAttemptsFailed {
                    attempts: attempts_used + 1,
                    fallback_used: true,
                    detail: err.to_string(),
                });
            }
        };

        self.registry.append_content(&design_id, &design).await;
        self.registry.complete_task(&design_id).await;
        self.record_attempt(elapsed_ms, None).await;

        Ok(DesignOutcome {
            output: DesignOutput::Fallback {
                phases: vec![
                    GeneratedPhase {
                        kind: PhaseKind::Analysis,
                        confidence: FALLBACK_ANALYSIS_CONFIDENCE,
                        content: analysis,
                    },
                    GeneratedPhase {
                        kind: PhaseKind::Design,
                        confidence: FALLBACK_DESIGN_CONFIDENCE,
                        content: design,
                    },
                ],
            },
            fallback_used: true,
            attempts_used,
        })
    }

    /// Last-resort, network-independent content. Invoked explicitly by the
    /// caller when even the fallback path is unavailable; always succeeds.
    pub fn static_design(request: &str, domain: DesignDomain) -> Vec<GeneratedPhase> {
        vec![
            GeneratedPhase {
                kind: PhaseKind::Analysis,
                confidence: STATIC_ANALYSIS_CONFIDENCE,
                content: StaticContent::analysis(request, domain),
            },
            GeneratedPhase {
                kind: PhaseKind::Design,
                confidence: STATIC_DESIGN_CONFIDENCE,
                content: StaticContent::design(domain),
            },
        ]
    }

    async fn record_attempt(&self, response_time_ms: u64, error: Option<String>) {
        let mut diag = self.diagnostics.write().await;
        diag.metrics.response_time_ms = response_time_ms;
        if error.is_some() {
            diag.metrics.retry_count += 1;
        }
        diag.last_error = error;
    }
}

/// Shape check only; the credential is never sent anywhere from here
fn credential_looks_valid(credential: Option<&str>) -> bool {
    match credential {
        Some(key) => {
            let key = key.trim();
            key.len() >= 8 && !key.contains(char::is_whitespace)
        }
        None => false,
    }
}
