// Scripted provider for exercising the generation paths without a network

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use schemaflow_providers::{DesignProvider, GenerateError, GenerateResult};

#[derive(Debug, Clone)]
pub(crate) enum ScriptStep {
    Ok(String),
    Err(GenerateError),
    /// Never resolves; exercises the timeout race
    Hang,
}

pub(crate) struct ScriptedProvider {
    steps: StdMutex<VecDeque<ScriptStep>>,
    /// Replayed once the script runs dry
    default_step: Option<ScriptStep>,
    calls: AtomicU32,
    credential: Option<String>,
    probe_failure: Option<GenerateError>,
}

impl ScriptedProvider {
    pub(crate) fn with_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: StdMutex::new(steps.into()),
            default_step: None,
            calls: AtomicU32::new(0),
            credential: Some("sk-test-0123456789".to_string()),
            probe_failure: None,
        }
    }

    pub(crate) fn with_responses(responses: Vec<GenerateResult<String>>) -> Self {
        Self::with_steps(
            responses
                .into_iter()
                .map(|r| match r {
                    Ok(text) => ScriptStep::Ok(text),
                    Err(err) => ScriptStep::Err(err),
                })
                .collect(),
        )
    }

    pub(crate) fn always_failing(err: GenerateError) -> Self {
        let mut provider = Self::with_steps(Vec::new());
        provider.default_step = Some(ScriptStep::Err(err));
        provider
    }

    pub(crate) fn with_credential(mut self, credential: Option<&str>) -> Self {
        self.credential = credential.map(str::to_string);
        self
    }

    pub(crate) fn with_probe_failure(mut self, err: GenerateError) -> Self {
        self.probe_failure = Some(err);
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> ScriptStep {
        let popped = self
            .steps
            .lock()
            .ok()
            .and_then(|mut steps| steps.pop_front());
        popped.or_else(|| self.default_step.clone()).unwrap_or_else(|| {
            ScriptStep::Err(GenerateError::Service("script exhausted".to_string()))
        })
    }
}

#[async_trait]
impl DesignProvider for ScriptedProvider {
    fn credential(&self) -> Option<String> {
        self.credential.clone()
    }

    async fn probe(&self) -> GenerateResult<()> {
        match &self.probe_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn generate(&self, _prompt: &str) -> GenerateResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            ScriptStep::Ok(text) => Ok(text),
            ScriptStep::Err(err) => Err(err),
            ScriptStep::Hang => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
        }
    }
}
