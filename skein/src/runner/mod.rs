//! The agent runner: binds strategy, environment, tools, and features,
//! drives the interpreter to termination, and owns the run record.
//!
//! One runner serves one run at a time; concurrent callers get `RunnerBusy`.
//! Cancellation is cooperative: `cancel()` trips the run's token, and every
//! suspension point observes it. Restoring a checkpoint creates a new run id
//! positioned at the snapshotted node.

mod run;

pub use run::{Run, RunStatus};

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointStorage};
use crate::environment::Environment;
use crate::error::{AgentError, ConfigurationError};
use crate::executor::{LlModel, LlmExecutor, RetryPolicy};
use crate::feature::{AgentFeature, FeaturePipeline, RunOutcome};
use crate::message::Message;
use crate::prompt::{Params, Prompt};
use crate::strategy::{Interpreter, Position, StepOutcome, Strategy};
use crate::tool::ToolRegistry;

/// Everything an agent needs to run.
pub struct AgentConfig {
    pub executor: Arc<dyn LlmExecutor>,
    pub model: LlModel,
    pub strategy: Arc<Strategy>,
    pub tools: ToolRegistry,
    pub system_prompt: Option<String>,
    pub params: Params,
    pub max_iterations: usize,
    pub max_subgraph_depth: usize,
    pub retry: RetryPolicy,
    /// Destination for checkpoints; used by auto-persistence.
    pub checkpoint_storage: Option<Arc<dyn CheckpointStorage>>,
    /// Persist a checkpoint after every node when set.
    pub auto_checkpoint: bool,
}

impl AgentConfig {
    pub fn new(
        executor: Arc<dyn LlmExecutor>,
        model: LlModel,
        strategy: Arc<Strategy>,
    ) -> Self {
        Self {
            executor,
            model,
            strategy,
            tools: ToolRegistry::new(),
            system_prompt: None,
            params: Params::default(),
            max_iterations: 50,
            max_subgraph_depth: 8,
            retry: RetryPolicy::default(),
            checkpoint_storage: None,
            auto_checkpoint: false,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_subgraph_depth(mut self, max_subgraph_depth: usize) -> Self {
        self.max_subgraph_depth = max_subgraph_depth;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_checkpoint_storage(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.checkpoint_storage = Some(storage);
        self
    }

    pub fn with_auto_checkpoint(mut self, auto_checkpoint: bool) -> Self {
        self.auto_checkpoint = auto_checkpoint;
        self
    }
}

struct ActiveRun {
    run: Run,
    prompt: Arc<Mutex<Prompt>>,
    position: Option<Position>,
}

enum Seed {
    Fresh(Value),
    Restored(Box<Checkpoint>),
}

/// Top-level orchestrator for one agent.
pub struct AgentRunner {
    config: AgentConfig,
    agent_id: String,
    pipeline: Arc<FeaturePipeline>,
    busy: tokio::sync::Mutex<()>,
    cancellation: Mutex<CancellationToken>,
    active: Mutex<Option<ActiveRun>>,
}

impl AgentRunner {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            agent_id: Uuid::new_v4().to_string(),
            pipeline: Arc::new(FeaturePipeline::new()),
            busy: tokio::sync::Mutex::new(()),
            cancellation: Mutex::new(CancellationToken::new()),
            active: Mutex::new(None),
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Installs a feature on the pipeline; at most one per storage key.
    pub fn install_feature(
        &self,
        feature: Arc<dyn AgentFeature>,
    ) -> Result<(), ConfigurationError> {
        self.pipeline.install(feature)
    }

    /// Requests cooperative cancellation of the in-flight run.
    pub fn cancel(&self) {
        self.cancellation.lock().expect("cancellation lock").cancel();
    }

    /// Bookkeeping record of the current or most recent run.
    pub fn last_run(&self) -> Option<Run> {
        self.active
            .lock()
            .expect("active run lock")
            .as_ref()
            .map(|active| active.run.clone())
    }

    /// Message history of the current or most recent run.
    pub fn history(&self) -> Option<Vec<Message>> {
        self.active
            .lock()
            .expect("active run lock")
            .as_ref()
            .map(|active| active.prompt.lock().expect("prompt lock").messages().to_vec())
    }

    /// Drives the strategy from its entry subgraph to termination.
    pub async fn run(&self, input: Value) -> Result<Value, AgentError> {
        self.execute(Seed::Fresh(input)).await
    }

    /// The restore operation: creates a **new** run positioned at the
    /// checkpointed node with the snapshotted input, messages, and feature
    /// storage, then drives it to termination.
    pub async fn resume(&self, checkpoint: Checkpoint) -> Result<Value, AgentError> {
        self.execute(Seed::Restored(Box::new(checkpoint))).await
    }

    /// Captures the current run state per the checkpoint contract. Callable
    /// while a run is in flight (between nodes) and after termination as
    /// long as the interpreter had a position left.
    pub fn checkpoint(&self) -> Result<Checkpoint, AgentError> {
        let active = self.active.lock().expect("active run lock");
        let active = active
            .as_ref()
            .ok_or_else(|| AgentError::Checkpoint("no run to snapshot".into()))?;
        let position = active.position.clone().ok_or_else(|| {
            AgentError::Checkpoint("run terminated at its finish node; nothing to restore".into())
        })?;
        let checkpoint = Checkpoint {
            run_id: active.run.id.clone(),
            agent_id: active.run.agent_id.clone(),
            strategy_name: active.run.strategy_name.clone(),
            current_subgraph: position.subgraph,
            current_node: position.node,
            current_input: position.input,
            messages: active.prompt.lock().expect("prompt lock").messages().to_vec(),
            feature_storage: self.pipeline.storage_snapshot(),
            saved_at: Utc::now(),
        };
        Ok(checkpoint)
    }

    async fn execute(&self, seed: Seed) -> Result<Value, AgentError> {
        let _guard = self.busy.try_lock().map_err(|_| AgentError::RunnerBusy)?;
        let token = CancellationToken::new();
        *self.cancellation.lock().expect("cancellation lock") = token.clone();

        let run_id = Uuid::new_v4().to_string();
        let strategy = Arc::clone(&self.config.strategy);
        let strategy_name = strategy.name().to_string();

        let initial = match &seed {
            Seed::Fresh(_) => {
                let mut prompt = Prompt::new(self.config.params.clone());
                if let Some(system) = &self.config.system_prompt {
                    prompt.push(Message::system(system.clone()));
                }
                prompt
            }
            Seed::Restored(checkpoint) => {
                Prompt::from_messages(checkpoint.messages.clone(), self.config.params.clone())
            }
        };
        let prompt = Arc::new(Mutex::new(initial));

        self.pipeline.reset_storage();
        if let Seed::Restored(checkpoint) = &seed {
            self.pipeline.restore_storage(&checkpoint.feature_storage);
        }

        let mut interpreter = match &seed {
            Seed::Fresh(input) => Interpreter::start(
                Arc::clone(&strategy),
                &run_id,
                input.clone(),
                self.config.max_iterations,
                self.config.max_subgraph_depth,
            )?,
            Seed::Restored(checkpoint) => Interpreter::resume(
                Arc::clone(&strategy),
                &run_id,
                &checkpoint.current_subgraph,
                &checkpoint.current_node,
                checkpoint.current_input.clone(),
                self.config.max_iterations,
                self.config.max_subgraph_depth,
            )?,
        };

        // The registry snapshot happens here: mutations to the caller's
        // registry after this point are invisible to the run.
        let env = Environment::new(
            Arc::clone(&self.config.executor),
            self.config.model.clone(),
            self.config.tools.clone(),
            Arc::clone(&self.pipeline),
            Arc::clone(&prompt),
            token.clone(),
            strategy_name.clone(),
            run_id.clone(),
            self.config.retry.clone(),
        );

        {
            let mut active = self.active.lock().expect("active run lock");
            *active = Some(ActiveRun {
                run: Run::new(run_id.clone(), strategy_name.clone(), self.agent_id.clone()),
                prompt: Arc::clone(&prompt),
                position: interpreter.position(),
            });
        }

        if let Err(error) = self.pipeline.agent_start(&strategy_name, &self.agent_id).await {
            return self.fail(&strategy_name, &run_id, error).await;
        }
        self.transition(RunStatus::Running);
        if let Err(error) = self.pipeline.strategy_start(&strategy_name, &run_id).await {
            return self.fail(&strategy_name, &run_id, error).await;
        }

        loop {
            if token.is_cancelled() {
                return self.cancelled_exit(&strategy_name).await;
            }
            self.update_position(interpreter.position(), interpreter.iterations());
            match interpreter.step(&env, &self.pipeline).await {
                Ok(StepOutcome::Continue) => {
                    self.update_position(interpreter.position(), interpreter.iterations());
                    if self.config.auto_checkpoint {
                        self.auto_persist(&run_id).await;
                    }
                }
                Ok(StepOutcome::Finished(output)) => {
                    self.update_position(None, interpreter.iterations());
                    if let Err(error) = self
                        .pipeline
                        .strategy_finish(&strategy_name, &run_id, &output)
                        .await
                    {
                        return self.fail(&strategy_name, &run_id, error).await;
                    }
                    self.pipeline
                        .agent_finish(&strategy_name, &RunOutcome::Completed(output.clone()))
                        .await;
                    self.transition(RunStatus::Completed);
                    return Ok(output);
                }
                Err(AgentError::Cancelled) => {
                    return self.cancelled_exit(&strategy_name).await;
                }
                Err(error) => {
                    return self.fail(&strategy_name, &run_id, error).await;
                }
            }
        }
    }

    /// Best-effort checkpoint write after a node; storage failures are
    /// logged, not fatal.
    async fn auto_persist(&self, run_id: &str) {
        let Some(storage) = &self.config.checkpoint_storage else {
            return;
        };
        match self.checkpoint() {
            Ok(checkpoint) => {
                if let Err(error) = storage.put(run_id, &checkpoint).await {
                    warn!(run_id, %error, "auto checkpoint write failed");
                }
            }
            Err(error) => warn!(run_id, %error, "auto checkpoint capture failed"),
        }
    }

    async fn fail(
        &self,
        strategy: &str,
        run_id: &str,
        error: AgentError,
    ) -> Result<Value, AgentError> {
        self.pipeline.agent_error(strategy, run_id, &error).await;
        self.transition(RunStatus::Failed);
        Err(error)
    }

    async fn cancelled_exit(&self, strategy: &str) -> Result<Value, AgentError> {
        self.pipeline
            .agent_finish(strategy, &RunOutcome::Cancelled)
            .await;
        self.transition(RunStatus::Cancelled);
        Err(AgentError::Cancelled)
    }

    fn transition(&self, status: RunStatus) {
        if let Some(active) = self.active.lock().expect("active run lock").as_mut() {
            active.run.transition(status);
        }
    }

    fn update_position(&self, position: Option<Position>, iterations: usize) {
        if let Some(active) = self.active.lock().expect("active run lock").as_mut() {
            active.run.current_node = position.as_ref().map(|p| p.node.clone());
            active.run.iterations = iterations;
            active.position = position;
        }
    }
}

impl std::fmt::Debug for AgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("agent_id", &self.agent_id)
            .field("strategy", &self.config.strategy.name())
            .finish()
    }
}
