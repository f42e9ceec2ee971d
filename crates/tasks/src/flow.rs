//! Linear flow runner: executes tasks in order and reverts them on failure.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{Result, TaskError};
use crate::state::FlowState;
use crate::task::{Outcome, Task};

/// A named value one step publishes for later steps to read.
pub struct Slot<T> {
    name: &'static str,
    cell: Arc<OnceLock<T>>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone> Slot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: Arc::new(OnceLock::new()),
        }
    }

    /// Returns the published value, or `MissingInput` if no step has
    /// published it yet.
    pub fn get(&self) -> Result<T> {
        self.cell
            .get()
            .cloned()
            .ok_or(TaskError::MissingInput(self.name))
    }

    fn set(&self, value: T) {
        if self.cell.set(value).is_err() {
            tracing::warn!(slot = self.name, "slot already filled, keeping first value");
        }
    }
}

/// How a step gets its input.
pub enum Binding<I> {
    /// Known when the flow is built.
    Value(I),
    /// Computed right before the step runs, usually from slots.
    Deferred(Box<dyn FnOnce() -> Result<I> + Send + Sync>),
}

impl<I> Binding<I> {
    pub fn value(input: I) -> Self {
        Binding::Value(input)
    }

    pub fn deferred<F>(resolve: F) -> Self
    where
        F: FnOnce() -> Result<I> + Send + Sync + 'static,
    {
        Binding::Deferred(Box::new(resolve))
    }
}

#[async_trait]
trait Step: Send + Sync {
    fn name(&self) -> Cow<'static, str>;
    async fn execute(&mut self) -> Result<()>;
    async fn revert(&self, failure: Option<&TaskError>);
}

type Publisher<O> = Box<dyn Fn(&O) + Send + Sync>;

struct BoundTask<T: Task> {
    task: T,
    binding: Option<Binding<T::Input>>,
    input: Option<T::Input>,
    output: Option<T::Output>,
    publish: Option<Publisher<T::Output>>,
}

#[async_trait]
impl<T: Task> Step for BoundTask<T> {
    fn name(&self) -> Cow<'static, str> {
        self.task.name()
    }

    async fn execute(&mut self) -> Result<()> {
        let input = match self.binding.take() {
            Some(Binding::Value(input)) => input,
            Some(Binding::Deferred(resolve)) => resolve()?,
            None => {
                return Err(TaskError::InvalidInput(format!(
                    "step {} has already run",
                    self.task.name()
                )));
            }
        };
        let input = self.input.insert(input);
        let output = self.task.execute(input).await?;
        if let Some(publish) = &self.publish {
            publish(&output);
        }
        self.output = Some(output);
        Ok(())
    }

    async fn revert(&self, failure: Option<&TaskError>) {
        let Some(input) = &self.input else {
            return;
        };
        match (failure, &self.output) {
            (Some(error), _) => self.task.revert(input, Outcome::Failed(error)).await,
            (None, Some(output)) => self.task.revert(input, Outcome::Succeeded(output)).await,
            (None, None) => {}
        }
    }
}

/// Summary of a flow that ran to completion.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub flow: String,
    pub executed: Vec<Cow<'static, str>>,
    pub duration: Duration,
}

/// A flow that failed and was reverted.
#[derive(Debug, Error)]
#[error("flow '{flow}' failed at step '{step}': {error}")]
pub struct FlowFailure {
    pub flow: String,
    pub step: Cow<'static, str>,
    #[source]
    pub error: TaskError,
    /// Steps reverted, in the order their reverts ran.
    pub reverted: Vec<Cow<'static, str>>,
}

/// An ordered list of tasks run as one unit.
///
/// Steps execute in insertion order. When a step fails, that step is
/// reverted with its failure, then every step that executed before it is
/// reverted in strict reverse order, and the original error is returned.
pub struct Flow {
    name: String,
    steps: Vec<Box<dyn Step>>,
    state: FlowState,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            state: FlowState::NotStarted,
        }
    }

    /// Appends a step with an input known up front.
    pub fn add<T>(&mut self, task: T, input: T::Input) -> &mut Self
    where
        T: Task + 'static,
    {
        self.add_bound(task, Binding::Value(input))
    }

    /// Appends a step with an explicit input binding.
    pub fn add_bound<T>(&mut self, task: T, input: Binding<T::Input>) -> &mut Self
    where
        T: Task + 'static,
    {
        self.steps.push(Box::new(BoundTask {
            task,
            binding: Some(input),
            input: None,
            output: None,
            publish: None,
        }));
        self
    }

    /// Appends a step whose output is published to `slot`.
    pub fn add_with_output<T>(
        &mut self,
        task: T,
        input: Binding<T::Input>,
        slot: &Slot<T::Output>,
    ) -> &mut Self
    where
        T: Task + 'static,
        T::Output: Clone + 'static,
    {
        let slot = slot.clone();
        self.steps.push(Box::new(BoundTask {
            task,
            binding: Some(input),
            input: None,
            output: None,
            publish: Some(Box::new(move |output: &T::Output| slot.set(output.clone()))),
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step, reverting on the first failure.
    #[tracing::instrument(skip(self), fields(flow = %self.name))]
    pub async fn run(&mut self) -> std::result::Result<FlowReport, FlowFailure> {
        if let Err(error) = self.advance(FlowState::Running) {
            return Err(self.failure(Cow::Borrowed("start"), error, Vec::new()));
        }

        metrics::counter!("flow_executions_total").increment(1);
        let started = Instant::now();
        let mut executed = Vec::with_capacity(self.steps.len());

        for index in 0..self.steps.len() {
            let name = self.steps[index].name();
            tracing::debug!(step = %name, "flow step started");

            if let Err(error) = self.steps[index].execute().await {
                tracing::warn!(step = %name, %error, "flow step failed, reverting");
                let reverted = self.revert_from(index, &error).await;
                metrics::counter!("flow_reverted_total").increment(1);
                metrics::histogram!("flow_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                return Err(self.failure(name, error, reverted));
            }
            executed.push(name);
        }

        if let Err(error) = self.advance(FlowState::Completed) {
            return Err(self.failure(Cow::Borrowed("finish"), error, Vec::new()));
        }
        let duration = started.elapsed();
        metrics::histogram!("flow_duration_seconds").record(duration.as_secs_f64());
        tracing::info!(steps = executed.len(), ?duration, "flow completed");

        Ok(FlowReport {
            flow: self.name.clone(),
            executed,
            duration,
        })
    }

    /// Reverts the failed step, then every earlier step in reverse order.
    ///
    /// Only a running flow reverts; anything else leaves the steps alone.
    async fn revert_from(&mut self, failed: usize, error: &TaskError) -> Vec<Cow<'static, str>> {
        if let Err(state_error) = self.advance(FlowState::Reverting) {
            tracing::error!(error = %state_error, "flow cannot revert");
            return Vec::new();
        }
        let mut reverted = Vec::with_capacity(failed + 1);

        let step = &self.steps[failed];
        step.revert(Some(error)).await;
        reverted.push(step.name());

        for step in self.steps[..failed].iter().rev() {
            step.revert(None).await;
            reverted.push(step.name());
        }

        if let Err(state_error) = self.advance(FlowState::Reverted) {
            tracing::error!(error = %state_error, "flow left in an unexpected state after revert");
        }
        reverted
    }

    fn advance(&mut self, next: FlowState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(TaskError::InvalidFlowState {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = %self.state, to = %next, "flow state changed");
        self.state = next;
        Ok(())
    }

    fn failure(
        &self,
        step: Cow<'static, str>,
        error: TaskError,
        reverted: Vec<Cow<'static, str>>,
    ) -> FlowFailure {
        FlowFailure {
            flow: self.name.clone(),
            step,
            error,
            reverted,
        }
    }

    /// True once the flow has completed or finished reverting.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
