//! The execute/revert contract every task implements.

use std::borrow::Cow;

use async_trait::async_trait;

use crate::compensation;
use crate::error::{Result, TaskError};

/// What the runner knows about a task's execute when it asks for a revert.
#[derive(Debug)]
pub enum Outcome<'a, T> {
    /// Execute returned this output.
    Succeeded(&'a T),
    /// Execute itself failed with this error.
    Failed(&'a TaskError),
}

/// One forward step of a provisioning flow together with its compensation.
///
/// A runner calls [`Task::execute`] once. If that step or any later step
/// fails, it calls [`Task::revert`] on every executed task in reverse
/// order. Implementations put their undo logic in [`Task::compensate`];
/// the provided `revert` skips it when the task's own execute failed and
/// otherwise runs it best-effort, so a revert never fails.
#[async_trait]
pub trait Task: Send + Sync {
    type Input: Send + Sync;
    type Output: Send + Sync;

    /// Name used in logs, metrics and flow reports.
    fn name(&self) -> Cow<'static, str>;

    /// Performs the forward action.
    async fn execute(&self, input: &Self::Input) -> Result<Self::Output>;

    /// Undoes a successful execute: restores the prior value where it is
    /// known, otherwise moves the resource to ERROR. Tasks without a
    /// meaningful undo keep the default no-op.
    async fn compensate(&self, _input: &Self::Input, _output: &Self::Output) -> Result<()> {
        Ok(())
    }

    /// Reverts this task after a flow failure. Never fails.
    async fn revert(&self, input: &Self::Input, outcome: Outcome<'_, Self::Output>) {
        match outcome {
            Outcome::Failed(error) => {
                tracing::debug!(task = %self.name(), %error, "execute failed, nothing to revert");
            }
            Outcome::Succeeded(output) => {
                let name = self.name();
                compensation::best_effort(&name, self.compensate(input, output)).await;
            }
        }
    }
}
