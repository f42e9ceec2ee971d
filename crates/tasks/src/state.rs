//! Lifecycle of a [`Flow`](crate::flow::Flow) run.

/// Where a flow is in its single run.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Reverting ──► Reverted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    NotStarted,
    Running,
    /// A step failed; executed steps are being reverted.
    Reverting,
    Completed,
    Reverted,
}

impl FlowState {
    /// Whether a flow in this state may move to `next`.
    pub fn can_transition_to(self, next: FlowState) -> bool {
        use FlowState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Running, Completed)
                | (Running, Reverting)
                | (Reverting, Reverted)
        )
    }

    /// Completed and Reverted flows never run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Completed | FlowState::Reverted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlowState::NotStarted => "NotStarted",
            FlowState::Running => "Running",
            FlowState::Reverting => "Reverting",
            FlowState::Completed => "Completed",
            FlowState::Reverted => "Reverted",
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
