//! Operation lifecycle state.

use std::fmt;

/// Lifecycle of a [`FetchOperation`](super::FetchOperation).
///
/// Transitions are monotonic: `Ready → Executing → Finished`, or
/// `Ready → Finished` when cancelled before it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationState {
    Ready,
    Executing,
    Finished,
}

impl OperationState {
    /// Whether moving to `next` is allowed.
    pub fn can_transition_to(self, next: OperationState) -> bool {
        next > self
    }

    pub fn is_finished(self) -> bool {
        self == OperationState::Finished
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Ready => "ready",
            OperationState::Executing => "executing",
            OperationState::Finished => "finished",
        };
        f.write_str(name)
    }
}
