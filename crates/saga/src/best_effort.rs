//! Outcome of a step whose failure must not fail the surrounding operation.

/// Result of a best-effort step.
///
/// Unlike `Result`, a `BestEffort` is not `#[must_use]` and has no `?`
/// conversion: the caller records it and moves on.
#[derive(Debug)]
pub enum BestEffort<E> {
    /// The step succeeded.
    Done,
    /// The step failed; the parent operation still succeeded.
    Failed(E),
}

impl<E> BestEffort<E> {
    /// Returns true if the step succeeded.
    pub fn is_done(&self) -> bool {
        matches!(self, BestEffort::Done)
    }

    /// Returns the failure, if any.
    pub fn failure(&self) -> Option<&E> {
        match self {
            BestEffort::Done => None,
            BestEffort::Failed(e) => Some(e),
        }
    }
}

impl<E> From<Result<(), E>> for BestEffort<E> {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => BestEffort::Done,
            Err(e) => BestEffort::Failed(e),
        }
    }
}
