/// Errors from state slice access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("state slice `{0}` is not registered")]
    UnknownSlice(String),
    #[error("state slice `{name}` is not a `{expected}`")]
    SliceTypeMismatch { name: String, expected: &'static str },
    #[error("state slice `{0}` is already registered")]
    DuplicateSlice(String),
}

/// A receptor's failure for one action.
///
/// Never propagates out of a processing pass; the store logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ReceptorError {
    #[error(transparent)]
    State(#[from] StoreError),
    #[error("{0}")]
    Rejected(String),
}

/// A pending wait whose receptor was removed before it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("action wait cancelled before a match")]
pub struct WaitCancelled;
