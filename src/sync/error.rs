use thiserror::Error;

/// The error which is returned when a wait or a lock acquisition fails.
///
/// Timeouts are not errors. A wait which times out yields `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The [`CancelToken`](super::CancelToken) which was passed to the
    /// operation fired before the operation completed.
    #[error("the wait was canceled")]
    Canceled,
}
