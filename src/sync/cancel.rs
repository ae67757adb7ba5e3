//! Cooperative cancellation of waits.

use super::completion::{CompletionSlot, SlotFuture};
use core::pin::Pin;
use futures_core::{
    future::{FusedFuture, Future},
    task::{Context, Poll},
};
use pin_project_lite::pin_project;

/// A cancellation request which can be shared between threads.
///
/// All clones of a token refer to the same request. Once
/// [`cancel`](CancelToken::cancel) has been called, every wait and lock
/// acquisition which was started with this token and has not finished yet
/// fails with [`WaitError::Canceled`](super::WaitError::Canceled).
///
/// Cancellation is cooperative. It only affects operations which observe
/// the token, and never interrupts a thread which is blocked elsewhere.
#[derive(Clone, Default)]
pub struct CancelToken {
    requested: CompletionSlot<()>,
}

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("is_canceled", &self.is_canceled())
            .finish()
    }
}

impl CancelToken {
    /// Creates a token which has not been canceled
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation.
    ///
    /// Returns `false` if cancellation had been requested before.
    pub fn cancel(&self) -> bool {
        let first = self.requested.try_complete(());
        if first {
            tracing::trace!("cancellation requested");
        }
        first
    }

    /// Returns whether cancellation has been requested
    pub fn is_canceled(&self) -> bool {
        self.requested.is_resolved()
    }

    /// Returns a future that resolves once cancellation is requested.
    pub fn canceled(&self) -> CanceledFuture {
        CanceledFuture {
            requested: self.requested.observe(),
        }
    }
}

pin_project! {
    /// A Future that is resolved once the associated [`CancelToken`] got
    /// canceled.
    #[must_use = "futures do nothing unless polled"]
    pub struct CanceledFuture {
        #[pin]
        requested: SlotFuture<()>,
    }
}

impl core::fmt::Debug for CanceledFuture {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("CanceledFuture").finish()
    }
}

impl Future for CanceledFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.project().requested.poll(cx).map(|_| ())
    }
}

impl FusedFuture for CanceledFuture {
    fn is_terminated(&self) -> bool {
        self.requested.is_terminated()
    }
}
