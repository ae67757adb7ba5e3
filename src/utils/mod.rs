//! Utilities which are used within the library

use core::task::{Context, Waker};
use std::{sync::Arc, task::Wake, thread::Thread};

/// Replaces a stored `Waker` with the one delivered via `cx`, unless both
/// would wake the same task anyway.
pub(crate) fn update_waker_ref(waker: &mut Waker, cx: &Context<'_>) {
    if !waker.will_wake(cx.waker()) {
        *waker = cx.waker().clone();
    }
}

/// Wakes a thread which is parked via [`std::thread::park`].
struct Unparker(Thread);

impl Wake for Unparker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Returns a `Waker` which unparks `thread`.
pub(crate) fn unpark_waker(thread: Thread) -> Waker {
    Waker::from(Arc::new(Unparker(thread)))
}
