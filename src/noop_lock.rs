//! A raw mutex that performs no synchronization at all.

use core::marker::PhantomData;
use lock_api::{GuardSend, RawMutex};

/// A [`RawMutex`] which never blocks and never synchronizes.
///
/// It backs the `Local*` primitives. Since the state it guards is only ever
/// touched from one thread, locking it can't fail.
#[derive(Debug)]
pub struct NoopLock {
    // Raw pointers are neither `Send` nor `Sync`, which keeps every
    // primitive built on top of this lock on its thread.
    _not_thread_safe: PhantomData<*mut ()>,
}

unsafe impl RawMutex for NoopLock {
    const INIT: NoopLock = NoopLock {
        _not_thread_safe: PhantomData,
    };

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {}

    #[inline]
    fn try_lock(&self) -> bool {
        true
    }

    #[inline]
    unsafe fn unlock(&self) {}
}
