//! A signal which releases one waiter per `set`.

use super::{
    completion::GenericCompletionSlot,
    engine::{
        sealed::{Internal, WaitSource},
        GenericCancelableWaitFuture, GenericWaitFuture, WaitSlot,
    },
};
use crate::NoopLock;
use core::{
    future::{ready, Ready},
    sync::atomic::{AtomicBool, Ordering},
};
use lock_api::{Mutex, RawMutex};
use std::collections::VecDeque;

/// A signal which resets itself after it released a single waiter.
///
/// Every [`set`](GenericAutoResetSignal::set) releases the longest waiting
/// task. If nobody is waiting, the signal stays set until exactly one
/// future wait consumes it.
///
/// The set flag is consumed through a compare-and-swap without taking the
/// queue lock. A wait which arrives while the signal is set can thereby
/// complete ahead of a wait which was about to enqueue itself, so FIFO order
/// is best-effort only.
pub struct GenericAutoResetSignal<MutexType: RawMutex> {
    is_set: AtomicBool,
    waiters: Mutex<MutexType, VecDeque<GenericCompletionSlot<MutexType, bool>>>,
}

impl<MutexType: RawMutex> core::fmt::Debug for GenericAutoResetSignal<MutexType> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("AutoResetSignal")
            .field("is_set", &self.is_set())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

impl<MutexType: RawMutex> GenericAutoResetSignal<MutexType> {
    /// Creates a new signal in the given state
    pub fn new(is_set: bool) -> GenericAutoResetSignal<MutexType> {
        GenericAutoResetSignal {
            is_set: AtomicBool::new(is_set),
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Releases the longest waiting task. If no task is waiting, the signal
    /// stays set for the next wait.
    pub fn set(&self) {
        let mut waiters = self.waiters.lock();
        // A wait which timed out or got canceled may not have withdrawn its
        // slot yet. Resolved slots refuse the completion.
        while let Some(waiter) = waiters.pop_front() {
            if waiter.try_complete(true) {
                tracing::trace!(
                    queued = waiters.len(),
                    "auto-reset signal released a waiter"
                );
                return;
            }
        }
        self.is_set.store(true, Ordering::Release);
        tracing::trace!("auto-reset signal set without waiters");
    }

    /// Same as [`set`](GenericAutoResetSignal::set), for callers which
    /// signal from async code.
    ///
    /// Setting the signal never suspends. The queue lock is only held for
    /// the handoff, so the returned future is always ready.
    pub fn set_async(&self) -> Ready<()> {
        self.set();
        ready(())
    }

    /// Resets the signal. Pending waiters are not affected.
    pub fn reset(&self) {
        self.is_set.store(false, Ordering::Release);
    }

    /// Returns whether the signal is set, i.e. whether the next wait
    /// completes immediately.
    pub fn is_set(&self) -> bool {
        self.is_set.load(Ordering::Acquire)
    }

    /// Returns the number of waits which are currently queued
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn try_consume(&self) -> bool {
        self.is_set
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<MutexType: RawMutex> WaitSource for GenericAutoResetSignal<MutexType> {
    type Mutex = MutexType;

    fn wait_slot(&self, _: Internal) -> WaitSlot<MutexType> {
        if self.try_consume() {
            return WaitSlot::Ready;
        }

        let slot = GenericCompletionSlot::new();
        let mut waiters = self.waiters.lock();
        // `set` flips the flag while holding the lock. Checking again closes
        // the window between the first check and enqueueing.
        if self.try_consume() {
            return WaitSlot::Ready;
        }

        waiters.push_back(slot.clone());
        WaitSlot::Exclusive(slot)
    }

    fn forfeit(&self, _: Internal) {
        tracing::trace!("released waiter went away, passing the signal on");
        self.set();
    }

    fn withdraw(&self, _: Internal) {
        self.waiters.lock().retain(|waiter| !waiter.is_resolved());
    }
}

// Export a non thread-safe version using NoopLock

/// A [`GenericAutoResetSignal`] which is not thread-safe.
pub type LocalAutoResetSignal = GenericAutoResetSignal<NoopLock>;
/// A [`GenericWaitFuture`] for [`LocalAutoResetSignal`].
pub type LocalAutoResetWaitFuture<'a> =
    GenericWaitFuture<'a, LocalAutoResetSignal>;
/// A [`GenericCancelableWaitFuture`] for [`LocalAutoResetSignal`].
pub type LocalAutoResetCancelableWaitFuture<'a> =
    GenericCancelableWaitFuture<'a, LocalAutoResetSignal>;

// Export a thread-safe version using parking_lot::RawMutex

/// A [`GenericAutoResetSignal`] backed by [`parking_lot`].
pub type AutoResetSignal = GenericAutoResetSignal<parking_lot::RawMutex>;
/// A [`GenericWaitFuture`] for [`AutoResetSignal`].
pub type AutoResetWaitFuture<'a> = GenericWaitFuture<'a, AutoResetSignal>;
/// A [`GenericCancelableWaitFuture`] for [`AutoResetSignal`].
pub type AutoResetCancelableWaitFuture<'a> =
    GenericCancelableWaitFuture<'a, AutoResetSignal>;
