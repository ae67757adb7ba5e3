//! A signal which stays set until it gets reset.

use super::{
    completion::GenericCompletionSlot,
    engine::{
        sealed::{Internal, WaitSource},
        GenericCancelableWaitFuture, GenericWaitFuture, WaitSlot,
    },
};
use crate::NoopLock;
use lock_api::{Mutex, RawMutex};

/// A synchronization primitive which can be either in the set or reset state.
///
/// Setting the signal releases every pending waiter, and every wait which
/// starts while it stays set completes immediately. Waits are provided by
/// [`WaitEngine`](super::WaitEngine).
///
/// All waits which start while the signal is reset observe one shared
/// completion slot. `set` completes that slot, `reset` replaces it by a fresh
/// one.
pub struct GenericManualResetSignal<MutexType: RawMutex> {
    slot: Mutex<MutexType, GenericCompletionSlot<MutexType, bool>>,
}

impl<MutexType: RawMutex> core::fmt::Debug
    for GenericManualResetSignal<MutexType>
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("ManualResetSignal")
            .field("is_set", &self.is_set())
            .finish()
    }
}

impl<MutexType: RawMutex> GenericManualResetSignal<MutexType> {
    /// Creates a new signal in the given state
    pub fn new(is_set: bool) -> GenericManualResetSignal<MutexType> {
        let slot = if is_set {
            GenericCompletionSlot::completed(true)
        } else {
            GenericCompletionSlot::new()
        };
        GenericManualResetSignal {
            slot: Mutex::new(slot),
        }
    }

    /// Sets the signal, which releases all pending waiters.
    ///
    /// Has no effect if the signal is set already.
    pub fn set(&self) {
        if self.slot.lock().try_complete(true) {
            tracing::trace!("manual-reset signal set");
        }
    }

    /// Resets the signal.
    ///
    /// Only a completed slot gets replaced. A reset which races with a `set`
    /// therefore either happens before it, or resets the state that `set`
    /// established, but never swallows the signal for the waiters which were
    /// pending at the time of `set`.
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        if slot.is_resolved() {
            *slot = GenericCompletionSlot::new();
            tracing::trace!("manual-reset signal reset");
        }
    }

    /// Returns whether the signal is set
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_resolved()
    }
}

impl<MutexType: RawMutex> WaitSource for GenericManualResetSignal<MutexType> {
    type Mutex = MutexType;

    fn wait_slot(&self, _: Internal) -> WaitSlot<MutexType> {
        let slot = self.slot.lock();
        if slot.is_resolved() {
            WaitSlot::Ready
        } else {
            WaitSlot::Shared(slot.clone())
        }
    }
}

// Export a non thread-safe version using NoopLock

/// A [`GenericManualResetSignal`] which is not thread-safe.
pub type LocalManualResetSignal = GenericManualResetSignal<NoopLock>;
/// A [`GenericWaitFuture`] for [`LocalManualResetSignal`].
pub type LocalManualResetWaitFuture<'a> =
    GenericWaitFuture<'a, LocalManualResetSignal>;
/// A [`GenericCancelableWaitFuture`] for [`LocalManualResetSignal`].
pub type LocalManualResetCancelableWaitFuture<'a> =
    GenericCancelableWaitFuture<'a, LocalManualResetSignal>;

// Export a thread-safe version using parking_lot::RawMutex

/// A [`GenericManualResetSignal`] backed by [`parking_lot`].
pub type ManualResetSignal = GenericManualResetSignal<parking_lot::RawMutex>;
/// A [`GenericWaitFuture`] for [`ManualResetSignal`].
pub type ManualResetWaitFuture<'a> = GenericWaitFuture<'a, ManualResetSignal>;
/// A [`GenericCancelableWaitFuture`] for [`ManualResetSignal`].
pub type ManualResetCancelableWaitFuture<'a> =
    GenericCancelableWaitFuture<'a, ManualResetSignal>;
