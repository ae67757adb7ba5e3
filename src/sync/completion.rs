//! A single-assignment future which any number of tasks can observe.

use crate::{utils::update_waker_ref, NoopLock};
use core::pin::Pin;
use futures_core::{
    future::{FusedFuture, Future},
    task::{Context, Poll, Waker},
};
use lock_api::{Mutex, RawMutex};
use pin_list::PinList;
use pin_project_lite::pin_project;
use std::sync::Arc;

type PinListTypes = dyn pin_list::Types<
    Id = pin_list::id::Checked,
    // The waker that will wake the observing task.
    Protected = Waker,
    Removed = (),
    Unprotected = (),
>;

/// How a completion slot got resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome<T> {
    /// The slot was completed with a value
    Completed(T),
    /// The slot was canceled
    Canceled,
}

impl<T> SlotOutcome<T> {
    /// Returns the value the slot was completed with, if any
    pub fn completed(self) -> Option<T> {
        match self {
            SlotOutcome::Completed(value) => Some(value),
            SlotOutcome::Canceled => None,
        }
    }

    /// Returns whether the slot was canceled
    pub fn is_canceled(&self) -> bool {
        matches!(self, SlotOutcome::Canceled)
    }
}

/// Internal state of a completion slot
struct SlotState<T> {
    outcome: Option<SlotOutcome<T>>,
    observers: PinList<PinListTypes>,
}

impl<T> SlotState<T> {
    fn new(outcome: Option<SlotOutcome<T>>) -> SlotState<T> {
        SlotState {
            outcome,
            observers: PinList::new(pin_list::id::Checked::new()),
        }
    }

    /// Stores the outcome unless the slot is resolved already.
    fn resolve(&mut self, outcome: SlotOutcome<T>) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);

        // Observers are woken while the lock is held. An observer which gets
        // dropped concurrently can thereby never be referenced after it got
        // unlinked.
        let mut cursor = self.observers.cursor_front_mut();
        while cursor.remove_current_with_or(|waker| waker.wake(), || {}) {}
        true
    }

    fn remove_observer(
        &mut self,
        wait_node: Pin<&mut pin_list::Node<PinListTypes>>,
    ) {
        // Only registered observers need to be unlinked
        if let Some(node) = wait_node.initialized_mut() {
            let _ = node.reset(&mut self.observers);
        }
    }
}

impl<T: Clone> SlotState<T> {
    /// Returns the outcome if the slot is resolved. Otherwise the observer
    /// gets registered, and will be woken on resolution.
    fn try_observe(
        &mut self,
        mut wait_node: Pin<&mut pin_list::Node<PinListTypes>>,
        cx: &mut Context<'_>,
    ) -> Poll<SlotOutcome<T>> {
        match wait_node.as_mut().initialized_mut() {
            None => match &self.outcome {
                Some(outcome) => Poll::Ready(outcome.clone()),
                None => {
                    self.observers.push_back(
                        wait_node,
                        cx.waker().clone(),
                        (),
                    );
                    Poll::Pending
                }
            },
            Some(node) => match node.take_removed(&self.observers) {
                // Still registered. The caller might have passed a
                // different `Waker` in the meantime.
                Err(node) => {
                    if let Some(waker) = node.protected_mut(&mut self.observers)
                    {
                        update_waker_ref(waker, cx);
                    }
                    Poll::Pending
                }
                // Observers only get unlinked by `resolve`
                Ok(((), ())) => {
                    self.outcome.clone().map_or(Poll::Pending, Poll::Ready)
                }
            },
        }
    }
}

/// A single-assignment future.
///
/// A slot starts out pending and gets resolved exactly once, either through
/// [`try_complete`](GenericCompletionSlot::try_complete) or
/// [`try_cancel`](GenericCompletionSlot::try_cancel). The first call wins,
/// later ones report `false` and have no effect. This allows a signal, a
/// timeout and a cancellation to race for the same slot without any of them
/// failing loudly.
///
/// Cloning a slot yields another handle to the same slot. Any number of
/// tasks can wait for the resolution via
/// [`observe`](GenericCompletionSlot::observe).
pub struct GenericCompletionSlot<MutexType: RawMutex, T> {
    inner: Arc<Mutex<MutexType, SlotState<T>>>,
}

impl<MutexType: RawMutex, T> Clone for GenericCompletionSlot<MutexType, T> {
    fn clone(&self) -> Self {
        GenericCompletionSlot {
            inner: self.inner.clone(),
        }
    }
}

impl<MutexType: RawMutex, T> core::fmt::Debug
    for GenericCompletionSlot<MutexType, T>
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("CompletionSlot")
            .field("is_resolved", &self.is_resolved())
            .finish()
    }
}

impl<MutexType: RawMutex, T> Default for GenericCompletionSlot<MutexType, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MutexType: RawMutex, T> GenericCompletionSlot<MutexType, T> {
    /// Creates a pending slot
    pub fn new() -> GenericCompletionSlot<MutexType, T> {
        Self::with_outcome(None)
    }

    /// Creates a slot which is already completed with `value`
    pub fn completed(value: T) -> GenericCompletionSlot<MutexType, T> {
        Self::with_outcome(Some(SlotOutcome::Completed(value)))
    }

    fn with_outcome(
        outcome: Option<SlotOutcome<T>>,
    ) -> GenericCompletionSlot<MutexType, T> {
        GenericCompletionSlot {
            inner: Arc::new(Mutex::new(SlotState::new(outcome))),
        }
    }

    /// Completes the slot with `value` and wakes all observers.
    ///
    /// Returns `false` if the slot had already been resolved. In that case
    /// `value` is dropped.
    pub fn try_complete(&self, value: T) -> bool {
        self.inner.lock().resolve(SlotOutcome::Completed(value))
    }

    /// Cancels the slot and wakes all observers.
    ///
    /// Returns `false` if the slot had already been resolved.
    pub fn try_cancel(&self) -> bool {
        self.inner.lock().resolve(SlotOutcome::Canceled)
    }

    /// Returns whether the slot has been completed or canceled
    pub fn is_resolved(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }

    /// Returns whether both handles refer to the same slot
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<MutexType: RawMutex, T: Clone> GenericCompletionSlot<MutexType, T> {
    /// Returns the outcome, or `None` while the slot is pending
    pub fn outcome(&self) -> Option<SlotOutcome<T>> {
        self.inner.lock().outcome.clone()
    }

    /// Returns a future that resolves with the outcome of the slot.
    pub fn observe(&self) -> GenericSlotFuture<MutexType, T> {
        GenericSlotFuture {
            slot: Some(self.clone()),
            wait_node: pin_list::Node::new(),
        }
    }

    /// Blocks the current thread until the slot is resolved.
    pub fn wait(&self) -> SlotOutcome<T> {
        futures_executor::block_on(self.observe())
    }
}

pin_project! {
    /// A Future that is resolved once the associated completion slot is
    /// resolved.
    #[must_use = "futures do nothing unless polled"]
    pub struct GenericSlotFuture<MutexType: RawMutex, T> {
        // The observed slot. `None` once the outcome was delivered.
        slot: Option<GenericCompletionSlot<MutexType, T>>,
        // Node for waiting at the slot
        #[pin]
        wait_node: pin_list::Node<PinListTypes>,
    }

    impl<MutexType: RawMutex, T> PinnedDrop for GenericSlotFuture<MutexType, T> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();

            // A registered node must be unlinked before its memory goes away
            if let Some(slot) = this.slot {
                slot.inner.lock().remove_observer(this.wait_node);
            }
        }
    }
}

impl<MutexType: RawMutex, T> core::fmt::Debug
    for GenericSlotFuture<MutexType, T>
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("GenericSlotFuture").finish()
    }
}

impl<MutexType: RawMutex, T: Clone> Future for GenericSlotFuture<MutexType, T> {
    type Output = SlotOutcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let slot = this
            .slot
            .as_ref()
            .expect("polled GenericSlotFuture after completion");

        let poll_res = slot.inner.lock().try_observe(this.wait_node, cx);

        if poll_res.is_ready() {
            *this.slot = None;
        }

        poll_res
    }
}

impl<MutexType: RawMutex, T: Clone> FusedFuture
    for GenericSlotFuture<MutexType, T>
{
    fn is_terminated(&self) -> bool {
        self.slot.is_none()
    }
}

/// A [`GenericCompletionSlot`] which is not thread-safe.
pub type LocalCompletionSlot<T> = GenericCompletionSlot<NoopLock, T>;
/// A [`GenericSlotFuture`] for [`LocalCompletionSlot`].
pub type LocalSlotFuture<T> = GenericSlotFuture<NoopLock, T>;

/// A [`GenericCompletionSlot`] backed by [`parking_lot`].
pub type CompletionSlot<T> = GenericCompletionSlot<parking_lot::RawMutex, T>;
/// A [`GenericSlotFuture`] for [`CompletionSlot`].
pub type SlotFuture<T> = GenericSlotFuture<parking_lot::RawMutex, T>;
