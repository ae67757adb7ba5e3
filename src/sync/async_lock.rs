//! An asynchronously awaitable lock without protected data.

use super::{
    cancel::CancelToken,
    completion::GenericCompletionSlot,
    engine::{Abandoned, WaitOptions, WaitRace, WaitSlot},
    error::WaitError,
};
use crate::NoopLock;
use core::{
    pin::Pin,
    sync::atomic::{AtomicBool, Ordering},
};
use futures_core::{
    future::{FusedFuture, Future},
    task::{Context, Poll},
};
use lock_api::{Mutex, RawMutex};
use pin_project_lite::pin_project;
use std::collections::VecDeque;

/// A non-reentrant lock which hands out ownership in the form of a guard.
///
/// Ownership can be obtained by blocking the calling thread
/// ([`acquire`](GenericAsyncLock::acquire)), by awaiting a future
/// ([`acquire_async`](GenericAsyncLock::acquire_async)), or only if the lock
/// is free ([`try_acquire`](GenericAsyncLock::try_acquire)). Dropping the
/// returned [`GenericAsyncLockGuard`] releases the lock, and passes ownership
/// on to the longest waiting task if there is any.
///
/// An acquire which arrives while the lock is free takes it without
/// looking at the queue. It can thereby overtake waiters that are just about
/// to enqueue themselves. Waiters which made it into the queue are served in
/// FIFO order.
///
/// The blocking variants occupy the calling thread until ownership arrives.
/// Calling them from an executor's worker thread while the current owner
/// needs that worker to make progress deadlocks.
pub struct GenericAsyncLock<MutexType: RawMutex> {
    is_held: AtomicBool,
    waiters: Mutex<MutexType, VecDeque<GenericCompletionSlot<MutexType, bool>>>,
}

impl<MutexType: RawMutex> core::fmt::Debug for GenericAsyncLock<MutexType> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("AsyncLock")
            .field("is_held", &self.is_held())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

impl<MutexType: RawMutex> Default for GenericAsyncLock<MutexType> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MutexType: RawMutex> GenericAsyncLock<MutexType> {
    /// Creates a new lock which is not held
    pub fn new() -> GenericAsyncLock<MutexType> {
        GenericAsyncLock {
            is_held: AtomicBool::new(false),
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Blocks the calling thread until the lock is owned.
    pub fn acquire(&self) -> GenericAsyncLockGuard<'_, MutexType> {
        futures_executor::block_on(self.acquire_async())
    }

    /// Blocks the calling thread until the lock is owned, or until `cancel`
    /// fires.
    ///
    /// The returned guard only borrows the lock, the token may be dropped
    /// while the guard is still held.
    pub fn acquire_cancelable(
        &self,
        cancel: &CancelToken,
    ) -> Result<GenericAsyncLockGuard<'_, MutexType>, WaitError> {
        futures_executor::block_on(self.acquire_cancelable_async(cancel))
    }

    /// Returns a future that resolves with a guard once the lock is owned.
    pub fn acquire_async(&self) -> GenericAcquireFuture<'_, MutexType> {
        GenericAcquireFuture {
            lock: self,
            race: WaitRace::new(WaitOptions::new()),
        }
    }

    /// Returns a future that resolves with a guard once the lock is owned,
    /// or fails with [`WaitError::Canceled`] once `cancel` fires.
    ///
    /// If ownership arrives at the same time as the cancellation, whichever
    /// resolves the waiter first wins. A guard that won is always returned.
    pub fn acquire_cancelable_async(
        &self,
        cancel: &CancelToken,
    ) -> GenericCancelableAcquireFuture<'_, MutexType> {
        GenericCancelableAcquireFuture {
            lock: self,
            race: WaitRace::new(WaitOptions::new()).with_cancel(cancel),
        }
    }

    /// Takes the lock if it is free.
    pub fn try_acquire(&self) -> Option<GenericAsyncLockGuard<'_, MutexType>> {
        if self.try_take() {
            Some(GenericAsyncLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Returns whether somebody owns the lock
    pub fn is_held(&self) -> bool {
        self.is_held.load(Ordering::Acquire)
    }

    /// Returns the number of acquires which are waiting for the lock
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn try_take(&self) -> bool {
        self.is_held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn acquire_slot(&self) -> WaitSlot<MutexType> {
        if self.try_take() {
            return WaitSlot::Ready;
        }

        let slot = GenericCompletionSlot::new();
        let mut waiters = self.waiters.lock();
        // `release` only clears the flag while holding the lock
        if self.try_take() {
            return WaitSlot::Ready;
        }

        waiters.push_back(slot.clone());
        WaitSlot::Exclusive(slot)
    }

    /// Drops the slots of acquires which got canceled or went away.
    fn prune(&self) {
        self.waiters.lock().retain(|waiter| !waiter.is_resolved());
    }

    fn settle(&self, abandoned: Abandoned) {
        match abandoned {
            Abandoned::Unclaimed => {}
            Abandoned::Withdrawn => self.prune(),
            // Ownership was handed over, but nobody is there to take it
            Abandoned::Forfeited => self.release(),
        }
    }

    /// Hands ownership to the oldest live waiter, or frees the lock.
    fn release(&self) {
        let mut waiters = self.waiters.lock();
        if !self.is_held.load(Ordering::Acquire) {
            drop(waiters);
            panic!("released an AsyncLock which is not held");
        }

        while let Some(waiter) = waiters.pop_front() {
            // Waiters which got canceled refuse the handoff
            if waiter.try_complete(true) {
                tracing::trace!(
                    queued = waiters.len(),
                    "lock handed over to the next waiter"
                );
                return;
            }
        }
        self.is_held.store(false, Ordering::Release);
    }
}

/// Proof of ownership of a [`GenericAsyncLock`].
///
/// The lock is released when the guard gets dropped.
#[must_use = "if unused the lock will immediately be released"]
pub struct GenericAsyncLockGuard<'a, MutexType: RawMutex> {
    lock: &'a GenericAsyncLock<MutexType>,
}

impl<MutexType: RawMutex> core::fmt::Debug
    for GenericAsyncLockGuard<'_, MutexType>
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("AsyncLockGuard").finish()
    }
}

impl<MutexType: RawMutex> GenericAsyncLockGuard<'_, MutexType> {
    /// Releases the lock. Same as dropping the guard.
    pub fn release(self) {
        drop(self)
    }
}

impl<MutexType: RawMutex> Drop for GenericAsyncLockGuard<'_, MutexType> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

pin_project! {
    /// A future which resolves once ownership of the lock was obtained.
    #[must_use = "futures do nothing unless polled"]
    pub struct GenericAcquireFuture<'a, MutexType: RawMutex> {
        lock: &'a GenericAsyncLock<MutexType>,
        #[pin]
        race: WaitRace<'a, MutexType>,
    }

    impl<MutexType: RawMutex> PinnedDrop for GenericAcquireFuture<'_, MutexType> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            this.lock.settle(this.race.abandon());
        }
    }
}

impl<MutexType: RawMutex> core::fmt::Debug for GenericAcquireFuture<'_, MutexType> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("GenericAcquireFuture")
            .field("race", &self.race)
            .finish()
    }
}

impl<'a, MutexType: RawMutex> Future for GenericAcquireFuture<'a, MutexType> {
    type Output = GenericAsyncLockGuard<'a, MutexType>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let lock: &'a GenericAsyncLock<MutexType> = *this.lock;
        this.race.poll_race(cx, || lock.acquire_slot()).map(|result| {
            // Neither a timeout nor a cancel token can end this race
            debug_assert_eq!(result, Ok(true));
            GenericAsyncLockGuard { lock }
        })
    }
}

impl<MutexType: RawMutex> FusedFuture for GenericAcquireFuture<'_, MutexType> {
    fn is_terminated(&self) -> bool {
        self.race.is_terminated()
    }
}

pin_project! {
    /// A future which resolves once ownership of the lock was obtained, and
    /// which fails once its cancel token fires.
    #[must_use = "futures do nothing unless polled"]
    pub struct GenericCancelableAcquireFuture<'a, MutexType: RawMutex> {
        lock: &'a GenericAsyncLock<MutexType>,
        #[pin]
        race: WaitRace<'a, MutexType>,
    }

    impl<MutexType: RawMutex> PinnedDrop for GenericCancelableAcquireFuture<'_, MutexType> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            this.lock.settle(this.race.abandon());
        }
    }
}

impl<MutexType: RawMutex> core::fmt::Debug
    for GenericCancelableAcquireFuture<'_, MutexType>
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("GenericCancelableAcquireFuture")
            .field("race", &self.race)
            .finish()
    }
}

impl<'a, MutexType: RawMutex> Future
    for GenericCancelableAcquireFuture<'a, MutexType>
{
    type Output = Result<GenericAsyncLockGuard<'a, MutexType>, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let lock: &'a GenericAsyncLock<MutexType> = *this.lock;
        let poll_res = this.race.poll_race(cx, || lock.acquire_slot());
        if let Poll::Ready(Err(_)) = poll_res {
            lock.prune();
        }
        poll_res.map(|result| result.map(|_| GenericAsyncLockGuard { lock }))
    }
}

impl<MutexType: RawMutex> FusedFuture
    for GenericCancelableAcquireFuture<'_, MutexType>
{
    fn is_terminated(&self) -> bool {
        self.race.is_terminated()
    }
}

// Export a non thread-safe version using NoopLock

/// A [`GenericAsyncLock`] which is not thread-safe.
pub type LocalAsyncLock = GenericAsyncLock<NoopLock>;
/// A [`GenericAsyncLockGuard`] for [`LocalAsyncLock`].
pub type LocalAsyncLockGuard<'a> = GenericAsyncLockGuard<'a, NoopLock>;
/// A [`GenericAcquireFuture`] for [`LocalAsyncLock`].
pub type LocalAcquireFuture<'a> = GenericAcquireFuture<'a, NoopLock>;
/// A [`GenericCancelableAcquireFuture`] for [`LocalAsyncLock`].
pub type LocalCancelableAcquireFuture<'a> =
    GenericCancelableAcquireFuture<'a, NoopLock>;

// Export a thread-safe version using parking_lot::RawMutex

/// A [`GenericAsyncLock`] backed by [`parking_lot`].
pub type AsyncLock = GenericAsyncLock<parking_lot::RawMutex>;
/// A [`GenericAsyncLockGuard`] for [`AsyncLock`].
pub type AsyncLockGuard<'a> = GenericAsyncLockGuard<'a, parking_lot::RawMutex>;
/// A [`GenericAcquireFuture`] for [`AsyncLock`].
pub type AcquireFuture<'a> = GenericAcquireFuture<'a, parking_lot::RawMutex>;
/// A [`GenericCancelableAcquireFuture`] for [`AsyncLock`].
pub type CancelableAcquireFuture<'a> =
    GenericCancelableAcquireFuture<'a, parking_lot::RawMutex>;
