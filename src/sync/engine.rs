//! The wait engine which is shared by all signal types.
//!
//! A signal only decides which [`WaitSlot`] a new wait has to observe. Racing
//! that slot against a timeout and a [`CancelToken`], and interpreting the
//! result, happens here.

use super::{
    cancel::{CancelToken, CanceledFuture},
    completion::{GenericCompletionSlot, GenericSlotFuture, SlotOutcome},
    error::WaitError,
};
use crate::timer::{default_timer, Timer, TimerFuture};
use core::{pin::Pin, time::Duration};
use futures_core::{
    future::{FusedFuture, Future},
    task::{Context, Poll},
};
use lock_api::RawMutex;
use pin_project_lite::pin_project;

/// The slot a wait has to observe, as handed out by a signal.
pub enum WaitSlot<MutexType: RawMutex> {
    /// The wait succeeds immediately. Used whenever the outcome can be
    /// decided synchronously, so that no slot has to be allocated.
    Ready,
    /// A slot which is observed by many waits at once. A timeout or a
    /// cancellation only ends the observation, and never resolves the slot.
    Shared(GenericCompletionSlot<MutexType, bool>),
    /// A slot which belongs to a single wait. A timeout completes it with
    /// `false`, a cancellation cancels it, unless the slot got resolved
    /// before.
    Exclusive(GenericCompletionSlot<MutexType, bool>),
}

impl<MutexType: RawMutex> core::fmt::Debug for WaitSlot<MutexType> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            WaitSlot::Ready => f.write_str("Ready"),
            WaitSlot::Shared(slot) => f.debug_tuple("Shared").field(slot).finish(),
            WaitSlot::Exclusive(slot) => {
                f.debug_tuple("Exclusive").field(slot).finish()
            }
        }
    }
}

/// How long a wait may take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timeout {
    /// The wait only ends through the signal or a cancellation
    #[default]
    Infinite,
    /// The wait yields `false` if the signal didn't arrive within the duration
    After(Duration),
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Timeout {
        Timeout::After(duration)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Timeout {
        duration.map_or(Timeout::Infinite, Timeout::After)
    }
}

/// Options for a single wait.
///
/// ```
/// use std::time::Duration;
/// use waitables::sync::{CancelToken, WaitOptions};
///
/// let cancel = CancelToken::new();
/// let options = WaitOptions::new()
///     .with_timeout(Duration::from_millis(250))
///     .with_cancel(&cancel);
/// # let _ = options;
/// ```
#[derive(Clone, Copy, Default)]
pub struct WaitOptions<'a> {
    timeout: Timeout,
    cancel: Option<&'a CancelToken>,
    timer: Option<&'a dyn Timer>,
}

impl core::fmt::Debug for WaitOptions<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("WaitOptions")
            .field("timeout", &self.timeout)
            .field("cancel", &self.cancel)
            .field("custom_timer", &self.timer.is_some())
            .finish()
    }
}

impl<'a> WaitOptions<'a> {
    /// Options for a wait without timeout and cancellation
    pub fn new() -> WaitOptions<'a> {
        WaitOptions::default()
    }

    /// Limits how long the wait may take
    pub fn with_timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Makes the wait fail with [`WaitError::Canceled`] once `cancel` fires
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Measures the timeout with `timer` instead of
    /// [`default_timer`](crate::timer::default_timer)
    pub fn with_timer(mut self, timer: &'a dyn Timer) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Returns the configured timeout
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Returns the configured cancel token
    pub fn cancel(&self) -> Option<&'a CancelToken> {
        self.cancel
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RaceState {
    /// Not polled yet, so no slot was taken
    Idle,
    /// A slot was taken and is being observed
    Waiting,
    /// The outcome was delivered, or the race was abandoned
    Done,
}

pin_project! {
    /// Races a wait slot against a timeout and a cancellation.
    ///
    /// The slot is only taken on the first poll, so that a future which is
    /// never polled doesn't take part in the waiter queues.
    pub struct WaitRace<'a, MutexType: RawMutex> {
        state: RaceState,
        slot: Option<WaitSlot<MutexType>>,
        timeout: Timeout,
        timer: Option<&'a dyn Timer>,
        #[pin]
        observer: Option<GenericSlotFuture<MutexType, bool>>,
        #[pin]
        delay: Option<TimerFuture<'a>>,
        #[pin]
        canceled: Option<CanceledFuture>,
    }
}

impl<MutexType: RawMutex> core::fmt::Debug for WaitRace<'_, MutexType> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("WaitRace")
            .field("state", &self.state)
            .field("slot", &self.slot)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<'a, MutexType: RawMutex> WaitRace<'a, MutexType> {
    pub(crate) fn new(options: WaitOptions<'a>) -> WaitRace<'a, MutexType> {
        WaitRace {
            state: RaceState::Idle,
            slot: None,
            timeout: options.timeout,
            timer: options.timer,
            observer: None,
            delay: None,
            canceled: options.cancel.map(CancelToken::canceled),
        }
    }

    /// Lets `cancel` end the race. The race only keeps an observer of the
    /// token, so the token itself may go away before the race ends.
    pub(crate) fn with_cancel(mut self, cancel: &CancelToken) -> Self {
        self.canceled = Some(cancel.canceled());
        self
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.state == RaceState::Done
    }

    /// Drives the race. `wait_slot` is invoked on the first poll.
    pub(crate) fn poll_race(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        wait_slot: impl FnOnce() -> WaitSlot<MutexType>,
    ) -> Poll<Result<bool, WaitError>> {
        let mut this = self.project();

        match *this.state {
            RaceState::Done => panic!("polled a wait after completion"),
            RaceState::Idle => {
                let slot = wait_slot();
                if let WaitSlot::Shared(slot) | WaitSlot::Exclusive(slot) = &slot
                {
                    this.observer.set(Some(slot.observe()));
                }
                if let Timeout::After(duration) = *this.timeout {
                    let timer: &'a dyn Timer = match *this.timer {
                        Some(timer) => timer,
                        None => default_timer(),
                    };
                    this.delay.set(Some(timer.delay(duration)));
                }
                *this.slot = Some(slot);
                *this.state = RaceState::Waiting;
            }
            RaceState::Waiting => {}
        }

        let poll_res = match this.slot.as_ref() {
            Some(slot) => race(
                slot,
                this.observer.as_mut(),
                this.delay.as_mut(),
                this.canceled.as_mut(),
                cx,
            ),
            None => Poll::Ready(Ok(true)),
        };

        if poll_res.is_ready() {
            // Release the timer registration and the observers right away
            *this.state = RaceState::Done;
            this.observer.set(None);
            this.delay.set(None);
            this.canceled.set(None);
        }
        poll_res
    }

    /// Stops the race without delivering its outcome.
    pub(crate) fn abandon(self: Pin<&mut Self>) -> Abandoned {
        let mut this = self.project();
        if *this.state != RaceState::Waiting {
            return Abandoned::Unclaimed;
        }
        *this.state = RaceState::Done;
        this.observer.set(None);

        match this.slot.as_ref() {
            Some(WaitSlot::Exclusive(slot)) => {
                if slot.try_cancel() {
                    Abandoned::Withdrawn
                } else if slot.outcome() == Some(SlotOutcome::Completed(true)) {
                    Abandoned::Forfeited
                } else {
                    Abandoned::Withdrawn
                }
            }
            _ => Abandoned::Unclaimed,
        }
    }
}

/// What an abandoned race left behind at its signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandoned {
    /// No exclusive slot was taken
    Unclaimed,
    /// An exclusive slot was given up without a success on it
    Withdrawn,
    /// An exclusive slot had been completed with `true`, and that success
    /// is lost unless the signal passes it on
    Forfeited,
}

impl Abandoned {
    pub(crate) fn settle<S: WaitSource>(self, source: &S) {
        match self {
            Abandoned::Unclaimed => {}
            Abandoned::Withdrawn => source.withdraw(Internal(())),
            Abandoned::Forfeited => source.forfeit(Internal(())),
        }
    }
}

/// Settles a finished race: a wait which ended without success leaves a
/// resolved slot behind, which the signal no longer needs to keep.
fn settle_outcome<S: WaitSource>(
    source: &S,
    result: &Poll<Result<bool, WaitError>>,
) {
    if let Poll::Ready(outcome) = result {
        if *outcome != Ok(true) {
            source.withdraw(Internal(()));
        }
    }
}

fn interpret(outcome: SlotOutcome<bool>) -> Result<bool, WaitError> {
    match outcome {
        SlotOutcome::Completed(signaled) => Ok(signaled),
        SlotOutcome::Canceled => Err(WaitError::Canceled),
    }
}

fn race<MutexType: RawMutex>(
    slot: &WaitSlot<MutexType>,
    mut observer: Pin<&mut Option<GenericSlotFuture<MutexType, bool>>>,
    mut delay: Pin<&mut Option<TimerFuture<'_>>>,
    mut canceled: Pin<&mut Option<CanceledFuture>>,
    cx: &mut Context<'_>,
) -> Poll<Result<bool, WaitError>> {
    let (slot, exclusive) = match slot {
        WaitSlot::Ready => return Poll::Ready(Ok(true)),
        WaitSlot::Shared(slot) => (slot, false),
        WaitSlot::Exclusive(slot) => (slot, true),
    };

    if let Some(observer) = observer.as_mut().as_pin_mut() {
        if let Poll::Ready(outcome) = observer.poll(cx) {
            return Poll::Ready(interpret(outcome));
        }
    }

    if let Some(canceled) = canceled.as_mut().as_pin_mut() {
        if canceled.poll(cx).is_ready() {
            // Resolving the slot must not wake this task again
            observer.set(None);
            let won = if exclusive {
                slot.try_cancel()
            } else {
                !slot.is_resolved()
            };
            if won {
                tracing::trace!("wait canceled");
                return Poll::Ready(Err(WaitError::Canceled));
            }
            // The slot got resolved first
            return Poll::Ready(slot.outcome().map_or(Ok(false), interpret));
        }
    }

    if let Some(delay) = delay.as_mut().as_pin_mut() {
        if delay.poll(cx).is_ready() {
            observer.set(None);
            let won = if exclusive {
                slot.try_complete(false)
            } else {
                !slot.is_resolved()
            };
            if won {
                tracing::trace!("wait timed out");
                return Poll::Ready(Ok(false));
            }
            return Poll::Ready(slot.outcome().map_or(Ok(false), interpret));
        }
    }

    Poll::Pending
}

pub(crate) mod sealed {
    use super::WaitSlot;
    use lock_api::RawMutex;

    /// Proof that a hook is invoked from within the crate.
    #[derive(Debug, Clone, Copy)]
    pub struct Internal(pub(crate) ());

    /// The hooks through which the wait engine talks to a signal.
    ///
    /// Not nameable outside of the crate, and its hooks can't be invoked
    /// from outside either. A slot handed out here must be observed by a
    /// wait, otherwise a signal delivered to it is lost.
    pub trait WaitSource {
        /// The mutex type which guards the signal's slots
        type Mutex: RawMutex;

        /// Returns the slot which a wait that starts now has to observe.
        fn wait_slot(&self, _: Internal) -> WaitSlot<Self::Mutex>;

        /// Called when a wait got dropped after its
        /// [`Exclusive`](WaitSlot::Exclusive) slot had been completed with
        /// `true`, but before the outcome was observed.
        fn forfeit(&self, _: Internal) {}

        /// Called when a wait gave up its
        /// [`Exclusive`](WaitSlot::Exclusive) slot after a timeout or a
        /// cancellation.
        fn withdraw(&self, _: Internal) {}
    }
}

use sealed::{Internal, WaitSource};

/// The wait operations which every signal offers.
///
/// All operations are provided: blocking and suspending waits, each
/// optionally limited by a timeout and cancelable through a
/// [`CancelToken`]. The trait can't be implemented outside of this crate,
/// and waits can only be started through these operations.
///
/// ```compile_fail
/// use waitables::sync::{AutoResetSignal, WaitEngine};
///
/// fn take_slot<E: WaitEngine>(signal: &E) {
///     // The slot hook is internal
///     let _ = signal.wait_slot();
/// }
///
/// take_slot(&AutoResetSignal::new(false));
/// ```
///
/// The blocking variants do not spawn a worker. They drive the suspending
/// wait to completion on the calling thread, which stays blocked for the
/// whole wait. They must not be called from within an executor's worker
/// thread: that can starve or deadlock executors with a bounded number of
/// threads.
pub trait WaitEngine: WaitSource + Sized {
    /// Blocks the calling thread until the signal arrives.
    fn wait(&self) -> bool {
        futures_executor::block_on(self.wait_async())
    }

    /// Blocks the calling thread until the signal arrives, or until
    /// `timeout` elapsed.
    ///
    /// Returns `false` if the timeout elapsed first.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        futures_executor::block_on(self.wait_timeout_async(timeout))
    }

    /// Blocks the calling thread until the signal arrives, or until `cancel`
    /// fires.
    fn wait_cancelable(&self, cancel: &CancelToken) -> Result<bool, WaitError> {
        futures_executor::block_on(self.wait_cancelable_async(cancel))
    }

    /// Blocks the calling thread until the signal arrives, or until the
    /// timeout or the cancel token in `options` ends the wait.
    fn wait_with(&self, options: WaitOptions<'_>) -> Result<bool, WaitError> {
        futures_executor::block_on(self.wait_with_async(options))
    }

    /// Returns a future that resolves with `true` once the signal arrives.
    fn wait_async(&self) -> GenericWaitFuture<'_, Self> {
        GenericWaitFuture {
            engine: self,
            race: WaitRace::new(WaitOptions::new()),
        }
    }

    /// Returns a future that resolves with `true` once the signal arrives,
    /// or with `false` once `timeout` elapsed.
    fn wait_timeout_async(&self, timeout: Duration) -> GenericWaitFuture<'_, Self> {
        GenericWaitFuture {
            engine: self,
            race: WaitRace::new(WaitOptions::new().with_timeout(timeout)),
        }
    }

    /// Returns a future that resolves once the signal arrives, or fails once
    /// `cancel` fires.
    fn wait_cancelable_async(
        &self,
        cancel: &CancelToken,
    ) -> GenericCancelableWaitFuture<'_, Self> {
        GenericCancelableWaitFuture {
            engine: self,
            race: WaitRace::new(WaitOptions::new()).with_cancel(cancel),
        }
    }

    /// Returns a future for a wait which is configured through `options`.
    fn wait_with_async<'a>(
        &'a self,
        options: WaitOptions<'a>,
    ) -> GenericCancelableWaitFuture<'a, Self> {
        GenericCancelableWaitFuture {
            engine: self,
            race: WaitRace::new(options),
        }
    }
}

impl<S: WaitSource> WaitEngine for S {}

pin_project! {
    /// A Future that resolves once a signal arrives, or once its timeout
    /// elapsed.
    #[must_use = "futures do nothing unless polled"]
    pub struct GenericWaitFuture<'a, E: WaitEngine> {
        engine: &'a E,
        #[pin]
        race: WaitRace<'a, E::Mutex>,
    }

    impl<E: WaitEngine> PinnedDrop for GenericWaitFuture<'_, E> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            this.race.abandon().settle(*this.engine);
        }
    }
}

impl<E: WaitEngine> core::fmt::Debug for GenericWaitFuture<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("GenericWaitFuture")
            .field("race", &self.race)
            .finish()
    }
}

impl<'a, E: WaitEngine> Future for GenericWaitFuture<'a, E> {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        let this = self.project();
        let engine: &'a E = *this.engine;
        let poll_res = this.race.poll_race(cx, || engine.wait_slot(Internal(())));
        settle_outcome(engine, &poll_res);
        // Without a cancel token the slot can't get canceled
        poll_res.map(|result| result == Ok(true))
    }
}

impl<E: WaitEngine> FusedFuture for GenericWaitFuture<'_, E> {
    fn is_terminated(&self) -> bool {
        self.race.is_terminated()
    }
}

pin_project! {
    /// A Future that resolves once a signal arrives or its timeout elapsed,
    /// and which fails once its cancel token fires.
    #[must_use = "futures do nothing unless polled"]
    pub struct GenericCancelableWaitFuture<'a, E: WaitEngine> {
        engine: &'a E,
        #[pin]
        race: WaitRace<'a, E::Mutex>,
    }

    impl<E: WaitEngine> PinnedDrop for GenericCancelableWaitFuture<'_, E> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            this.race.abandon().settle(*this.engine);
        }
    }
}

impl<E: WaitEngine> core::fmt::Debug for GenericCancelableWaitFuture<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("GenericCancelableWaitFuture")
            .field("race", &self.race)
            .finish()
    }
}

impl<'a, E: WaitEngine> Future for GenericCancelableWaitFuture<'a, E> {
    type Output = Result<bool, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let engine: &'a E = *this.engine;
        let poll_res = this.race.poll_race(cx, || engine.wait_slot(Internal(())));
        settle_outcome(engine, &poll_res);
        poll_res
    }
}

impl<E: WaitEngine> FusedFuture for GenericCancelableWaitFuture<'_, E> {
    fn is_terminated(&self) -> bool {
        self.race.is_terminated()
    }
}
