//! An asynchronously awaitable timer

use super::clock::{millis_rounded_up, Clock};
use crate::utils::update_waker_ref;
use core::{pin::Pin, time::Duration};
use futures_core::{
    future::{FusedFuture, Future},
    task::{Context, Poll, Waker},
};
use lock_api::{Mutex, RawMutex};
use std::collections::BTreeMap;

/// Orders registered timers by their expiry timestamp. The sequence number
/// keeps timers with the same expiry apart.
type TimerKey = (u64, u64);

/// Tracks how the future had interacted with the timer
#[derive(Clone, Copy, Debug, PartialEq)]
enum PollState {
    /// The task is not registered at the wait queue at the timer
    Unregistered,
    /// The task was added to the wait queue at the timer under the given key
    Registered(TimerKey),
    /// The timer has expired and the task was removed from the wait queue.
    /// Remembering this avoids querying the clock again.
    Expired,
}

/// The part of a [`TimerFuture`] which the timer service inspects
#[derive(Debug)]
struct TimerEntry {
    /// Timestamp when the timer expires
    expiry: u64,
    /// Current polling state
    state: PollState,
}

/// Internal state of the timer
struct TimerState {
    /// The clock which is utilized
    clock: &'static dyn Clock,
    /// Wakers of the tasks which wait for their timer to expire
    waiters: BTreeMap<TimerKey, Waker>,
    /// Sequence number for the next registration
    next_seq: u64,
    /// Woken whenever the earliest expiry moves forward in time, so that
    /// whoever calls `check_expirations` can adjust its sleep.
    driver: Option<Waker>,
}

impl TimerState {
    fn new(clock: &'static dyn Clock) -> TimerState {
        TimerState {
            clock,
            waiters: BTreeMap::new(),
            next_seq: 0,
            driver: None,
        }
    }

    fn try_wait(
        &mut self,
        entry: &mut TimerEntry,
        cx: &mut Context<'_>,
    ) -> Poll<()> {
        match entry.state {
            PollState::Unregistered => {
                if self.clock.now() >= entry.expiry {
                    entry.state = PollState::Expired;
                    return Poll::Ready(());
                }

                let key = (entry.expiry, self.next_seq);
                self.next_seq = self.next_seq.wrapping_add(1);
                self.waiters.insert(key, cx.waker().clone());
                entry.state = PollState::Registered(key);

                if self.waiters.keys().next() == Some(&key) {
                    if let Some(driver) = &self.driver {
                        driver.wake_by_ref();
                    }
                }
                Poll::Pending
            }
            PollState::Registered(key) => match self.waiters.get_mut(&key) {
                // Still waiting. The caller might have passed a different
                // `Waker` in the meantime.
                Some(waker) => {
                    update_waker_ref(waker, cx);
                    Poll::Pending
                }
                // `check_expirations` removed the entry
                None => {
                    entry.state = PollState::Expired;
                    Poll::Ready(())
                }
            },
            PollState::Expired => Poll::Ready(()),
        }
    }

    fn remove_waiter(&mut self, entry: &mut TimerEntry) {
        if let PollState::Registered(key) = entry.state {
            self.waiters.remove(&key);
            entry.state = PollState::Unregistered;
        }
    }

    fn next_expiration(&self) -> Option<u64> {
        self.waiters.keys().next().map(|(expiry, _)| *expiry)
    }

    fn check_expirations(&mut self) {
        let now = self.clock.now();
        while let Some(first) = self.waiters.first_entry() {
            if first.key().0 > now {
                // Remaining timers are not expired
                break;
            }
            first.remove().wake();
        }
    }
}

/// Adapter trait that allows Futures to generically interact with timer
/// implementations via dynamic dispatch.
trait TimerAccess: Sync {
    fn try_wait(&self, entry: &mut TimerEntry, cx: &mut Context<'_>)
        -> Poll<()>;

    fn remove_waiter(&self, entry: &mut TimerEntry);
}

/// An asynchronously awaitable timer.
///
/// The timer allows to wait asynchronously either for a certain duration,
/// or until the underlying [`Clock`] reaches a certain timestamp.
pub trait Timer: Sync {
    /// Returns a future that gets fulfilled after the given `Duration`
    fn delay(&self, delay: Duration) -> TimerFuture<'_>;

    /// Returns a future that gets fulfilled when the utilized [`Clock`] reaches
    /// the given timestamp.
    fn deadline(&self, timestamp: u64) -> TimerFuture<'_>;
}

/// A timer service with millisecond precision over a configurable clock.
///
/// Tasks which wait on a [`TimerFuture`] are only woken up when
/// [`check_expirations`](GenericTimerService::check_expirations) is called.
/// This can happen from a dedicated thread (see
/// [`TimerDriver`](super::TimerDriver)) or be integrated into an executor's
/// event loop.
pub struct GenericTimerService<MutexType: RawMutex> {
    inner: Mutex<MutexType, TimerState>,
}

impl<MutexType: RawMutex> core::fmt::Debug for GenericTimerService<MutexType> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("TimerService")
            .field("next_expiration", &self.next_expiration())
            .finish()
    }
}

impl<MutexType: RawMutex> GenericTimerService<MutexType> {
    /// Creates a new timer service which queries `clock` for the current
    /// time.
    ///
    /// [`StdClock`](super::StdClock) follows the system's monotonic time,
    /// [`MockClock`](super::MockClock) allows to simulate time in tests.
    pub fn new(clock: &'static dyn Clock) -> GenericTimerService<MutexType> {
        GenericTimerService {
            inner: Mutex::new(TimerState::new(clock)),
        }
    }

    /// Returns the current timestamp of the underlying clock
    pub fn now(&self) -> u64 {
        self.inner.lock().clock.now()
    }

    /// Returns a timestamp when the next timer expires.
    ///
    /// For thread-safe timers the returned value is only a snapshot, since
    /// other threads can add timers in the meantime. Register a waker via
    /// [`register_driver`](GenericTimerService::register_driver) to get
    /// notified about those.
    pub fn next_expiration(&self) -> Option<u64> {
        self.inner.lock().next_expiration()
    }

    /// Checks whether any registered [`TimerFuture`] has expired, and wakes
    /// up the associated tasks.
    pub fn check_expirations(&self) {
        self.inner.lock().check_expirations()
    }

    /// Registers a `Waker` which gets woken whenever a newly registered timer
    /// becomes the one which expires first.
    pub fn register_driver(&self, waker: Waker) {
        self.inner.lock().driver = Some(waker);
    }

    /// Returns the number of registered timers which have not expired yet
    pub fn pending_timers(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

impl<MutexType: RawMutex + Sync> Timer for GenericTimerService<MutexType> {
    fn delay(&self, delay: Duration) -> TimerFuture<'_> {
        if delay.is_zero() {
            return self.deadline(self.now());
        }
        // The clock only reports full milliseconds. Rounding both parts up
        // keeps the timer from firing before `delay` really elapsed.
        let now = self.inner.lock().clock.now_rounded_up();
        self.deadline(now.saturating_add(millis_rounded_up(delay)))
    }

    fn deadline(&self, timestamp: u64) -> TimerFuture<'_> {
        TimerFuture {
            timer: Some(self),
            entry: TimerEntry {
                expiry: timestamp,
                state: PollState::Unregistered,
            },
        }
    }
}

impl<MutexType: RawMutex + Sync> TimerAccess for GenericTimerService<MutexType> {
    fn try_wait(
        &self,
        entry: &mut TimerEntry,
        cx: &mut Context<'_>,
    ) -> Poll<()> {
        self.inner.lock().try_wait(entry, cx)
    }

    fn remove_waiter(&self, entry: &mut TimerEntry) {
        self.inner.lock().remove_waiter(entry)
    }
}

/// A Future that is resolved once the requested time has elapsed.
#[must_use = "futures do nothing unless polled"]
pub struct TimerFuture<'a> {
    /// The Timer that is associated with this TimerFuture
    timer: Option<&'a dyn TimerAccess>,
    /// Registration at the timer
    entry: TimerEntry,
}

impl<'a> core::fmt::Debug for TimerFuture<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("TimerFuture")
            .field("expiry", &self.entry.expiry)
            .finish()
    }
}

impl<'a> Future for TimerFuture<'a> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let timer = this.timer.expect("polled TimerFuture after completion");

        let poll_res = timer.try_wait(&mut this.entry, cx);
        if poll_res.is_ready() {
            this.timer = None;
        }
        poll_res
    }
}

impl<'a> FusedFuture for TimerFuture<'a> {
    fn is_terminated(&self) -> bool {
        self.timer.is_none()
    }
}

impl<'a> Drop for TimerFuture<'a> {
    fn drop(&mut self) {
        // A pending registration must not outlive the future, otherwise the
        // timer would keep waking a task which is no longer interested.
        if let Some(timer) = self.timer {
            timer.remove_waiter(&mut self.entry);
        }
    }
}

/// A [`GenericTimerService`] backed by [`parking_lot`].
pub type TimerService = GenericTimerService<parking_lot::RawMutex>;
