//! A background thread which drives a [`TimerService`].

use super::{
    clock::{Clock, StdClock},
    timer::{Timer, TimerFuture, TimerService},
};
use crate::utils::unpark_waker;
use core::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use std::{
    io,
    sync::{Arc, OnceLock},
    thread::{self, JoinHandle},
};

/// Owns a [`TimerService`] together with a thread which sleeps until the
/// next timer expires and then wakes up the waiting tasks.
///
/// Dropping the driver stops the thread. Timers which are still pending at
/// that point never fire.
pub struct TimerDriver {
    service: Arc<TimerService>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for TimerDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("TimerDriver")
            .field("service", &self.service)
            .finish()
    }
}

impl TimerDriver {
    /// Starts a driver thread for a new timer service over `clock`.
    pub fn spawn(clock: &'static dyn Clock) -> io::Result<TimerDriver> {
        let service = Arc::new(TimerService::new(clock));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread = thread::Builder::new()
            .name("waitables-timer".into())
            .spawn({
                let service = service.clone();
                let shutdown = shutdown.clone();
                move || drive(&service, &shutdown)
            })?;
        tracing::debug!("timer driver started");

        Ok(TimerDriver {
            service,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Returns the timer service which this driver operates on
    pub fn service(&self) -> &TimerService {
        &self.service
    }
}

fn drive(service: &TimerService, shutdown: &AtomicBool) {
    service.register_driver(unpark_waker(thread::current()));

    while !shutdown.load(Ordering::Acquire) {
        service.check_expirations();
        match service.next_expiration() {
            Some(expiry) => {
                let now = service.now();
                if expiry > now {
                    thread::park_timeout(Duration::from_millis(expiry - now));
                }
            }
            None => thread::park(),
        }
    }
    tracing::debug!("timer driver stopped");
}

impl Timer for TimerDriver {
    fn delay(&self, delay: Duration) -> TimerFuture<'_> {
        self.service.delay(delay)
    }

    fn deadline(&self, timestamp: u64) -> TimerFuture<'_> {
        self.service.deadline(timestamp)
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

static STD_CLOCK: StdClock = StdClock::new();
static DEFAULT_DRIVER: OnceLock<TimerDriver> = OnceLock::new();

/// Returns the process wide timer, starting its driver thread on first use.
///
/// Waits with a finite timeout use this timer unless
/// [`WaitOptions`](crate::sync::WaitOptions) name another one.
///
/// # Panics
///
/// Panics if the driver thread can't be spawned.
pub fn default_timer() -> &'static TimerDriver {
    DEFAULT_DRIVER.get_or_init(|| {
        TimerDriver::spawn(&STD_CLOCK).unwrap_or_else(|err| {
            panic!("failed to start the default timer driver: {err}")
        })
    })
}
