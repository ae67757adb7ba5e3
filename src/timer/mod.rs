//! Asynchronous timers.
//!
//! This module provides a timer service over a pluggable [`Clock`], and a
//! [`TimerDriver`] thread which fires expired timers. The synchronization
//! primitives use it to implement timeouts.

mod clock;
pub use self::clock::{Clock, MockClock, StdClock};

mod timer;
pub use self::timer::{GenericTimerService, Timer, TimerFuture, TimerService};

mod driver;
pub use self::driver::{default_timer, TimerDriver};
