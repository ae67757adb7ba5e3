//! Signals and an async lock that can be waited on either by blocking the
//! calling thread or by suspending a task.
//!
//! The crate provides
//! - [`ManualResetSignal`](sync::ManualResetSignal): once set, releases every
//!   current and future waiter until it is reset.
//! - [`AutoResetSignal`](sync::AutoResetSignal): every `set` releases exactly
//!   one waiter, or is latched for the next one.
//! - [`AsyncLock`](sync::AsyncLock): an exclusive, non-reentrant lock whose
//!   ownership is a scoped guard.
//!
//! All waits share one engine ([`WaitEngine`](sync::WaitEngine)) which
//! combines them with timeouts and cooperative cancellation
//! ([`CancelToken`](sync::CancelToken)).
//!
//! Every primitive exists in three flavors:
//! - A `Generic*` type which is parameterized over a
//!   [`lock_api::RawMutex`] that guards its internal state.
//! - A `Local*` alias over [`NoopLock`] for use from a single thread.
//! - An unprefixed alias over [`parking_lot::RawMutex`] which can be shared
//!   between threads.
//!
//! Timeouts are driven by the [`timer`] module. Unless a timer is passed
//! explicitly via [`WaitOptions`](sync::WaitOptions), a process wide
//! [`TimerDriver`](timer::TimerDriver) thread is started on first use.

#![warn(missing_docs, missing_debug_implementations)]
#![deny(bare_trait_objects)]

mod noop_lock;
pub use noop_lock::NoopLock;

mod utils;

pub mod sync;
pub mod timer;
