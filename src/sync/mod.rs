//! Signals and a lock which can be awaited by threads and tasks alike.
//!
//! This module provides various primitives for synchronizing concurrently
//! executing threads and futures. All of them build on
//! [`GenericCompletionSlot`], a single-assignment future, and share the wait
//! logic of [`WaitEngine`].

mod completion;

pub use self::completion::{
    CompletionSlot, GenericCompletionSlot, GenericSlotFuture,
    LocalCompletionSlot, LocalSlotFuture, SlotFuture, SlotOutcome,
};

mod error;

pub use self::error::WaitError;

mod cancel;

pub use self::cancel::{CancelToken, CanceledFuture};

mod engine;

pub use self::engine::{
    GenericCancelableWaitFuture, GenericWaitFuture, Timeout, WaitEngine,
    WaitOptions,
};

mod manual_reset_signal;

pub use self::manual_reset_signal::{
    GenericManualResetSignal, LocalManualResetCancelableWaitFuture,
    LocalManualResetSignal, LocalManualResetWaitFuture,
    ManualResetCancelableWaitFuture, ManualResetSignal, ManualResetWaitFuture,
};

mod auto_reset_signal;

pub use self::auto_reset_signal::{
    AutoResetCancelableWaitFuture, AutoResetSignal, AutoResetWaitFuture,
    GenericAutoResetSignal, LocalAutoResetCancelableWaitFuture,
    LocalAutoResetSignal, LocalAutoResetWaitFuture,
};

mod async_lock;

pub use self::async_lock::{
    AcquireFuture, AsyncLock, AsyncLockGuard, CancelableAcquireFuture,
    GenericAcquireFuture, GenericAsyncLock, GenericAsyncLockGuard,
    GenericCancelableAcquireFuture, LocalAcquireFuture, LocalAsyncLock,
    LocalAsyncLockGuard, LocalCancelableAcquireFuture,
};
