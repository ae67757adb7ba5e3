use futures::future::{FusedFuture, Future};
use futures::task::{Context, Poll};
use futures_test::task::{new_count_waker, panic_waker};
use pin_utils::pin_mut;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use waitables::sync::{AsyncLock, CancelToken, LocalAsyncLock, WaitError};

macro_rules! gen_async_lock_tests {
    ($mod_name:ident, $lock_type:ident) => {
        mod $mod_name {
            use super::*;

            #[test]
            fn uncontended_acquire() {
                let waker = &panic_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();
                assert!(!lock.is_held());

                {
                    let fut = lock.acquire_async();
                    pin_mut!(fut);
                    match fut.as_mut().poll(cx) {
                        Poll::Pending => panic!("Expect lock to get locked"),
                        Poll::Ready(_guard) => {
                            assert!(lock.is_held());
                        }
                    };
                    assert!(fut.as_mut().is_terminated());
                }
                assert!(!lock.is_held());

                let guard = lock.acquire();
                assert!(lock.is_held());
                guard.release();
                assert!(!lock.is_held());
            }

            #[test]
            fn try_acquire() {
                let lock = $lock_type::new();
                let guard = lock.try_acquire().expect("lock is free");
                assert!(lock.is_held());
                assert!(lock.try_acquire().is_none());
                drop(guard);
                assert!(!lock.is_held());
                assert!(lock.try_acquire().is_some());
            }

            #[test]
            fn release_hands_over_in_fifo_order() {
                let (waker, count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();

                let guard = lock.try_acquire().unwrap();
                let fut1 = lock.acquire_async();
                let fut2 = lock.acquire_async();
                pin_mut!(fut1);
                pin_mut!(fut2);
                assert!(fut1.as_mut().poll(cx).is_pending());
                assert!(fut2.as_mut().poll(cx).is_pending());
                assert_eq!(2, lock.waiter_count());

                drop(guard);
                assert_eq!(count, 1);
                assert!(lock.is_held());
                // A newcomer can't take a lock which was handed over
                assert!(lock.try_acquire().is_none());
                assert_eq!(1, lock.waiter_count());

                let guard1 = match fut1.as_mut().poll(cx) {
                    Poll::Ready(guard) => guard,
                    Poll::Pending => panic!("Expect lock to be handed over"),
                };
                assert!(fut2.as_mut().poll(cx).is_pending());

                drop(guard1);
                assert_eq!(count, 2);
                let guard2 = match fut2.as_mut().poll(cx) {
                    Poll::Ready(guard) => guard,
                    Poll::Pending => panic!("Expect lock to be handed over"),
                };
                assert!(lock.is_held());
                drop(guard2);
                assert!(!lock.is_held());
                assert_eq!(0, lock.waiter_count());
            }

            #[test]
            fn dropped_pending_acquire_is_skipped() {
                let (waker, count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();

                let guard = lock.try_acquire().unwrap();
                let fut2 = lock.acquire_async();
                pin_mut!(fut2);
                {
                    let fut1 = lock.acquire_async();
                    pin_mut!(fut1);
                    assert!(fut1.as_mut().poll(cx).is_pending());
                    assert!(fut2.as_mut().poll(cx).is_pending());
                }
                assert_eq!(1, lock.waiter_count());

                drop(guard);
                assert_eq!(count, 1);
                assert!(fut2.as_mut().poll(cx).is_ready());
                assert!(!lock.is_held());
            }

            #[test]
            fn dropped_granted_acquire_releases_ownership() {
                let (waker, count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();

                let guard = lock.try_acquire().unwrap();
                let fut2 = lock.acquire_async();
                pin_mut!(fut2);
                {
                    let fut1 = lock.acquire_async();
                    pin_mut!(fut1);
                    assert!(fut1.as_mut().poll(cx).is_pending());
                    assert!(fut2.as_mut().poll(cx).is_pending());

                    // Ownership goes to fut1, which never picks it up
                    drop(guard);
                    assert_eq!(count, 1);
                }
                assert_eq!(count, 2);
                assert!(lock.is_held());

                let guard2 = match fut2.as_mut().poll(cx) {
                    Poll::Ready(guard) => guard,
                    Poll::Pending => panic!("Expect lock to be handed over"),
                };
                drop(guard2);
                assert!(!lock.is_held());

                // Without further waiters the lock becomes free
                let guard = lock.try_acquire().unwrap();
                {
                    let fut3 = lock.acquire_async();
                    pin_mut!(fut3);
                    assert!(fut3.as_mut().poll(cx).is_pending());
                    drop(guard);
                }
                assert!(!lock.is_held());
            }

            #[test]
            fn cancel_pending_acquire() {
                let (waker, _count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();
                let token = CancelToken::new();

                let guard = lock.try_acquire().unwrap();
                let fut = lock.acquire_cancelable_async(&token);
                pin_mut!(fut);
                assert!(fut.as_mut().poll(cx).is_pending());

                token.cancel();
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Err(WaitError::Canceled)) => {}
                    _ => panic!("Expect acquire to be canceled"),
                }
                assert!(fut.as_mut().is_terminated());
                assert_eq!(0, lock.waiter_count());

                drop(guard);
                assert!(!lock.is_held());
            }

            #[test]
            fn handover_wins_over_later_cancellation() {
                let (waker, _count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();
                let token = CancelToken::new();

                let guard = lock.try_acquire().unwrap();
                let fut = lock.acquire_cancelable_async(&token);
                pin_mut!(fut);
                assert!(fut.as_mut().poll(cx).is_pending());

                drop(guard);
                token.cancel();
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(guard)) => {
                        assert!(lock.is_held());
                        drop(guard);
                    }
                    _ => panic!("Expect lock to be handed over"),
                }
                assert!(!lock.is_held());
            }

            #[test]
            fn canceled_token_still_acquires_free_lock() {
                let lock = $lock_type::new();
                let token = CancelToken::new();
                token.cancel();

                let guard = lock.acquire_cancelable(&token).unwrap();
                drop(guard);
                assert!(!lock.is_held());
            }

            #[test]
            fn guard_outlives_cancel_token() {
                let lock = $lock_type::new();
                let guard = {
                    let token = CancelToken::new();
                    lock.acquire_cancelable(&token).unwrap()
                };
                assert!(lock.is_held());
                drop(guard);
                assert!(!lock.is_held());

                let waker = &panic_waker();
                let cx = &mut Context::from_waker(&waker);
                let guard = {
                    let token = CancelToken::new();
                    let fut = lock.acquire_cancelable_async(&token);
                    pin_mut!(fut);
                    match fut.as_mut().poll(cx) {
                        Poll::Ready(Ok(guard)) => guard,
                        _ => panic!("Expect lock to get locked"),
                    }
                };
                assert!(lock.is_held());
                guard.release();
                assert!(!lock.is_held());
            }

            #[test]
            fn canceled_acquires_behind_live_waiter_leave_queue() {
                let (waker, count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();

                let guard = lock.try_acquire().unwrap();
                let live = lock.acquire_async();
                pin_mut!(live);
                assert!(live.as_mut().poll(cx).is_pending());

                for _ in 0..1000 {
                    let token = CancelToken::new();
                    let fut = lock.acquire_cancelable_async(&token);
                    pin_mut!(fut);
                    assert!(fut.as_mut().poll(cx).is_pending());
                    token.cancel();
                    match fut.as_mut().poll(cx) {
                        Poll::Ready(Err(WaitError::Canceled)) => {}
                        _ => panic!("Expect acquire to be canceled"),
                    }
                }
                assert_eq!(1, lock.waiter_count());

                drop(guard);
                assert!(count.get() > 1000);
                assert!(live.as_mut().poll(cx).is_ready());
                assert_eq!(0, lock.waiter_count());
                assert!(!lock.is_held());
            }

            #[test]
            #[should_panic]
            fn poll_after_completion_should_panic() {
                let waker = &panic_waker();
                let cx = &mut Context::from_waker(&waker);
                let lock = $lock_type::new();

                let fut = lock.acquire_async();
                pin_mut!(fut);
                let guard = match fut.as_mut().poll(cx) {
                    Poll::Ready(guard) => guard,
                    Poll::Pending => panic!("Expect lock to get locked"),
                };
                drop(guard);
                let _ = fut.as_mut().poll(cx);
            }
        }
    };
}

gen_async_lock_tests!(local_async_lock_tests, LocalAsyncLock);
gen_async_lock_tests!(async_lock_tests, AsyncLock);

#[test]
fn canceled_token_fails_contended_blocking_acquire() {
    let lock = Arc::new(AsyncLock::new());
    let token = CancelToken::new();
    let guard = lock.try_acquire().unwrap();

    let handle = {
        let lock = lock.clone();
        let token = token.clone();
        std::thread::spawn(move || {
            let result = lock.acquire_cancelable(&token);
            result.is_err()
        })
    };
    std::thread::sleep(Duration::from_millis(20));
    token.cancel();
    assert!(handle.join().unwrap());

    drop(guard);
    assert!(!lock.is_held());
}

#[test]
fn blocking_acquire_excludes_other_threads() {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 200;
    let lock = Arc::new(AsyncLock::new());
    let inside = Arc::new(AtomicBool::new(false));
    let entered = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let lock = lock.clone();
            let inside = inside.clone();
            let entered = entered.clone();
            std::thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    let _guard = lock.acquire();
                    assert!(!inside.swap(true, Ordering::SeqCst));
                    entered.fetch_add(1, Ordering::SeqCst);
                    std::thread::yield_now();
                    inside.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(THREADS * ITERATIONS, entered.load(Ordering::SeqCst));
    assert!(!lock.is_held());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_acquire_excludes_other_tasks() {
    const TASKS: usize = 8;
    const ITERATIONS: usize = 100;
    let lock = Arc::new(AsyncLock::new());
    let inside = Arc::new(AtomicBool::new(false));

    let tasks: Vec<_> = (0..TASKS)
        .map(|_| {
            let lock = lock.clone();
            let inside = inside.clone();
            tokio::spawn(async move {
                for _ in 0..ITERATIONS {
                    let guard = lock.acquire_async().await;
                    assert!(!inside.swap(true, Ordering::SeqCst));
                    tokio::task::yield_now().await;
                    inside.store(false, Ordering::SeqCst);
                    drop(guard);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert!(!lock.is_held());
}
