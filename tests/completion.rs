use futures::future::{FusedFuture, Future};
use futures::task::{Context, Poll};
use futures_test::task::{new_count_waker, panic_waker};
use pin_utils::pin_mut;
use waitables::sync::{
    CancelToken, CompletionSlot, LocalCompletionSlot, SlotOutcome,
};

macro_rules! gen_completion_tests {
    ($mod_name:ident, $slot_type:ident) => {
        mod $mod_name {
            use super::*;

            #[test]
            fn first_resolution_wins() {
                let slot = $slot_type::<u32>::new();
                assert!(!slot.is_resolved());
                assert_eq!(None, slot.outcome());

                assert!(slot.try_complete(5));
                assert!(!slot.try_complete(6));
                assert!(!slot.try_cancel());
                assert!(slot.is_resolved());
                assert_eq!(Some(SlotOutcome::Completed(5)), slot.outcome());
            }

            #[test]
            fn cancel_wins_over_later_completion() {
                let slot = $slot_type::<u32>::new();
                assert!(slot.try_cancel());
                assert!(!slot.try_complete(1));
                assert_eq!(Some(SlotOutcome::Canceled), slot.outcome());
                assert!(slot.outcome().unwrap().is_canceled());
            }

            #[test]
            fn observe_resolved_slot() {
                let waker = &panic_waker();
                let cx = &mut Context::from_waker(&waker);
                let slot = $slot_type::completed(3);

                let fut = slot.observe();
                pin_mut!(fut);
                assert!(!fut.as_mut().is_terminated());
                assert_eq!(
                    Poll::Ready(SlotOutcome::Completed(3)),
                    fut.as_mut().poll(cx)
                );
                assert!(fut.as_mut().is_terminated());
            }

            #[test]
            fn wakes_all_observers() {
                let (waker, count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let slot = $slot_type::<&'static str>::new();

                let fut1 = slot.observe();
                let fut2 = slot.observe();
                pin_mut!(fut1);
                pin_mut!(fut2);
                assert!(fut1.as_mut().poll(cx).is_pending());
                assert!(fut2.as_mut().poll(cx).is_pending());
                assert_eq!(count, 0);

                assert!(slot.clone().try_complete("done"));
                assert_eq!(count, 2);
                assert_eq!(
                    Poll::Ready(SlotOutcome::Completed("done")),
                    fut1.as_mut().poll(cx)
                );
                assert_eq!(
                    Poll::Ready(SlotOutcome::Completed("done")),
                    fut2.as_mut().poll(cx)
                );
            }

            #[test]
            fn dropped_observer_is_not_woken() {
                let (waker, count) = new_count_waker();
                let cx = &mut Context::from_waker(&waker);
                let slot = $slot_type::<()>::new();

                {
                    let fut = slot.observe();
                    pin_mut!(fut);
                    assert!(fut.as_mut().poll(cx).is_pending());
                }
                let fut2 = slot.observe();
                pin_mut!(fut2);
                assert!(fut2.as_mut().poll(cx).is_pending());

                assert!(slot.try_cancel());
                assert_eq!(count, 1);
                assert_eq!(
                    Poll::Ready(SlotOutcome::Canceled),
                    fut2.as_mut().poll(cx)
                );
            }

            #[test]
            fn clones_share_state() {
                let slot = $slot_type::<u8>::new();
                let clone = slot.clone();
                assert!(slot.same_slot(&clone));
                assert!(!slot.same_slot(&$slot_type::new()));

                clone.try_complete(1);
                assert!(slot.is_resolved());
            }
        }
    };
}

gen_completion_tests!(local_completion_slot_tests, LocalCompletionSlot);
gen_completion_tests!(completion_slot_tests, CompletionSlot);

#[test]
fn wait_blocks_until_completed_from_other_thread() {
    let slot = CompletionSlot::<u64>::new();
    let completer = slot.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(10));
        completer.try_complete(42)
    });

    assert_eq!(SlotOutcome::Completed(42), slot.wait());
    assert!(handle.join().unwrap());
}

#[test]
fn cancel_token_first_call_wins() {
    let (waker, count) = new_count_waker();
    let cx = &mut Context::from_waker(&waker);
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!token.is_canceled());

    let fut = token.canceled();
    pin_mut!(fut);
    assert!(fut.as_mut().poll(cx).is_pending());

    assert!(clone.cancel());
    assert!(!token.cancel());
    assert_eq!(count, 1);
    assert!(token.is_canceled());
    assert!(fut.as_mut().poll(cx).is_ready());
    assert!(fut.as_mut().is_terminated());

    // Later observers see the cancellation immediately
    let fut2 = clone.canceled();
    pin_mut!(fut2);
    assert!(fut2.as_mut().poll(cx).is_ready());
}

#[test]
#[tracing_test::traced_test]
fn cancel_token_logs_request() {
    let token = CancelToken::new();
    token.cancel();
    token.cancel();
    assert!(logs_contain("cancellation requested"));
}
