//! Property-based tests for the endpoint driver.
//!
//! Verifies ordering and terminal-failure invariants under arbitrary push
//! sequences rather than specific scenarios.

use std::rc::Rc;

use capstan_core::{AppWrite, EarlyAppWrite, EndpointError, WriteNewSessionTicket};
use capstan_harness::{CountingWriteCallback, DriverFixture, MachineCall};
use proptest::prelude::*;

/// One push against the driver's public API.
#[derive(Debug, Clone)]
enum PushOp {
    Write(Vec<u8>),
    EarlyWrite(Vec<u8>),
    Ticket(Option<Vec<u8>>),
    Close,
    CloseImmediate,
}

fn push_op() -> impl Strategy<Value = PushOp> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..16).prop_map(PushOp::Write),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(PushOp::EarlyWrite),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..8)).prop_map(PushOp::Ticket),
        Just(PushOp::Close),
        Just(PushOp::CloseImmediate),
    ]
}

fn apply(fx: &DriverFixture, op: &PushOp) {
    match op {
        PushOp::Write(data) => fx.handle.app_write(AppWrite::new(data.clone())),
        PushOp::EarlyWrite(data) => fx.handle.early_app_write(EarlyAppWrite::new(data.clone())),
        PushOp::Ticket(Some(token)) => fx
            .handle
            .write_new_session_ticket(WriteNewSessionTicket::with_app_token(token.clone())),
        PushOp::Ticket(None) => {
            fx.handle.write_new_session_ticket(WriteNewSessionTicket::default());
        },
        PushOp::Close => fx.handle.app_close(),
        PushOp::CloseImmediate => fx.handle.app_close_immediate(),
    }
}

fn expected_call(op: &PushOp) -> MachineCall {
    match op {
        PushOp::Write(data) => MachineCall::AppWrite(data.clone()),
        PushOp::EarlyWrite(data) => MachineCall::EarlyAppWrite(data.clone()),
        PushOp::Ticket(token) => MachineCall::WriteNewSessionTicket(token.clone()),
        PushOp::Close => MachineCall::AppClose,
        PushOp::CloseImmediate => MachineCall::AppCloseImmediate,
    }
}

proptest! {
    /// State-machine entry points are invoked in push order, and the driver
    /// is quiescent between pushes.
    #[test]
    fn dispatch_order_matches_push_order(ops in prop::collection::vec(push_op(), 0..32)) {
        let fx = DriverFixture::new();

        for op in &ops {
            apply(&fx, op);
            prop_assert!(!fx.handle.action_processing());
        }

        let expected: Vec<MachineCall> = ops.iter().map(expected_call).collect();
        prop_assert_eq!(fx.script.calls(), expected);
    }

    /// After a terminal transition, every queued write with a callback fails
    /// exactly once with the stored reason, non-write events vanish, and the
    /// state machine is never re-entered.
    #[test]
    fn terminal_transition_fails_each_pending_write_once(
        ops in prop::collection::vec(push_op(), 0..32),
        reason_text in "[a-z]{1,12}",
    ) {
        let fx = DriverFixture::new();

        // Park the dispatcher on a deferred batch so subsequent pushes queue
        // up instead of dispatching.
        let promise = {
            let slot = Rc::new(std::cell::RefCell::new(None));
            let parked = Rc::clone(&slot);
            fx.script.expect(move || {
                let (promise, batch) = capstan_core::ActionBatch::pending();
                *parked.borrow_mut() = Some(promise);
                batch
            });
            slot
        };
        fx.handle.app_write(AppWrite::new(b"head".to_vec()));

        let mut callbacks = Vec::new();
        for op in &ops {
            match op {
                PushOp::Write(data) => {
                    let callback = CountingWriteCallback::new();
                    callbacks.push(Rc::clone(&callback));
                    fx.handle.app_write(AppWrite::new(data.clone()).with_callback(callback));
                },
                PushOp::EarlyWrite(data) => {
                    let callback = CountingWriteCallback::new();
                    callbacks.push(Rc::clone(&callback));
                    fx.handle
                        .early_app_write(EarlyAppWrite::new(data.clone()).with_callback(callback));
                },
                _ => apply(&fx, op),
            }
        }

        let reason = EndpointError::Transport(reason_text);
        fx.handle.move_to_error_state(reason.clone());

        // The in-flight batch has not resolved yet, so nothing is failed.
        for callback in &callbacks {
            prop_assert_eq!(callback.write_err_count(), 0);
        }

        promise.borrow_mut().take().expect("deferred batch was scripted").complete(Vec::new());

        for callback in &callbacks {
            prop_assert_eq!(callback.failures(), vec![(0, reason.clone())]);
        }
        prop_assert!(fx.handle.in_terminal_state());
        prop_assert_eq!(fx.script.calls(), vec![MachineCall::AppWrite(b"head".to_vec())]);
    }
}
