//! Scripted state machine.
//!
//! [`ScriptedMachine`] implements [`StateMachine`] with behavior supplied by
//! the test: a queue of one-shot responses consumed in call order, plus an
//! optional repeating fallback. Every entry-point invocation is recorded as a
//! [`MachineCall`] so tests can assert the exact dispatch order the driver
//! produced.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use bytes::BytesMut;
use capstan_core::{
    ActionBatch, AppWrite, EarlyAppWrite, StateMachine, WriteNewSessionTicket,
};

use crate::{fixture::TestState, recorder::TestAction};

/// One recorded state-machine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineCall {
    /// `process_transport_data`.
    TransportData,
    /// `process_app_write` with the write payload.
    AppWrite(Vec<u8>),
    /// `process_early_app_write` with the write payload.
    EarlyAppWrite(Vec<u8>),
    /// `process_write_new_session_ticket` with the application token.
    WriteNewSessionTicket(Option<Vec<u8>>),
    /// `process_app_close`.
    AppClose,
    /// `process_app_close_immediate`.
    AppCloseImmediate,
}

type Response = Box<dyn FnOnce() -> ActionBatch<TestAction>>;
type Fallback = Box<dyn FnMut() -> ActionBatch<TestAction>>;

struct ScriptState {
    calls: RefCell<Vec<MachineCall>>,
    responses: RefCell<VecDeque<Response>>,
    fallback: RefCell<Option<Fallback>>,
}

/// State machine whose responses are scripted through a [`ScriptHandle`].
///
/// Unscripted calls return an empty ready batch, so tests only need to
/// script the invocations they care about.
pub struct ScriptedMachine {
    script: Rc<ScriptState>,
}

impl ScriptedMachine {
    /// Create a machine and the handle that scripts and observes it.
    pub fn new() -> (Self, ScriptHandle) {
        let script = Rc::new(ScriptState {
            calls: RefCell::new(Vec::new()),
            responses: RefCell::new(VecDeque::new()),
            fallback: RefCell::new(None),
        });
        (Self { script: Rc::clone(&script) }, ScriptHandle { script })
    }

    fn respond(&self, call: MachineCall) -> ActionBatch<TestAction> {
        self.script.calls.borrow_mut().push(call);
        let next = self.script.responses.borrow_mut().pop_front();
        if let Some(response) = next {
            return response();
        }
        let mut fallback = self.script.fallback.borrow_mut();
        match fallback.as_mut() {
            Some(f) => f(),
            None => ActionBatch::none(),
        }
    }
}

impl StateMachine for ScriptedMachine {
    type State = TestState;
    type Action = TestAction;

    fn process_transport_data(
        &mut self,
        _state: &TestState,
        _inbound: &mut BytesMut,
    ) -> ActionBatch<TestAction> {
        self.respond(MachineCall::TransportData)
    }

    fn process_app_write(&mut self, _state: &TestState, write: AppWrite) -> ActionBatch<TestAction> {
        self.respond(MachineCall::AppWrite(write.data.to_vec()))
    }

    fn process_early_app_write(
        &mut self,
        _state: &TestState,
        write: EarlyAppWrite,
    ) -> ActionBatch<TestAction> {
        self.respond(MachineCall::EarlyAppWrite(write.data.to_vec()))
    }

    fn process_write_new_session_ticket(
        &mut self,
        _state: &TestState,
        ticket: WriteNewSessionTicket,
    ) -> ActionBatch<TestAction> {
        self.respond(MachineCall::WriteNewSessionTicket(
            ticket.app_token.map(|token| token.to_vec()),
        ))
    }

    fn process_app_close(&mut self, _state: &TestState) -> ActionBatch<TestAction> {
        self.respond(MachineCall::AppClose)
    }

    fn process_app_close_immediate(&mut self, _state: &TestState) -> ActionBatch<TestAction> {
        self.respond(MachineCall::AppCloseImmediate)
    }
}

/// Scripts a [`ScriptedMachine`] and observes the calls it received.
#[derive(Clone)]
pub struct ScriptHandle {
    script: Rc<ScriptState>,
}

impl ScriptHandle {
    /// Queue a one-shot response for the next unscripted invocation.
    ///
    /// Responses run inside the state-machine call, so they may re-enter the
    /// driver the way a real state machine can (for example to force a
    /// terminal error) before returning their batch.
    pub fn expect(&self, response: impl FnOnce() -> ActionBatch<TestAction> + 'static) {
        self.script.responses.borrow_mut().push_back(Box::new(response));
    }

    /// Queue a one-shot response returning the given ready actions.
    pub fn expect_actions(&self, actions: Vec<TestAction>) {
        self.expect(move || actions.into());
    }

    /// Queue a one-shot response returning an empty batch.
    pub fn expect_empty(&self) {
        self.expect_actions(Vec::new());
    }

    /// Install a repeating response used once the one-shot queue is empty.
    pub fn repeat(&self, fallback: impl FnMut() -> ActionBatch<TestAction> + 'static) {
        *self.script.fallback.borrow_mut() = Some(Box::new(fallback));
    }

    /// Snapshot of every recorded invocation, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<MachineCall> {
        self.script.calls.borrow().clone()
    }

    /// Number of recorded invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.script.calls.borrow().len()
    }
}
