//! The endpoint driver.
//!
//! Mediates between an asynchronous byte transport and a pure TLS 1.3 state
//! machine: pushes from the transport and the application are serialized
//! through an event queue, handed to the state machine one at a time, and the
//! resulting action batches are delivered to the visitor in order.
//!
//! ```text
//!  push ──> [event queue] ──> dispatcher ──> state machine
//!                                 ^               │
//!                                 │          action batch
//!                                 │               │
//!                                 └─── visitor <──┘
//! ```
//!
//! # Ordering
//!
//! - At most one state-machine call is in flight at any time.
//! - At most one action batch is being pumped at any time; actions within a
//!   batch are visited in batch order, batches in event-dispatch order.
//! - Events pushed while a batch is pumping are queued, never dispatched
//!   inline, and are strictly ordered after events already queued.
//!
//! # Reentrancy
//!
//! Visitor callbacks may re-enter the driver with arbitrary pushes, request
//! [`wait_for_data`](EndpointDriver::wait_for_data), force a terminal error,
//! or drop the [`EndpointDriver`] outright. Callbacks that may drop the
//! driver must interact with it through a [`DriverHandle`]; the handle holds
//! a weak reference and degrades to a no-op once the driver is gone, which is
//! also how action batches resolving after teardown are discarded.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::{Rc, Weak},
};

use bytes::BytesMut;

use crate::{
    error::EndpointError,
    event::{AppWrite, EarlyAppWrite, Event, WriteNewSessionTicket},
    machine::{ActionVisitor, LifecycleState, ProtocolState, StateMachine},
    pending::ActionBatch,
};

/// Event-driven driver for one TLS 1.3 endpoint.
///
/// Owns the dispatch loop and the event queue; shares the protocol state and
/// the inbound byte buffer with its creator. Dropping the driver destroys it:
/// queued events are discarded, the running pump (if any) aborts after the
/// current visitor call returns, and deferred batches resolving later vanish.
///
/// The driver is single-threaded: all pushes, visitor calls, and batch
/// resolutions must happen on the executor context that owns it.
pub struct EndpointDriver<M, V>
where
    M: StateMachine,
{
    core: Rc<DriverCore<M, V>>,
}

impl<M, V> EndpointDriver<M, V>
where
    M: StateMachine + 'static,
    V: ActionVisitor<M::Action> + 'static,
{
    /// Create a driver around an injected state machine and visitor.
    ///
    /// `state` and `inbound` are shared with the creator: the transport glue
    /// appends received bytes to `inbound` before calling
    /// [`new_transport_data`](Self::new_transport_data), and the visitor may
    /// mutate `state` from inside callbacks.
    pub fn new(
        machine: M,
        visitor: V,
        state: Rc<RefCell<M::State>>,
        inbound: Rc<RefCell<BytesMut>>,
    ) -> Self {
        Self {
            core: Rc::new(DriverCore {
                machine: RefCell::new(machine),
                visitor: RefCell::new(visitor),
                state,
                inbound,
                pending_events: RefCell::new(VecDeque::new()),
                wait_for_data: Cell::new(true),
                action_processing: Cell::new(false),
                dispatching: Cell::new(false),
                terminal: Cell::new(false),
                terminal_reason: RefCell::new(None),
                destroyed: Cell::new(false),
            }),
        }
    }

    /// A weak handle for visitors, state machines, and transport glue.
    pub fn handle(&self) -> DriverHandle<M, V> {
        DriverHandle { core: Rc::downgrade(&self.core) }
    }

    /// New bytes have been appended to the inbound buffer.
    ///
    /// Queues a transport notification behind any earlier events; once the
    /// dispatcher reaches it, the state machine consumes transport data
    /// continuously until [`wait_for_data`](Self::wait_for_data) is
    /// requested.
    pub fn new_transport_data(&self) {
        let core = Rc::clone(&self.core);
        DriverCore::new_transport_data(&core);
    }

    /// Queue application plaintext for encryption and delivery.
    pub fn app_write(&self, write: AppWrite) {
        let core = Rc::clone(&self.core);
        DriverCore::push(&core, Event::AppWrite(write));
    }

    /// Queue 0-RTT application plaintext.
    pub fn early_app_write(&self, write: EarlyAppWrite) {
        let core = Rc::clone(&self.core);
        DriverCore::push(&core, Event::EarlyAppWrite(write));
    }

    /// Queue a post-handshake `NewSessionTicket`.
    pub fn write_new_session_ticket(&self, ticket: WriteNewSessionTicket) {
        let core = Rc::clone(&self.core);
        DriverCore::push(&core, Event::WriteNewSessionTicket(ticket));
    }

    /// Queue a graceful close.
    pub fn app_close(&self) {
        let core = Rc::clone(&self.core);
        DriverCore::push(&core, Event::AppClose);
    }

    /// Queue an abrupt close.
    pub fn app_close_immediate(&self) {
        let core = Rc::clone(&self.core);
        DriverCore::push(&core, Event::AppCloseImmediate);
    }

    /// Stop consuming transport data until the next
    /// [`new_transport_data`](Self::new_transport_data).
    ///
    /// Intended to be called from inside a visitor callback once the state
    /// machine has drained everything it can from the inbound buffer.
    pub fn wait_for_data(&self) {
        self.core.wait_for_data();
    }

    /// Force the driver into the terminal error state.
    ///
    /// The in-flight action batch (if any) still finishes; afterwards every
    /// queued write fails through its callback with `reason`, the queue is
    /// cleared, and no state-machine entry point is ever invoked again.
    /// Idempotent: later calls neither re-fail callbacks nor replace the
    /// stored reason.
    pub fn move_to_error_state(&self, reason: EndpointError) {
        let core = Rc::clone(&self.core);
        DriverCore::move_to_error_state(&core, reason);
    }

    /// Whether the protocol state reports a fatal error.
    #[must_use]
    pub fn in_error_state(&self) -> bool {
        self.core.in_error_state()
    }

    /// Whether the driver has entered the terminal error state.
    ///
    /// True once [`move_to_error_state`](Self::move_to_error_state) has run:
    /// queued writes have been failed (or will be, the moment the in-flight
    /// batch finishes) and no state-machine entry point is reachable. A
    /// state-machine transition to `Error` alone stops dispatch but is
    /// reported through [`in_error_state`](Self::in_error_state) instead.
    #[must_use]
    pub fn in_terminal_state(&self) -> bool {
        self.core.in_terminal_state()
    }

    /// Whether a state-machine call is in flight, its batch is being awaited,
    /// or its batch is being visited.
    #[must_use]
    pub fn action_processing(&self) -> bool {
        self.core.action_processing.get()
    }
}

impl<M, V> Drop for EndpointDriver<M, V>
where
    M: StateMachine,
{
    fn drop(&mut self) {
        // The pump pins its own strong reference, so the allocation may
        // outlive this handle; the flag is what aborts it.
        self.core.destroyed.set(true);
    }
}

/// Weak handle to an [`EndpointDriver`].
///
/// Cheap to clone and safe to hold from anywhere: every operation upgrades
/// internally and becomes a no-op once the driver has been dropped. This is
/// the handle visitors and deferred-batch producers should capture.
pub struct DriverHandle<M, V>
where
    M: StateMachine,
{
    core: Weak<DriverCore<M, V>>,
}

impl<M, V> Clone for DriverHandle<M, V>
where
    M: StateMachine,
{
    fn clone(&self) -> Self {
        Self { core: Weak::clone(&self.core) }
    }
}

impl<M, V> DriverHandle<M, V>
where
    M: StateMachine + 'static,
    V: ActionVisitor<M::Action> + 'static,
{
    /// See [`EndpointDriver::new_transport_data`].
    pub fn new_transport_data(&self) {
        if let Some(core) = self.core.upgrade() {
            DriverCore::new_transport_data(&core);
        }
    }

    /// See [`EndpointDriver::app_write`]. Dropped silently if the driver is
    /// gone; the callback is not invoked.
    pub fn app_write(&self, write: AppWrite) {
        if let Some(core) = self.core.upgrade() {
            DriverCore::push(&core, Event::AppWrite(write));
        }
    }

    /// See [`EndpointDriver::early_app_write`].
    pub fn early_app_write(&self, write: EarlyAppWrite) {
        if let Some(core) = self.core.upgrade() {
            DriverCore::push(&core, Event::EarlyAppWrite(write));
        }
    }

    /// See [`EndpointDriver::write_new_session_ticket`].
    pub fn write_new_session_ticket(&self, ticket: WriteNewSessionTicket) {
        if let Some(core) = self.core.upgrade() {
            DriverCore::push(&core, Event::WriteNewSessionTicket(ticket));
        }
    }

    /// See [`EndpointDriver::app_close`].
    pub fn app_close(&self) {
        if let Some(core) = self.core.upgrade() {
            DriverCore::push(&core, Event::AppClose);
        }
    }

    /// See [`EndpointDriver::app_close_immediate`].
    pub fn app_close_immediate(&self) {
        if let Some(core) = self.core.upgrade() {
            DriverCore::push(&core, Event::AppCloseImmediate);
        }
    }

    /// See [`EndpointDriver::wait_for_data`].
    pub fn wait_for_data(&self) {
        if let Some(core) = self.core.upgrade() {
            core.wait_for_data();
        }
    }

    /// See [`EndpointDriver::move_to_error_state`].
    pub fn move_to_error_state(&self, reason: EndpointError) {
        if let Some(core) = self.core.upgrade() {
            DriverCore::move_to_error_state(&core, reason);
        }
    }

    /// See [`EndpointDriver::in_error_state`]. `false` once the driver is
    /// gone.
    #[must_use]
    pub fn in_error_state(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.in_error_state())
    }

    /// See [`EndpointDriver::in_terminal_state`]. A destroyed driver is
    /// terminal.
    #[must_use]
    pub fn in_terminal_state(&self) -> bool {
        self.core.upgrade().is_none_or(|core| core.in_terminal_state())
    }

    /// See [`EndpointDriver::action_processing`]. `false` once the driver is
    /// gone.
    #[must_use]
    pub fn action_processing(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.action_processing.get())
    }
}

/// Shared-ownership root behind both handle types.
///
/// All driver logic lives here and is invoked through an `Rc`, so a frame
/// that is mid-pump keeps the allocation alive even after the owning
/// [`EndpointDriver`] has been dropped out from under it.
struct DriverCore<M, V>
where
    M: StateMachine,
{
    machine: RefCell<M>,
    visitor: RefCell<V>,
    state: Rc<RefCell<M::State>>,
    inbound: Rc<RefCell<BytesMut>>,
    pending_events: RefCell<VecDeque<Event>>,

    /// True while the dispatcher drains the queue in push order; cleared when
    /// a queued transport notification is reached, and set again by
    /// `wait_for_data`, which ends the continuous read loop.
    wait_for_data: Cell<bool>,

    /// True from the moment a state-machine call begins until its batch has
    /// been fully visited.
    action_processing: Cell<bool>,

    /// Reentrancy guard for the dispatch loop itself.
    dispatching: Cell<bool>,

    /// Set by `move_to_error_state`; never cleared.
    terminal: Cell<bool>,
    terminal_reason: RefCell<Option<EndpointError>>,

    /// Set by `EndpointDriver::drop`; checked after every visitor call.
    destroyed: Cell<bool>,
}

impl<M, V> DriverCore<M, V>
where
    M: StateMachine + 'static,
    V: ActionVisitor<M::Action> + 'static,
{
    fn push(core: &Rc<Self>, event: Event) {
        if core.terminal.get() {
            core.fail_or_discard(event);
            return;
        }
        core.pending_events.borrow_mut().push_back(event);
        Self::dispatch(core);
    }

    fn new_transport_data(core: &Rc<Self>) {
        Self::push(core, Event::TransportData);
    }

    fn wait_for_data(&self) {
        self.wait_for_data.set(true);
    }

    fn move_to_error_state(core: &Rc<Self>, reason: EndpointError) {
        if core.terminal.get() {
            return;
        }
        tracing::debug!(%reason, "endpoint entering terminal error state");
        core.terminal.set(true);
        *core.terminal_reason.borrow_mut() = Some(reason);
        // An in-flight batch must finish before the queue is failed; the pump
        // runs the drain once the last action of the batch has been visited.
        if !core.action_processing.get() {
            core.fail_pending_writes();
        }
    }

    fn in_error_state(&self) -> bool {
        self.state.borrow().lifecycle() == LifecycleState::Error
    }

    fn in_terminal_state(&self) -> bool {
        self.terminal.get()
    }

    /// Dispatch stops on the explicit terminal flag, and also once the state
    /// machine has recorded a fatal error or closed the connection.
    fn dispatch_halted(&self) -> bool {
        self.terminal.get()
            || matches!(
                self.state.borrow().lifecycle(),
                LifecycleState::Error | LifecycleState::Closed
            )
    }

    /// Dispatch loop: one invocation per iteration, flat so that long runs of
    /// empty transport batches cannot grow the stack.
    fn dispatch(core: &Rc<Self>) {
        if core.dispatching.get() {
            return;
        }
        core.dispatching.set(true);
        while !core.destroyed.get()
            && !core.action_processing.get()
            && !core.dispatch_halted()
        {
            // Between transport notifications the queue drains strictly in
            // push order. Once a notification is reached, transport data is
            // consumed continuously until wait_for_data is requested.
            let event = if core.wait_for_data.get() {
                let Some(event) = core.pending_events.borrow_mut().pop_front() else {
                    break;
                };
                event
            } else {
                Event::TransportData
            };
            if matches!(event, Event::TransportData) {
                core.wait_for_data.set(false);
                core.coalesce_transport_notifications();
            }
            core.action_processing.set(true);
            let batch = {
                let state = core.state.borrow();
                let mut machine = core.machine.borrow_mut();
                match event {
                    Event::TransportData => {
                        let mut inbound = core.inbound.borrow_mut();
                        machine.process_transport_data(&state, &mut inbound)
                    },
                    Event::AppWrite(write) => machine.process_app_write(&state, write),
                    Event::EarlyAppWrite(write) => machine.process_early_app_write(&state, write),
                    Event::WriteNewSessionTicket(ticket) => {
                        machine.process_write_new_session_ticket(&state, ticket)
                    },
                    Event::AppClose => machine.process_app_close(&state),
                    Event::AppCloseImmediate => machine.process_app_close_immediate(&state),
                }
            };
            Self::start_actions(core, batch);
        }
        core.dispatching.set(false);
    }

    /// Merge transport notifications at the queue head into the read loop
    /// that is about to run; one loop serves all of them.
    fn coalesce_transport_notifications(&self) {
        let mut queue = self.pending_events.borrow_mut();
        while matches!(queue.front(), Some(Event::TransportData)) {
            queue.pop_front();
        }
    }

    fn start_actions(core: &Rc<Self>, batch: ActionBatch<M::Action>) {
        match batch {
            ActionBatch::Ready(actions) => Self::process_actions(core, actions),
            ActionBatch::Pending(pending) => {
                let weak = Rc::downgrade(core);
                pending.on_ready(move |actions| match weak.upgrade() {
                    Some(core) if !core.destroyed.get() => Self::process_actions(&core, actions),
                    _ => {
                        tracing::debug!("discarding action batch resolved after driver teardown");
                    },
                });
            },
        }
    }

    fn process_actions(core: &Rc<Self>, actions: Vec<M::Action>) {
        for action in actions {
            core.visitor.borrow_mut().visit(action);
            if core.destroyed.get() {
                return;
            }
        }
        core.action_processing.set(false);
        if core.terminal.get() {
            core.fail_pending_writes();
        }
        Self::dispatch(core);
    }

    /// Single linear walk of the queue after a terminal transition: writes
    /// fail through their callbacks, everything else is discarded.
    fn fail_pending_writes(&self) {
        let drained: Vec<Event> = self.pending_events.borrow_mut().drain(..).collect();
        for event in drained {
            self.fail_or_discard(event);
        }
    }

    fn fail_or_discard(&self, event: Event) {
        let reason = self
            .terminal_reason
            .borrow()
            .clone()
            .expect("invariant: terminal reason is set before any event is failed");
        match event {
            Event::AppWrite(write) => {
                if let Some(callback) = write.callback {
                    callback.write_err(0, &reason);
                }
            },
            Event::EarlyAppWrite(write) => {
                if let Some(callback) = write.callback {
                    callback.write_err(0, &reason);
                }
            },
            Event::TransportData
            | Event::WriteNewSessionTicket(_)
            | Event::AppClose
            | Event::AppCloseImmediate => {
                tracing::trace!("discarding non-write event after terminal transition");
            },
        }
    }
}
