//! Driver fixture wiring the scripted collaborators together.

use std::{cell::RefCell, rc::Rc};

use bytes::BytesMut;
use capstan_core::{DriverHandle, EndpointDriver, LifecycleState, ProtocolState};

use crate::{
    recorder::{RecordingVisitor, VisitorHandle},
    script::{ScriptHandle, ScriptedMachine},
};

/// Protocol state stub exposing just the lifecycle projection.
#[derive(Debug, Clone, Copy)]
pub struct TestState {
    /// Lifecycle the driver observes. Tests mutate this from visitor hooks
    /// the way a state-mutating action would.
    pub lifecycle: LifecycleState,
}

impl Default for TestState {
    fn default() -> Self {
        Self { lifecycle: LifecycleState::NotError }
    }
}

impl ProtocolState for TestState {
    fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }
}

/// Driver type under test.
pub type TestDriver = EndpointDriver<ScriptedMachine, RecordingVisitor>;

/// Weak handle to the driver under test.
pub type TestHandle = DriverHandle<ScriptedMachine, RecordingVisitor>;

/// A fully wired driver under test.
///
/// The driver itself sits in a shared `Option` slot so that visitor hooks
/// can destroy it mid-callback; all other interaction goes through
/// [`handle`](Self::handle), which stays valid (as a no-op) afterwards.
pub struct DriverFixture {
    /// Shared protocol state.
    pub state: Rc<RefCell<TestState>>,
    /// Shared inbound transport buffer.
    pub inbound: Rc<RefCell<BytesMut>>,
    /// Scripts and observes the state machine.
    pub script: ScriptHandle,
    /// Observes and hooks the visitor.
    pub visitor: VisitorHandle,
    /// Owning slot for the driver; `take()` destroys it.
    pub driver: Rc<RefCell<Option<TestDriver>>>,
    /// Weak handle used for every push and introspection.
    pub handle: TestHandle,
}

impl DriverFixture {
    /// Build a driver with fresh collaborators.
    pub fn new() -> Self {
        let state = Rc::new(RefCell::new(TestState::default()));
        let inbound = Rc::new(RefCell::new(BytesMut::new()));
        let (machine, script) = ScriptedMachine::new();
        let (recorder, visitor) = RecordingVisitor::new();
        let driver =
            EndpointDriver::new(machine, recorder, Rc::clone(&state), Rc::clone(&inbound));
        let handle = driver.handle();
        Self {
            state,
            inbound,
            script,
            visitor,
            driver: Rc::new(RefCell::new(Some(driver))),
            handle,
        }
    }

    /// Set the lifecycle the shared state reports.
    pub fn set_lifecycle(&self, lifecycle: LifecycleState) {
        self.state.borrow_mut().lifecycle = lifecycle;
    }

    /// Drop the driver, as a visitor hook holding the slot would.
    pub fn destroy(&self) {
        self.driver.borrow_mut().take();
    }
}

impl Default for DriverFixture {
    fn default() -> Self {
        Self::new()
    }
}
