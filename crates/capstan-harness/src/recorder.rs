//! Recording visitor and counting write callback.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use capstan_core::{ActionVisitor, EndpointError, WriteCallback};

/// Opaque action variants for driver tests.
///
/// The driver never inspects actions, so two distinguishable markers are
/// enough to assert batch ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestAction {
    /// First marker variant.
    Alpha,
    /// Second marker variant.
    Beta,
}

struct VisitorState {
    visits: RefCell<Vec<TestAction>>,
    hooks: RefCell<HashMap<usize, Box<dyn FnOnce(TestAction)>>>,
}

/// Visitor that records every visited action and runs per-visit hooks.
///
/// Hooks are attached by 1-based position in the visit sequence and run
/// after the visit is recorded; they are where tests re-enter the driver the
/// way a real visitor would.
pub struct RecordingVisitor {
    state: Rc<VisitorState>,
}

impl RecordingVisitor {
    /// Create a visitor and the handle that observes and hooks it.
    pub fn new() -> (Self, VisitorHandle) {
        let state = Rc::new(VisitorState {
            visits: RefCell::new(Vec::new()),
            hooks: RefCell::new(HashMap::new()),
        });
        (Self { state: Rc::clone(&state) }, VisitorHandle { state })
    }
}

impl ActionVisitor<TestAction> for RecordingVisitor {
    fn visit(&mut self, action: TestAction) {
        let position = {
            let mut visits = self.state.visits.borrow_mut();
            visits.push(action);
            visits.len()
        };
        let hook = self.state.hooks.borrow_mut().remove(&position);
        if let Some(hook) = hook {
            hook(action);
        }
    }
}

/// Observes and hooks a [`RecordingVisitor`].
#[derive(Clone)]
pub struct VisitorHandle {
    state: Rc<VisitorState>,
}

impl VisitorHandle {
    /// Run `hook` after the `position`-th visit (1-based) is recorded.
    pub fn on_visit(&self, position: usize, hook: impl FnOnce(TestAction) + 'static) {
        self.state.hooks.borrow_mut().insert(position, Box::new(hook));
    }

    /// Snapshot of every visited action, in visit order.
    #[must_use]
    pub fn visits(&self) -> Vec<TestAction> {
        self.state.visits.borrow().clone()
    }
}

/// Write callback that records every failure it is given.
pub struct CountingWriteCallback {
    failures: RefCell<Vec<(usize, EndpointError)>>,
}

impl CountingWriteCallback {
    /// Create a callback ready to hand to [`AppWrite::with_callback`].
    ///
    /// [`AppWrite::with_callback`]: capstan_core::AppWrite::with_callback
    pub fn new() -> Rc<Self> {
        Rc::new(Self { failures: RefCell::new(Vec::new()) })
    }

    /// Recorded `(bytes_written, reason)` pairs, in invocation order.
    #[must_use]
    pub fn failures(&self) -> Vec<(usize, EndpointError)> {
        self.failures.borrow().clone()
    }

    /// Number of times `write_err` fired.
    #[must_use]
    pub fn write_err_count(&self) -> usize {
        self.failures.borrow().len()
    }
}

impl WriteCallback for CountingWriteCallback {
    fn write_err(&self, bytes_written: usize, reason: &EndpointError) {
        self.failures.borrow_mut().push((bytes_written, reason.clone()));
    }
}
