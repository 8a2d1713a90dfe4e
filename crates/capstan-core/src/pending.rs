//! Possibly-deferred action batches.
//!
//! A state-machine entry point returns an [`ActionBatch`]: either actions
//! that are ready immediately, or a [`PendingActions`] placeholder whose
//! actions arrive later, resolved through the matching [`ActionPromise`] on
//! the same executor context. Synchronous resolution takes a fast path: if
//! the promise was completed before the driver subscribed, the subscriber
//! runs inline with no scheduling.

use std::{cell::RefCell, rc::Rc};

/// One-shot rendezvous between a producer and a single subscriber.
enum Slot<A: 'static> {
    /// Neither side has acted yet.
    Idle,
    /// The subscriber registered first; waiting on the producer.
    Subscribed(Box<dyn FnOnce(Vec<A>)>),
    /// The producer resolved first; actions parked until subscription.
    Resolved(Vec<A>),
    /// Actions were handed over, or one side was dropped.
    Done,
}

/// An ordered batch of actions produced by one state-machine invocation.
pub enum ActionBatch<A: 'static> {
    /// Actions available immediately.
    Ready(Vec<A>),

    /// Actions that will be supplied later through an [`ActionPromise`].
    Pending(PendingActions<A>),
}

impl<A: 'static> ActionBatch<A> {
    /// An empty, immediately-ready batch.
    pub fn none() -> Self {
        Self::Ready(Vec::new())
    }

    /// A deferred batch plus the promise that resolves it.
    pub fn pending() -> (ActionPromise<A>, Self) {
        let slot = Rc::new(RefCell::new(Slot::Idle));
        let promise = ActionPromise { slot: Rc::clone(&slot) };
        (promise, Self::Pending(PendingActions { slot }))
    }
}

impl<A: 'static> From<Vec<A>> for ActionBatch<A> {
    fn from(actions: Vec<A>) -> Self {
        Self::Ready(actions)
    }
}

/// Consumer half of a deferred batch.
///
/// Held inside [`ActionBatch::Pending`]; the driver subscribes a continuation
/// that runs when the producer completes the matching [`ActionPromise`].
pub struct PendingActions<A: 'static> {
    slot: Rc<RefCell<Slot<A>>>,
}

impl<A: 'static> PendingActions<A> {
    /// Register the continuation to run on resolution.
    ///
    /// If the promise has already been completed the continuation runs
    /// immediately, on the caller's stack.
    pub(crate) fn on_ready(self, f: impl FnOnce(Vec<A>) + 'static) {
        let parked = {
            let mut slot = self.slot.borrow_mut();
            match std::mem::replace(&mut *slot, Slot::Done) {
                Slot::Resolved(actions) => Some(actions),
                Slot::Idle => {
                    *slot = Slot::Subscribed(Box::new(f));
                    return;
                },
                // A second subscription or a subscription after teardown has
                // nothing to wait for.
                Slot::Subscribed(_) | Slot::Done => None,
            }
        };
        if let Some(actions) = parked {
            f(actions);
        }
    }
}

/// Producer half of a deferred batch.
///
/// Completing the promise delivers the actions to the subscriber, on the
/// completing call's stack. Dropping the promise without completing it leaves
/// the batch unresolved forever: the driver stays parked with
/// `action_processing() == true` until it is destroyed.
pub struct ActionPromise<A: 'static> {
    slot: Rc<RefCell<Slot<A>>>,
}

impl<A: 'static> ActionPromise<A> {
    /// Resolve the batch.
    pub fn complete(self, actions: Vec<A>) {
        let subscriber = {
            let mut slot = self.slot.borrow_mut();
            match std::mem::replace(&mut *slot, Slot::Done) {
                Slot::Subscribed(f) => Some(f),
                Slot::Idle => {
                    *slot = Slot::Resolved(actions);
                    return;
                },
                Slot::Resolved(_) | Slot::Done => None,
            }
        };
        if let Some(f) = subscriber {
            f(actions);
        }
    }
}
