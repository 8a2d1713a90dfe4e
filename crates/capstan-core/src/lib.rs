//! Event-driven driver core for a TLS 1.3 endpoint library.
//!
//! Capstan sits between an asynchronous byte transport and a pure TLS 1.3
//! state machine. It follows the Sans-IO and action-based patterns: the
//! driver serializes events, invokes the injected state machine one event at
//! a time, and delivers the resulting action batches to a user-supplied
//! visitor, preserving the strict ordering a record protocol requires.
//!
//! The state machine itself, the cryptography, the transport, and the
//! meaning of individual actions are all external collaborators; this crate
//! only sequences them.
//!
//! # Components
//!
//! - [`EndpointDriver`]: the driver; owns the event queue and dispatch loop
//! - [`DriverHandle`]: weak handle for reentrant use from callbacks
//! - [`StateMachine`] / [`ProtocolState`]: contracts for the injected machine
//! - [`ActionVisitor`]: executes the actions the machine produces
//! - [`ActionBatch`] / [`ActionPromise`]: immediate or deferred action batches
//!
//! # Reentrancy and teardown
//!
//! Visitor callbacks may push further events, pause transport consumption,
//! force a terminal error, or drop the driver outright; deferred batches
//! that resolve after the driver is gone are discarded. Once the driver is
//! terminal, every queued write fails exactly once through its
//! [`WriteCallback`] with the stored [`EndpointError`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod event;
mod machine;
mod pending;

pub use driver::{DriverHandle, EndpointDriver};
pub use error::EndpointError;
pub use event::{AppWrite, EarlyAppWrite, WriteCallback, WriteNewSessionTicket};
pub use machine::{ActionVisitor, LifecycleState, ProtocolState, StateMachine};
pub use pending::{ActionBatch, ActionPromise, PendingActions};
