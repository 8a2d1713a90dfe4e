//! Deterministic test harness for the capstan endpoint driver.
//!
//! Scripted implementations of the driver's collaborators: a state machine
//! whose responses are queued by the test, a visitor that records visits and
//! runs per-visit hooks, and a write callback that counts its failures. The
//! driver's behavioral and property-based test suites live in this crate's
//! `tests/` directory and are built entirely from these pieces.
//!
//! # Scripting model
//!
//! Responses and hooks run on the driver's own stack, so they can re-enter
//! it exactly the way production collaborators can: pushing events, pausing
//! transport consumption, forcing a terminal error, or destroying the driver
//! mid-callback.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod fixture;
mod recorder;
mod script;

pub use fixture::{DriverFixture, TestDriver, TestHandle, TestState};
pub use recorder::{CountingWriteCallback, RecordingVisitor, TestAction, VisitorHandle};
pub use script::{MachineCall, ScriptHandle, ScriptedMachine};
