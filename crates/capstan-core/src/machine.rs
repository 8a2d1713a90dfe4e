//! Collaborator contracts: protocol state, state machine, and action visitor.
//!
//! The driver is generic over all three. The concrete state machine is
//! injected at construction and the driver never interprets its state or its
//! actions beyond the coarse [`LifecycleState`] projection.

use bytes::BytesMut;

use crate::{
    event::{AppWrite, EarlyAppWrite, WriteNewSessionTicket},
    pending::ActionBatch,
};

/// Coarse lifecycle classification the driver reads off the protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Handshaking or established; dispatch continues.
    NotError,
    /// Closed cleanly; no further dispatch.
    Closed,
    /// The state machine recorded a fatal error; no further dispatch.
    Error,
}

/// Read-only projection the driver observes on the opaque protocol state.
///
/// All other state transitions are performed by the state machine through
/// actions; the driver only ever asks "may I keep dispatching?".
pub trait ProtocolState {
    /// Current lifecycle classification.
    fn lifecycle(&self) -> LifecycleState;
}

/// A pure TLS state machine the driver feeds events to.
///
/// Every entry point receives the protocol state by read-only reference and
/// returns a possibly-deferred ordered batch of actions. Entry points must
/// not block; a batch that cannot be produced synchronously is returned as
/// [`ActionBatch::Pending`] and resolved later on the same executor context.
pub trait StateMachine {
    /// Opaque protocol state, lent read-only to every entry point.
    type State: ProtocolState + 'static;

    /// Opaque directive delivered to the visitor.
    type Action: 'static;

    /// Consume bytes from the inbound transport buffer.
    fn process_transport_data(
        &mut self,
        state: &Self::State,
        inbound: &mut BytesMut,
    ) -> ActionBatch<Self::Action>;

    /// Encrypt and send application plaintext.
    fn process_app_write(
        &mut self,
        state: &Self::State,
        write: AppWrite,
    ) -> ActionBatch<Self::Action>;

    /// Encrypt and send 0-RTT application plaintext.
    fn process_early_app_write(
        &mut self,
        state: &Self::State,
        write: EarlyAppWrite,
    ) -> ActionBatch<Self::Action>;

    /// Emit a post-handshake `NewSessionTicket`.
    fn process_write_new_session_ticket(
        &mut self,
        state: &Self::State,
        ticket: WriteNewSessionTicket,
    ) -> ActionBatch<Self::Action>;

    /// Begin a graceful close.
    fn process_app_close(&mut self, state: &Self::State) -> ActionBatch<Self::Action>;

    /// Tear the connection down without waiting for the peer.
    fn process_app_close_immediate(&mut self, state: &Self::State) -> ActionBatch<Self::Action>;
}

/// User-supplied capability invoked once per action in a batch.
///
/// The action type is a tagged sum owned by the state machine; implementors
/// dispatch on its variants by match. During [`visit`](Self::visit) the
/// visitor may re-enter the driver through a
/// [`DriverHandle`](crate::DriverHandle) with arbitrary event pushes,
/// [`wait_for_data`], [`move_to_error_state`], or may drop the
/// [`EndpointDriver`](crate::EndpointDriver) entirely.
///
/// [`wait_for_data`]: crate::DriverHandle::wait_for_data
/// [`move_to_error_state`]: crate::DriverHandle::move_to_error_state
pub trait ActionVisitor<A> {
    /// Execute one action.
    fn visit(&mut self, action: A);
}
