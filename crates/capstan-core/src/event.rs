//! Events fed into the endpoint driver.
//!
//! Each event carries exactly the payload needed by the corresponding
//! state-machine entry point. Transport data is queued as a payload-less
//! notification: the transport appends received bytes to the shared inbound
//! buffer and then calls [`new_transport_data`], which enqueues the
//! notification behind any earlier events.
//!
//! [`new_transport_data`]: crate::EndpointDriver::new_transport_data

use std::{fmt, rc::Rc};

use bytes::Bytes;

use crate::error::EndpointError;

/// Completion callback attached to an application write.
///
/// The driver invokes this at most once, and only on terminal failure.
/// Successful delivery, if reported at all, is the state machine's
/// responsibility through actions.
pub trait WriteCallback {
    /// The write failed before `bytes_written` bytes reached the transport.
    fn write_err(&self, bytes_written: usize, reason: &EndpointError);
}

/// Application plaintext to encrypt and send.
#[derive(Clone)]
pub struct AppWrite {
    /// Plaintext bytes.
    pub data: Bytes,

    /// Failure callback. Borrowed by the driver for the lifetime of the
    /// queued event; invoked at most once.
    pub callback: Option<Rc<dyn WriteCallback>>,
}

impl AppWrite {
    /// Create a write with no callback.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), callback: None }
    }

    /// Attach a failure callback.
    #[must_use]
    pub fn with_callback(mut self, callback: Rc<dyn WriteCallback>) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for AppWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppWrite")
            .field("len", &self.data.len())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// 0-RTT application plaintext.
///
/// Same shape as [`AppWrite`], but routed through the early-data entry point
/// so the state machine can apply its 0-RTT policy.
#[derive(Clone)]
pub struct EarlyAppWrite {
    /// Plaintext bytes.
    pub data: Bytes,

    /// Failure callback. Invoked at most once.
    pub callback: Option<Rc<dyn WriteCallback>>,
}

impl EarlyAppWrite {
    /// Create an early write with no callback.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), callback: None }
    }

    /// Attach a failure callback.
    #[must_use]
    pub fn with_callback(mut self, callback: Rc<dyn WriteCallback>) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for EarlyAppWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarlyAppWrite")
            .field("len", &self.data.len())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Server-initiated post-handshake `NewSessionTicket` request.
#[derive(Debug, Clone, Default)]
pub struct WriteNewSessionTicket {
    /// Opaque application token to embed in the ticket.
    pub app_token: Option<Bytes>,
}

impl WriteNewSessionTicket {
    /// Request a ticket carrying the given application token.
    pub fn with_app_token(app_token: impl Into<Bytes>) -> Self {
        Self { app_token: Some(app_token.into()) }
    }
}

/// Queued driver event. One variant per state-machine entry point; the
/// transport notification carries no payload, the bytes live in the shared
/// inbound buffer.
#[derive(Clone)]
pub(crate) enum Event {
    TransportData,
    AppWrite(AppWrite),
    EarlyAppWrite(EarlyAppWrite),
    WriteNewSessionTicket(WriteNewSessionTicket),
    AppClose,
    AppCloseImmediate,
}
