//! Unified error handling for coracled.
//!
//! Handlers return [`HandlerResult`]; failures are trapped and logged at the
//! bus boundary and never propagate to the scheduler. A session is only ever
//! terminated through `Session::quit`/`Session::exit`.

use thiserror::Error;

/// Errors that can occur inside an event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A payload was structurally invalid beyond what a numeric reply covers.
    #[error("malformed payload: {0}")]
    #[allow(dead_code)]
    Malformed(String),

    /// The account datastore failed.
    #[error("datastore error: {0}")]
    #[allow(dead_code)]
    Store(#[from] crate::store::StoreError),

    /// Anything else; logged and swallowed by the dispatcher.
    #[error("internal error: {0}")]
    #[allow(dead_code)]
    Internal(String),
}

/// Result type for command and core-event handlers.
pub type HandlerResult = Result<(), HandlerError>;
