//! Session error types
//!
//! None of these are fatal: every failure leaves the session in a
//! well-defined mode (Idle, Scanning or WriteArmed).

use tagrw_api::{PermissionState, SessionMode};
use thiserror::Error;

use crate::permission::ConsentError;
use crate::transport::TransportError;

/// Errors returned by [`TagSession`](crate::session::TagSession) operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Tag access is not authorized; the user must re-trigger it
    #[error("NFC access not available ({0})")]
    Permission(PermissionState),

    /// The transport refused to start scanning; mode stays Idle
    #[error("Failed to start scanning: {0}")]
    ScanStart(#[source] TransportError),

    /// A write attempt failed; the pending write stays armed
    #[error("Write failed, present another tag to retry: {0}")]
    Write(#[source] TransportError),

    /// The user declined the consent prompt
    #[error("NFC access was not enabled by the user")]
    ConsentDeclined,

    #[error("Consent prompt failed: {0}")]
    Consent(#[from] ConsentError),

    #[error("Cannot {operation} while {mode}")]
    InvalidTransition {
        operation: &'static str,
        mode: SessionMode,
    },
}

impl SessionError {
    /// Whether the user can simply try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ScanStart(_) | Self::Write(_) | Self::ConsentDeclined | Self::Consent(_)
        )
    }
}
