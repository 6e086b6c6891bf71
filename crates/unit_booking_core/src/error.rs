//! crates/unit_booking_core/src/error.rs
//!
//! The error taxonomy every core operation resolves to.

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    /// The referenced unit or property no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// A transition's precondition no longer holds.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The viewer lacks the ownership or role the transition requires.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Network or store failure unrelated to business rules.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Malformed input, e.g. an unknown plan selector.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl BookingError {
    /// Stable machine-readable kind, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "not_found",
            BookingError::Conflict(_) => "conflict",
            BookingError::Permission(_) => "permission",
            BookingError::RemoteUnavailable(_) => "remote_unavailable",
            BookingError::Validation(_) => "validation",
        }
    }
}

impl From<PortError> for BookingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) => BookingError::NotFound(msg),
            PortError::Conflict(msg) => BookingError::Conflict(msg),
            PortError::Unauthorized => {
                BookingError::Permission("the store rejected the viewer's credentials".to_string())
            }
            PortError::Unexpected(msg) => BookingError::RemoteUnavailable(msg),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
