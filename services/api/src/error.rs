//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and the mapping
//! of booking errors onto HTTP statuses.

use axum::http::StatusCode;
use unit_booking_core::{BookingError, PortError};

use crate::config::ConfigError;

/// The primary error type for the `booking_api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A booking operation was refused or could not be completed.
    #[error("Booking Error: {0}")]
    Booking(#[from] BookingError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations failed to apply.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents an error related to the WebSocket connection.
    #[error("WebSocket Error: {0}")]
    Websocket(#[from] axum::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The HTTP status a booking error is reported with.
pub fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Conflict(_) => StatusCode::CONFLICT,
        BookingError::Permission(_) => StatusCode::FORBIDDEN,
        BookingError::RemoteUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::Validation(_) => StatusCode::BAD_REQUEST,
    }
}

/// Converts a booking error into the `(StatusCode, String)` pair handlers return.
pub fn booking_rejection(err: BookingError) -> (StatusCode, String) {
    (booking_status(&err), err.to_string())
}
