//! crates/unit_booking_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the booking engine.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted store, its change feed and its auth service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    ChangeEvent, Property, RawUnit, Role, StatusChange, StatusPrecondition, UnitId,
    ViewerIdentity,
};

/// Table name the unit change feed is keyed on.
pub const UNITS_TABLE: &str = "units";

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Precondition failed: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Change events in commit order. Dropping the stream unsubscribes.
pub type ChangeStream = Pin<Box<dyn Stream<Item = PortResult<ChangeEvent>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait UnitStore: Send + Sync {
    async fn list_properties(&self) -> PortResult<Vec<Property>>;

    async fn list_units(&self, property_id: Uuid) -> PortResult<Vec<RawUnit>>;

    async fn get_unit(&self, unit_id: UnitId) -> PortResult<RawUnit>;

    /// Applies `change` only if the stored unit still satisfies `expected`.
    ///
    /// Returns the confirmed record. A unit that exists but no longer matches
    /// yields `PortError::Conflict`; a missing one `PortError::NotFound`.
    async fn update_unit_status(
        &self,
        unit_id: UnitId,
        expected: &StatusPrecondition,
        change: &StatusChange,
    ) -> PortResult<RawUnit>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribes to row-level mutations of `table`.
    async fn subscribe(&self, table: &str) -> PortResult<ChangeStream>;
}

#[async_trait]
pub trait ViewerProvider: Send + Sync {
    /// Resolves a session token to the viewer it belongs to, if still valid.
    async fn current_viewer(&self, session_token: &str) -> PortResult<Option<ViewerIdentity>>;

    async fn get_role(&self, viewer_id: Uuid) -> PortResult<Role>;
}

/// Public object storage holding unit-type layout files.
pub trait FileStore: Send + Sync {
    fn public_url(&self, path: &str) -> String;
}

/// Wall clock used for reservation timestamps, expiry and schedule dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
