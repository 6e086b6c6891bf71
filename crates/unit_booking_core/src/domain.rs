//! crates/unit_booking_core/src/domain.rs
//!
//! Defines the pure, core data structures for the booking engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable, store-assigned identifier of a unit.
pub type UnitId = Uuid;

/// Display value used when a related record (unit type, floor, ...) is missing.
pub const NOT_AVAILABLE: &str = "N/A";

//=========================================================================================
// Unit Lifecycle
//=========================================================================================

/// The lifecycle status of a unit. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitStatus {
    Available,
    Reserved,
    Booked,
    Sold,
    Blocked,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 5] = [
        UnitStatus::Available,
        UnitStatus::Reserved,
        UnitStatus::Booked,
        UnitStatus::Sold,
        UnitStatus::Blocked,
    ];

    /// The canonical label stored in the `units.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Available => "Available",
            UnitStatus::Reserved => "Reserved",
            UnitStatus::Booked => "Booked",
            UnitStatus::Sold => "Sold",
            UnitStatus::Blocked => "Blocked",
        }
    }

    /// Sold and Booked units offer no reserve/book actions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Booked | UnitStatus::Sold)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown unit status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for UnitStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        UnitStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

//=========================================================================================
// Viewers
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Profiles store the role as free text; only `"admin"` is privileged.
    pub fn from_profile(role: Option<&str>) -> Self {
        match role {
            Some(r) if r.trim().eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// The authenticated identity as returned by the session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerIdentity {
    pub id: Uuid,
    pub email: String,
}

/// The viewer performing actions, with the role resolved once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Viewer {
    pub fn new(identity: ViewerIdentity, role: Role) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

//=========================================================================================
// Properties and Units
//=========================================================================================

/// A building or project owning a collection of units.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub id: Uuid,
    pub name: String,
}

/// The five optional plan prices carried by a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlanPrices {
    pub sale_30_70: Option<f64>,
    pub full_comp_40_60: Option<f64>,
    pub post_handover_2_year: Option<f64>,
    pub post_handover_3_year: Option<f64>,
    pub post_handover_4_year: Option<f64>,
}

/// A normalized unit, as held in a session inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: UnitId,
    pub property_id: Uuid,
    pub unit_number: String,
    pub floor_number: Option<i32>,
    /// Unit type name, or `"N/A"` when the relation is missing.
    pub unit_type: String,
    pub unit_type_file_path: Option<String>,
    pub number_of_bedrooms: Option<i32>,
    pub square_footage: Option<i32>,
    pub bathrooms: Option<i32>,
    /// Comma-separated amenity tags, as stored.
    pub amenities: Option<String>,
    pub release: Option<String>,
    pub prices: PlanPrices,
    pub status: UnitStatus,
    pub reserved_by_email: Option<String>,
    pub reservation_time: Option<DateTime<Utc>>,
    pub blocked_by: Option<Uuid>,
    pub blocked_by_email: Option<String>,
    pub floor_id: Option<Uuid>,
    pub unit_type_id: Option<Uuid>,
    pub bedroom_id: Option<Uuid>,
    /// Row version assigned by the store; bumped on every committed write.
    pub version: i64,
}

impl Unit {
    /// Trimmed, non-empty amenity tags in stored order.
    pub fn amenity_tags(&self) -> impl Iterator<Item = &str> {
        self.amenities
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
    }

    pub fn is_reserved_by(&self, email: &str) -> bool {
        self.status == UnitStatus::Reserved && self.reserved_by_email.as_deref() == Some(email)
    }

    pub fn is_blocked_by(&self, viewer: &Viewer) -> bool {
        self.status == UnitStatus::Blocked
            && (self.blocked_by == Some(viewer.id)
                || self.blocked_by_email.as_deref() == Some(viewer.email.as_str()))
    }
}

//=========================================================================================
// Raw Store Records
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloorRef {
    pub floor_number: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitTypeRef {
    pub name: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BedroomRef {
    pub number_of_bedrooms: Option<i32>,
}

/// A unit row as delivered by the store, with related records nested and
/// every field possibly missing. Normalized into [`Unit`] at ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawUnit {
    pub id: UnitId,
    pub property_id: Uuid,
    pub unit_number: Option<String>,
    pub floor: Option<FloorRef>,
    pub unit_type: Option<UnitTypeRef>,
    pub bedroom: Option<BedroomRef>,
    pub square_footage: Option<i32>,
    pub bathrooms: Option<i32>,
    pub amenities: Option<String>,
    pub release: Option<String>,
    pub prices: PlanPrices,
    pub status: Option<String>,
    pub reserved_by_email: Option<String>,
    pub reservation_time: Option<DateTime<Utc>>,
    pub blocked_by: Option<Uuid>,
    pub blocked_by_email: Option<String>,
    pub floor_id: Option<Uuid>,
    pub unit_type_id: Option<Uuid>,
    pub bedroom_id: Option<Uuid>,
    pub version: i64,
}

//=========================================================================================
// Status Writes
//=========================================================================================

/// The full set of lifecycle fields written atomically by a transition.
///
/// Constructed only through the transition constructors so that the
/// reservation and block ownership fields always move together.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: UnitStatus,
    pub reserved_by_email: Option<String>,
    pub reservation_time: Option<DateTime<Utc>>,
    pub blocked_by: Option<Uuid>,
    pub blocked_by_email: Option<String>,
}

impl StatusChange {
    pub fn reserve(email: &str, at: DateTime<Utc>) -> Self {
        Self {
            status: UnitStatus::Reserved,
            reserved_by_email: Some(email.to_string()),
            reservation_time: Some(at),
            blocked_by: None,
            blocked_by_email: None,
        }
    }

    pub fn book() -> Self {
        Self::cleared(UnitStatus::Booked)
    }

    /// Back to Available with every ownership field cleared.
    pub fn release() -> Self {
        Self::cleared(UnitStatus::Available)
    }

    pub fn block(viewer: &Viewer) -> Self {
        Self {
            status: UnitStatus::Blocked,
            reserved_by_email: None,
            reservation_time: None,
            blocked_by: Some(viewer.id),
            blocked_by_email: Some(viewer.email.clone()),
        }
    }

    fn cleared(status: UnitStatus) -> Self {
        Self {
            status,
            reserved_by_email: None,
            reservation_time: None,
            blocked_by: None,
            blocked_by_email: None,
        }
    }
}

/// The state a unit must still be in, remotely, for a write to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusPrecondition {
    pub status: UnitStatus,
    /// When set, the stored reservation time must match as well.
    pub reservation_time: Option<DateTime<Utc>>,
}

impl StatusPrecondition {
    pub fn status(status: UnitStatus) -> Self {
        Self {
            status,
            reservation_time: None,
        }
    }

    pub fn reservation(reservation_time: Option<DateTime<Utc>>) -> Self {
        Self {
            status: UnitStatus::Reserved,
            reservation_time,
        }
    }
}

//=========================================================================================
// Change Feed
//=========================================================================================

/// A presence-aware image of a unit row from the change feed.
///
/// The outer `Option` says whether the field was present in the payload; the
/// inner one (for nullable columns) carries an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitPatch {
    pub id: UnitId,
    pub property_id: Option<Uuid>,
    pub unit_number: Option<String>,
    pub status: Option<UnitStatus>,
    pub square_footage: Option<Option<i32>>,
    pub bathrooms: Option<Option<i32>>,
    pub amenities: Option<Option<String>>,
    pub release: Option<Option<String>>,
    pub sale_30_70: Option<Option<f64>>,
    pub full_comp_40_60: Option<Option<f64>>,
    pub post_handover_2_year: Option<Option<f64>>,
    pub post_handover_3_year: Option<Option<f64>>,
    pub post_handover_4_year: Option<Option<f64>>,
    pub reserved_by_email: Option<Option<String>>,
    pub reservation_time: Option<Option<DateTime<Utc>>>,
    pub blocked_by: Option<Option<Uuid>>,
    pub blocked_by_email: Option<Option<String>>,
    pub floor_id: Option<Option<Uuid>>,
    pub unit_type_id: Option<Option<Uuid>>,
    pub bedroom_id: Option<Option<Uuid>>,
    pub version: Option<i64>,
}

impl UnitPatch {
    /// A patch carrying every flat field of a confirmed unit record.
    pub fn from_unit(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            property_id: Some(unit.property_id),
            unit_number: Some(unit.unit_number.clone()),
            status: Some(unit.status),
            square_footage: Some(unit.square_footage),
            bathrooms: Some(unit.bathrooms),
            amenities: Some(unit.amenities.clone()),
            release: Some(unit.release.clone()),
            sale_30_70: Some(unit.prices.sale_30_70),
            full_comp_40_60: Some(unit.prices.full_comp_40_60),
            post_handover_2_year: Some(unit.prices.post_handover_2_year),
            post_handover_3_year: Some(unit.prices.post_handover_3_year),
            post_handover_4_year: Some(unit.prices.post_handover_4_year),
            reserved_by_email: Some(unit.reserved_by_email.clone()),
            reservation_time: Some(unit.reservation_time),
            blocked_by: Some(unit.blocked_by),
            blocked_by_email: Some(unit.blocked_by_email.clone()),
            floor_id: Some(unit.floor_id),
            unit_type_id: Some(unit.unit_type_id),
            bedroom_id: Some(unit.bedroom_id),
            version: Some(unit.version),
        }
    }

    /// Whether the patch points the unit at a different floor, unit type or
    /// bedroom record. The derived display fields then need a fresh read.
    pub fn moves_relations(&self, unit: &Unit) -> bool {
        [
            (self.floor_id, unit.floor_id),
            (self.unit_type_id, unit.unit_type_id),
            (self.bedroom_id, unit.bedroom_id),
        ]
        .into_iter()
        .any(|(patched, held)| patched.is_some_and(|id| id != held))
    }

    /// Whether the patch describes an older row than `unit`.
    pub fn is_older_than(&self, unit: &Unit) -> bool {
        self.version.is_some_and(|v| v < unit.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level mutation delivered by the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub old: Option<UnitPatch>,
    pub new: Option<UnitPatch>,
}

impl ChangeEvent {
    pub fn unit_id(&self) -> Option<UnitId> {
        self.new.as_ref().or(self.old.as_ref()).map(|p| p.id)
    }
}
