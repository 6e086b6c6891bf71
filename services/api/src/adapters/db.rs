//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the `UnitStore` and `ViewerProvider` ports from the core crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, error};
use unit_booking_core::domain::{
    BedroomRef, FloorRef, PlanPrices, Property, RawUnit, Role, StatusChange, StatusPrecondition,
    UnitId, UnitTypeRef, ViewerIdentity,
};
use unit_booking_core::ports::{PortError, PortResult, UnitStore, ViewerProvider};
use uuid::Uuid;

/// Columns selected for a unit joined onto its related records. Expects the
/// unit row aliased as `u`.
const UNIT_COLUMNS: &str = "
    u.id, u.property_id, u.unit_number, u.square_footage, u.bathrooms, u.amenities, u.release,
    u.sale_30_70, u.full_comp_40_60,
    u.post_handover_2_year, u.post_handover_3_year, u.post_handover_4_year,
    u.status, u.reserved_by_email, u.reservation_time, u.blocked_by, u.blocked_by_email,
    u.version,
    f.id AS floor_id, f.floor_number,
    t.id AS unit_type_id, t.name AS unit_type_name, t.file_path AS unit_type_file_path,
    b.id AS bedroom_id, b.number_of_bedrooms";

const UNIT_JOINS: &str = "
    LEFT JOIN floors f ON f.id = u.floor_id
    LEFT JOIN unit_types t ON t.id = u.unit_type_id
    LEFT JOIN bedrooms b ON b.id = u.bedroom_id";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `UnitStore` and `ViewerProvider` ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn unit_exists(&self, unit_id: UnitId) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM units WHERE id = $1)")
            .bind(unit_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    error!("Database error: {:?}", e);
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PropertyRecord {
    id: Uuid,
    name: String,
}
impl PropertyRecord {
    fn to_domain(self) -> Property {
        Property {
            id: self.id,
            name: self.name,
        }
    }
}

#[derive(FromRow)]
struct UnitRecord {
    id: Uuid,
    property_id: Uuid,
    unit_number: Option<String>,
    square_footage: Option<i32>,
    bathrooms: Option<i32>,
    amenities: Option<String>,
    release: Option<String>,
    sale_30_70: Option<f64>,
    full_comp_40_60: Option<f64>,
    post_handover_2_year: Option<f64>,
    post_handover_3_year: Option<f64>,
    post_handover_4_year: Option<f64>,
    status: Option<String>,
    reserved_by_email: Option<String>,
    reservation_time: Option<DateTime<Utc>>,
    blocked_by: Option<Uuid>,
    blocked_by_email: Option<String>,
    version: i64,
    floor_id: Option<Uuid>,
    floor_number: Option<i32>,
    unit_type_id: Option<Uuid>,
    unit_type_name: Option<String>,
    unit_type_file_path: Option<String>,
    bedroom_id: Option<Uuid>,
    number_of_bedrooms: Option<i32>,
}
impl UnitRecord {
    /// A relation is present only when its joined row exists.
    fn to_domain(self) -> RawUnit {
        RawUnit {
            id: self.id,
            property_id: self.property_id,
            unit_number: self.unit_number,
            floor: self.floor_id.map(|_| FloorRef {
                floor_number: self.floor_number,
            }),
            unit_type: self.unit_type_id.map(|_| UnitTypeRef {
                name: self.unit_type_name,
                file_path: self.unit_type_file_path,
            }),
            bedroom: self.bedroom_id.map(|_| BedroomRef {
                number_of_bedrooms: self.number_of_bedrooms,
            }),
            square_footage: self.square_footage,
            bathrooms: self.bathrooms,
            amenities: self.amenities,
            release: self.release,
            prices: PlanPrices {
                sale_30_70: self.sale_30_70,
                full_comp_40_60: self.full_comp_40_60,
                post_handover_2_year: self.post_handover_2_year,
                post_handover_3_year: self.post_handover_3_year,
                post_handover_4_year: self.post_handover_4_year,
            },
            status: self.status,
            reserved_by_email: self.reserved_by_email,
            reservation_time: self.reservation_time,
            blocked_by: self.blocked_by,
            blocked_by_email: self.blocked_by_email,
            floor_id: self.floor_id,
            unit_type_id: self.unit_type_id,
            bedroom_id: self.bedroom_id,
            version: self.version,
        }
    }
}

#[derive(FromRow)]
struct ViewerRecord {
    id: Uuid,
    email: String,
}
impl ViewerRecord {
    fn to_domain(self) -> ViewerIdentity {
        ViewerIdentity {
            id: self.id,
            email: self.email,
        }
    }
}

//=========================================================================================
// `UnitStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UnitStore for DbAdapter {
    async fn list_properties(&self) -> PortResult<Vec<Property>> {
        let records = sqlx::query_as::<_, PropertyRecord>("SELECT id, name FROM properties ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(PropertyRecord::to_domain).collect())
    }

    async fn list_units(&self, property_id: Uuid) -> PortResult<Vec<RawUnit>> {
        let query = format!(
            "SELECT {} FROM units u {} WHERE u.property_id = $1 ORDER BY u.unit_number",
            UNIT_COLUMNS, UNIT_JOINS
        );
        let records = sqlx::query_as::<_, UnitRecord>(&query)
            .bind(property_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(UnitRecord::to_domain).collect())
    }

    async fn get_unit(&self, unit_id: UnitId) -> PortResult<RawUnit> {
        let query = format!("SELECT {} FROM units u {} WHERE u.id = $1", UNIT_COLUMNS, UNIT_JOINS);
        let record = sqlx::query_as::<_, UnitRecord>(&query)
            .bind(unit_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => PortError::NotFound(format!("Unit {} not found", unit_id)),
                _ => unexpected(e),
            })?;
        Ok(record.to_domain())
    }

    async fn update_unit_status(
        &self,
        unit_id: UnitId,
        expected: &StatusPrecondition,
        change: &StatusChange,
    ) -> PortResult<RawUnit> {
        // One statement: the row is only touched if it still matches. The
        // version trigger bumps `version` and `updated_at`.
        let query = format!(
            "WITH u AS (
                UPDATE units
                SET status = $3,
                    reserved_by_email = $4,
                    reservation_time = $5,
                    blocked_by = $6,
                    blocked_by_email = $7
                WHERE id = $1
                  AND lower(status) = lower($2)
                  AND ($8::timestamptz IS NULL OR reservation_time = $8)
                RETURNING *
            )
            SELECT {} FROM u {}",
            UNIT_COLUMNS, UNIT_JOINS
        );
        let record = sqlx::query_as::<_, UnitRecord>(&query)
            .bind(unit_id)
            .bind(expected.status.as_str())
            .bind(change.status.as_str())
            .bind(change.reserved_by_email.as_deref())
            .bind(change.reservation_time)
            .bind(change.blocked_by)
            .bind(change.blocked_by_email.as_deref())
            .bind(expected.reservation_time)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        match record {
            Some(record) => Ok(record.to_domain()),
            None if self.unit_exists(unit_id).await? => {
                debug!(%unit_id, expected = %expected.status, "Conditional update matched no row.");
                Err(PortError::Conflict(format!(
                    "Unit {} is no longer {}",
                    unit_id, expected.status
                )))
            }
            None => Err(PortError::NotFound(format!("Unit {} not found", unit_id))),
        }
    }
}

//=========================================================================================
// `ViewerProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl ViewerProvider for DbAdapter {
    async fn current_viewer(&self, session_token: &str) -> PortResult<Option<ViewerIdentity>> {
        let record = sqlx::query_as::<_, ViewerRecord>(
            "SELECT p.id, p.email
             FROM auth_sessions s
             JOIN profiles p ON p.id = s.profile_id
             WHERE s.token = $1 AND s.expires_at > now()",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ViewerRecord::to_domain))
    }

    async fn get_role(&self, viewer_id: Uuid) -> PortResult<Role> {
        let role = sqlx::query_scalar::<_, Option<String>>("SELECT role FROM profiles WHERE id = $1")
            .bind(viewer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(Role::from_profile(role.flatten().as_deref()))
    }
}
