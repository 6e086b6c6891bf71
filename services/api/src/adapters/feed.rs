//! services/api/src/adapters/feed.rs
//!
//! The `ChangeFeed` port over PostgreSQL LISTEN/NOTIFY. The `units` trigger
//! publishes `{table, type, old, new}` payloads on the `unit_changes` channel.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};
use unit_booking_core::domain::{ChangeEvent, ChangeKind, UnitPatch, UnitStatus};
use unit_booking_core::ports::{ChangeFeed, ChangeStream, PortError, PortResult};

pub const CHANGE_CHANNEL: &str = "unit_changes";

/// Pause before polling again after the listener failed to reconnect.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct PgChangeFeed {
    pool: PgPool,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, table: &str) -> PortResult<ChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info!(table, channel = CHANGE_CHANNEL, "Subscribed to change feed.");

        // Notifications sent while the connection is down are gone, so a lost
        // connection is surfaced as an error for subscribers to resync on.
        let table = table.to_string();
        let stream = futures::stream::unfold(listener, move |mut listener| {
            let table = table.clone();
            async move {
                loop {
                    let item = match listener.try_recv().await {
                        Ok(Some(notification)) => {
                            match parse_change_event(notification.payload(), &table).transpose() {
                                Some(item) => item,
                                None => continue,
                            }
                        }
                        Ok(None) => {
                            warn!(channel = CHANGE_CHANNEL, "Change feed connection lost; reconnecting.");
                            Err(PortError::Unexpected("change feed connection lost".to_string()))
                        }
                        Err(e) => {
                            warn!(channel = CHANGE_CHANNEL, error = %e, "Change feed receive failed.");
                            tokio::time::sleep(RECONNECT_DELAY).await;
                            Err(PortError::Unexpected(e.to_string()))
                        }
                    };
                    return Some((item, listener));
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

//=========================================================================================
// Payload Parsing
//=========================================================================================

#[derive(Deserialize)]
struct NotifyPayload {
    table: String,
    #[serde(rename = "type")]
    kind: String,
    old: Option<Map<String, Value>>,
    new: Option<Map<String, Value>>,
}

/// Parses one notification. Events for other tables yield `Ok(None)`.
pub fn parse_change_event(payload: &str, table: &str) -> PortResult<Option<ChangeEvent>> {
    let payload: NotifyPayload = serde_json::from_str(payload)
        .map_err(|e| PortError::Unexpected(format!("malformed change payload: {}", e)))?;
    if payload.table != table {
        return Ok(None);
    }

    let kind = match payload.kind.to_ascii_uppercase().as_str() {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        other => {
            return Err(PortError::Unexpected(format!("unknown change type '{}'", other)));
        }
    };

    Ok(Some(ChangeEvent {
        kind,
        old: payload.old.as_ref().map(parse_unit_patch).transpose()?,
        new: payload.new.as_ref().map(parse_unit_patch).transpose()?,
    }))
}

/// Builds a presence-aware patch: absent keys stay `None`, explicit nulls
/// become `Some(None)`.
pub fn parse_unit_patch(row: &Map<String, Value>) -> PortResult<UnitPatch> {
    let id = nullable(row, "id")?
        .flatten()
        .ok_or_else(|| PortError::Unexpected("change payload row without an id".to_string()))?;

    Ok(UnitPatch {
        id,
        property_id: nullable(row, "property_id")?.flatten(),
        unit_number: nullable(row, "unit_number")?.flatten(),
        status: nullable::<String>(row, "status")?.map(|status| parse_status(status.as_deref())),
        square_footage: nullable(row, "square_footage")?,
        bathrooms: nullable(row, "bathrooms")?,
        amenities: nullable(row, "amenities")?,
        release: nullable(row, "release")?,
        sale_30_70: nullable(row, "sale_30_70")?,
        full_comp_40_60: nullable(row, "full_comp_40_60")?,
        post_handover_2_year: nullable(row, "post_handover_2_year")?,
        post_handover_3_year: nullable(row, "post_handover_3_year")?,
        post_handover_4_year: nullable(row, "post_handover_4_year")?,
        reserved_by_email: nullable(row, "reserved_by_email")?,
        reservation_time: nullable(row, "reservation_time")?,
        blocked_by: nullable(row, "blocked_by")?,
        blocked_by_email: nullable(row, "blocked_by_email")?,
        floor_id: nullable(row, "floor_id")?,
        unit_type_id: nullable(row, "unit_type_id")?,
        bedroom_id: nullable(row, "bedroom_id")?,
        version: nullable(row, "version")?.flatten(),
    })
}

fn nullable<T: DeserializeOwned>(row: &Map<String, Value>, key: &str) -> PortResult<Option<Option<T>>> {
    match row.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(value) => serde_json::from_value(value.clone())
            .map(|v| Some(Some(v)))
            .map_err(|e| PortError::Unexpected(format!("bad '{}' in change payload: {}", key, e))),
    }
}

/// Unknown or missing statuses are treated as Blocked, like at ingestion.
fn parse_status(status: Option<&str>) -> UnitStatus {
    status.and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        warn!(status = ?status, "Unrecognised status in change payload; treating as Blocked.");
        UnitStatus::Blocked
    })
}
