//! crates/unit_booking_core/src/memory.rs
//!
//! In-process implementations of the ports. They keep the same contracts as
//! the hosted adapters (conditional writes, commit-ordered change events) and
//! back the test suites of both crates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{
    ChangeEvent, ChangeKind, Property, RawUnit, Role, StatusChange, StatusPrecondition, UnitId,
    UnitPatch, UnitStatus, ViewerIdentity,
};
use crate::normalize::normalize_unit;
use crate::ports::{
    ChangeFeed, ChangeStream, Clock, PortError, PortResult, UnitStore, ViewerProvider, UNITS_TABLE,
};

const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct StoreState {
    properties: Vec<Property>,
    units: Vec<RawUnit>,
}

/// A unit store held in memory. Every committed mutation is published on its
/// change feed.
pub struct InMemoryUnitStore {
    state: Mutex<StoreState>,
    events: broadcast::Sender<ChangeEvent>,
    unavailable: AtomicBool,
}

impl Default for InMemoryUnitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUnitStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            state: Mutex::new(StoreState::default()),
            events,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn add_property(&self, property: Property) {
        self.lock().properties.push(property);
    }

    /// Inserts or replaces a unit and publishes the matching change event.
    /// The stored row gets the next version, as a database trigger would.
    pub fn put_unit(&self, mut raw: RawUnit) {
        let mut state = self.lock();
        let event = match state.units.iter_mut().find(|u| u.id == raw.id) {
            Some(existing) => {
                let old = Some(image(existing));
                raw.version = existing.version + 1;
                *existing = raw;
                ChangeEvent {
                    kind: ChangeKind::Update,
                    old,
                    new: Some(image(existing)),
                }
            }
            None => {
                raw.version = raw.version.max(1);
                let new = Some(image(&raw));
                state.units.push(raw);
                ChangeEvent { kind: ChangeKind::Insert, old: None, new }
            }
        };
        self.publish(event);
    }

    pub fn delete_unit(&self, unit_id: UnitId) -> Option<RawUnit> {
        let mut state = self.lock();
        let index = state.units.iter().position(|u| u.id == unit_id)?;
        let removed = state.units.remove(index);
        self.publish(ChangeEvent {
            kind: ChangeKind::Delete,
            old: Some(image(&removed)),
            new: None,
        });
        Some(removed)
    }

    pub fn unit(&self, unit_id: UnitId) -> Option<RawUnit> {
        self.lock().units.iter().find(|u| u.id == unit_id).cloned()
    }

    /// Makes every subsequent call fail as if the network were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> PortResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("store unreachable".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

fn image(raw: &RawUnit) -> UnitPatch {
    UnitPatch::from_unit(&normalize_unit(raw.clone()))
}

fn satisfies(raw: &RawUnit, expected: &StatusPrecondition) -> bool {
    let status = raw.status.as_deref().and_then(|s| s.parse::<UnitStatus>().ok());
    status == Some(expected.status)
        && expected
            .reservation_time
            .map_or(true, |at| raw.reservation_time == Some(at))
}

#[async_trait]
impl UnitStore for InMemoryUnitStore {
    async fn list_properties(&self) -> PortResult<Vec<Property>> {
        self.check_available()?;
        let mut properties = self.lock().properties.clone();
        properties.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(properties)
    }

    async fn list_units(&self, property_id: Uuid) -> PortResult<Vec<RawUnit>> {
        self.check_available()?;
        Ok(self
            .lock()
            .units
            .iter()
            .filter(|u| u.property_id == property_id)
            .cloned()
            .collect())
    }

    async fn get_unit(&self, unit_id: UnitId) -> PortResult<RawUnit> {
        self.check_available()?;
        self.unit(unit_id)
            .ok_or_else(|| PortError::NotFound(format!("unit {}", unit_id)))
    }

    async fn update_unit_status(
        &self,
        unit_id: UnitId,
        expected: &StatusPrecondition,
        change: &StatusChange,
    ) -> PortResult<RawUnit> {
        self.check_available()?;
        let mut state = self.lock();
        let unit = state
            .units
            .iter_mut()
            .find(|u| u.id == unit_id)
            .ok_or_else(|| PortError::NotFound(format!("unit {}", unit_id)))?;

        if !satisfies(unit, expected) {
            return Err(PortError::Conflict(format!(
                "unit {} is no longer {}",
                unit_id, expected.status
            )));
        }

        let old = image(unit);
        unit.status = Some(change.status.as_str().to_string());
        unit.reserved_by_email = change.reserved_by_email.clone();
        unit.reservation_time = change.reservation_time;
        unit.blocked_by = change.blocked_by;
        unit.blocked_by_email = change.blocked_by_email.clone();
        unit.version += 1;
        let confirmed = unit.clone();

        self.publish(ChangeEvent {
            kind: ChangeKind::Update,
            old: Some(old),
            new: Some(image(&confirmed)),
        });
        Ok(confirmed)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryUnitStore {
    async fn subscribe(&self, table: &str) -> PortResult<ChangeStream> {
        self.check_available()?;
        if table != UNITS_TABLE {
            return Err(PortError::NotFound(format!("no change feed for table '{}'", table)));
        }
        let receiver = self.events.subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(broadcast::error::RecvError::Lagged(missed)) => Some((
                    Err(PortError::Unexpected(format!("change feed lagged by {} events", missed))),
                    receiver,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(Box::pin(stream))
    }
}

//=========================================================================================
// Viewers and time
//=========================================================================================

/// Session tokens and roles held in memory.
#[derive(Default)]
pub struct InMemoryViewers {
    sessions: Mutex<HashMap<String, ViewerIdentity>>,
    roles: Mutex<HashMap<Uuid, Role>>,
}

impl InMemoryViewers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, token: &str, identity: ViewerIdentity, role: Role) {
        if let Ok(mut roles) = self.roles.lock() {
            roles.insert(identity.id, role);
        }
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(token.to_string(), identity);
        }
    }
}

#[async_trait]
impl ViewerProvider for InMemoryViewers {
    async fn current_viewer(&self, session_token: &str) -> PortResult<Option<ViewerIdentity>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| PortError::Unexpected("viewer sessions poisoned".to_string()))?;
        Ok(sessions.get(session_token).cloned())
    }

    async fn get_role(&self, viewer_id: Uuid) -> PortResult<Role> {
        let roles = self
            .roles
            .lock()
            .map_err(|_| PortError::Unexpected("viewer roles poisoned".to_string()))?;
        Ok(roles.get(&viewer_id).copied().unwrap_or(Role::User))
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}
