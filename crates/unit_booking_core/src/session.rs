//! crates/unit_booking_core/src/session.rs
//!
//! `BookingSession` is the status transition manager for one viewer looking
//! at one property. It owns the session-local inventory, consumes the change
//! feed, arms reservation expiry and re-emits the view on every change.
//!
//! Transitions are written remotely first, as a conditional update, and only
//! the confirmed record is merged locally. Feed events go through the same
//! merge, so there is a single place where held units change.

use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    ChangeEvent, ChangeKind, StatusChange, StatusPrecondition, Unit, UnitId, UnitPatch,
    UnitStatus, Viewer,
};
use crate::error::{BookingError, BookingResult};
use crate::expiry::{remaining_ms, ExpiryTimers};
use crate::filters::FilterDimension;
use crate::inventory::{Inventory, InventoryView, Merge, Upsert, HIGHLIGHT_DURATION_MS};
use crate::normalize::{normalize_unit, normalize_units};
use crate::payment_plan::{compute_payment_schedule, PaymentSchedule};
use crate::ports::{ChangeFeed, ChangeStream, Clock, PortError, UnitStore, UNITS_TABLE};
use crate::visibility::is_visible_to;

/// Delay before retrying a reservation release the store could not take.
pub const EXPIRY_RETRY_MS: u64 = 5_000;

/// The collaborators a session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn UnitStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Reserve,
    Book,
    CancelReservation,
    Block,
    Unblock,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Reserve => "reserve",
            Transition::Book => "book",
            Transition::CancelReservation => "cancel_reservation",
            Transition::Block => "block",
            Transition::Unblock => "unblock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

pub struct BookingSession {
    inner: Arc<SessionInner>,
    feed_task: JoinHandle<()>,
}

struct SessionInner {
    viewer: Viewer,
    property_id: Uuid,
    store: Arc<dyn UnitStore>,
    clock: Arc<dyn Clock>,
    inventory: Mutex<Inventory>,
    timers: ExpiryTimers,
    view_tx: watch::Sender<InventoryView>,
    cancel: CancellationToken,
}

impl BookingSession {
    /// Subscribes to the change feed, loads the property's units and starts
    /// consuming feed events.
    pub async fn open(deps: SessionDeps, viewer: Viewer, property_id: Uuid) -> BookingResult<Self> {
        // Subscribe before listing so no commit between the two is missed.
        let events = deps.feed.subscribe(UNITS_TABLE).await?;
        let units = normalize_units(deps.store.list_units(property_id).await?);
        info!(
            %property_id,
            viewer = %viewer.email,
            units = units.len(),
            "Booking session opened."
        );

        let (view_tx, _) = watch::channel(InventoryView::default());
        let inner = Arc::new(SessionInner {
            viewer,
            property_id,
            store: deps.store,
            clock: deps.clock,
            inventory: Mutex::new(Inventory::new(units)),
            timers: ExpiryTimers::new(),
            view_tx,
            cancel: CancellationToken::new(),
        });
        inner.sync_all_timers();
        inner.publish();

        let feed_task = tokio::spawn(consume_feed(
            Arc::downgrade(&inner),
            events,
            inner.cancel.clone(),
        ));

        Ok(Self { inner, feed_task })
    }

    pub fn viewer(&self) -> &Viewer {
        &self.inner.viewer
    }

    pub fn property_id(&self) -> Uuid {
        self.inner.property_id
    }

    /// A receiver that observes every recomputed view.
    pub fn subscribe_view(&self) -> watch::Receiver<InventoryView> {
        self.inner.view_tx.subscribe()
    }

    pub fn view(&self) -> InventoryView {
        self.inner.compute_view()
    }

    pub fn unit(&self, unit_id: UnitId) -> Option<Unit> {
        self.inner.lock_inventory().get(unit_id).cloned()
    }

    pub fn is_expiry_armed(&self, unit_id: UnitId) -> bool {
        self.inner.timers.is_armed(unit_id)
    }

    //-------------------------------------------------------------------------------------
    // Filter controls
    //-------------------------------------------------------------------------------------

    pub fn set_filter(&self, dimension: FilterDimension, value: Option<&str>) -> BookingResult<()> {
        self.inner.lock_inventory().filters_mut().set(dimension, value)?;
        self.inner.publish();
        Ok(())
    }

    pub fn set_search_term(&self, term: &str) {
        self.inner.lock_inventory().filters_mut().set_search_term(term);
        self.inner.publish();
    }

    /// Resets every filter and the search term; observers see a single update.
    pub fn clear_filters(&self) {
        self.inner.lock_inventory().filters_mut().clear();
        self.inner.publish();
    }

    /// Reloads the property's units from the store.
    pub async fn refresh(&self) -> BookingResult<()> {
        self.inner.resync().await
    }

    //-------------------------------------------------------------------------------------
    // Transitions
    //-------------------------------------------------------------------------------------

    pub async fn reserve(&self, unit_id: UnitId) -> BookingResult<Unit> {
        self.transition(unit_id, Transition::Reserve).await
    }

    pub async fn book(&self, unit_id: UnitId) -> BookingResult<Unit> {
        self.transition(unit_id, Transition::Book).await
    }

    pub async fn cancel_reservation(&self, unit_id: UnitId) -> BookingResult<Unit> {
        self.transition(unit_id, Transition::CancelReservation).await
    }

    pub async fn block(&self, unit_id: UnitId) -> BookingResult<Unit> {
        self.transition(unit_id, Transition::Block).await
    }

    pub async fn unblock(&self, unit_id: UnitId) -> BookingResult<Unit> {
        self.transition(unit_id, Transition::Unblock).await
    }

    /// Runs `transition` on a held unit: local guards, conditional remote
    /// write, then a merge of the confirmed record. On any error the local
    /// state is left untouched, except that a unit the store reports as
    /// changed or gone is re-read or dropped.
    pub async fn transition(&self, unit_id: UnitId, transition: Transition) -> BookingResult<Unit> {
        let inner = &self.inner;
        let current = inner
            .lock_inventory()
            .get(unit_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("unit {} is not in this session", unit_id)))?;

        let (expected, change) = inner.plan(&current, transition)?;

        let confirmed = match inner.store.update_unit_status(unit_id, &expected, &change).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(
                    %unit_id,
                    action = transition.as_str(),
                    viewer = %inner.viewer.email,
                    error = %e,
                    "Transition rejected by the store."
                );
                match &e {
                    PortError::Conflict(_) => inner.reload(unit_id).await,
                    PortError::NotFound(_) => inner.evict(unit_id),
                    _ => {}
                }
                return Err(BookingError::from(e));
            }
        };

        let unit = normalize_unit(confirmed);
        info!(
            %unit_id,
            unit_number = %unit.unit_number,
            action = transition.as_str(),
            status = %unit.status,
            viewer = %inner.viewer.email,
            "Transition confirmed."
        );
        Ok(inner.apply_confirmed(&unit).applied().map(|outcome| outcome.unit).unwrap_or(unit))
    }

    /// Payment schedule of a unit this viewer can see, dated from today.
    pub fn compute_payment_schedule(&self, unit_id: UnitId, plan: &str) -> BookingResult<PaymentSchedule> {
        let unit = self
            .unit(unit_id)
            .filter(|unit| is_visible_to(unit, &self.inner.viewer))
            .ok_or_else(|| BookingError::NotFound(format!("unit {} is not in this session", unit_id)))?;
        compute_payment_schedule(&unit, plan, self.inner.clock.now().date_naive())
    }

    /// Cancels every expiry timer and stops consuming the change feed.
    pub fn close(&self) {
        self.inner.shutdown();
        self.feed_task.abort();
    }
}

impl Drop for BookingSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl SessionInner {
    fn lock_inventory(&self) -> MutexGuard<'_, Inventory> {
        // A panic while holding the lock leaves the inventory itself consistent.
        self.inventory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn compute_view(&self) -> InventoryView {
        self.lock_inventory().view(&self.viewer, self.clock.now())
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.compute_view());
    }

    fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            debug!(property_id = %self.property_id, viewer = %self.viewer.email, "Booking session closed.");
        }
        self.cancel.cancel();
        self.timers.clear();
    }

    /// Checks the transition against the held unit and returns the remote
    /// precondition and the fields to write.
    fn plan(&self, unit: &Unit, transition: Transition) -> BookingResult<(StatusPrecondition, StatusChange)> {
        let viewer = &self.viewer;

        if unit.status == UnitStatus::Blocked && !unit.is_blocked_by(viewer) && !viewer.is_admin() {
            return Err(BookingError::Permission(format!(
                "unit {} is blocked by another salesperson",
                unit.unit_number
            )));
        }

        let wrong_status = || {
            BookingError::Conflict(format!(
                "cannot {} unit {} while it is {}",
                transition.as_str(),
                unit.unit_number,
                unit.status
            ))
        };

        match transition {
            Transition::Reserve | Transition::Block => {
                if unit.status != UnitStatus::Available {
                    return Err(wrong_status());
                }
                let change = match transition {
                    Transition::Reserve => StatusChange::reserve(&viewer.email, self.clock.now()),
                    _ => StatusChange::block(viewer),
                };
                Ok((StatusPrecondition::status(UnitStatus::Available), change))
            }
            Transition::Book | Transition::CancelReservation => {
                if unit.status != UnitStatus::Reserved {
                    return Err(wrong_status());
                }
                if !unit.is_reserved_by(&viewer.email) && !viewer.is_admin() {
                    return Err(BookingError::Permission(format!(
                        "unit {} is reserved by another salesperson",
                        unit.unit_number
                    )));
                }
                let change = match transition {
                    Transition::Book => StatusChange::book(),
                    _ => StatusChange::release(),
                };
                Ok((StatusPrecondition::reservation(unit.reservation_time), change))
            }
            Transition::Unblock => {
                if unit.status != UnitStatus::Blocked {
                    return Err(wrong_status());
                }
                Ok((StatusPrecondition::status(UnitStatus::Blocked), StatusChange::release()))
            }
        }
    }

    /// The single merge path for held units. `full` is the complete record
    /// when the patch came from one, so moved relations can be taken from it.
    fn apply(self: &Arc<Self>, patch: &UnitPatch, full: Option<&Unit>, origin: Origin) -> Merge {
        let (outcome, highlight) = {
            let mut inventory = self.lock_inventory();
            let mut outcome = match inventory.merge(patch) {
                Merge::Applied(outcome) => outcome,
                Merge::Stale => {
                    debug!(unit_id = %patch.id, version = ?patch.version, "Ignoring an older image of a held unit.");
                    return Merge::Stale;
                }
                Merge::NotHeld => return Merge::NotHeld,
            };
            if let Some(full) = full.filter(|_| outcome.relations_moved) {
                inventory.upsert(full.clone());
                outcome.unit = full.clone();
                outcome.relations_moved = false;
            }
            let highlight = (origin == Origin::Remote && outcome.status_changed())
                .then(|| inventory.highlight(patch.id));
            (outcome, highlight)
        };

        if let Some(generation) = highlight {
            debug!(
                unit_id = %patch.id,
                from = %outcome.previous_status,
                to = %outcome.unit.status,
                "Unit status changed remotely."
            );
            self.schedule_highlight_clear(patch.id, generation);
        }
        self.sync_timer(&outcome.unit);
        self.publish();
        Merge::Applied(outcome)
    }

    fn apply_confirmed(self: &Arc<Self>, unit: &Unit) -> Merge {
        self.apply(&UnitPatch::from_unit(unit), Some(unit), Origin::Local)
    }

    fn sync_all_timers(self: &Arc<Self>) {
        let units: Vec<Unit> = self.lock_inventory().units().to_vec();
        for unit in &units {
            self.sync_timer(unit);
        }
    }

    /// Arms expiry for a reserved unit, disarms it otherwise.
    fn sync_timer(self: &Arc<Self>, unit: &Unit) {
        match (unit.status, unit.reservation_time) {
            (UnitStatus::Reserved, Some(reserved_at)) => {
                let delay = Duration::from_millis(remaining_ms(reserved_at, self.clock.now()) as u64);
                self.arm_expiry(unit.id, reserved_at, delay);
            }
            _ => self.timers.disarm(unit.id),
        }
    }

    fn arm_expiry(self: &Arc<Self>, unit_id: UnitId, reserved_at: chrono::DateTime<chrono::Utc>, delay: Duration) {
        if self.cancel.is_cancelled() {
            return;
        }
        let weak = Arc::downgrade(self);
        let armed = self.timers.arm(unit_id, reserved_at, delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.expire(unit_id, reserved_at).await;
            }
        });
        if armed {
            debug!(%unit_id, %reserved_at, delay_ms = delay.as_millis() as u64, "Reservation expiry armed.");
        }
    }

    async fn expire(self: &Arc<Self>, unit_id: UnitId, reserved_at: chrono::DateTime<chrono::Utc>) {
        self.timers.release(unit_id, reserved_at);
        let expected = StatusPrecondition::reservation(Some(reserved_at));

        match self
            .store
            .update_unit_status(unit_id, &expected, &StatusChange::release())
            .await
        {
            Ok(confirmed) => {
                let unit = normalize_unit(confirmed);
                info!(%unit_id, unit_number = %unit.unit_number, "Reservation expired; unit released.");
                self.apply_confirmed(&unit);
            }
            Err(PortError::Conflict(_)) => {
                debug!(%unit_id, "Reservation already resolved elsewhere; re-reading the unit.");
                self.reload(unit_id).await;
            }
            Err(PortError::NotFound(_)) => self.evict(unit_id),
            Err(e) => {
                error!(%unit_id, error = %e, retry_ms = EXPIRY_RETRY_MS, "Failed to release expired reservation.");
                let still_due = self.lock_inventory().get(unit_id).is_some_and(|unit| {
                    unit.status == UnitStatus::Reserved && unit.reservation_time == Some(reserved_at)
                });
                if still_due {
                    self.arm_expiry(unit_id, reserved_at, Duration::from_millis(EXPIRY_RETRY_MS));
                }
            }
        }
    }

    fn schedule_highlight_clear(self: &Arc<Self>, unit_id: UnitId, generation: u64) {
        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(HIGHLIGHT_DURATION_MS)) => {
                    if let Some(inner) = weak.upgrade() {
                        let cleared = inner.lock_inventory().clear_highlight(unit_id, generation);
                        if cleared {
                            inner.publish();
                        }
                    }
                }
            }
        });
    }

    async fn handle_change(self: &Arc<Self>, event: ChangeEvent) {
        match event.kind {
            ChangeKind::Update => {
                let Some(new) = event.new else { return };
                if new.property_id.is_some_and(|p| p != self.property_id) {
                    self.evict(new.id);
                    return;
                }
                match self.apply(&new, None, Origin::Remote) {
                    Merge::Applied(outcome) if outcome.relations_moved => self.reload(new.id).await,
                    Merge::NotHeld if new.property_id == Some(self.property_id) => self.reload(new.id).await,
                    _ => {}
                }
            }
            ChangeKind::Insert => {
                if let Some(new) = event.new.filter(|n| n.property_id == Some(self.property_id)) {
                    self.reload(new.id).await;
                }
            }
            ChangeKind::Delete => {
                if let Some(unit_id) = event.unit_id() {
                    self.evict(unit_id);
                }
            }
        }
    }

    /// Re-reads one unit from the store and holds the result, unless a newer
    /// row is already held. Units gone or moved to another property are dropped.
    async fn reload(self: &Arc<Self>, unit_id: UnitId) {
        let unit = match self.store.get_unit(unit_id).await {
            Ok(raw) => normalize_unit(raw),
            Err(PortError::NotFound(_)) => return self.evict(unit_id),
            Err(e) => {
                warn!(%unit_id, error = %e, "Failed to re-read unit from the store.");
                return;
            }
        };
        if unit.property_id != self.property_id {
            return self.evict(unit_id);
        }

        let upsert = self.lock_inventory().upsert(unit.clone());
        match upsert {
            Upsert::Stale => return,
            Upsert::Replaced { previous_status } if previous_status != unit.status => {
                let generation = self.lock_inventory().highlight(unit_id);
                self.schedule_highlight_clear(unit_id, generation);
            }
            _ => {}
        }
        self.sync_timer(&unit);
        self.publish();
    }

    /// Replaces the held units with a fresh listing of the property.
    async fn resync(self: &Arc<Self>) -> BookingResult<()> {
        let listed = normalize_units(self.store.list_units(self.property_id).await?);
        let (changed, dropped) = {
            let mut inventory = self.lock_inventory();
            let before: Vec<UnitId> = inventory.units().iter().map(|u| u.id).collect();
            let changed = inventory.resync(listed);
            let dropped: Vec<UnitId> = before
                .into_iter()
                .filter(|id| inventory.get(*id).is_none())
                .collect();
            let changed: Vec<(UnitId, u64)> = changed
                .into_iter()
                .map(|id| (id, inventory.highlight(id)))
                .collect();
            (changed, dropped)
        };
        info!(
            property_id = %self.property_id,
            changed = changed.len(),
            dropped = dropped.len(),
            "Session inventory resynchronised with the store."
        );

        for unit_id in dropped {
            self.timers.disarm(unit_id);
        }
        for (unit_id, generation) in changed {
            self.schedule_highlight_clear(unit_id, generation);
        }
        self.sync_all_timers();
        self.publish();
        Ok(())
    }

    fn evict(&self, unit_id: UnitId) {
        let removed = self.lock_inventory().remove(unit_id);
        if removed.is_some() {
            self.timers.disarm(unit_id);
            self.publish();
        }
    }
}

/// The change-feed actor: applies events in arrival order until the session
/// is closed or dropped. A feed error means events may have been lost, so the
/// inventory is re-listed before the next event is applied.
async fn consume_feed(inner: Weak<SessionInner>, mut events: ChangeStream, cancel: CancellationToken) {
    let mut needs_resync = false;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };
        let Some(session) = inner.upgrade() else { break };
        match next {
            Some(Ok(event)) => {
                if needs_resync {
                    needs_resync = session.resync().await.is_err();
                }
                session.handle_change(event).await;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Change feed delivered an error; resynchronising.");
                if let Err(e) = session.resync().await {
                    warn!(error = %e, "Resynchronisation failed; retrying on the next event.");
                    needs_resync = true;
                }
            }
            None => {
                warn!(property_id = %session.property_id, "Change feed closed.");
                break;
            }
        }
    }
    debug!("Change feed consumer stopped.");
}
