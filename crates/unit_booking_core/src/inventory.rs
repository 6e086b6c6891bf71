//! crates/unit_booking_core/src/inventory.rs
//!
//! The session-local unit collection. Every mutation of a held unit, whether
//! it comes from a confirmed local transition or from the change feed, goes
//! through [`Inventory::merge`].

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::{Unit, UnitId, UnitPatch, UnitStatus, Viewer};
use crate::expiry::remaining_ms;
use crate::filters::FilterSet;
use crate::normalize::FilterOptions;
use crate::visibility::{display_color, is_visible_to, UnitActions};

/// How long a unit stays highlighted after a remote status change.
pub const HIGHLIGHT_DURATION_MS: u64 = 3000;

/// Applies the fields present in `patch` onto `unit`. Remote values win;
/// fields absent from the patch keep their local value.
pub fn apply_patch(unit: &mut Unit, patch: &UnitPatch) {
    fn set<T: Clone>(field: &mut T, value: &Option<T>) {
        if let Some(v) = value {
            *field = v.clone();
        }
    }

    set(&mut unit.property_id, &patch.property_id);
    set(&mut unit.unit_number, &patch.unit_number);
    set(&mut unit.status, &patch.status);
    set(&mut unit.square_footage, &patch.square_footage);
    set(&mut unit.bathrooms, &patch.bathrooms);
    set(&mut unit.amenities, &patch.amenities);
    set(&mut unit.release, &patch.release);
    set(&mut unit.prices.sale_30_70, &patch.sale_30_70);
    set(&mut unit.prices.full_comp_40_60, &patch.full_comp_40_60);
    set(&mut unit.prices.post_handover_2_year, &patch.post_handover_2_year);
    set(&mut unit.prices.post_handover_3_year, &patch.post_handover_3_year);
    set(&mut unit.prices.post_handover_4_year, &patch.post_handover_4_year);
    set(&mut unit.reserved_by_email, &patch.reserved_by_email);
    set(&mut unit.reservation_time, &patch.reservation_time);
    set(&mut unit.blocked_by, &patch.blocked_by);
    set(&mut unit.blocked_by_email, &patch.blocked_by_email);
    set(&mut unit.floor_id, &patch.floor_id);
    set(&mut unit.unit_type_id, &patch.unit_type_id);
    set(&mut unit.bedroom_id, &patch.bedroom_id);
    set(&mut unit.version, &patch.version);
}

/// What a merge did to a held unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub previous_status: UnitStatus,
    pub unit: Unit,
    /// The unit now points at another floor, type or bedroom record, so its
    /// derived display fields are out of date until re-read.
    pub relations_moved: bool,
}

impl MergeOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.unit.status
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Merge {
    Applied(MergeOutcome),
    /// The patch describes an older row than the one held; nothing changed.
    Stale,
    NotHeld,
}

impl Merge {
    pub fn applied(self) -> Option<MergeOutcome> {
        match self {
            Merge::Applied(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// What storing a freshly read unit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced { previous_status: UnitStatus },
    /// A newer row is already held and was kept.
    Stale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryStats {
    pub total: usize,
    pub available: usize,
    pub reserved: usize,
    pub booked: usize,
    pub sold: usize,
    pub blocked: usize,
}

/// One unit as the viewer should see it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitView {
    pub unit: Unit,
    pub actions: UnitActions,
    pub interactive: bool,
    pub color: &'static str,
    pub highlighted: bool,
    pub reservation_remaining_ms: Option<i64>,
}

/// The derived display state, recomputed after every input change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryView {
    pub units: Vec<UnitView>,
    pub total_units: usize,
    pub options: FilterOptions,
    pub filters: FilterSet,
    pub stats: InventoryStats,
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    units: Vec<Unit>,
    filters: FilterSet,
    highlighted: HashMap<UnitId, u64>,
    highlight_seq: u64,
}

impl Inventory {
    pub fn new(units: Vec<Unit>) -> Self {
        Self {
            units,
            ..Default::default()
        }
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn get(&self, unit_id: UnitId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == unit_id)
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterSet {
        &mut self.filters
    }

    pub fn replace_units(&mut self, units: Vec<Unit>) {
        self.units = units;
        self.highlighted.retain(|id, _| self.units.iter().any(|u| u.id == *id));
    }

    /// Replaces the collection with a fresh listing, keeping any held copy
    /// newer than its listed row. Returns the ids whose status changed.
    pub fn resync(&mut self, listed: Vec<Unit>) -> Vec<UnitId> {
        let mut changed = Vec::new();
        let units = listed
            .into_iter()
            .map(|unit| match self.get(unit.id) {
                Some(held) if held.version > unit.version => held.clone(),
                Some(held) => {
                    if held.status != unit.status {
                        changed.push(unit.id);
                    }
                    unit
                }
                None => unit,
            })
            .collect();
        self.replace_units(units);
        changed
    }

    /// Adds a unit, or replaces the held copy with the same id unless the held
    /// copy is a newer row.
    pub fn upsert(&mut self, unit: Unit) -> Upsert {
        match self.units.iter_mut().find(|u| u.id == unit.id) {
            Some(held) if held.version > unit.version => Upsert::Stale,
            Some(held) => {
                let previous_status = held.status;
                *held = unit;
                Upsert::Replaced { previous_status }
            }
            None => {
                self.units.push(unit);
                Upsert::Inserted
            }
        }
    }

    pub fn remove(&mut self, unit_id: UnitId) -> Option<Unit> {
        let index = self.units.iter().position(|u| u.id == unit_id)?;
        self.highlighted.remove(&unit_id);
        Some(self.units.remove(index))
    }

    /// Field-level merge of `patch` into the held unit with the same id.
    /// Units not held locally and patches older than the held row are ignored.
    pub fn merge(&mut self, patch: &UnitPatch) -> Merge {
        let Some(unit) = self.units.iter_mut().find(|u| u.id == patch.id) else {
            return Merge::NotHeld;
        };
        if patch.is_older_than(unit) {
            return Merge::Stale;
        }
        let previous_status = unit.status;
        let relations_moved = patch.moves_relations(unit);
        apply_patch(unit, patch);
        Merge::Applied(MergeOutcome {
            previous_status,
            unit: unit.clone(),
            relations_moved,
        })
    }

    /// Marks a unit highlighted and returns the generation to clear it with.
    pub fn highlight(&mut self, unit_id: UnitId) -> u64 {
        self.highlight_seq += 1;
        self.highlighted.insert(unit_id, self.highlight_seq);
        self.highlight_seq
    }

    /// Clears the highlight only if no newer one replaced it.
    pub fn clear_highlight(&mut self, unit_id: UnitId, generation: u64) -> bool {
        if self.highlighted.get(&unit_id) == Some(&generation) {
            self.highlighted.remove(&unit_id);
            true
        } else {
            false
        }
    }

    pub fn is_highlighted(&self, unit_id: UnitId) -> bool {
        self.highlighted.contains_key(&unit_id)
    }

    pub fn stats(&self) -> InventoryStats {
        self.units.iter().fold(
            InventoryStats {
                total: self.units.len(),
                ..Default::default()
            },
            |mut stats, unit| {
                match unit.status {
                    UnitStatus::Available => stats.available += 1,
                    UnitStatus::Reserved => stats.reserved += 1,
                    UnitStatus::Booked => stats.booked += 1,
                    UnitStatus::Sold => stats.sold += 1,
                    UnitStatus::Blocked => stats.blocked += 1,
                }
                stats
            },
        )
    }

    /// Filters, then projects onto `viewer`, then decorates each unit.
    pub fn view(&self, viewer: &Viewer, now: DateTime<Utc>) -> InventoryView {
        let units = self
            .filters
            .apply(&self.units)
            .into_iter()
            .filter(|unit| is_visible_to(unit, viewer))
            .map(|unit| {
                let actions = UnitActions::for_viewer(unit, viewer);
                UnitView {
                    unit: unit.clone(),
                    actions,
                    interactive: actions.is_interactive(),
                    color: display_color(unit, viewer),
                    highlighted: self.is_highlighted(unit.id),
                    reservation_remaining_ms: match (unit.status, unit.reservation_time) {
                        (UnitStatus::Reserved, Some(at)) => Some(remaining_ms(at, now)),
                        _ => None,
                    },
                }
            })
            .collect();

        InventoryView {
            units,
            total_units: self.units.len(),
            options: FilterOptions::derive(&self.units),
            filters: self.filters.clone(),
            stats: self.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PlanPrices, Role};
    use crate::filters::FilterDimension;
    use uuid::Uuid;

    fn unit(number: &str, status: UnitStatus) -> Unit {
        Unit {
            id: Uuid::new_v4(),
            property_id: Uuid::nil(),
            unit_number: number.to_string(),
            floor_number: Some(1),
            unit_type: "Studio".to_string(),
            unit_type_file_path: None,
            number_of_bedrooms: Some(0),
            square_footage: Some(540),
            bathrooms: Some(1),
            amenities: Some("Pool".to_string()),
            release: None,
            prices: PlanPrices {
                sale_30_70: Some(900_000.0),
                ..Default::default()
            },
            status,
            reserved_by_email: None,
            reservation_time: None,
            blocked_by: None,
            blocked_by_email: None,
            floor_id: None,
            unit_type_id: None,
            bedroom_id: None,
            version: 1,
        }
    }

    fn salesperson(email: &str) -> Viewer {
        Viewer {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn merge_keeps_fields_missing_from_the_payload() {
        let held = unit("101", UnitStatus::Available);
        let id = held.id;
        let mut inventory = Inventory::new(vec![held]);
        let at = Utc::now();

        let outcome = inventory
            .merge(&UnitPatch {
                id,
                status: Some(UnitStatus::Reserved),
                reserved_by_email: Some(Some("a@example.com".to_string())),
                reservation_time: Some(Some(at)),
                ..Default::default()
            })
            .applied()
            .unwrap();

        assert!(outcome.status_changed());
        assert!(!outcome.relations_moved);
        let merged = inventory.get(id).unwrap();
        assert_eq!(merged.status, UnitStatus::Reserved);
        assert_eq!(merged.reservation_time, Some(at));
        assert_eq!(merged.unit_type, "Studio");
        assert_eq!(merged.square_footage, Some(540));
        assert_eq!(merged.prices.sale_30_70, Some(900_000.0));
    }

    #[test]
    fn explicit_null_clears_a_field() {
        let held = Unit {
            reserved_by_email: Some("a@example.com".to_string()),
            reservation_time: Some(Utc::now()),
            ..unit("101", UnitStatus::Reserved)
        };
        let id = held.id;
        let mut inventory = Inventory::new(vec![held]);

        inventory.merge(&UnitPatch {
            id,
            status: Some(UnitStatus::Available),
            reserved_by_email: Some(None),
            reservation_time: Some(None),
            ..Default::default()
        });

        let merged = inventory.get(id).unwrap();
        assert_eq!(merged.reserved_by_email, None);
        assert_eq!(merged.reservation_time, None);
    }

    #[test]
    fn merge_ignores_units_not_held() {
        let mut inventory = Inventory::new(vec![unit("101", UnitStatus::Available)]);
        let outcome = inventory.merge(&UnitPatch {
            id: Uuid::new_v4(),
            status: Some(UnitStatus::Sold),
            ..Default::default()
        });
        assert_eq!(outcome, Merge::NotHeld);
    }

    #[test]
    fn older_rows_never_overwrite_newer_ones() {
        let held = Unit {
            version: 3,
            ..unit("101", UnitStatus::Booked)
        };
        let id = held.id;
        let mut inventory = Inventory::new(vec![held]);

        let outcome = inventory.merge(&UnitPatch {
            id,
            status: Some(UnitStatus::Reserved),
            reserved_by_email: Some(Some("a@example.com".to_string())),
            version: Some(2),
            ..Default::default()
        });
        assert_eq!(outcome, Merge::Stale);
        assert_eq!(inventory.get(id).unwrap().status, UnitStatus::Booked);

        let replayed = Unit {
            version: 2,
            ..unit("101", UnitStatus::Available)
        };
        assert_eq!(inventory.upsert(Unit { id, ..replayed }), Upsert::Stale);
        assert_eq!(inventory.get(id).unwrap().status, UnitStatus::Booked);

        let outcome = inventory
            .merge(&UnitPatch {
                id,
                status: Some(UnitStatus::Sold),
                version: Some(4),
                ..Default::default()
            })
            .applied()
            .unwrap();
        assert_eq!(outcome.previous_status, UnitStatus::Booked);
        assert_eq!(inventory.get(id).unwrap().version, 4);
    }

    #[test]
    fn moving_to_another_floor_is_reported() {
        let floor = Uuid::new_v4();
        let held = Unit {
            floor_id: Some(floor),
            ..unit("101", UnitStatus::Available)
        };
        let id = held.id;
        let mut inventory = Inventory::new(vec![held]);

        let same = inventory
            .merge(&UnitPatch {
                id,
                floor_id: Some(Some(floor)),
                amenities: Some(Some("Gym".to_string())),
                ..Default::default()
            })
            .applied()
            .unwrap();
        assert!(!same.relations_moved);

        let moved = inventory
            .merge(&UnitPatch {
                id,
                floor_id: Some(Some(Uuid::new_v4())),
                ..Default::default()
            })
            .applied()
            .unwrap();
        assert!(moved.relations_moved);
    }

    #[test]
    fn resync_keeps_newer_local_rows_and_drops_deleted_units() {
        let kept = Unit {
            version: 5,
            ..unit("101", UnitStatus::Booked)
        };
        let sold = unit("102", UnitStatus::Available);
        let deleted = unit("103", UnitStatus::Available);
        let (kept_id, sold_id) = (kept.id, sold.id);
        let mut inventory = Inventory::new(vec![kept.clone(), sold.clone(), deleted]);

        let changed = inventory.resync(vec![
            Unit {
                version: 4,
                ..kept
            },
            Unit {
                status: UnitStatus::Sold,
                version: 2,
                ..sold
            },
        ]);

        assert_eq!(changed, vec![sold_id]);
        assert_eq!(inventory.units().len(), 2);
        assert_eq!(inventory.get(kept_id).unwrap().status, UnitStatus::Booked);
        assert_eq!(inventory.get(sold_id).unwrap().status, UnitStatus::Sold);
    }

    #[test]
    fn newer_highlight_survives_older_clear() {
        let held = unit("101", UnitStatus::Available);
        let id = held.id;
        let mut inventory = Inventory::new(vec![held]);

        let first = inventory.highlight(id);
        let second = inventory.highlight(id);
        assert!(!inventory.clear_highlight(id, first));
        assert!(inventory.is_highlighted(id));
        assert!(inventory.clear_highlight(id, second));
        assert!(!inventory.is_highlighted(id));
    }

    #[test]
    fn view_hides_foreign_reservations_from_salespeople() {
        let reserved = Unit {
            reserved_by_email: Some("a@example.com".to_string()),
            reservation_time: Some(Utc::now()),
            ..unit("102", UnitStatus::Reserved)
        };
        let reserved_id = reserved.id;
        let inventory = Inventory::new(vec![
            unit("101", UnitStatus::Available),
            reserved,
            unit("103", UnitStatus::Sold),
        ]);

        let b_view = inventory.view(&salesperson("b@example.com"), Utc::now());
        assert_eq!(b_view.units.len(), 1);
        assert!(b_view.units.iter().all(|u| u.unit.id != reserved_id));
        assert_eq!(b_view.total_units, 3);

        let a_view = inventory.view(&salesperson("a@example.com"), Utc::now());
        let own = a_view.units.iter().find(|u| u.unit.id == reserved_id).unwrap();
        assert!(own.actions.can_book);
        assert!(own.reservation_remaining_ms.unwrap() > 0);
    }

    #[test]
    fn view_applies_filters_before_projection() {
        let mut inventory = Inventory::new(vec![
            unit("101", UnitStatus::Available),
            unit("201", UnitStatus::Available),
        ]);
        inventory.filters_mut().set_search_term("20");
        let view = inventory.view(&salesperson("b@example.com"), Utc::now());
        assert_eq!(view.units.len(), 1);
        assert_eq!(view.units[0].unit.unit_number, "201");

        inventory
            .filters_mut()
            .set(FilterDimension::Status, Some("Sold"))
            .unwrap();
        assert!(inventory.view(&salesperson("b@example.com"), Utc::now()).units.is_empty());
    }

    #[test]
    fn stats_count_every_status() {
        let inventory = Inventory::new(vec![
            unit("1", UnitStatus::Available),
            unit("2", UnitStatus::Available),
            unit("3", UnitStatus::Sold),
            unit("4", UnitStatus::Blocked),
        ]);
        let stats = inventory.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.sold, 1);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.reserved + stats.booked, 0);
    }
}
