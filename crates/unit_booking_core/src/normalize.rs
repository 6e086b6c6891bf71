//! crates/unit_booking_core/src/normalize.rs
//!
//! Ingestion boundary: raw store rows become canonical [`Unit`]s here, and the
//! filter option sets are derived from the current collection.

use std::collections::BTreeSet;
use tracing::warn;

use crate::domain::{RawUnit, Unit, UnitStatus, NOT_AVAILABLE};

/// Normalizes one raw record. Missing relations degrade to `"N/A"` / `None`.
///
/// A missing or unrecognised status is treated as `Blocked` with no owner, so
/// the unit stays hidden from salespeople and offers no actions.
pub fn normalize_unit(raw: RawUnit) -> Unit {
    let status = match raw.status.as_deref().map(str::parse::<UnitStatus>) {
        Some(Ok(status)) => status,
        Some(Err(e)) => {
            warn!(unit_id = %raw.id, "{}; treating unit as blocked", e);
            UnitStatus::Blocked
        }
        None => {
            warn!(unit_id = %raw.id, "unit has no status; treating unit as blocked");
            UnitStatus::Blocked
        }
    };

    let (unit_type, unit_type_file_path) = match raw.unit_type {
        Some(t) => (
            t.name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            t.file_path.filter(|p| !p.trim().is_empty()),
        ),
        None => (NOT_AVAILABLE.to_string(), None),
    };

    Unit {
        id: raw.id,
        property_id: raw.property_id,
        unit_number: raw.unit_number.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        floor_number: raw.floor.and_then(|f| f.floor_number),
        unit_type,
        unit_type_file_path,
        number_of_bedrooms: raw.bedroom.and_then(|b| b.number_of_bedrooms),
        square_footage: raw.square_footage,
        bathrooms: raw.bathrooms,
        amenities: raw.amenities,
        release: raw.release.filter(|r| !r.trim().is_empty()),
        prices: raw.prices,
        status,
        reserved_by_email: raw.reserved_by_email,
        reservation_time: raw.reservation_time,
        blocked_by: raw.blocked_by,
        blocked_by_email: raw.blocked_by_email,
        floor_id: raw.floor_id,
        unit_type_id: raw.unit_type_id,
        bedroom_id: raw.bedroom_id,
        version: raw.version,
    }
}

pub fn normalize_units(raw: Vec<RawUnit>) -> Vec<Unit> {
    raw.into_iter().map(normalize_unit).collect()
}

/// Distinct, sorted values that populate the filter controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub floors: Vec<i32>,
    pub unit_types: Vec<String>,
    pub bedrooms: Vec<i32>,
    pub amenities: Vec<String>,
    pub releases: Vec<String>,
}

impl FilterOptions {
    pub fn derive(units: &[Unit]) -> Self {
        let mut floors = BTreeSet::new();
        let mut unit_types = BTreeSet::new();
        let mut bedrooms = BTreeSet::new();
        let mut amenities = BTreeSet::new();
        let mut releases = BTreeSet::new();

        for unit in units {
            floors.extend(unit.floor_number);
            bedrooms.extend(unit.number_of_bedrooms);
            if unit.unit_type != NOT_AVAILABLE {
                unit_types.insert(unit.unit_type.clone());
            }
            amenities.extend(unit.amenity_tags().map(str::to_string));
            releases.extend(unit.release.clone());
        }

        Self {
            floors: floors.into_iter().collect(),
            unit_types: unit_types.into_iter().collect(),
            bedrooms: bedrooms.into_iter().collect(),
            amenities: amenities.into_iter().collect(),
            releases: releases.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BedroomRef, FloorRef, UnitTypeRef};
    use uuid::Uuid;

    fn raw(number: &str) -> RawUnit {
        RawUnit {
            id: Uuid::new_v4(),
            property_id: Uuid::nil(),
            unit_number: Some(number.to_string()),
            status: Some("Available".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn flattens_nested_relations() {
        let unit = normalize_unit(RawUnit {
            floor: Some(FloorRef { floor_number: Some(3) }),
            unit_type: Some(UnitTypeRef {
                name: Some("Studio".to_string()),
                file_path: Some("layouts/studio.pdf".to_string()),
            }),
            bedroom: Some(BedroomRef { number_of_bedrooms: Some(0) }),
            ..raw("301")
        });

        assert_eq!(unit.floor_number, Some(3));
        assert_eq!(unit.unit_type, "Studio");
        assert_eq!(unit.unit_type_file_path.as_deref(), Some("layouts/studio.pdf"));
        assert_eq!(unit.number_of_bedrooms, Some(0));
        assert_eq!(unit.status, UnitStatus::Available);
    }

    #[test]
    fn missing_relations_degrade_to_sentinels() {
        let unit = normalize_unit(RawUnit {
            unit_type: Some(UnitTypeRef::default()),
            bedroom: Some(BedroomRef::default()),
            unit_number: None,
            ..raw("x")
        });

        assert_eq!(unit.unit_type, NOT_AVAILABLE);
        assert_eq!(unit.unit_number, NOT_AVAILABLE);
        assert_eq!(unit.floor_number, None);
        assert_eq!(unit.number_of_bedrooms, None);
    }

    #[test]
    fn status_is_case_insensitive_and_unknown_blocks() {
        let lower = normalize_unit(RawUnit {
            status: Some("reserved".to_string()),
            ..raw("1")
        });
        assert_eq!(lower.status, UnitStatus::Reserved);

        let unknown = normalize_unit(RawUnit {
            status: Some("Pending".to_string()),
            ..raw("2")
        });
        assert_eq!(unknown.status, UnitStatus::Blocked);
        assert_eq!(unknown.blocked_by, None);
    }

    #[test]
    fn options_are_distinct_sorted_and_skip_missing() {
        let units = normalize_units(vec![
            RawUnit {
                floor: Some(FloorRef { floor_number: Some(10) }),
                unit_type: Some(UnitTypeRef { name: Some("Villa".into()), file_path: None }),
                bedroom: Some(BedroomRef { number_of_bedrooms: Some(3) }),
                amenities: Some("Sea View, Pool".into()),
                release: Some("Phase 2".into()),
                ..raw("a")
            },
            RawUnit {
                floor: Some(FloorRef { floor_number: Some(2) }),
                unit_type: Some(UnitTypeRef { name: Some("Studio".into()), file_path: None }),
                bedroom: Some(BedroomRef { number_of_bedrooms: Some(0) }),
                amenities: Some("Pool,Garden,".into()),
                release: Some("Phase 1".into()),
                ..raw("b")
            },
            raw("c"),
        ]);

        let options = FilterOptions::derive(&units);
        assert_eq!(options.floors, vec![2, 10]);
        assert_eq!(options.unit_types, vec!["Studio", "Villa"]);
        assert_eq!(options.bedrooms, vec![0, 3]);
        assert_eq!(options.amenities, vec!["Garden", "Pool", "Sea View"]);
        assert_eq!(options.releases, vec!["Phase 1", "Phase 2"]);
    }
}
