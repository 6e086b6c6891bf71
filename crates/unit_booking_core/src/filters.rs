//! crates/unit_booking_core/src/filters.rs
//!
//! The viewer-local filter state: a free-text search term plus single-select
//! filters, all combined conjunctively.

use std::fmt;
use std::str::FromStr;

use crate::domain::{Unit, UnitStatus};
use crate::error::{BookingError, BookingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDimension {
    Floor,
    UnitType,
    Bedrooms,
    Status,
    Amenities,
    Release,
}

impl FilterDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDimension::Floor => "floor",
            FilterDimension::UnitType => "unit_type",
            FilterDimension::Bedrooms => "bedrooms",
            FilterDimension::Status => "status",
            FilterDimension::Amenities => "amenities",
            FilterDimension::Release => "release",
        }
    }
}

impl fmt::Display for FilterDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterDimension {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "floor" => Ok(FilterDimension::Floor),
            "unit_type" | "unitType" => Ok(FilterDimension::UnitType),
            "bedrooms" => Ok(FilterDimension::Bedrooms),
            "status" => Ok(FilterDimension::Status),
            "amenities" => Ok(FilterDimension::Amenities),
            "release" => Ok(FilterDimension::Release),
            other => Err(BookingError::Validation(format!(
                "unknown filter dimension '{}'",
                other
            ))),
        }
    }
}

/// Active filters. `None` means the dimension matches every unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    pub search_term: String,
    pub floor: Option<i32>,
    pub unit_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub status: Option<UnitStatus>,
    pub amenities: Option<String>,
    pub release: Option<String>,
}

impl FilterSet {
    /// Sets one dimension from its textual value. An absent, empty or `"all"`
    /// value unsets it. Nothing changes when the value does not parse.
    pub fn set(&mut self, dimension: FilterDimension, value: Option<&str>) -> BookingResult<()> {
        let value = value
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"));

        match dimension {
            FilterDimension::Floor => self.floor = value.map(|v| parse_number(dimension, v)).transpose()?,
            FilterDimension::Bedrooms => {
                self.bedrooms = value.map(|v| parse_number(dimension, v)).transpose()?
            }
            FilterDimension::Status => {
                self.status = value
                    .map(|v| {
                        v.parse::<UnitStatus>()
                            .map_err(|e| BookingError::Validation(e.to_string()))
                    })
                    .transpose()?
            }
            FilterDimension::UnitType => self.unit_type = value.map(str::to_string),
            FilterDimension::Amenities => self.amenities = value.map(str::to_string),
            FilterDimension::Release => self.release = value.map(str::to_string),
        }
        Ok(())
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.search_term = term.to_string();
    }

    /// Resets every filter and the search term in one step.
    pub fn clear(&mut self) {
        *self = FilterSet::default();
    }

    pub fn is_empty(&self) -> bool {
        self == &FilterSet::default()
    }

    pub fn matches(&self, unit: &Unit) -> bool {
        self.matches_search(unit)
            && self.floor.map_or(true, |f| unit.floor_number == Some(f))
            && self.unit_type.as_deref().map_or(true, |t| unit.unit_type == t)
            && self.bedrooms.map_or(true, |b| unit.number_of_bedrooms == Some(b))
            && self.status.map_or(true, |s| unit.status == s)
            && self
                .amenities
                .as_deref()
                .map_or(true, |a| unit.amenity_tags().any(|tag| tag == a))
            && self
                .release
                .as_deref()
                .map_or(true, |r| unit.release.as_deref() == Some(r))
    }

    pub fn apply<'a>(&self, units: &'a [Unit]) -> Vec<&'a Unit> {
        units.iter().filter(|unit| self.matches(unit)).collect()
    }

    fn matches_search(&self, unit: &Unit) -> bool {
        let needle = self.search_term.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [unit.unit_number.as_str(), unit.unit_type.as_str(), unit.status.as_str()]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

fn parse_number(dimension: FilterDimension, value: &str) -> BookingResult<i32> {
    value.parse::<i32>().map_err(|_| {
        BookingError::Validation(format!("'{}' is not a valid {} value", value, dimension))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PlanPrices, NOT_AVAILABLE};
    use uuid::Uuid;

    fn unit(number: &str, unit_type: &str, bedrooms: i32, floor: i32, status: UnitStatus) -> Unit {
        Unit {
            id: Uuid::new_v4(),
            property_id: Uuid::nil(),
            unit_number: number.to_string(),
            floor_number: Some(floor),
            unit_type: unit_type.to_string(),
            unit_type_file_path: None,
            number_of_bedrooms: Some(bedrooms),
            square_footage: None,
            bathrooms: None,
            amenities: Some("Pool, Sea View".to_string()),
            release: Some("Phase 1".to_string()),
            prices: PlanPrices::default(),
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

    fn ten_units() -> Vec<Unit> {
        let types = ["Studio", "1BR", "2BR", "Studio", "Villa", "1BR", "Studio", "2BR", "Villa", NOT_AVAILABLE];
        types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let status = if i % 2 == 0 { UnitStatus::Available } else { UnitStatus::Sold };
                unit(&format!("{}", 100 + i), t, (i % 3) as i32, (i / 4) as i32, status)
            })
            .collect()
    }

    #[test]
    fn unit_type_filter_ignores_unset_bedrooms() {
        let units = ten_units();
        let mut filters = FilterSet::default();
        filters.set(FilterDimension::UnitType, Some("Studio")).unwrap();
        filters.set(FilterDimension::Bedrooms, None).unwrap();

        assert_eq!(filters.apply(&units).len(), 3);
    }

    #[test]
    fn active_filters_are_conjunctive() {
        let units = ten_units();
        let mut filters = FilterSet::default();
        filters.set(FilterDimension::UnitType, Some("Studio")).unwrap();
        filters.set(FilterDimension::Status, Some("available")).unwrap();

        let result = filters.apply(&units);
        assert!(result
            .iter()
            .all(|u| u.unit_type == "Studio" && u.status == UnitStatus::Available));
        let expected = units
            .iter()
            .filter(|u| u.unit_type == "Studio" && u.status == UnitStatus::Available)
            .count();
        assert_eq!(result.len(), expected);
    }

    #[test]
    fn removing_a_constraint_never_shrinks_the_result() {
        let units = ten_units();
        let mut full = FilterSet::default();
        full.set(FilterDimension::Floor, Some("0")).unwrap();
        full.set(FilterDimension::Bedrooms, Some("1")).unwrap();
        full.set(FilterDimension::Status, Some("Sold")).unwrap();
        full.set_search_term("10");

        let narrowed = full.apply(&units).len();
        for dimension in [FilterDimension::Floor, FilterDimension::Bedrooms, FilterDimension::Status] {
            let mut relaxed = full.clone();
            relaxed.set(dimension, None).unwrap();
            assert!(relaxed.apply(&units).len() >= narrowed);
        }
        let mut relaxed = full.clone();
        relaxed.set_search_term("");
        assert!(relaxed.apply(&units).len() >= narrowed);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let units = ten_units();
        let mut filters = FilterSet::default();

        filters.set_search_term("  STUDIO ");
        assert_eq!(filters.apply(&units).len(), 3);

        filters.set_search_term("sold");
        assert_eq!(filters.apply(&units).len(), 5);

        filters.set_search_term("105");
        assert_eq!(filters.apply(&units).len(), 1);
    }

    #[test]
    fn amenities_match_whole_tags() {
        let units = ten_units();
        let mut filters = FilterSet::default();
        filters.set(FilterDimension::Amenities, Some("Sea View")).unwrap();
        assert_eq!(filters.apply(&units).len(), 10);

        filters.set(FilterDimension::Amenities, Some("Sea")).unwrap();
        assert!(filters.apply(&units).is_empty());
    }

    #[test]
    fn clear_resets_everything_at_once() {
        let mut filters = FilterSet::default();
        filters.set(FilterDimension::Release, Some("Phase 1")).unwrap();
        filters.set(FilterDimension::Floor, Some("2")).unwrap();
        filters.set_search_term("studio");

        filters.clear();
        assert!(filters.is_empty());
    }

    #[test]
    fn invalid_values_leave_state_untouched() {
        let mut filters = FilterSet::default();
        filters.set(FilterDimension::Floor, Some("4")).unwrap();

        let err = filters.set(FilterDimension::Floor, Some("fourth")).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_eq!(filters.floor, Some(4));

        filters.set(FilterDimension::Floor, Some("All")).unwrap();
        assert_eq!(filters.floor, None);
    }

    #[test]
    fn dimension_names_parse() {
        assert_eq!("unitType".parse::<FilterDimension>().unwrap(), FilterDimension::UnitType);
        assert!("price".parse::<FilterDimension>().is_err());
    }
}
