//! services/api/src/web/dto.rs
//!
//! Wire representations shared by the REST and WebSocket surfaces.

use chrono::{DateTime, Utc};
use serde::Serialize;
use unit_booking_core::inventory::{InventoryStats, InventoryView, UnitView};
use unit_booking_core::normalize::FilterOptions;
use unit_booking_core::payment_plan::{PaymentSchedule, ScheduleRow};
use unit_booking_core::visibility::UnitActions;
use unit_booking_core::{FilterSet, Property, Unit, Viewer};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ViewerDto {
    pub id: Uuid,
    pub email: String,
    /// `admin` or `user`.
    pub role: String,
}

impl From<&Viewer> for ViewerDto {
    fn from(viewer: &Viewer) -> Self {
        Self {
            id: viewer.id,
            email: viewer.email.clone(),
            role: viewer.role.as_str().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct PropertyDto {
    pub id: Uuid,
    pub name: String,
}

impl From<Property> for PropertyDto {
    fn from(property: Property) -> Self {
        Self {
            id: property.id,
            name: property.name,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct PricesDto {
    pub sale_30_70: Option<f64>,
    pub full_comp_40_60: Option<f64>,
    pub post_handover_2_year: Option<f64>,
    pub post_handover_3_year: Option<f64>,
    pub post_handover_4_year: Option<f64>,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct UnitDto {
    pub id: Uuid,
    pub property_id: Uuid,
    pub unit_number: String,
    pub floor_number: Option<i32>,
    pub unit_type: String,
    pub number_of_bedrooms: Option<i32>,
    pub square_footage: Option<i32>,
    pub bathrooms: Option<i32>,
    pub amenities: Option<String>,
    pub release: Option<String>,
    pub status: String,
    pub reserved_by_email: Option<String>,
    pub reservation_time: Option<DateTime<Utc>>,
    pub blocked_by_email: Option<String>,
    pub prices: PricesDto,
}

impl From<&Unit> for UnitDto {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            property_id: unit.property_id,
            unit_number: unit.unit_number.clone(),
            floor_number: unit.floor_number,
            unit_type: unit.unit_type.clone(),
            number_of_bedrooms: unit.number_of_bedrooms,
            square_footage: unit.square_footage,
            bathrooms: unit.bathrooms,
            amenities: unit.amenities.clone(),
            release: unit.release.clone(),
            status: unit.status.as_str().to_string(),
            reserved_by_email: unit.reserved_by_email.clone(),
            reservation_time: unit.reservation_time,
            blocked_by_email: unit.blocked_by_email.clone(),
            prices: PricesDto {
                sale_30_70: unit.prices.sale_30_70,
                full_comp_40_60: unit.prices.full_comp_40_60,
                post_handover_2_year: unit.prices.post_handover_2_year,
                post_handover_3_year: unit.prices.post_handover_3_year,
                post_handover_4_year: unit.prices.post_handover_4_year,
            },
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, Copy, PartialEq)]
pub struct ActionsDto {
    pub can_reserve: bool,
    pub can_book: bool,
    pub can_cancel: bool,
    pub can_block: bool,
    pub can_unblock: bool,
}

impl From<UnitActions> for ActionsDto {
    fn from(actions: UnitActions) -> Self {
        Self {
            can_reserve: actions.can_reserve,
            can_book: actions.can_book,
            can_cancel: actions.can_cancel,
            can_block: actions.can_block,
            can_unblock: actions.can_unblock,
        }
    }
}

/// A unit as one viewer sees it.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct UnitViewDto {
    pub unit: UnitDto,
    pub actions: ActionsDto,
    pub interactive: bool,
    pub color: String,
    pub highlighted: bool,
    pub reservation_remaining_ms: Option<i64>,
}

impl From<&UnitView> for UnitViewDto {
    fn from(view: &UnitView) -> Self {
        Self {
            unit: UnitDto::from(&view.unit),
            actions: view.actions.into(),
            interactive: view.interactive,
            color: view.color.to_string(),
            highlighted: view.highlighted,
            reservation_remaining_ms: view.reservation_remaining_ms,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct FilterOptionsDto {
    pub floors: Vec<i32>,
    pub unit_types: Vec<String>,
    pub bedrooms: Vec<i32>,
    pub amenities: Vec<String>,
    pub releases: Vec<String>,
}

impl From<&FilterOptions> for FilterOptionsDto {
    fn from(options: &FilterOptions) -> Self {
        Self {
            floors: options.floors.clone(),
            unit_types: options.unit_types.clone(),
            bedrooms: options.bedrooms.clone(),
            amenities: options.amenities.clone(),
            releases: options.releases.clone(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct FiltersDto {
    pub search_term: String,
    pub floor: Option<i32>,
    pub unit_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub status: Option<String>,
    pub amenities: Option<String>,
    pub release: Option<String>,
}

impl From<&FilterSet> for FiltersDto {
    fn from(filters: &FilterSet) -> Self {
        Self {
            search_term: filters.search_term.clone(),
            floor: filters.floor,
            unit_type: filters.unit_type.clone(),
            bedrooms: filters.bedrooms,
            status: filters.status.map(|s| s.as_str().to_string()),
            amenities: filters.amenities.clone(),
            release: filters.release.clone(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, Copy, PartialEq)]
pub struct StatsDto {
    pub total: usize,
    pub available: usize,
    pub reserved: usize,
    pub booked: usize,
    pub sold: usize,
    pub blocked: usize,
}

impl From<InventoryStats> for StatsDto {
    fn from(stats: InventoryStats) -> Self {
        Self {
            total: stats.total,
            available: stats.available,
            reserved: stats.reserved,
            booked: stats.booked,
            sold: stats.sold,
            blocked: stats.blocked,
        }
    }
}

/// The filtered, viewer-projected inventory of one property.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct InventoryDto {
    pub units: Vec<UnitViewDto>,
    /// Number of units shown after filtering and visibility.
    pub showing: usize,
    /// Number of units held for the property.
    pub total_units: usize,
    pub options: FilterOptionsDto,
    pub filters: FiltersDto,
    pub stats: StatsDto,
}

impl From<&InventoryView> for InventoryDto {
    fn from(view: &InventoryView) -> Self {
        Self {
            units: view.units.iter().map(UnitViewDto::from).collect(),
            showing: view.units.len(),
            total_units: view.total_units,
            options: (&view.options).into(),
            filters: (&view.filters).into(),
            stats: view.stats.into(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ScheduleRowDto {
    /// Formatted `DD Mon YYYY`.
    pub date: String,
    pub milestone: String,
    pub percentage: f64,
    pub amount: f64,
}

impl From<&ScheduleRow> for ScheduleRowDto {
    fn from(row: &ScheduleRow) -> Self {
        Self {
            date: row.display_date(),
            milestone: row.milestone.clone(),
            percentage: row.percentage,
            amount: row.amount,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct PaymentScheduleDto {
    pub unit_id: Uuid,
    /// The selector the schedule was requested with, e.g. `30/70` or `3`.
    pub plan: String,
    pub label: String,
    pub unit_price: f64,
    pub adm_fee: f64,
    pub registration_fee: f64,
    pub total_price: f64,
    pub rows: Vec<ScheduleRowDto>,
}

impl PaymentScheduleDto {
    pub fn new(unit_id: Uuid, schedule: &PaymentSchedule) -> Self {
        Self {
            unit_id,
            plan: schedule.plan.selector().to_string(),
            label: schedule.plan.label().to_string(),
            unit_price: schedule.unit_price,
            adm_fee: schedule.adm_fee,
            registration_fee: schedule.registration_fee,
            total_price: schedule.total_price,
            rows: schedule.rows.iter().map(ScheduleRowDto::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct LayoutDto {
    pub unit_id: Uuid,
    pub url: String,
}
