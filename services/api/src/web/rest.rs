//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::booking_rejection;
use crate::web::dto::{
    ActionsDto, FilterOptionsDto, FiltersDto, InventoryDto, LayoutDto, PaymentScheduleDto,
    PricesDto, PropertyDto, ScheduleRowDto, StatsDto, UnitDto, UnitViewDto, ViewerDto,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use unit_booking_core::inventory::Inventory;
use unit_booking_core::normalize::{normalize_unit, normalize_units};
use unit_booking_core::payment_plan::compute_payment_schedule;
use unit_booking_core::visibility::is_visible_to;
use unit_booking_core::{BookingError, FilterDimension, PortError, Unit, Viewer};
use utoipa::{IntoParams, OpenApi};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        me_handler,
        list_properties_handler,
        list_units_handler,
        payment_schedule_handler,
        layout_handler,
    ),
    components(
        schemas(
            ViewerDto, PropertyDto, InventoryDto, UnitViewDto, UnitDto, PricesDto, ActionsDto,
            FilterOptionsDto, FiltersDto, StatsDto, PaymentScheduleDto, ScheduleRowDto, LayoutDto
        )
    ),
    tags(
        (name = "Unit Booking API", description = "Live unit inventory, reservations and payment plans.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Query Parameters
//=========================================================================================

/// Optional filters applied to a one-shot inventory listing.
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct UnitQuery {
    /// Case-insensitive match on unit number, type or status.
    pub search: Option<String>,
    pub floor: Option<String>,
    pub unit_type: Option<String>,
    pub bedrooms: Option<String>,
    pub status: Option<String>,
    pub amenities: Option<String>,
    pub release: Option<String>,
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct ScheduleQuery {
    /// One of `30/70`, `40/60`, `2`, `3`, `4`.
    pub plan: String,
}

type Rejection = (StatusCode, String);

fn port_rejection(context: &str, e: PortError) -> Rejection {
    error!("{}: {:?}", context, e);
    booking_rejection(BookingError::from(e))
}

/// Loads a unit the viewer may see. Hidden units are reported as missing.
async fn visible_unit(app_state: &AppState, viewer: &Viewer, unit_id: Uuid) -> Result<Unit, Rejection> {
    let raw = app_state
        .store
        .get_unit(unit_id)
        .await
        .map_err(|e| port_rejection("Failed to load unit", e))?;
    let unit = normalize_unit(raw);
    if !is_visible_to(&unit, viewer) {
        return Err(booking_rejection(BookingError::NotFound(format!(
            "unit {} not found",
            unit_id
        ))));
    }
    Ok(unit)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The authenticated viewer.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The current viewer", body = ViewerDto),
        (status = 401, description = "Missing or unknown session token")
    )
)]
pub async fn me_handler(Extension(viewer): Extension<Viewer>) -> impl IntoResponse {
    Json(ViewerDto::from(&viewer))
}

/// List properties.
#[utoipa::path(
    get,
    path = "/properties",
    responses(
        (status = 200, description = "All properties, by name", body = [PropertyDto]),
        (status = 401, description = "Missing or unknown session token"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn list_properties_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Rejection> {
    let properties = app_state
        .store
        .list_properties()
        .await
        .map_err(|e| port_rejection("Failed to list properties", e))?;
    Ok(Json(
        properties.into_iter().map(PropertyDto::from).collect::<Vec<_>>(),
    ))
}

/// The filtered inventory of a property, projected onto the viewer.
#[utoipa::path(
    get,
    path = "/properties/{property_id}/units",
    params(
        ("property_id" = Uuid, Path, description = "The property to list."),
        UnitQuery
    ),
    responses(
        (status = 200, description = "Visible units with actions, filter options and stats", body = InventoryDto),
        (status = 400, description = "A filter value is malformed"),
        (status = 401, description = "Missing or unknown session token"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn list_units_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(viewer): Extension<Viewer>,
    Path(property_id): Path<Uuid>,
    Query(query): Query<UnitQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let raw = app_state
        .store
        .list_units(property_id)
        .await
        .map_err(|e| port_rejection("Failed to list units", e))?;

    let mut inventory = Inventory::new(normalize_units(raw));
    let filters = inventory.filters_mut();
    if let Some(term) = &query.search {
        filters.set_search_term(term);
    }
    let dimensions = [
        (FilterDimension::Floor, &query.floor),
        (FilterDimension::UnitType, &query.unit_type),
        (FilterDimension::Bedrooms, &query.bedrooms),
        (FilterDimension::Status, &query.status),
        (FilterDimension::Amenities, &query.amenities),
        (FilterDimension::Release, &query.release),
    ];
    for (dimension, value) in dimensions {
        filters
            .set(dimension, value.as_deref())
            .map_err(booking_rejection)?;
    }

    let view = inventory.view(&viewer, app_state.clock.now());
    Ok(Json(InventoryDto::from(&view)))
}

/// Payment schedule of a unit under a plan, dated from today.
#[utoipa::path(
    get,
    path = "/units/{unit_id}/payment-schedule",
    params(
        ("unit_id" = Uuid, Path, description = "The unit to price."),
        ScheduleQuery
    ),
    responses(
        (status = 200, description = "The installment schedule with fees and totals", body = PaymentScheduleDto),
        (status = 400, description = "Unknown plan or the unit has no price for it"),
        (status = 401, description = "Missing or unknown session token"),
        (status = 404, description = "Unit not found")
    )
)]
pub async fn payment_schedule_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(viewer): Extension<Viewer>,
    Path(unit_id): Path<Uuid>,
    Query(query): Query<ScheduleQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let unit = visible_unit(&app_state, &viewer, unit_id).await?;
    let today = app_state.clock.now().date_naive();
    let schedule = compute_payment_schedule(&unit, &query.plan, today).map_err(booking_rejection)?;
    Ok(Json(PaymentScheduleDto::new(unit_id, &schedule)))
}

/// Public URL of the unit type's layout file.
#[utoipa::path(
    get,
    path = "/units/{unit_id}/layout",
    params(
        ("unit_id" = Uuid, Path, description = "The unit whose layout to fetch.")
    ),
    responses(
        (status = 200, description = "Layout URL", body = LayoutDto),
        (status = 401, description = "Missing or unknown session token"),
        (status = 404, description = "Unit not found or its type has no layout")
    )
)]
pub async fn layout_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(viewer): Extension<Viewer>,
    Path(unit_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let unit = visible_unit(&app_state, &viewer, unit_id).await?;
    let path = unit.unit_type_file_path.as_deref().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("unit {} has no layout file", unit.unit_number),
        )
    })?;
    Ok(Json(LayoutDto {
        unit_id,
        url: app_state.files.public_url(path),
    }))
}
