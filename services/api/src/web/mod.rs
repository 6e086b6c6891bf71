pub mod dto;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use middleware::require_auth;
pub use rest::{
    layout_handler, list_properties_handler, list_units_handler, me_handler,
    payment_schedule_handler,
};
pub use ws_handler::ws_handler;

use state::AppState;

/// Every API route, behind the auth middleware.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/me", get(me_handler))
        .route("/properties", get(list_properties_handler))
        .route("/properties/{property_id}/units", get(list_units_handler))
        .route("/units/{unit_id}/payment-schedule", get(payment_schedule_handler))
        .route("/units/{unit_id}/layout", get(layout_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state)
}
