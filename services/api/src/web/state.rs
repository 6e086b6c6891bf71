//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;
use unit_booking_core::ports::{ChangeFeed, Clock, FileStore, UnitStore, ViewerProvider};
use unit_booking_core::SessionDeps;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UnitStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub viewers: Arc<dyn ViewerProvider>,
    pub files: Arc<dyn FileStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// The collaborators each WebSocket connection's booking session is opened with.
    pub fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            store: self.store.clone(),
            feed: self.feed.clone(),
            clock: self.clock.clone(),
        }
    }
}
