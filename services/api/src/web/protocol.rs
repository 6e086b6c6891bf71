//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the live unit inventory.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::web::dto::{InventoryDto, PaymentScheduleDto, UnitDto};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the booking session for a property. This must be the first message sent on the connection.
    Init { property_id: Uuid },

    /// Sets one filter dimension. An absent, empty or `"all"` value clears it.
    SetFilter {
        dimension: String,
        #[serde(default)]
        value: Option<String>,
    },

    /// Resets every filter and the search term.
    ClearFilters,

    SetSearchTerm { term: String },

    Reserve { unit_id: Uuid },

    Book { unit_id: Uuid },

    CancelReservation { unit_id: Uuid },

    Block { unit_id: Uuid },

    Unblock { unit_id: Uuid },

    /// Requests the payment schedule of a unit under a plan selector.
    PaymentSchedule { unit_id: Uuid, plan: String },
}

impl ClientMessage {
    /// The action name echoed back in replies.
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::Init { .. } => "init",
            ClientMessage::SetFilter { .. } => "set_filter",
            ClientMessage::ClearFilters => "clear_filters",
            ClientMessage::SetSearchTerm { .. } => "set_search_term",
            ClientMessage::Reserve { .. } => "reserve",
            ClientMessage::Book { .. } => "book",
            ClientMessage::CancelReservation { .. } => "cancel_reservation",
            ClientMessage::Block { .. } => "block",
            ClientMessage::Unblock { .. } => "unblock",
            ClientMessage::PaymentSchedule { .. } => "payment_schedule",
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the booking session is open.
    SessionInitialized { property_id: Uuid },

    /// The current view. Pushed after every change to units, filters or highlights.
    Inventory(InventoryDto),

    /// An action was applied. Transitions carry the confirmed unit.
    ActionCompleted {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<UnitDto>,
    },

    /// An action was refused. `kind` is one of `not_found`, `conflict`,
    /// `permission`, `remote_unavailable`, `validation`.
    ActionFailed {
        action: String,
        kind: String,
        message: String,
    },

    PaymentSchedule(PaymentScheduleDto),

    /// Reports a fatal error to the client, which should display an error message.
    Error { message: String },
}
