//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection hosts one `BookingSession`; its view is pushed to the client
//! whenever it changes, and client messages are dispatched to the session.

use crate::web::{
    dto::{InventoryDto, PaymentScheduleDto, UnitDto},
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use unit_booking_core::{
    BookingError, BookingSession, FilterDimension, InventoryView, Transition, Viewer,
};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(viewer): Extension<Viewer>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, viewer))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, viewer: Viewer) {
    info!("New WebSocket connection established for viewer: {}", viewer.email);

    // The sender is shared between the view forwarder and the reply path.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // --- 1. Initialization Phase ---
    let property_id = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => match serde_json::from_str::<ClientMessage>(init_json.as_str()) {
            Ok(ClientMessage::Init { property_id }) => property_id,
            _ => {
                error!("First message was not a valid Init message.");
                let _ = send_message(
                    &ws_sender,
                    &ServerMessage::Error {
                        message: "The first message must be init.".to_string(),
                    },
                )
                .await;
                return;
            }
        },
        _ => {
            info!("Client disconnected before sending Init message.");
            return;
        }
    };

    let session = match BookingSession::open(app_state.session_deps(), viewer, property_id).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to open booking session for property {}: {:?}", property_id, e);
            let _ = send_message(
                &ws_sender,
                &ServerMessage::Error {
                    message: format!("Failed to load property: {}", e),
                },
            )
            .await;
            return;
        }
    };

    if send_message(&ws_sender, &ServerMessage::SessionInitialized { property_id })
        .await
        .is_err()
    {
        error!("Failed to send session initialized message.");
        return;
    }

    // --- 2. Push every view change ---
    let forward_task = tokio::spawn(forward_views(session.subscribe_view(), ws_sender.clone()));

    // --- 3. Main Message Loop ---
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => dispatch(&session, message).await,
                    Err(e) => {
                        warn!("Failed to deserialize client message: {}", e);
                        ServerMessage::ActionFailed {
                            action: "unknown".to_string(),
                            kind: "validation".to_string(),
                            message: e.to_string(),
                        }
                    }
                };
                if send_message(&ws_sender, &reply).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    forward_task.abort();
    session.close();
    info!("WebSocket connection closed.");
}

/// Sends the current view, then one message per change, until the socket or
/// the session goes away.
async fn forward_views(mut views: watch::Receiver<InventoryView>, ws_sender: WsSender) {
    loop {
        let message = ServerMessage::Inventory(InventoryDto::from(&*views.borrow_and_update()));
        if send_message(&ws_sender, &message).await.is_err() {
            break;
        }
        if views.changed().await.is_err() {
            break;
        }
    }
}

async fn send_message(ws_sender: &WsSender, message: &ServerMessage) -> Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|e| {
        error!("Failed to serialize server message: {}", e);
    })?;
    ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| {
            warn!("Failed to send message to client: {}", e);
        })
}

//=========================================================================================
// Message Dispatch
//=========================================================================================

/// Applies one client message to the session and returns the reply.
pub async fn dispatch(session: &BookingSession, message: ClientMessage) -> ServerMessage {
    let action = message.action();
    let outcome: Result<ServerMessage, BookingError> = match message {
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
            return ServerMessage::Error {
                message: "The session is already initialized.".to_string(),
            };
        }
        ClientMessage::SetFilter { dimension, value } => dimension
            .parse::<FilterDimension>()
            .and_then(|dimension| session.set_filter(dimension, value.as_deref()))
            .map(|_| completed(action, None)),
        ClientMessage::ClearFilters => {
            session.clear_filters();
            Ok(completed(action, None))
        }
        ClientMessage::SetSearchTerm { term } => {
            session.set_search_term(&term);
            Ok(completed(action, None))
        }
        ClientMessage::Reserve { unit_id } => transition(session, unit_id, Transition::Reserve).await,
        ClientMessage::Book { unit_id } => transition(session, unit_id, Transition::Book).await,
        ClientMessage::CancelReservation { unit_id } => {
            transition(session, unit_id, Transition::CancelReservation).await
        }
        ClientMessage::Block { unit_id } => transition(session, unit_id, Transition::Block).await,
        ClientMessage::Unblock { unit_id } => transition(session, unit_id, Transition::Unblock).await,
        ClientMessage::PaymentSchedule { unit_id, plan } => session
            .compute_payment_schedule(unit_id, &plan)
            .map(|schedule| ServerMessage::PaymentSchedule(PaymentScheduleDto::new(unit_id, &schedule))),
    };

    outcome.unwrap_or_else(|e| {
        info!(action, kind = e.kind(), "Action refused: {}", e);
        ServerMessage::ActionFailed {
            action: action.to_string(),
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    })
}

async fn transition(
    session: &BookingSession,
    unit_id: uuid::Uuid,
    transition: Transition,
) -> Result<ServerMessage, BookingError> {
    let unit = session.transition(unit_id, transition).await?;
    Ok(completed(transition.as_str(), Some(UnitDto::from(&unit))))
}

fn completed(action: &str, unit: Option<UnitDto>) -> ServerMessage {
    ServerMessage::ActionCompleted {
        action: action.to_string(),
        unit,
    }
}
