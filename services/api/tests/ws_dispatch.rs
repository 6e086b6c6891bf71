use chrono::{TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use booking_api::web::protocol::{ClientMessage, ServerMessage};
use booking_api::web::ws_handler::dispatch;
use unit_booking_core::domain::PlanPrices;
use unit_booking_core::memory::{InMemoryUnitStore, ManualClock};
use unit_booking_core::{BookingSession, RawUnit, Role, SessionDeps, Viewer};

fn viewer(email: &str) -> Viewer {
    Viewer {
        id: Uuid::new_v4(),
        email: email.to_string(),
        role: Role::User,
    }
}

async fn open_pair() -> (BookingSession, BookingSession, Uuid) {
    let store = Arc::new(InMemoryUnitStore::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()));
    let property_id = Uuid::new_v4();
    let raw = RawUnit {
        id: Uuid::new_v4(),
        property_id,
        unit_number: Some("C-301".to_string()),
        prices: PlanPrices {
            full_comp_40_60: Some(800_000.0),
            ..PlanPrices::default()
        },
        status: Some("Available".to_string()),
        ..RawUnit::default()
    };
    let unit_id = raw.id;
    store.put_unit(raw);

    let deps = || SessionDeps {
        store: store.clone(),
        feed: store.clone(),
        clock: clock.clone(),
    };
    let a = BookingSession::open(deps(), viewer("a@example.com"), property_id)
        .await
        .unwrap();
    let b = BookingSession::open(deps(), viewer("b@example.com"), property_id)
        .await
        .unwrap();
    (a, b, unit_id)
}

#[tokio::test]
async fn reserve_replies_with_the_confirmed_unit() {
    let (a, b, unit_id) = open_pair().await;

    match dispatch(&a, ClientMessage::Reserve { unit_id }).await {
        ServerMessage::ActionCompleted { action, unit: Some(unit) } => {
            assert_eq!(action, "reserve");
            assert_eq!(unit.status, "Reserved");
            assert_eq!(unit.reserved_by_email.as_deref(), Some("a@example.com"));
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    match dispatch(&b, ClientMessage::Reserve { unit_id }).await {
        ServerMessage::ActionFailed { action, kind, .. } => {
            assert_eq!(action, "reserve");
            assert_eq!(kind, "conflict");
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    a.close();
    b.close();
}

#[tokio::test]
async fn filters_and_schedules_are_dispatched() {
    let (a, _b, unit_id) = open_pair().await;

    let reply = dispatch(
        &a,
        ClientMessage::SetFilter {
            dimension: "floor".to_string(),
            value: Some("ground".to_string()),
        },
    )
    .await;
    assert!(matches!(reply, ServerMessage::ActionFailed { ref kind, .. } if kind == "validation"));

    let reply = dispatch(
        &a,
        ClientMessage::SetFilter {
            dimension: "colour".to_string(),
            value: None,
        },
    )
    .await;
    assert!(matches!(reply, ServerMessage::ActionFailed { ref kind, .. } if kind == "validation"));

    let reply = dispatch(&a, ClientMessage::ClearFilters).await;
    assert!(matches!(reply, ServerMessage::ActionCompleted { unit: None, .. }));

    match dispatch(
        &a,
        ClientMessage::PaymentSchedule {
            unit_id,
            plan: "40/60".to_string(),
        },
    )
    .await
    {
        ServerMessage::PaymentSchedule(schedule) => {
            assert_eq!(schedule.plan, "40/60");
            assert_eq!(schedule.rows.len(), 6);
            assert_eq!(schedule.rows[0].date, "15 Jan 2025");
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    let reply = dispatch(
        &a,
        ClientMessage::PaymentSchedule {
            unit_id,
            plan: "30/70".to_string(),
        },
    )
    .await;
    assert!(matches!(reply, ServerMessage::ActionFailed { ref kind, .. } if kind == "validation"));

    let reply = dispatch(&a, ClientMessage::Init { property_id: Uuid::new_v4() }).await;
    assert!(matches!(reply, ServerMessage::Error { .. }));
}

#[tokio::test]
async fn schedules_follow_unit_visibility() {
    let (a, b, unit_id) = open_pair().await;
    a.block(unit_id).await.unwrap();
    b.refresh().await.unwrap();

    let request = || ClientMessage::PaymentSchedule {
        unit_id,
        plan: "40/60".to_string(),
    };
    assert!(matches!(dispatch(&a, request()).await, ServerMessage::PaymentSchedule(_)));
    match dispatch(&b, request()).await {
        ServerMessage::ActionFailed { action, kind, .. } => {
            assert_eq!(action, "payment_schedule");
            assert_eq!(kind, "not_found");
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}
