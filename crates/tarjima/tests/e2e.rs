// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the bot core pipeline.
//!
//! Each test builds an isolated temp database with mock platform clients
//! and exercises a full path: updates through a runtime into the wizard,
//! webhook ingestion through the gateway router, payment races through the
//! ledger. Tests are independent and order-insensitive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use tarjima_core::types::{CustomerKind, InboundUpdate, OrderStatus, Tenant, UpdateKind};
use tarjima_core::{MessengerApi, RuntimeRegistry, UpdateHandler};
use tarjima_dispatch::{MessengerFactory, NotificationRouter};
use tarjima_gateway::GatewayState;
use tarjima_ledger::{PaymentActor, PaymentLedger, PaymentRequest};
use tarjima_registry::TenantRegistry;
use tarjima_state::{user_key, ConversationStore};
use tarjima_storage::queries::{orders, tenants as tenant_queries};
use tarjima_supervisor::{BotRuntime, RunMode, RuntimeServices, Supervisor, WizardHandler};
use tarjima_test_utils::{MockMessenger, TestDb};

fn callback(tenant_id: i64, update_id: i64, data: &str) -> InboundUpdate {
    InboundUpdate {
        update_id,
        tenant_id,
        chat_id: 123456789,
        sender_id: "123456789".into(),
        message_id: None,
        kind: UpdateKind::Callback(data.into()),
    }
}

fn text(tenant_id: i64, update_id: i64, content: &str) -> InboundUpdate {
    InboundUpdate {
        update_id,
        tenant_id,
        chat_id: 123456789,
        sender_id: "123456789".into(),
        message_id: Some(update_id),
        kind: UpdateKind::Text(content.into()),
    }
}

fn single_factory(messenger: Arc<MockMessenger>) -> MessengerFactory {
    Arc::new(move |_, _| Ok(messenger.clone() as Arc<dyn MessengerApi>))
}

fn services_with(harness: &TestDb, factory: MessengerFactory) -> RuntimeServices {
    let db = harness.db.clone();
    RuntimeServices {
        store: Arc::new(ConversationStore::new(db.clone())),
        ledger: Arc::new(PaymentLedger::new(db.clone())),
        router: Arc::new(NotificationRouter::with_retry_delay(
            factory,
            Duration::ZERO,
        )),
        tenants: Arc::new(TenantRegistry::new(db.clone())),
        db,
    }
}

fn wizard_for(
    harness: &TestDb,
    tenant: Tenant,
    messenger: Arc<MockMessenger>,
    services: &RuntimeServices,
) -> Arc<WizardHandler> {
    Arc::new(WizardHandler::new(
        tenant,
        messenger,
        services.store.clone(),
        services.ledger.clone(),
        services.router.clone(),
        services.tenants.clone(),
        harness.db.clone(),
    ))
}

// ---- Test 1: polled updates drive the wizard to a finalized order ----

#[tokio::test]
async fn polled_wizard_flow_creates_and_fans_out_an_order() {
    let harness = TestDb::seeded().await;
    let messenger = MockMessenger::new(1);
    let services = services_with(&harness, single_factory(messenger.clone()));
    let handler = wizard_for(&harness, TestDb::tenant(), messenger.clone(), &services);

    messenger.inject_batch(vec![
        text(1, 1, "/start"),
        callback(1, 2, "product:11"),
        callback(1, 3, "branch:2"),
        callback(1, 4, "quote:100000"),
        callback(1, 5, "confirm"),
    ]);

    let (_tx, rx) = mpsc::channel(8);
    let runtime = BotRuntime::new(
        TestDb::tenant(),
        messenger.clone(),
        handler,
        rx,
        1,
        Duration::from_millis(50),
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn(runtime.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    task.await.unwrap();

    // The order landed with the quoted price.
    let created = orders::list_for_tenant(&harness.db, 1).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].total_price, dec!(100000));

    // Fan-out reached the company channel and the B2C branch channel.
    let sent = messenger.sent_messages();
    assert!(sent.iter().any(|(c, _)| c.0 == "-100500"));
    assert!(sent.iter().any(|(c, _)| c.0 == "-100111"));

    // The wizard reset and now tracks the created order for payment.
    let state = services
        .store
        .get(&user_key(1, "123456789"))
        .await
        .unwrap();
    assert_eq!(state.current_order_id, Some(created[0].id));
}

// ---- Test 2: webhook ingestion through the gateway ----

#[tokio::test]
async fn webhook_update_reaches_the_runtime_and_user_gets_a_reply() {
    let harness = TestDb::seeded().await;
    let messenger = MockMessenger::new(1);
    let services = services_with(&harness, single_factory(messenger.clone()));
    let handler = wizard_for(&harness, TestDb::tenant(), messenger.clone(), &services);

    let registry = Arc::new(RuntimeRegistry::new());
    let (tx, rx) = mpsc::channel(8);
    registry.register(1, tx);

    let runtime = BotRuntime::new(
        TestDb::tenant(),
        messenger.clone(),
        handler,
        rx,
        1,
        Duration::from_millis(50),
    );
    let cancel = CancellationToken::new();
    let task = tokio::spawn(runtime.run(cancel.clone()));

    // Inbound platform update as the gateway receives it.
    let body = serde_json::json!({
        "update_id": 900,
        "message": {
            "message_id": 5,
            "date": 1700000000i64,
            "chat": {"id": 123456789i64, "type": "private", "first_name": "T"},
            "from": {"id": 123456789u64, "is_bot": false, "first_name": "T"},
            "text": "/start",
        }
    })
    .to_string();

    let app = tarjima_gateway::router(GatewayState::new(registry));
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/bot/webhook/1/")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    task.await.unwrap();

    let sent = messenger.sent_messages();
    assert!(
        sent.iter()
            .any(|(c, t)| c.0 == "123456789" && t.contains("Welcome")),
        "webhook /start must produce the welcome reply: {sent:?}"
    );
}

// ---- Test 3: two tenants under one supervisor stay isolated ----

#[tokio::test]
async fn supervisor_runs_two_tenants_with_independent_clients() {
    let harness = TestDb::seeded().await;

    // Second tenant with its own credential and channels.
    let mut second = TestDb::tenant();
    second.id = 2;
    second.name = "Second Center".into();
    second.bot_token = Some("100002:other-token".into());
    tenant_queries::upsert(&harness.db, &second).await.unwrap();

    let mocks: HashMap<i64, Arc<MockMessenger>> =
        [(1, MockMessenger::new(1)), (2, MockMessenger::new(2))].into();
    let factory: MessengerFactory = {
        let mocks = mocks.clone();
        Arc::new(move |tenant_id, _| Ok(mocks[&tenant_id].clone() as Arc<dyn MessengerApi>))
    };
    let services = services_with(&harness, factory.clone());

    let registry = Arc::new(RuntimeRegistry::new());
    let mut supervisor = Supervisor::new(
        registry.clone(),
        tarjima_config::TarjimaConfig::default().supervisor,
        1,
    );
    let started = supervisor
        .start(
            &[TestDb::tenant(), second],
            RunMode::Tasks,
            &services,
            &factory,
        )
        .unwrap();
    assert_eq!(started, 2);
    assert!(registry.is_registered(1) && registry.is_registered(2));

    // Each tenant's update flows through its own client only.
    mocks[&1].inject_batch(vec![text(1, 10, "/start")]);
    mocks[&2].inject_batch(vec![text(2, 20, "/start")]);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        mocks[&1]
            .sent_messages()
            .iter()
            .filter(|(_, t)| t.contains("Welcome"))
            .count(),
        1
    );
    assert_eq!(
        mocks[&2]
            .sent_messages()
            .iter()
            .filter(|(_, t)| t.contains("Welcome"))
            .count(),
        1
    );

    supervisor.stop().await;
    assert!(!registry.is_registered(1) && !registry.is_registered(2));
}

// ---- Test 4: payment race and reset replay at the pipeline level ----

#[tokio::test]
async fn concurrent_customer_and_staff_payments_both_land() {
    let harness = TestDb::seeded().await;
    let ledger = Arc::new(PaymentLedger::new(harness.db.clone()));
    let order_id = harness.create_order(dec!(100000), CustomerKind::B2c).await;

    let customer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .record_payment(
                    order_id,
                    PaymentRequest::amount(dec!(30000)),
                    PaymentActor::new("bot", tarjima_core::types::StaffRole::Staff),
                )
                .await
        })
    };
    let staff = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .record_payment(
                    order_id,
                    PaymentRequest::amount(dec!(20000)),
                    PaymentActor::new("reception", tarjima_core::types::StaffRole::Staff),
                )
                .await
        })
    };
    customer.await.unwrap().unwrap();
    staff.await.unwrap().unwrap();

    let order = orders::get(&harness.db, order_id).await.unwrap().unwrap();
    assert_eq!(order.received, dec!(50000));
    assert_eq!(order.remaining(), dec!(50000));
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn reset_and_replay_matches_a_direct_full_payment() {
    let harness = TestDb::seeded().await;
    let ledger = PaymentLedger::new(harness.db.clone());
    let staff = PaymentActor::new("reception", tarjima_core::types::StaffRole::Staff);
    let owner = PaymentActor::new("director", tarjima_core::types::StaffRole::Owner);

    let direct = harness.create_order(dec!(80000), CustomerKind::B2b).await;
    let replayed = harness.create_order(dec!(80000), CustomerKind::B2b).await;

    let direct_outcome = ledger
        .record_payment(direct, PaymentRequest::amount(dec!(80000)), staff.clone())
        .await
        .unwrap();

    ledger
        .record_payment(replayed, PaymentRequest::amount(dec!(30000)), staff.clone())
        .await
        .unwrap();
    ledger.reset_payment(replayed, owner).await.unwrap();
    let replay_outcome = ledger
        .record_payment(replayed, PaymentRequest::amount(dec!(80000)), staff)
        .await
        .unwrap();

    assert_eq!(replay_outcome.received, direct_outcome.received);
    assert_eq!(replay_outcome.remaining, direct_outcome.remaining);
    assert_eq!(replay_outcome.status, direct_outcome.status);
    assert_eq!(
        replay_outcome.payment_percentage,
        direct_outcome.payment_percentage
    );
}

// ---- Test 5: conversation continuity across worker processes ----

#[tokio::test]
async fn conversation_survives_a_worker_swap() {
    let harness = TestDb::seeded().await;
    let messenger = MockMessenger::new(1);
    let factory = single_factory(messenger.clone());

    // Worker A serves the first message.
    let services_a = services_with(&harness, factory.clone());
    let worker_a = wizard_for(&harness, TestDb::tenant(), messenger.clone(), &services_a);
    worker_a
        .handle(callback(1, 1, "product:11"))
        .await
        .unwrap();

    // Worker B (fresh store, no local cache) serves the next message.
    let services_b = services_with(&harness, factory);
    let worker_b = wizard_for(&harness, TestDb::tenant(), messenger.clone(), &services_b);
    worker_b.handle(callback(1, 2, "quote:60000")).await.unwrap();
    worker_b.handle(callback(1, 3, "confirm")).await.unwrap();

    // Worker B saw worker A's product selection, so the order exists.
    let created = orders::list_for_tenant(&harness.db, 1).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].total_price, dec!(60000));
}
