//! PostgreSQL integration smoke test.
//!
//! Runs only when `DATABASE_URL` points at a disposable database; without
//! it the test exits early so the suite stays green on machines with no
//! PostgreSQL instance.

use fresis_core::{Customer, SyncKind};
use fresis_db::{Database, DbConfig};

fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

#[tokio::test]
async fn migrations_and_round_trip() {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL not set, skipping postgres integration test");
        return;
    };

    let db = Database::connect(DbConfig::new(url))
        .await
        .expect("connect + migrate");

    assert!(db.health_check().await);

    // Settings seed twice without error (idempotent).
    db.sync_settings().seed_defaults().await.unwrap();
    db.sync_settings().seed_defaults().await.unwrap();
    let settings = db.sync_settings().get_all().await.unwrap();
    assert_eq!(settings.len(), SyncKind::ALL.len());

    // A customer row survives a write/read round trip.
    let user = fresis_core::User {
        id: "it-user".into(),
        username: "integration".into(),
        role: fresis_core::UserRole::Agent,
        whitelisted: true,
        last_login: None,
        last_customer_sync: None,
        last_order_sync: None,
    };
    db.users().upsert(&user).await.unwrap();

    let mut customer = Customer {
        customer_profile: "IT-CP-001".into(),
        user_id: "it-user".into(),
        business_name: "Prova SRL".into(),
        city: Some("Milano".into()),
        last_sync: 1_700_000_000,
        ..Default::default()
    };
    customer.hash = customer.content_hash();

    db.customers().insert(&customer).await.unwrap();
    let read = db
        .customers()
        .get("it-user", "IT-CP-001")
        .await
        .unwrap()
        .expect("customer present");
    assert_eq!(read.business_name, "Prova SRL");
    assert_eq!(read.hash, customer.hash);

    let by_city = db
        .customers()
        .find(
            "it-user",
            &fresis_db::CustomerFilter {
                city: Some("Milano".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_city.len(), 1);

    // An order with one article, plus the collaborator operations.
    let mut order = fresis_core::Order {
        id: "IT-ORD-001".into(),
        user_id: "it-user".into(),
        order_number: "IT-SO-001".into(),
        sales_status: "Open".into(),
        total_amount: "150.00".into(),
        current_state: fresis_core::INITIAL_ORDER_STATE.into(),
        last_sync: 1_700_000_000,
        created_at: 1_700_000_000,
        ..Default::default()
    };
    order.hash = order.content_hash();

    let article = fresis_core::OrderArticle {
        order_id: "IT-ORD-001".into(),
        user_id: "it-user".into(),
        line_number: 1,
        article_code: "IT-ART-1".into(),
        quantity: 2.0,
        ..Default::default()
    };
    db.orders()
        .insert_with_articles(&order, &[article])
        .await
        .unwrap();

    db.orders()
        .update_state(
            "it-user",
            "IT-ORD-001",
            "confirmed",
            "integration-test",
            Some("state round trip"),
            Some(0.9),
            Some("test"),
        )
        .await
        .unwrap();

    let history = db
        .orders()
        .state_history_for("it-user", "IT-ORD-001")
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_state.as_deref(), Some("new"));
    assert_eq!(history[0].new_state, "confirmed");

    let sales = db
        .orders()
        .last_sales_for_article("it-user", "IT-ART-1", 20)
        .await
        .unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].order_number, "IT-SO-001");

    // Prune everything again so reruns stay clean.
    db.orders()
        .delete_missing("it-user", &["nothing".to_string()])
        .await
        .unwrap();
    db.customers()
        .delete_missing("it-user", &["nothing".to_string()])
        .await
        .unwrap();
}
