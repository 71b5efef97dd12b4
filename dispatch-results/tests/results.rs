//! Integration tests against a real Postgres instance. Skipped entirely
//! when `TEST_DATABASE_URL` isn't set, so `cargo test` stays usable
//! without a database on hand.

use chrono::Utc;
use dispatch_results::{report_result, DialerReport};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn test_pool() -> Option<sqlx::PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("../dispatch-db/migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

async fn seed_tenant(pool: &sqlx::PgPool) -> Uuid {
    let (id,): (Uuid,) =
        sqlx::query_as("insert into tenants (slug, name) values ($1, $1) returning id")
            .bind(format!("t-{}", Uuid::new_v4()))
            .fetch_one(pool)
            .await
            .unwrap();
    sqlx::query(
        "insert into schedule_configs (tenant_id, wallet_balance, default_cost_per_connected) \
         values ($1, 10000, 500)",
    )
    .bind(id)
    .execute(pool)
    .await
    .unwrap();
    id
}

fn report(phone: &str, status: &str, number_id: Option<Uuid>) -> DialerReport {
    DialerReport {
        number_id,
        phone_number: phone.to_string(),
        scenario_id: None,
        outbound_line_id: None,
        status: status.to_string(),
        reason: None,
        attempted_at: Utc::now(),
        call_allowed: None,
        batch_id: None,
        agent_id: None,
        agent_phone: None,
    }
}

#[tokio::test]
async fn a_billable_report_creates_a_number_and_charges_the_wallet() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_tenant(&pool).await;

    let result = report_result(&pool, tenant_id, report("09123456789", "CONNECTED", None))
        .await
        .unwrap();
    assert!(result.billable);
    assert_eq!(result.direction, "INBOUND");

    let (balance,): (i64,) =
        sqlx::query_as("select wallet_balance from schedule_configs where tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(balance, 9_500);
}

#[tokio::test]
async fn power_off_sticks_to_the_number_global_status() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_tenant(&pool).await;

    report_result(&pool, tenant_id, report("09123456780", "POWER_OFF", None))
        .await
        .unwrap();

    let (status,): (String,) =
        sqlx::query_as("select global_status from numbers where phone_number = '09123456780'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "POWER_OFF");
}

#[tokio::test]
async fn a_non_billable_report_does_not_touch_the_wallet() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_tenant(&pool).await;

    report_result(&pool, tenant_id, report("09123456781", "MISSED", None))
        .await
        .unwrap();

    let (balance,): (i64,) =
        sqlx::query_as("select wallet_balance from schedule_configs where tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(balance, 10_000);
}
