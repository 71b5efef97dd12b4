//! Integration tests against a real Postgres instance. Skipped entirely
//! when `TEST_DATABASE_URL` isn't set, so `cargo test` stays usable
//! without a database on hand.

use dispatch_billing::{charge_for_connected_call, current_balance, manual_adjust, AdjustOp};
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
    sqlx::query("insert into schedule_configs (tenant_id) values ($1)")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn ledger_balance_tracks_charges_and_credits() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_tenant(&pool).await;

    manual_adjust(&pool, tenant_id, 1_000, AdjustOp::Add, "initial top-up", None)
        .await
        .unwrap();
    assert_eq!(current_balance(&pool, tenant_id).await.unwrap(), 1_000);

    sqlx::query("update schedule_configs set default_cost_per_connected = 300 where tenant_id = $1")
        .bind(tenant_id)
        .execute(&pool)
        .await
        .unwrap();

    let txn = charge_for_connected_call(&pool, tenant_id, None)
        .await
        .unwrap()
        .expect("charge should apply");
    assert_eq!(txn.balance_after, 700);
    assert_eq!(current_balance(&pool, tenant_id).await.unwrap(), 700);
}

#[tokio::test]
async fn exhausting_the_wallet_disables_the_dialer() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_tenant(&pool).await;
    sqlx::query("update schedule_configs set default_cost_per_connected = 100 where tenant_id = $1")
        .bind(tenant_id)
        .execute(&pool)
        .await
        .unwrap();

    manual_adjust(&pool, tenant_id, 100, AdjustOp::Add, "seed", None)
        .await
        .unwrap();
    charge_for_connected_call(&pool, tenant_id, None)
        .await
        .unwrap();

    let (disabled,): (bool,) =
        sqlx::query_as("select disabled_by_dialer from schedule_configs where tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(disabled);
}

#[tokio::test]
async fn manual_adjust_rejects_a_negative_result() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_tenant(&pool).await;
    let err = manual_adjust(&pool, tenant_id, 50, AdjustOp::Subtract, "oops", None)
        .await
        .unwrap_err();
    assert!(matches!(err, dispatch_core::CoreError::Conflict(_)));
}
