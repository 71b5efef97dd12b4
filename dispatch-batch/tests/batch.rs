//! Integration tests against a real Postgres instance. Skipped entirely
//! when `TEST_DATABASE_URL` isn't set, so `cargo test` stays usable
//! without a database on hand.

use dispatch_batch::fetch_next_batch;
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

/// Seeds a tenant that is always callable: funded wallet, enabled, holiday
/// skipping off, and a window spanning the full day on every weekday.
async fn seed_open_tenant(pool: &sqlx::PgPool) -> Uuid {
    let (tenant_id,): (Uuid,) =
        sqlx::query_as("insert into tenants (slug, name) values ($1, $1) returning id")
            .bind(format!("t-{}", Uuid::new_v4()))
            .fetch_one(pool)
            .await
            .unwrap();

    let (config_id,): (Uuid,) = sqlx::query_as(
        "insert into schedule_configs (tenant_id, enabled, skip_holidays, wallet_balance) \
         values ($1, true, false, 100000) returning id",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await
    .unwrap();

    for weekday in 0..7i16 {
        sqlx::query(
            "insert into schedule_windows (schedule_config_id, weekday, start_minute, end_minute) \
             values ($1, $2, 0, 1440)",
        )
        .bind(config_id)
        .bind(weekday)
        .execute(pool)
        .await
        .unwrap();
    }

    sqlx::query("insert into outbound_lines (tenant_id, phone_number) values ($1, '0900000001')")
        .bind(tenant_id)
        .execute(pool)
        .await
        .unwrap();

    tenant_id
}

async fn seed_number(pool: &sqlx::PgPool) -> Uuid {
    let phone = format!("09{}", &Uuid::new_v4().simple().to_string()[..9]);
    let (id,): (Uuid,) = sqlx::query_as("insert into numbers (phone_number) values ($1) returning id")
        .bind(phone)
        .fetch_one(pool)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn claims_a_requested_size_and_locks_the_numbers() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_open_tenant(&pool).await;
    for _ in 0..3 {
        seed_number(&pool).await;
    }

    let outcome = fetch_next_batch(&pool, tenant_id, Some(2), None, 10, 500, 1, 60, 120, 900)
        .await
        .unwrap();

    assert!(outcome.call_allowed);
    let batch = outcome.batch.expect("batch present");
    assert_eq!(batch.size_returned, 2);
    assert_eq!(batch.numbers.len(), 2);
    assert_eq!(batch.batch_id.len(), 32);
}

#[tokio::test]
async fn a_claimed_number_is_not_claimable_again_until_reclaimed() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_a = seed_open_tenant(&pool).await;
    let tenant_b = seed_open_tenant(&pool).await;
    seed_number(&pool).await;

    let first = fetch_next_batch(&pool, tenant_a, Some(1), None, 10, 500, 1, 60, 120, 900)
        .await
        .unwrap();
    assert_eq!(first.batch.unwrap().size_returned, 1);

    let second = fetch_next_batch(&pool, tenant_b, Some(1), None, 10, 500, 1, 60, 120, 900)
        .await
        .unwrap();
    assert_eq!(second.batch.unwrap().size_returned, 0);
}

#[tokio::test]
async fn an_exhausted_wallet_denies_the_claim() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let tenant_id = seed_open_tenant(&pool).await;
    sqlx::query("update schedule_configs set wallet_balance = 0 where tenant_id = $1")
        .bind(tenant_id)
        .execute(&pool)
        .await
        .unwrap();

    let outcome = fetch_next_batch(&pool, tenant_id, Some(1), None, 10, 500, 1, 60, 120, 900)
        .await
        .unwrap();

    assert!(!outcome.call_allowed);
    assert_eq!(outcome.reason, Some("insufficient_funds"));
    assert!(outcome.batch.is_none());
}
