//! Integration tests against a real Postgres instance. Skipped entirely
//! when `TEST_DATABASE_URL` isn't set, so `cargo test` stays usable
//! without a database on hand.

use dispatch_db::{connect_and_migrate, Number, Tenant};
use uuid::Uuid;

async fn test_pool() -> Option<sqlx::PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    Some(connect_and_migrate(&url).await.expect("connect and migrate"))
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    // Running connect_and_migrate a second time against the same pool's
    // URL must not error — sqlx tracks applied versions in its own table.
    let url = std::env::var("TEST_DATABASE_URL").unwrap();
    connect_and_migrate(&url).await.expect("second migrate run");
    drop(pool);
}

#[tokio::test]
async fn tenant_and_number_round_trip() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };

    let slug = format!("t-{}", Uuid::new_v4());
    let tenant: Tenant =
        sqlx::query_as("insert into tenants (slug, name) values ($1, $2) returning *")
            .bind(&slug)
            .bind("Round Trip Tenant")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(tenant.slug, slug);

    let phone = format!("09{}", &Uuid::new_v4().simple().to_string()[..9]);
    let number: Number =
        sqlx::query_as("insert into numbers (phone_number) values ($1) returning *")
            .bind(&phone)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(number.global_status, "ACTIVE");
    assert!(number.assigned_at.is_none());
}

#[tokio::test]
async fn phone_number_uniqueness_is_enforced_globally() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };

    let phone = format!("09{}", &Uuid::new_v4().simple().to_string()[..9]);
    sqlx::query("insert into numbers (phone_number) values ($1)")
        .bind(&phone)
        .execute(&pool)
        .await
        .unwrap();

    let err = sqlx::query("insert into numbers (phone_number) values ($1)")
        .bind(&phone)
        .execute(&pool)
        .await
        .unwrap_err();
    assert!(matches!(err, sqlx::Error::Database(_)));
}
