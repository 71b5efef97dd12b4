use sqlx::postgres::{PgPoolOptions, PgPool};

/// Open the pool and run pending migrations. This is the only place the
/// schema is touched; there is no on-import DDL hotfixing anywhere else
/// in the workspace.
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");
    Ok(pool)
}
