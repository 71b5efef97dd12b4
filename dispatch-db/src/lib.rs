//! Entities and connection management shared by every crate that talks
//! to Postgres.

pub mod models;
mod pool;

pub use pool::connect_and_migrate;
pub use sqlx::postgres::PgPool;

pub use models::*;
