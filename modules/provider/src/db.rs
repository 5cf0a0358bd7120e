use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Initialize the Postgres connection pool.
///
/// Pool size is fixed per the deployment baseline (min 1 / max 10); connections are recycled
/// after an hour to bound long-lived connection drift.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        .max_lifetime(Duration::from_secs(60 * 60))
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}
