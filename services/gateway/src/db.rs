//! The gateway process only reads `dashcam_connections`/`dashcam_locations`;
//! `services/ingest` owns the schema and runs migrations at startup, so
//! there is no `migrate!` call here.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pool(database_url: &str) -> PgPool {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .expect("failed to connect to Postgres")
}
