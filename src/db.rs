use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

use crate::error::AppError;

/// Idempotent schema, applied on every startup in place of a migration
/// runner. Every statement is IF NOT EXISTS.
pub static SCHEMA: &str = include_str!("schema.sql");

pub async fn init_pool(database_url: &str) -> Result<Pool, AppError> {
    let pool = build_pool(database_url)?;

    let client = pool.get().await?;
    client
        .batch_execute(SCHEMA)
        .await
        .map_err(|e| AppError::StartServer(format!("apply schema: {e}")))?;

    Ok(pool)
}

/// Pool construction without the schema bootstrap, shared with integration
/// tests that prepare their own database state.
pub fn build_pool(database_url: &str) -> Result<Pool, AppError> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e| AppError::Config(format!("DATABASE_URL parse: {e}")))?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(mgr)
        .max_size(16)
        .build()
        .map_err(|e| AppError::StartServer(format!("build pool: {e}")))
}
