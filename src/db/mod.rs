pub mod models;
pub mod pool;
pub mod repository;
pub mod transaction;

pub use pool::{PoolManager, PoolSettings};
pub use transaction::{ConnectionSource, TransactionalConnection, run_in_transaction};

use crate::error::DbError;

/// Applies the embedded migrations, creating the pool if needed.
pub async fn run_migrations(manager: &PoolManager) -> anyhow::Result<()> {
    tracing::info!("Running database migrations");

    let pool = manager.get_pool()?;
    sqlx::migrate!("./migrations").run(pool).await?;

    tracing::info!("Database migrations applied");

    Ok(())
}

/// Round-trips a trivial query through the transaction executor.
pub async fn ping(manager: &PoolManager) -> Result<(), DbError> {
    run_in_transaction(manager, |conn| {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&mut **conn).await?;
            Ok::<_, DbError>(())
        })
    })
    .await
}
