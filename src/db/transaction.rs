use crate::error::DbError;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// A live session that can open and close a transaction boundary.
///
/// Dropping the value hands the session back to wherever it came from.
#[async_trait]
pub trait TransactionalConnection: Send {
    async fn begin(&mut self) -> Result<(), sqlx::Error>;

    async fn commit(&mut self) -> Result<(), sqlx::Error>;

    async fn rollback(&mut self) -> Result<(), sqlx::Error>;

    /// Marks the session as unusable so it is closed instead of reused when
    /// dropped. Called when a transaction may still be open on it.
    fn discard(&mut self);
}

/// Something that hands out exclusive connections, usually a pool.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Connection: TransactionalConnection;

    /// Waits for a free connection.
    ///
    /// # Errors
    /// [`DbError::Configuration`] if the source cannot be set up, or
    /// [`DbError::ConnectionAcquisition`] if no connection can be obtained.
    async fn acquire(&self) -> Result<Self::Connection, DbError>;
}

/// Holds a connection while its transaction is in flight.
///
/// If the scope is dropped before the transaction has been committed or
/// rolled back (cancellation, failed rollback), the connection is discarded.
/// The connection itself is released when the scope drops, on every path.
struct TransactionScope<C: TransactionalConnection> {
    conn: C,
    settled: bool,
}

impl<C: TransactionalConnection> TransactionScope<C> {
    fn new(conn: C) -> Self {
        TransactionScope {
            conn,
            settled: false,
        }
    }

    /// Rolls back, swallowing any failure so the caller's error survives.
    async fn rollback_quietly(&mut self) {
        match self.conn.rollback().await {
            Ok(()) => {
                tracing::debug!("Transaction rolled back");
                self.settled = true;
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Rollback failed, discarding connection");
            }
        }
    }
}

impl<C: TransactionalConnection> Drop for TransactionScope<C> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Transaction did not settle, discarding connection");
            self.conn.discard();
        }
    }
}

/// Runs `work` inside a single transaction on a connection from `source`.
///
/// The connection is acquired, `BEGIN` is issued, and `work` receives
/// exclusive access to the connection. If `work` returns `Ok` the
/// transaction is committed; if it returns `Err`, or `BEGIN`/`COMMIT` fail,
/// a rollback is attempted. A failing rollback is logged and never replaces
/// the original error. The connection goes back to the source exactly once,
/// whichever way this returns, including when the returned future is dropped
/// early.
///
/// `work` must not commit, roll back, or close the connection itself.
///
/// # Errors
/// - Errors from `work` are returned unchanged.
/// - Acquisition failures and `BEGIN`/`COMMIT` failures are returned as
///   [`DbError`] converted into `E`.
///
/// # Example
/// ```rust,ignore
/// let count: i64 = run_in_transaction(&manager, |conn| {
///     Box::pin(async move {
///         let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boards")
///             .fetch_one(&mut **conn)
///             .await?;
///         Ok::<_, DbError>(row.0)
///     })
/// })
/// .await?;
/// ```
pub async fn run_in_transaction<S, F, T, E>(source: &S, work: F) -> Result<T, E>
where
    S: ConnectionSource + ?Sized,
    F: for<'c> FnOnce(&'c mut S::Connection) -> BoxFuture<'c, Result<T, E>> + Send,
    E: From<DbError>,
{
    let conn = source.acquire().await?;
    let mut scope = TransactionScope::new(conn);

    if let Err(err) = scope.conn.begin().await {
        scope.rollback_quietly().await;
        return Err(DbError::Transaction(err).into());
    }
    tracing::debug!("Transaction started");

    match work(&mut scope.conn).await {
        Ok(value) => match scope.conn.commit().await {
            Ok(()) => {
                scope.settled = true;
                tracing::debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                scope.rollback_quietly().await;
                Err(DbError::Transaction(err).into())
            }
        },
        Err(err) => {
            scope.rollback_quietly().await;
            Err(err)
        }
    }
}
