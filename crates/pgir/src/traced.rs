//! Traced catalog access.
//!
//! Every catalog query the inspector issues goes through [`Catalog`], and
//! every implementation here logs it via tracing.

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::Instrument;

use crate::Result;

/// Future returned by [`Catalog::query`].
pub type CatalogFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Row>>> + Send + 'a>>;

/// Something that can run read-only catalog queries.
///
/// Implemented for [`TracedPool`] (one pooled connection per query) and for
/// `tokio_postgres::Client` (one shared connection; concurrent queries are
/// pipelined).
pub trait Catalog: Send + Sync {
    /// Execute a query, returning all rows.
    fn query<'a>(&'a self, sql: &'a str, params: &'a [&'a (dyn ToSql + Sync)]) -> CatalogFuture<'a>;
}

/// Run `sql` on `client` inside a `db.query` debug span.
async fn traced_query(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<Row>> {
    let span = tracing::debug_span!(
        "db.query",
        sql = %sql,
        params = params.len(),
        rows = tracing::field::Empty,
    );
    let rows = client.query(sql, params).instrument(span.clone()).await?;
    span.record("rows", rows.len());
    Ok(rows)
}

/// A traced connection pool.
///
/// Wraps a `deadpool_postgres::Pool`; each query checks out its own
/// connection, so queries issued from parallel tasks run in parallel.
///
/// # Example
///
/// ```ignore
/// use pgir::{InspectOptions, NoIgnore, TracedPool};
///
/// let pool = TracedPool::new(pool);
/// let model = pgir::inspect(Arc::new(pool), "public", Arc::new(NoIgnore), &InspectOptions::default()).await?;
/// ```
#[derive(Clone)]
pub struct TracedPool {
    inner: deadpool_postgres::Pool,
}

impl TracedPool {
    /// Create a new traced pool wrapper.
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { inner: pool }
    }

    /// Get the inner pool (for cases where you need the raw pool).
    pub fn inner(&self) -> &deadpool_postgres::Pool {
        &self.inner
    }
}

impl Catalog for TracedPool {
    fn query<'a>(&'a self, sql: &'a str, params: &'a [&'a (dyn ToSql + Sync)]) -> CatalogFuture<'a> {
        Box::pin(async move {
            let conn = self.inner.get().await?;
            let client: &tokio_postgres::Client = &conn;
            traced_query(client, sql, params).await
        })
    }
}

impl Catalog for tokio_postgres::Client {
    fn query<'a>(&'a self, sql: &'a str, params: &'a [&'a (dyn ToSql + Sync)]) -> CatalogFuture<'a> {
        Box::pin(traced_query(self, sql, params))
    }
}
