//! Building a [`Model`] from a live catalog.
//!
//! Catalog reads run in phases. Within a phase every reader is its own task;
//! the phase ends when all of them have finished, or as soon as one fails.
//!
//! 1. prerequisites: server version, schema check, table list
//! 2. table details (columns, constraints, partitions), concurrently with
//!    independent objects (sequences, routines, types, default privileges)
//! 3. views, triggers and policies
//! 4. indexes, which may belong to a table or a materialized view
//!
//! The finished model is normalized before it is returned.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pgir_model::{Model, Schema};
use tokio::task::JoinSet;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::Instrument;

use crate::ignore::{IgnorePredicate, ObjectKind};
use crate::normalize::normalize;
use crate::traced::Catalog;
use crate::{Error, Result};

mod dependents;
mod objects;
mod routines;
mod tables;

/// Knobs for [`inspect`].
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Give up (and abort every catalog query in flight) after this long.
    pub timeout: Option<Duration>,
}

/// Namespaces that never hold user objects.
const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// Read the catalog of `schema` into a normalized model.
///
/// Fails with [`Error::SchemaNotFound`] when the schema does not exist or is
/// a system namespace. Any failed catalog read fails the whole build; its
/// error comes back wrapped in [`Error::Phase`].
pub async fn inspect(
    catalog: Arc<dyn Catalog>,
    schema: &str,
    ignore: Arc<dyn IgnorePredicate>,
    options: &InspectOptions,
) -> Result<Model> {
    let span = tracing::info_span!("inspect", schema);
    let build = build(catalog, schema.to_string(), ignore).instrument(span);
    let model = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, build)
            .await
            .map_err(|_| Error::Timeout(limit))??,
        None => build.await?,
    };
    normalize(&model);
    Ok(model)
}

async fn build(
    catalog: Arc<dyn Catalog>,
    schema: String,
    ignore: Arc<dyn IgnorePredicate>,
) -> Result<Model> {
    let model = Model::new();
    let ignored_tables = prerequisites(catalog.as_ref(), &model, &schema, ignore.as_ref())
        .instrument(tracing::info_span!("inspect.phase", phase = "prerequisites"))
        .await
        .map_err(|e| e.in_phase("prerequisites"))?;

    let ctx = Ctx {
        catalog,
        schema: model.get_or_create_schema(&schema),
        ignore,
        ignored_tables: Arc::new(ignored_tables),
    };

    let mut details = Phase::new("table details");
    details.spawn("columns", tables::columns, &ctx);
    details.spawn("constraints", tables::constraints, &ctx);
    details.spawn("partitions", tables::partitions, &ctx);

    let mut independent = Phase::new("independent objects");
    independent.spawn("sequences", objects::sequences, &ctx);
    independent.spawn("functions", routines::functions, &ctx);
    independent.spawn("aggregates", routines::aggregates, &ctx);
    independent.spawn("enums", objects::enums, &ctx);
    independent.spawn("composites", objects::composites, &ctx);
    independent.spawn("domains", objects::domains, &ctx);
    independent.spawn("default privileges", objects::default_privileges, &ctx);

    tokio::try_join!(details.join(), independent.join())?;

    let mut dependent = Phase::new("table-dependent objects");
    dependent.spawn("views", dependents::views, &ctx);
    dependent.spawn("triggers", dependents::triggers, &ctx);
    dependent.spawn("policies", dependents::policies, &ctx);
    dependent.join().await?;

    let mut indexes = Phase::new("indexes");
    indexes.spawn("indexes", dependents::indexes, &ctx);
    indexes.join().await?;

    ctx.schema.reorder_partition_keys();
    Ok(model)
}

/// Server version, schema check and the table list. Returns the names of
/// tables left out by the ignore predicate.
async fn prerequisites(
    catalog: &dyn Catalog,
    model: &Model,
    schema: &str,
    ignore: &dyn IgnorePredicate,
) -> Result<HashSet<String>> {
    let rows = catalog
        .query("SELECT current_setting('server_version')", &[])
        .await?;
    if let Some(row) = rows.first() {
        model.set_server_version(row.get::<_, String>(0));
    }

    if is_system_schema(schema) {
        return Err(Error::SchemaNotFound(schema.to_string()));
    }
    let rows = catalog
        .query(
            "SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1",
            &[&schema],
        )
        .await?;
    if rows.is_empty() {
        return Err(Error::SchemaNotFound(schema.to_string()));
    }
    let target = model.get_or_create_schema(schema);

    let rows = catalog
        .query(
            r#"
            SELECT c.relname::text, c.relrowsecurity, c.relforcerowsecurity,
                   pg_catalog.obj_description(c.oid, 'pg_class')
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
            ORDER BY c.relname
            "#,
            &[&schema],
        )
        .await?;
    let mut ignored = HashSet::new();
    for row in &rows {
        let name: String = row.get(0);
        if ignore.is_ignored(ObjectKind::Table, &name) {
            tracing::debug!(table = %name, "ignored table");
            ignored.insert(name);
            continue;
        }
        let mut table = pgir_model::Table::new(schema, &name);
        table.rls_enabled = row.get(1);
        table.rls_forced = row.get(2);
        table.comment = row.get(3);
        target.put_table(table);
    }
    tracing::debug!(tables = rows.len() - ignored.len(), ignored = ignored.len(), "tables");
    Ok(ignored)
}

fn is_system_schema(schema: &str) -> bool {
    SYSTEM_SCHEMAS.contains(&schema)
        || schema.starts_with("pg_temp_")
        || schema.starts_with("pg_toast_temp_")
}

/// What every catalog reader needs. Cheap to clone into a task.
#[derive(Clone)]
pub(crate) struct Ctx {
    catalog: Arc<dyn Catalog>,
    schema: Arc<Schema>,
    ignore: Arc<dyn IgnorePredicate>,
    ignored_tables: Arc<HashSet<String>>,
}

impl Ctx {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn is_ignored(&self, kind: ObjectKind, name: &str) -> bool {
        self.ignore.is_ignored(kind, name)
    }

    /// Run `sql` with the schema name as `$1`.
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let name = self.name();
        let params: [&(dyn ToSql + Sync); 1] = [&name];
        self.catalog.query(sql, &params).await
    }
}

/// One phase: a set of catalog readers and a join barrier.
struct Phase {
    name: &'static str,
    tasks: JoinSet<Result<()>>,
}

impl Phase {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: JoinSet::new(),
        }
    }

    fn spawn<F, Fut>(&mut self, task: &'static str, reader: F, ctx: &Ctx)
    where
        F: FnOnce(Ctx) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let span = tracing::debug_span!("inspect.task", phase = self.name, task);
        self.tasks.spawn(reader(ctx.clone()).instrument(span));
    }

    /// Wait for every task; on the first error abort the rest and return it
    /// labeled with the phase.
    async fn join(mut self) -> Result<()> {
        let span = tracing::info_span!("inspect.phase", phase = self.name);
        async {
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        self.tasks.abort_all();
                        return Err(e.in_phase(self.name));
                    }
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(_) => {}
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// `Some(text)` unless the catalog gave NULL or an empty string.
fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traced::CatalogFuture;

    /// A catalog that fails every query the way a server would.
    struct Refusing;

    impl Catalog for Refusing {
        fn query<'a>(
            &'a self,
            _sql: &'a str,
            _params: &'a [&'a (dyn ToSql + Sync)],
        ) -> CatalogFuture<'a> {
            Box::pin(async { Err(Error::Connection("refused".into())) })
        }
    }

    /// A catalog that never answers.
    struct Silent;

    impl Catalog for Silent {
        fn query<'a>(
            &'a self,
            _sql: &'a str,
            _params: &'a [&'a (dyn ToSql + Sync)],
        ) -> CatalogFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    #[test]
    fn test_system_schemas() {
        assert!(is_system_schema("pg_catalog"));
        assert!(is_system_schema("information_schema"));
        assert!(is_system_schema("pg_temp_3"));
        assert!(!is_system_schema("public"));
        assert!(!is_system_schema("pg_app"));
    }

    #[tokio::test]
    async fn test_failure_is_labeled_with_phase() {
        let err = inspect(
            Arc::new(Refusing),
            "public",
            Arc::new(crate::ignore::NoIgnore),
            &InspectOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(&err, Error::Phase { phase: "prerequisites", .. }),
            "{err}"
        );
        assert!(matches!(err.root(), Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let limit = Duration::from_millis(20);
        let err = inspect(
            Arc::new(Silent),
            "public",
            Arc::new(crate::ignore::NoIgnore),
            &InspectOptions {
                timeout: Some(limit),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == limit));
    }

    #[tokio::test]
    async fn test_phase_join_aborts_on_first_error() {
        let ctx = Ctx {
            catalog: Arc::new(Silent),
            schema: Arc::new(Schema::new("public")),
            ignore: Arc::new(crate::ignore::NoIgnore),
            ignored_tables: Arc::default(),
        };
        let mut phase = Phase::new("test");
        phase.spawn("hangs", |ctx: Ctx| async move { ctx.query("SELECT 1").await.map(|_| ()) }, &ctx);
        phase.spawn("fails", |_| async { Err(Error::Config("boom".into())) }, &ctx);
        let err = phase.join().await.unwrap_err();
        assert!(matches!(&err, Error::Phase { phase: "test", .. }));
        assert!(matches!(err.root(), Error::Config(_)));
    }
}
