//! Building a [`Model`] from DDL text.
//!
//! The script is split into statements and applied in two passes: every
//! statement except `CREATE TRIGGER` first, with tables whose `LIKE` source
//! or partition parent comes later held back until it exists, then the
//! triggers. The result is normalized before it is returned.

use pgir_model::{Index, Model, TableRef, Trigger};

use crate::ignore::IgnorePredicate;
use crate::normalize::normalize;
use crate::{Error, Result};

mod ast;
mod build;
mod corpus;
mod cursor;
mod grammar;
mod split;

pub use ast::*;
pub use build::Builder;
pub(crate) use build::Routine;
pub use corpus::Corpus;
pub use grammar::parse_statement;
pub use split::split_statements;

/// Parse a DDL script into a normalized model.
///
/// Unqualified names land in `default_schema`. Objects matched by `ignore`
/// are left out; an ignored table that carries triggers stays behind as an
/// external stub holding only those triggers.
pub fn parse_sql(sql: &str, default_schema: &str, ignore: &dyn IgnorePredicate) -> Result<Model> {
    let span = tracing::info_span!("parse", schema = %default_schema);
    let _guard = span.enter();

    let statements = split_statements(sql)?;
    tracing::debug!(statements = statements.len(), "split script");

    let mut builder = Builder::new(default_schema, ignore)?;
    for statement in &statements {
        builder.apply(parse_statement(statement)?)?;
    }
    builder.resolve_deferred()?;
    builder.apply_triggers()?;

    let model = builder.finish();
    normalize(&model);
    Ok(model)
}

/// Parse every file of `corpus`.
pub fn parse_corpus(
    corpus: &Corpus,
    default_schema: &str,
    ignore: &dyn IgnorePredicate,
) -> Result<Model> {
    parse_sql(corpus.sql(), default_schema, ignore)
}

/// The index described by `pg_get_indexdef` output.
pub(crate) fn index_from_definition(definition: &str, default_schema: &str) -> Result<Index> {
    match parse_statement(definition)? {
        Statement::CreateIndex(create) => {
            let name = create
                .name
                .clone()
                .ok_or_else(|| Error::parse(definition, "index definition without a name"))?;
            let schema = create.table.schema_or(default_schema);
            Ok(build::index_from_create(schema, &create.table.name, &name, &create))
        }
        _ => Err(Error::parse(definition, "expected CREATE INDEX")),
    }
}

/// The trigger described by `pg_get_triggerdef` output.
pub(crate) fn trigger_from_definition(definition: &str, default_schema: &str) -> Result<Trigger> {
    match parse_statement(definition)? {
        Statement::CreateTrigger(create) => {
            let table = TableRef::new(create.table.schema_or(default_schema), &create.table.name);
            Ok(build::trigger_from_create(&table, create))
        }
        _ => Err(Error::parse(definition, "expected CREATE TRIGGER")),
    }
}

/// The function or procedure described by `pg_get_functiondef` output.
pub(crate) fn routine_from_definition(definition: &str, default_schema: &str) -> Result<Routine> {
    match parse_statement(definition)? {
        Statement::CreateRoutine(create) => {
            let schema = create.name.schema_or(default_schema).to_string();
            Ok(build::routine_from_create(&schema, create))
        }
        _ => Err(Error::parse(definition, "expected CREATE FUNCTION or CREATE PROCEDURE")),
    }
}

#[cfg(test)]
mod tests {
    use pgir_model::{IndexKind, SortOrder, TriggerEvent, TriggerTiming};

    use super::*;

    #[test]
    fn test_index_from_catalog_definition() {
        let index = index_from_definition(
            "CREATE UNIQUE INDEX users_lower_idx ON public.users USING btree (lower(email) DESC) WHERE (deleted_at IS NULL)",
            "public",
        )
        .unwrap();
        assert_eq!(index.name, "users_lower_idx");
        assert_eq!(index.table, "users");
        assert_eq!(index.kind, IndexKind::Unique);
        assert!(index.is_expression);
        assert_eq!(index.columns[0].order, SortOrder::Desc);
        assert_eq!(index.predicate.as_deref(), Some("(deleted_at IS NULL)"));
    }

    #[test]
    fn test_trigger_from_catalog_definition() {
        let trigger = trigger_from_definition(
            "CREATE TRIGGER audit AFTER INSERT OR UPDATE ON app.orders FOR EACH ROW EXECUTE FUNCTION app.log_change('orders')",
            "public",
        )
        .unwrap();
        assert_eq!(trigger.schema, "app");
        assert_eq!(trigger.table, "orders");
        assert_eq!(trigger.timing, TriggerTiming::After);
        assert_eq!(trigger.events, [TriggerEvent::Insert, TriggerEvent::Update]);
        assert_eq!(trigger.function, "app.log_change");
        assert_eq!(trigger.arguments, ["orders"]);
    }

    #[test]
    fn test_routine_from_catalog_definition() {
        let definition = "CREATE OR REPLACE FUNCTION app.add(a integer, b integer DEFAULT 1)
 RETURNS integer
 LANGUAGE sql
 IMMUTABLE PARALLEL SAFE
 SET search_path TO 'app', 'pg_temp'
AS $function$SELECT a + b$function$
";
        let Routine::Function(function) = routine_from_definition(definition, "public").unwrap()
        else {
            panic!("expected a function");
        };
        assert_eq!(function.schema, "app");
        assert_eq!(function.return_type, "integer");
        assert_eq!(function.definition, "SELECT a + b");
        assert_eq!(function.parameters.len(), 2);
        assert_eq!(function.parameters[1].default.as_deref(), Some("1"));
        assert_eq!(function.search_path.as_deref(), Some("app, pg_temp"));
    }

    #[test]
    fn test_definition_of_wrong_kind() {
        let err = index_from_definition("CREATE TABLE t (a int)", "public").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
