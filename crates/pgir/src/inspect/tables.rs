//! Columns, constraints and partitioning of the tables found in the
//! prerequisites phase.

use pgir_model::{
    Column, Constraint, ConstraintColumn, ConstraintKind, ForeignKeyRef, GeneratedColumn,
    Identity, IdentityGeneration, MatchType, PartitionStrategy, ReferentialAction, TableRef,
};
use pgir_sql::qualified_name;

use super::{Ctx, non_empty};
use crate::Result;

const COLUMNS: &str = r#"
SELECT c.relname::text,
       a.attname::text,
       pg_catalog.format_type(a.atttypid, a.atttypmod),
       a.attnotnull,
       pg_catalog.pg_get_expr(d.adbin, d.adrelid),
       a.attidentity::text,
       a.attgenerated::text,
       CASE WHEN a.attcollation <> t.typcollation THEN cn.nspname::text END,
       CASE WHEN a.attcollation <> t.typcollation THEN co.collname::text END,
       pg_catalog.col_description(c.oid, a.attnum),
       s.seqstart, s.seqincrement, s.seqmin, s.seqmax, s.seqcache, s.seqcycle
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
LEFT JOIN pg_catalog.pg_collation co ON co.oid = a.attcollation
LEFT JOIN pg_catalog.pg_namespace cn ON cn.oid = co.collnamespace
LEFT JOIN pg_catalog.pg_depend dep
       ON dep.refclassid = 'pg_catalog.pg_class'::regclass
      AND dep.refobjid = c.oid
      AND dep.refobjsubid = a.attnum
      AND dep.classid = 'pg_catalog.pg_class'::regclass
      AND dep.deptype = 'i'
      AND a.attidentity <> ''
LEFT JOIN pg_catalog.pg_sequence s ON s.seqrelid = dep.objid
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY c.relname, a.attnum
"#;

pub(super) async fn columns(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(COLUMNS).await?;
    let mut added = 0usize;
    ctx.schema.tables_mut(|tables| {
        for row in &rows {
            let relname: String = row.get(0);
            let Some(table) = tables.get_mut(&relname) else {
                continue;
            };
            let data_type: String = row.get(2);
            let mut column = Column::new(row.get::<_, String>(1), &data_type);
            column.nullable = !row.get::<_, bool>(3);
            let default: Option<String> = row.get(4);
            let identity: String = row.get(5);
            let generated: String = row.get(6);

            match generated.as_str() {
                "s" | "v" => {
                    column.generated = default.map(|expression| GeneratedColumn {
                        expression,
                        stored: generated == "s",
                    });
                }
                _ => column.default = default,
            }
            if let Some(generation) = identity_generation(&identity) {
                let mut spec = Identity::new(generation);
                if let Some(start) = row.get::<_, Option<i64>>(10) {
                    spec.start = start;
                }
                if let Some(increment) = row.get::<_, Option<i64>>(11) {
                    spec.increment = increment;
                }
                spec.min = row.get(12);
                spec.max = row.get(13);
                spec.cache = row.get(14);
                spec.cycle = row.get::<_, Option<bool>>(15).unwrap_or(false);
                column.identity = Some(spec);
            }
            if let (Some(schema), Some(name)) =
                (row.get::<_, Option<String>>(7), row.get::<_, Option<String>>(8))
            {
                column.collation = Some(qualified_name(&schema, &name));
            }
            column.comment = row.get(9);
            table.add_column(column);
            added += 1;
        }
    });
    tracing::debug!(columns = added, "columns");
    Ok(())
}

fn identity_generation(code: &str) -> Option<IdentityGeneration> {
    match code {
        "a" => Some(IdentityGeneration::Always),
        "d" => Some(IdentityGeneration::ByDefault),
        _ => None,
    }
}

const CONSTRAINTS: &str = r#"
SELECT c.relname::text,
       con.conname::text,
       con.contype::text,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       fn.nspname::text,
       fc.relname::text,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       con.confdeltype::text,
       con.confupdtype::text,
       con.confmatchtype::text,
       con.convalidated,
       con.condeferrable,
       con.condeferred,
       pg_catalog.pg_get_constraintdef(con.oid),
       pg_catalog.obj_description(con.oid, 'pg_constraint')
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_class fc ON fc.oid = con.confrelid
LEFT JOIN pg_catalog.pg_namespace fn ON fn.oid = fc.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND con.contype IN ('p', 'u', 'c', 'f', 'x')
  AND (con.contype IN ('p', 'u', 'x') OR (con.conislocal AND con.conparentid = 0))
ORDER BY c.relname, con.conname
"#;

pub(super) async fn constraints(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(CONSTRAINTS).await?;
    let schema = ctx.name().to_string();
    ctx.schema.tables_mut(|tables| {
        for row in &rows {
            let relname: String = row.get(0);
            let Some(table) = tables.get_mut(&relname) else {
                continue;
            };
            let contype: String = row.get(2);
            let Some(kind) = ConstraintKind::from_catalog(&contype) else {
                continue;
            };
            let mut constraint = Constraint::new(&schema, &relname, row.get::<_, String>(1), kind);
            let definition: String = row.get(13);

            match kind {
                ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
                    constraint.columns = ConstraintColumn::numbered(&row.get::<_, Vec<String>>(3));
                }
                ConstraintKind::ForeignKey => {
                    constraint.columns = ConstraintColumn::numbered(&row.get::<_, Vec<String>>(3));
                    let (Some(target_schema), Some(target_table)) =
                        (row.get::<_, Option<String>>(4), row.get::<_, Option<String>>(5))
                    else {
                        continue;
                    };
                    constraint.foreign_key = Some(ForeignKeyRef {
                        schema: target_schema,
                        table: target_table,
                        columns: ConstraintColumn::numbered(&row.get::<_, Vec<String>>(6)),
                        on_delete: ReferentialAction::from_catalog(&row.get::<_, String>(7)),
                        on_update: ReferentialAction::from_catalog(&row.get::<_, String>(8)),
                        match_type: MatchType::from_catalog(&row.get::<_, String>(9)),
                    });
                }
                ConstraintKind::Check => {
                    constraint.check_clause = Some(strip_constraint_options(&definition).to_string());
                }
                ConstraintKind::Exclusion => {
                    constraint.exclusion = Some(strip_constraint_options(&definition).to_string());
                }
            }
            constraint.valid = row.get(10);
            constraint.deferrable = row.get(11);
            constraint.initially_deferred = row.get(12);
            constraint.comment = row.get(14);
            table.constraints.insert(constraint.name.clone(), constraint);
        }
    });
    tracing::debug!(constraints = rows.len(), "constraints");
    Ok(())
}

/// Trailing options `pg_get_constraintdef` appends to a `CHECK` or
/// `EXCLUDE` definition; the model keeps them in separate fields.
const CONSTRAINT_OPTIONS: &[&str] = &[
    " NOT VALID",
    " NO INHERIT",
    " INITIALLY DEFERRED",
    " INITIALLY IMMEDIATE",
    " NOT DEFERRABLE",
    " DEFERRABLE",
];

pub(super) fn strip_constraint_options(definition: &str) -> &str {
    let mut text = definition.trim_end();
    while let Some(rest) = CONSTRAINT_OPTIONS
        .iter()
        .find_map(|option| text.strip_suffix(option))
    {
        text = rest.trim_end();
    }
    text
}

const PARTITIONS: &str = r#"
SELECT c.relname::text,
       CASE WHEN c.relkind = 'p' THEN pg_catalog.pg_get_partkeydef(c.oid) END,
       pn.nspname::text,
       pc.relname::text,
       CASE WHEN c.relispartition THEN pg_catalog.pg_get_expr(c.relpartbound, c.oid) END
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_inherits i ON c.relispartition AND i.inhrelid = c.oid
LEFT JOIN pg_catalog.pg_class pc ON pc.oid = i.inhparent
LEFT JOIN pg_catalog.pg_namespace pn ON pn.oid = pc.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND (c.relkind = 'p' OR c.relispartition)
ORDER BY c.relname
"#;

pub(super) async fn partitions(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(PARTITIONS).await?;
    ctx.schema.tables_mut(|tables| {
        for row in &rows {
            let relname: String = row.get(0);
            let Some(table) = tables.get_mut(&relname) else {
                continue;
            };
            if let Some((strategy, key)) = row
                .get::<_, Option<String>>(1)
                .as_deref()
                .and_then(split_partition_key)
            {
                table.partition_strategy = Some(strategy);
                table.partition_key = Some(key);
            }
            if let (Some(schema), Some(parent)) =
                (row.get::<_, Option<String>>(2), row.get::<_, Option<String>>(3))
            {
                table.partition_of = Some(TableRef::new(schema, parent));
                table.partition_bound = non_empty(row.get(4));
            }
        }
    });
    tracing::debug!(tables = rows.len(), "partitioning");
    Ok(())
}

/// `RANGE (created_at)` into its strategy and the key inside the parens.
fn split_partition_key(definition: &str) -> Option<(PartitionStrategy, String)> {
    let (word, rest) = definition.trim().split_once(char::is_whitespace)?;
    let strategy = PartitionStrategy::parse(word)?;
    let key = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
    Some((strategy, key.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_constraint_options() {
        assert_eq!(
            strip_constraint_options("CHECK ((price > 0)) NOT VALID"),
            "CHECK ((price > 0))"
        );
        assert_eq!(
            strip_constraint_options("CHECK ((qty >= 0)) NO INHERIT NOT VALID"),
            "CHECK ((qty >= 0))"
        );
        assert_eq!(
            strip_constraint_options(
                "EXCLUDE USING gist (room WITH =, during WITH &&) DEFERRABLE INITIALLY DEFERRED"
            ),
            "EXCLUDE USING gist (room WITH =, during WITH &&)"
        );
        assert_eq!(strip_constraint_options("CHECK (ok)"), "CHECK (ok)");
    }

    #[test]
    fn test_split_partition_key() {
        assert_eq!(
            split_partition_key("RANGE (created_at)"),
            Some((PartitionStrategy::Range, "created_at".to_string()))
        );
        assert_eq!(
            split_partition_key("LIST (region, lower(name))"),
            Some((PartitionStrategy::List, "region, lower(name)".to_string()))
        );
        assert_eq!(split_partition_key("HASH id"), None);
        assert_eq!(split_partition_key("BOGUS (id)"), None);
    }

    #[test]
    fn test_identity_generation() {
        assert_eq!(identity_generation("a"), Some(IdentityGeneration::Always));
        assert_eq!(identity_generation("d"), Some(IdentityGeneration::ByDefault));
        assert_eq!(identity_generation(""), None);
    }
}
