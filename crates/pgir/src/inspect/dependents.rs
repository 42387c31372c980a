//! Objects that hang off tables and views: views themselves, triggers,
//! policies and indexes.

use pgir_model::{IndexKind, PolicyCommand, RlsPolicy, Table, View};

use super::Ctx;
use crate::ignore::ObjectKind;
use crate::parse::{index_from_definition, trigger_from_definition};
use crate::{Error, Result};

const VIEWS: &str = r#"
SELECT c.relname::text,
       c.relkind = 'm',
       pg_catalog.pg_get_viewdef(c.oid),
       pg_catalog.obj_description(c.oid, 'pg_class')
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relkind IN ('v', 'm')
ORDER BY c.relname
"#;

pub(super) async fn views(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(VIEWS).await?;
    for row in &rows {
        let name: String = row.get(0);
        if ctx.is_ignored(ObjectKind::View, &name) {
            tracing::debug!(view = %name, "ignored view");
            continue;
        }
        let definition: String = row.get(2);
        let mut view = View::new(ctx.name(), name, strip_terminator(&definition));
        view.materialized = row.get(1);
        view.comment = row.get(3);
        ctx.schema.put_view(view);
    }
    tracing::debug!(views = rows.len(), "views");
    Ok(())
}

/// `pg_get_viewdef` ends the query with a semicolon.
fn strip_terminator(definition: &str) -> &str {
    definition.trim_end().trim_end_matches(';').trim_end()
}

const TRIGGERS: &str = r#"
SELECT c.relname::text,
       pg_catalog.pg_get_triggerdef(t.oid)
FROM pg_catalog.pg_trigger t
JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND NOT t.tgisinternal
  AND t.tgparentid = 0
ORDER BY c.relname, t.tgname
"#;

/// Triggers on ignored tables are kept on an external stub of the table.
/// Policies and indexes of ignored tables are not.
pub(super) async fn triggers(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(TRIGGERS).await?;
    let mut triggers = Vec::with_capacity(rows.len());
    for row in &rows {
        let definition: String = row.get(1);
        triggers.push((row.get::<_, String>(0), trigger_from_definition(&definition, ctx.name())?));
    }
    let schema = ctx.name().to_string();
    ctx.schema.tables_mut(|tables| {
        for (relname, trigger) in triggers {
            if !tables.contains_key(&relname) {
                if !ctx.ignored_tables.contains(&relname) {
                    continue;
                }
                tables.insert(Table::external(&schema, &relname));
            }
            if let Some(table) = tables.get_mut(&relname) {
                table.triggers.insert(trigger.name.clone(), trigger);
            }
        }
    });
    tracing::debug!(triggers = rows.len(), "triggers");
    Ok(())
}

const POLICIES: &str = r#"
SELECT c.relname::text,
       p.polname::text,
       p.polcmd::text,
       p.polpermissive,
       ARRAY(SELECT CASE WHEN r.oid = 0 THEN 'public' ELSE ro.rolname::text END
             FROM unnest(p.polroles) AS r(oid)
             LEFT JOIN pg_catalog.pg_roles ro ON ro.oid = r.oid),
       pg_catalog.pg_get_expr(p.polqual, p.polrelid),
       pg_catalog.pg_get_expr(p.polwithcheck, p.polrelid)
FROM pg_catalog.pg_policy p
JOIN pg_catalog.pg_class c ON c.oid = p.polrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
ORDER BY c.relname, p.polname
"#;

pub(super) async fn policies(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(POLICIES).await?;
    let mut policies = Vec::with_capacity(rows.len());
    for row in &rows {
        let table: String = row.get(0);
        if ctx.ignored_tables.contains(&table) {
            continue;
        }
        let name: String = row.get(1);
        let code: String = row.get(2);
        let command = PolicyCommand::parse(&code)
            .ok_or_else(|| Error::parse(&code, format!("unknown command of policy {name}")))?;
        let roles = row
            .get::<_, Vec<Option<String>>>(4)
            .into_iter()
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| {
                Error::permission_denied(
                    format!("policy {name} on {}.{table}", ctx.name()),
                    "a role the policy applies to is not visible to this user",
                )
            })?;
        policies.push(RlsPolicy {
            schema: ctx.name().to_string(),
            table,
            name,
            command,
            permissive: row.get(3),
            roles,
            using: row.get(5),
            with_check: row.get(6),
        });
    }
    ctx.schema.tables_mut(|tables| {
        for policy in policies {
            if let Some(table) = tables.get_mut(&policy.table) {
                table.policies.insert(policy.name.clone(), policy);
            }
        }
    });
    tracing::debug!(policies = rows.len(), "policies");
    Ok(())
}

/// Partition indexes attached to a parent index are left out; they belong
/// to the parent's definition.
const INDEXES: &str = r#"
SELECT c.relname::text,
       i.indisprimary,
       pg_catalog.pg_get_indexdef(i.indexrelid),
       pg_catalog.obj_description(i.indexrelid, 'pg_class')
FROM pg_catalog.pg_index i
JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p', 'm')
  AND NOT EXISTS (
      SELECT 1 FROM pg_catalog.pg_inherits inh WHERE inh.inhrelid = i.indexrelid)
ORDER BY c.relname, i.indexrelid::regclass::text
"#;

pub(super) async fn indexes(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(INDEXES).await?;
    let mut kept = 0usize;
    for row in &rows {
        let relname: String = row.get(0);
        if ctx.ignored_tables.contains(&relname) {
            tracing::debug!(relation = %relname, "skipped index of ignored table");
            continue;
        }
        let definition: String = row.get(2);
        let mut index = index_from_definition(&definition, ctx.name())?;
        if row.get::<_, bool>(1) {
            index.kind = IndexKind::Primary;
        }
        index.comment = row.get(3);

        let name = index.name.clone();
        let attached = if ctx.schema.has_table(&relname) {
            ctx.schema
                .update_table(&relname, |t| t.indexes.insert(name.clone(), index))
                .is_some()
        } else {
            ctx.schema
                .update_view(&relname, |v| {
                    v.materialized
                        .then(|| v.indexes.insert(name.clone(), index))
                        .is_some()
                })
                .unwrap_or(false)
        };
        if attached {
            kept += 1;
        } else {
            tracing::debug!(index = %name, relation = %relname, "skipped index of ignored relation");
        }
    }
    tracing::debug!(indexes = kept, "indexes");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_terminator() {
        assert_eq!(
            strip_terminator(" SELECT users.id\n   FROM users;"),
            " SELECT users.id\n   FROM users"
        );
        assert_eq!(strip_terminator("SELECT 1"), "SELECT 1");
    }
}
