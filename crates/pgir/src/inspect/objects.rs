//! Sequences, user-defined types and default privileges.

use pgir_model::{
    CompositeAttribute, DefaultPrivilege, Domain, DomainConstraint, PrivilegeObjectType, Sequence,
    SequenceOwner, Type, TypeKind,
};
use pgir_sql::qualified_name;

use super::Ctx;
use super::tables::strip_constraint_options;
use crate::ignore::ObjectKind;
use crate::{Error, Result};

/// Identity sequences belong to their column and are left out.
const SEQUENCES: &str = r#"
SELECT c.relname::text,
       pg_catalog.format_type(s.seqtypid, NULL),
       s.seqstart, s.seqincrement, s.seqmin, s.seqmax, s.seqcache, s.seqcycle,
       ot.relname::text,
       oa.attname::text,
       pg_catalog.obj_description(c.oid, 'pg_class')
FROM pg_catalog.pg_sequence s
JOIN pg_catalog.pg_class c ON c.oid = s.seqrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_depend d
       ON d.classid = 'pg_catalog.pg_class'::regclass
      AND d.objid = c.oid
      AND d.refclassid = 'pg_catalog.pg_class'::regclass
      AND d.refobjsubid > 0
      AND d.deptype = 'a'
LEFT JOIN pg_catalog.pg_class ot ON ot.oid = d.refobjid
LEFT JOIN pg_catalog.pg_attribute oa ON oa.attrelid = d.refobjid AND oa.attnum = d.refobjsubid
WHERE n.nspname = $1
  AND NOT EXISTS (
      SELECT 1 FROM pg_catalog.pg_depend i
      WHERE i.classid = 'pg_catalog.pg_class'::regclass
        AND i.objid = c.oid
        AND i.deptype = 'i')
ORDER BY c.relname
"#;

pub(super) async fn sequences(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(SEQUENCES).await?;
    let mut kept = 0usize;
    for row in &rows {
        let name: String = row.get(0);
        if ctx.is_ignored(ObjectKind::Sequence, &name) {
            tracing::debug!(sequence = %name, "ignored sequence");
            continue;
        }
        let mut sequence = Sequence::new(ctx.name(), name);
        sequence.data_type = Some(row.get(1));
        sequence.start = row.get(2);
        sequence.increment = row.get(3);
        sequence.min = Some(row.get(4));
        sequence.max = Some(row.get(5));
        sequence.cache = Some(row.get(6));
        sequence.cycle = row.get(7);
        if let (Some(table), Some(column)) =
            (row.get::<_, Option<String>>(8), row.get::<_, Option<String>>(9))
        {
            sequence.owned_by = Some(SequenceOwner { table, column });
        }
        sequence.comment = row.get(10);
        ctx.schema.put_sequence(sequence);
        kept += 1;
    }
    tracing::debug!(sequences = kept, "sequences");
    Ok(())
}

/// Filter for types created by extensions.
const NOT_FROM_EXTENSION: &str = r#"
NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_depend e
    WHERE e.classid = 'pg_catalog.pg_type'::regclass
      AND e.objid = t.oid
      AND e.deptype = 'e')
"#;

pub(super) async fn enums(ctx: Ctx) -> Result<()> {
    let sql = format!(
        r#"
        SELECT t.typname::text,
               ARRAY(SELECT e.enumlabel::text FROM pg_catalog.pg_enum e
                     WHERE e.enumtypid = t.oid ORDER BY e.enumsortorder),
               pg_catalog.obj_description(t.oid, 'pg_type')
        FROM pg_catalog.pg_type t
        JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname = $1 AND t.typtype = 'e' AND {NOT_FROM_EXTENSION}
        ORDER BY t.typname
        "#
    );
    let rows = ctx.query(&sql).await?;
    for row in &rows {
        put_type(&ctx, row.get(0), TypeKind::Enum(row.get(1)), row.get(2));
    }
    Ok(())
}

pub(super) async fn composites(ctx: Ctx) -> Result<()> {
    let sql = format!(
        r#"
        SELECT t.typname::text,
               ARRAY(SELECT a.attname::text FROM pg_catalog.pg_attribute a
                     WHERE a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
                     ORDER BY a.attnum),
               ARRAY(SELECT pg_catalog.format_type(a.atttypid, a.atttypmod)
                     FROM pg_catalog.pg_attribute a
                     WHERE a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
                     ORDER BY a.attnum),
               pg_catalog.obj_description(t.oid, 'pg_type')
        FROM pg_catalog.pg_type t
        JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
        JOIN pg_catalog.pg_class c ON c.oid = t.typrelid
        WHERE n.nspname = $1 AND t.typtype = 'c' AND c.relkind = 'c' AND {NOT_FROM_EXTENSION}
        ORDER BY t.typname
        "#
    );
    let rows = ctx.query(&sql).await?;
    for row in &rows {
        let names: Vec<String> = row.get(1);
        let types: Vec<String> = row.get(2);
        let attributes = names
            .into_iter()
            .zip(types)
            .map(|(name, data_type)| CompositeAttribute { name, data_type })
            .collect();
        put_type(&ctx, row.get(0), TypeKind::Composite(attributes), row.get(3));
    }
    Ok(())
}

pub(super) async fn domains(ctx: Ctx) -> Result<()> {
    let sql = format!(
        r#"
        SELECT t.typname::text,
               pg_catalog.format_type(t.typbasetype, t.typtypmod),
               t.typnotnull,
               t.typdefault,
               CASE WHEN t.typcollation <> bt.typcollation THEN cn.nspname::text END,
               CASE WHEN t.typcollation <> bt.typcollation THEN co.collname::text END,
               ARRAY(SELECT con.conname::text FROM pg_catalog.pg_constraint con
                     WHERE con.contypid = t.oid AND con.contype = 'c' ORDER BY con.conname),
               ARRAY(SELECT pg_catalog.pg_get_constraintdef(con.oid) FROM pg_catalog.pg_constraint con
                     WHERE con.contypid = t.oid AND con.contype = 'c' ORDER BY con.conname),
               pg_catalog.obj_description(t.oid, 'pg_type')
        FROM pg_catalog.pg_type t
        JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
        JOIN pg_catalog.pg_type bt ON bt.oid = t.typbasetype
        LEFT JOIN pg_catalog.pg_collation co ON co.oid = t.typcollation
        LEFT JOIN pg_catalog.pg_namespace cn ON cn.oid = co.collnamespace
        WHERE n.nspname = $1 AND t.typtype = 'd' AND {NOT_FROM_EXTENSION}
        ORDER BY t.typname
        "#
    );
    let rows = ctx.query(&sql).await?;
    for row in &rows {
        let names: Vec<String> = row.get(6);
        let checks: Vec<String> = row.get(7);
        let constraints = names
            .into_iter()
            .zip(checks)
            .map(|(name, check)| DomainConstraint {
                name,
                check_clause: strip_constraint_options(&check).to_string(),
            })
            .collect();
        let collation = match (row.get::<_, Option<String>>(4), row.get::<_, Option<String>>(5)) {
            (Some(schema), Some(name)) => Some(qualified_name(&schema, &name)),
            _ => None,
        };
        let domain = Domain {
            base_type: row.get(1),
            not_null: row.get(2),
            default: row.get(3),
            collation,
            constraints,
        };
        put_type(&ctx, row.get(0), TypeKind::Domain(domain), row.get(8));
    }
    Ok(())
}

fn put_type(ctx: &Ctx, name: String, kind: TypeKind, comment: Option<String>) {
    if ctx.is_ignored(ObjectKind::Type, &name) {
        tracing::debug!(r#type = %name, "ignored type");
        return;
    }
    ctx.schema.put_type(Type {
        schema: ctx.name().to_string(),
        name,
        kind,
        comment,
    });
}

const DEFAULT_PRIVILEGES: &str = r#"
SELECT d.defaclobjtype::text,
       a.grantee = 0,
       r.rolname::text,
       a.privilege_type,
       a.is_grantable
FROM pg_catalog.pg_default_acl d
JOIN pg_catalog.pg_namespace n ON n.oid = d.defaclnamespace
CROSS JOIN LATERAL pg_catalog.aclexplode(d.defaclacl) a
LEFT JOIN pg_catalog.pg_roles r ON r.oid = a.grantee
WHERE n.nspname = $1
ORDER BY 1, 3, 4
"#;

pub(super) async fn default_privileges(ctx: Ctx) -> Result<()> {
    let rows = ctx.query(DEFAULT_PRIVILEGES).await?;
    for row in &rows {
        let code: String = row.get(0);
        let Some(object_type) = PrivilegeObjectType::from_catalog(&code) else {
            tracing::debug!(code = %code, "unknown default privilege object type");
            continue;
        };
        let grantee = if row.get::<_, bool>(1) {
            "PUBLIC".to_string()
        } else {
            row.get::<_, Option<String>>(2).ok_or_else(|| {
                Error::permission_denied(
                    format!("default privileges in schema {}", ctx.name()),
                    "grantee role is not visible to this user",
                )
            })?
        };
        ctx.schema.add_default_privilege(DefaultPrivilege {
            object_type,
            grantee,
            privileges: vec![row.get(3)],
            grantable: row.get(4),
        });
    }
    tracing::debug!(entries = rows.len(), "default privileges");
    Ok(())
}
