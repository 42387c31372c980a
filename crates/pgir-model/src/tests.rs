use super::*;
use std::sync::Arc;
use std::thread;

fn param(name: &str, data_type: &str, mode: ParameterMode, position: u32) -> Parameter {
    Parameter {
        name: Some(name.into()),
        data_type: data_type.into(),
        mode,
        position,
        default: None,
    }
}

fn pk(table: &str, columns: &[&str]) -> Constraint {
    let mut c = Constraint::new("public", table, format!("{table}_pkey"), ConstraintKind::PrimaryKey);
    c.columns = ConstraintColumn::numbered(columns);
    c
}

#[test]
fn test_routine_key_uses_input_parameters_only() {
    let mut f = Function::new("public", "split");
    f.parameters = vec![
        param("input", "text", ParameterMode::In, 1),
        param("sep", "text", ParameterMode::InOut, 2),
        param("parts", "text[]", ParameterMode::Out, 3),
        param("rest", "text[]", ParameterMode::Variadic, 4),
    ];
    assert_eq!(f.key(), "split(text, text, text[])");
    assert_eq!(f.signature(), "text, text, text[]");
}

#[test]
fn test_overloads_are_distinct_entries() {
    let schema = Schema::new("public");
    let mut a = Function::new("public", "area");
    a.parameters = vec![param("r", "integer", ParameterMode::In, 1)];
    let mut b = Function::new("public", "area");
    b.parameters = vec![
        param("w", "integer", ParameterMode::In, 1),
        param("h", "integer", ParameterMode::In, 2),
    ];
    schema.put_function(a);
    schema.put_function(b);
    assert_eq!(schema.functions().len(), 2);
    assert!(schema.function("area(integer, integer)").is_some());
    assert!(schema.has_routine_named("area"));
}

#[test]
fn test_entries_rekey_keeps_order() {
    let schema = Schema::new("public");
    schema.put_function(Function::new("public", "b"));
    let mut a = Function::new("public", "a");
    a.parameters = vec![param("x", "int4", ParameterMode::In, 1)];
    schema.put_function(a);

    schema.functions_mut(|functions| {
        assert!(functions.contains_key("a(int4)"));
        functions.rekey(|f| {
            for p in &mut f.parameters {
                p.data_type = "integer".into();
            }
        });
        functions.insert(Function::new("public", "c"));
        assert_eq!(functions.len(), 3);
    });
    let keys: Vec<String> = schema.functions().iter().map(Keyed::key).collect();
    assert_eq!(keys, ["b()", "a(integer)", "c()"]);
}

#[test]
fn test_sequence_defaults_are_suppressed() {
    let mut seq = Sequence::new("public", "s");
    seq.data_type = Some("bigint".into());
    seq.min = Some(1);
    seq.max = Some(i64::MAX);
    seq.cache = Some(1);
    seq.suppress_defaults();
    assert_eq!(seq.data_type, None);
    assert_eq!((seq.min, seq.max, seq.cache), (None, None, None));

    let mut seq = Sequence::new("public", "s");
    seq.data_type = Some("integer".into());
    seq.min = Some(1);
    seq.max = Some(i32::MAX as i64);
    seq.suppress_defaults();
    assert_eq!(seq.data_type.as_deref(), Some("integer"));
    assert_eq!(seq.max, None);

    let mut seq = Sequence::new("public", "s");
    seq.data_type = Some("bigint".into());
    seq.min = Some(10);
    seq.max = Some(i64::MAX);
    seq.cache = Some(20);
    seq.suppress_defaults();
    assert_eq!(seq.data_type.as_deref(), Some("bigint"));
    assert_eq!((seq.min, seq.max, seq.cache), (Some(10), None, Some(20)));
}

#[test]
fn test_identity_bounds_follow_column_type() {
    let mut identity = Identity::new(IdentityGeneration::Always);
    identity.min = Some(1);
    identity.max = Some(i16::MAX as i64);
    identity.cache = Some(1);
    identity.suppress_defaults("smallint");
    assert_eq!(identity, Identity::new(IdentityGeneration::Always));
}

#[test]
fn test_partition_key_columns() {
    let mut table = Table::new("public", "events");
    table.partition_key = Some("tenant_id, lower(kind), created_at text_ops".into());
    assert_eq!(table.partition_key_columns(), vec!["tenant_id", "created_at"]);
}

#[test]
fn test_partition_pk_reorder() {
    let mut table = Table::new("public", "events");
    table.partition_strategy = Some(PartitionStrategy::Range);
    table.partition_key = Some("created_at".into());
    table
        .constraints
        .insert("events_pkey".into(), pk("events", &["id", "tenant_id", "created_at"]));
    let mut index = Index::new("public", "events", "events_pkey", IndexKind::Primary);
    index.columns = ["id", "tenant_id", "created_at"]
        .into_iter()
        .map(IndexColumn::new)
        .collect();
    table.indexes.insert("events_pkey".into(), index);

    let schema = Schema::new("public");
    schema.put_table(table);
    schema.reorder_partition_keys();
    let table = schema.table("events").unwrap();

    let pk = table.primary_key().unwrap();
    let names: Vec<_> = pk.columns.iter().map(|c| (c.name.as_str(), c.position)).collect();
    assert_eq!(names, vec![("created_at", 1), ("id", 2), ("tenant_id", 3)]);
    let index_cols: Vec<_> = table.indexes["events_pkey"]
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(index_cols, vec!["created_at", "id", "tenant_id"]);
}

#[test]
fn test_partitions_follow_parent_key() {
    let schema = Schema::new("public");
    let mut parent = Table::new("public", "events");
    parent.partition_strategy = Some(PartitionStrategy::List);
    parent.partition_key = Some("tenant_id".into());
    parent
        .constraints
        .insert("events_pkey".into(), pk("events", &["id", "tenant_id"]));
    let mut child = Table::new("public", "events_a");
    child.partition_of = Some(TableRef::new("public", "events"));
    child
        .constraints
        .insert("events_a_pkey".into(), pk("events_a", &["id", "tenant_id"]));
    schema.put_table(parent);
    schema.put_table(child);

    schema.reorder_partition_keys();

    for name in ["events", "events_a"] {
        let table = schema.table(name).unwrap();
        let cols = table.primary_key().unwrap().column_names();
        assert_eq!(cols, vec!["tenant_id", "id"], "{name}");
    }
}

#[test]
fn test_column_type_split() {
    let col = Column::new("price", "numeric(10,2)");
    assert_eq!(col.data_type, "numeric");
    assert_eq!((col.precision, col.scale), (Some(10), Some(2)));
    assert_eq!(col.full_type(), "numeric(10,2)");

    let col = Column::new("tags", "character varying(32)[]");
    assert_eq!(col.data_type, "varchar[]");
    assert_eq!(col.full_type(), "varchar(32)[]");
}

#[test]
fn test_model_equality_ignores_version_and_order() {
    let a = Model::new();
    let b = Model::new();
    a.set_server_version("16.2");

    let sa = a.get_or_create_schema("public");
    sa.put_table(Table::new("public", "x"));
    sa.put_table(Table::new("public", "y"));

    let sb = b.get_or_create_schema("public");
    sb.put_table(Table::new("public", "y"));
    sb.put_table(Table::new("public", "x"));

    assert_eq!(a, b);

    sb.update_table("x", |t| t.rls_enabled = true);
    assert_ne!(a, b);
}

#[test]
fn test_get_or_create_schema_is_shared_across_threads() {
    let model = Arc::new(Model::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let model = model.clone();
            thread::spawn(move || {
                let schema = model.get_or_create_schema("app");
                schema.put_table(Table::new("app", format!("t{i}")));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(model.schemas().len(), 1);
    assert_eq!(model.schema("app").unwrap().tables().len(), 8);
}

#[test]
fn test_poisoned_lock_still_readable() {
    let locked = Arc::new(Locked::new(1));
    let clone = locked.clone();
    let _ = thread::spawn(move || {
        let _guard = clone.write();
        panic!("boom");
    })
    .join();
    assert_eq!(*locked.read(), 1);
}

#[test]
fn test_index_to_sql() {
    let mut index = Index::new("public", "users", "users_lower_idx", IndexKind::Unique);
    let mut key = IndexColumn::new("lower(email)");
    key.expression = true;
    key.order = SortOrder::Desc;
    index.columns = vec![key, IndexColumn::new("Tenant")];
    index.include = vec!["id".into()];
    index.predicate = Some("deleted_at IS NULL".into());
    insta::assert_snapshot!(index.to_sql(), @r#"CREATE UNIQUE INDEX users_lower_idx ON public.users USING btree ((lower(email)) DESC, "Tenant") INCLUDE (id) WHERE deleted_at IS NULL"#);
}
