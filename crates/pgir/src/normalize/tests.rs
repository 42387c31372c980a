use pgir_model::{
    Constraint, ConstraintKind, IndexColumn, IndexKind, NullsOrder, ParameterMode,
    PrivilegeObjectType, SortOrder,
};
use proptest::prelude::*;

use super::*;

fn orders(status_check: &str, index_expr: &str, default: &str) -> Table {
    let mut table = Table::new("public", "orders");
    table.add_column(Column::new("id", "int4"));
    let mut status = Column::new("status", "character varying(20)");
    status.default = Some(default.to_string());
    table.add_column(status);
    table.add_column(Column::new("email", "varchar"));

    let mut check = Constraint::new("public", "orders", "orders_status_check", ConstraintKind::Check);
    check.check_clause = Some(status_check.to_string());
    table.constraints.insert(check.name.clone(), check);

    let mut index = Index::new("public", "orders", "orders_email_idx", IndexKind::Regular);
    let mut column = IndexColumn::new(index_expr);
    column.expression = true;
    column.order = SortOrder::Desc;
    column.nulls = NullsOrder::First;
    index.columns.push(column);
    index.is_expression = true;
    table.indexes.insert(index.name.clone(), index);
    table
}

fn model_with(table: Table, function: Function) -> Model {
    let model = Model::new();
    let schema = model.get_or_create_schema("public");
    schema.put_table(table);
    schema.put_function(function);
    model
}

fn count_fn(param_type: &str, returns: &str) -> Function {
    let mut f = Function::new("public", "count_orders");
    f.language = "SQL".into();
    f.definition = "\n  select count(*) from orders;   \n".into();
    f.return_type = returns.into();
    f.parameters = vec![Parameter {
        name: Some("since".into()),
        data_type: param_type.into(),
        mode: ParameterMode::In,
        position: 1,
        default: None,
    }];
    f
}

#[test]
fn test_catalog_and_ddl_spellings_agree() {
    let catalog = model_with(
        orders(
            "CHECK (((status)::text = ANY ((ARRAY['new'::character varying, 'paid'::character varying])::text[])))",
            "lower((email)::text)",
            "'new'::character varying",
        ),
        count_fn("int4", "SETOF public.orders"),
    );
    let ddl = model_with(
        orders("CHECK (status IN ('new', 'paid'))", "lower(email)", "'new'"),
        count_fn("integer", "setof orders"),
    );
    assert_ne!(catalog, ddl);

    normalize(&catalog);
    normalize(&ddl);
    assert_eq!(catalog, ddl);

    let schema = catalog.schema("public").unwrap();
    let table = schema.table("orders").unwrap();
    insta::assert_snapshot!(
        table.constraints["orders_status_check"].check_clause.as_deref().unwrap(),
        @"CHECK (status IN ('new', 'paid'))"
    );
    let index = &table.indexes["orders_email_idx"];
    assert_eq!(index.columns[0].name, "lower(email)");
    assert_eq!(index.columns[0].nulls, NullsOrder::Default);
    assert_eq!(table.column("id").unwrap().data_type, "integer");
    assert_eq!(table.column("status").unwrap().max_length, Some(20));

    let function = schema.function("count_orders(integer)").unwrap();
    assert_eq!(function.return_type, "SETOF orders");
    assert_eq!(function.language, "sql");
    assert_eq!(function.definition, "\n  select count(*) from orders;\n");
}

#[test]
fn test_plain_column_index_expression() {
    let mut index = Index::new("public", "t", "t_a_idx", IndexKind::Regular);
    let mut column = IndexColumn::new("(a)");
    column.expression = true;
    index.columns.push(column);
    index.is_expression = true;
    normalize_index(&mut index, &ExprContext::new("public"));
    assert_eq!(index.columns[0].name, "a");
    assert!(!index.columns[0].expression);
    assert!(!index.is_expression);
}

#[test]
fn test_identity_columns() {
    use pgir_model::{Identity, IdentityGeneration};

    let mut table = Table::new("public", "t");
    let mut id = Column::new("id", "int2");
    let mut identity = Identity::new(IdentityGeneration::Always);
    identity.min = Some(1);
    identity.max = Some(i16::MAX as i64);
    identity.cache = Some(1);
    id.identity = Some(identity);
    table.add_column(id);
    normalize_table(&mut table, "public");

    let id = table.column("id").unwrap();
    assert!(!id.nullable);
    let identity = id.identity.as_ref().unwrap();
    assert_eq!((identity.min, identity.max, identity.cache), (None, None, None));
}

#[test]
fn test_default_privileges_merge() {
    let grant = |grantee: &str, privileges: &[&str]| DefaultPrivilege {
        object_type: PrivilegeObjectType::Tables,
        grantee: grantee.into(),
        privileges: privileges.iter().map(|p| p.to_string()).collect(),
        grantable: false,
    };
    let mut entries = vec![
        grant("reporting", &["select"]),
        grant("app", &["UPDATE", "DELETE", "INSERT", "SELECT", "TRUNCATE", "MAINTAIN"]),
        grant("app", &["REFERENCES", "TRIGGER"]),
        grant("reporting", &["SELECT"]),
    ];
    normalize_default_privileges(&mut entries);

    let rendered: Vec<String> = entries
        .iter()
        .map(|e| format!("{} {}", e.grantee, e.privileges.join(",")))
        .collect();
    insta::assert_debug_snapshot!(rendered, @r#"
    [
        "app DELETE,INSERT,REFERENCES,SELECT,TRIGGER,TRUNCATE,UPDATE",
        "reporting SELECT",
    ]
    "#);
}

#[test]
fn test_return_types() {
    assert_eq!(canonical_return_type("int4", "public"), "integer");
    assert_eq!(canonical_return_type("SETOF public.orders", "public"), "SETOF orders");
    assert_eq!(
        canonical_return_type("TABLE(id int8, \"Name\" character varying)", "public"),
        "TABLE(id bigint, \"Name\" varchar)"
    );
}

#[test]
fn test_search_path() {
    assert_eq!(canonical_search_path("public,\"$user\" , pg_temp"), "public, $user, pg_temp");
}

#[test]
fn test_function_body_whitespace() {
    assert_eq!(
        normalize_body("\nbegin  \n  return 1;\t\nend;\n\n"),
        "\nbegin\n  return 1;\nend;\n\n"
    );
}

const FRAGMENTS: &[&str] = &[
    "(status)::text = ANY (ARRAY['a'::text, 'b'::text])",
    "price > (0)::numeric",
    "name ~~ 'x%'::text",
    "x BETWEEN 1 AND 2",
    "NOT (a IS DISTINCT FROM b)",
    "public.f(x)",
    "nextval('public.s'::regclass) > 0",
    "kind IN ('only')",
    "created_at > '2024-01-01'::date",
];

proptest! {
    #[test]
    fn canonical_expr_is_idempotent(
        a in prop::sample::select(FRAGMENTS),
        b in prop::sample::select(FRAGMENTS),
        c in prop::sample::select(FRAGMENTS),
        negate in any::<bool>(),
    ) {
        let not = if negate { "NOT " } else { "" };
        let text = format!("({a}) AND ({b}) OR {not}({c})");
        let ctx = ExprContext::new("public");
        let once = canonical_expr(&text, &ctx);
        let twice = canonical_expr(&once, &ctx);
        prop_assert_eq!(once, twice);
    }
}
