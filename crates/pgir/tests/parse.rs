//! DDL scripts in, normalized models out. No database needed.

use camino::Utf8PathBuf;
use pgir::{
    Corpus, Error, IgnoreConfig, IndexKind, NoIgnore, PolicyCommand, parse_corpus, parse_sql,
};

#[test]
fn test_spellings_of_one_schema_parse_equal() {
    let written = parse_sql(
        r#"
        CREATE TABLE orders (
            id integer PRIMARY KEY,
            status varchar(20) NOT NULL DEFAULT 'new' CHECK (status IN ('new', 'paid')),
            email varchar
        );
        CREATE INDEX orders_email_idx ON orders (lower(email));
        CREATE FUNCTION count_orders(since integer) RETURNS SETOF orders
            LANGUAGE sql AS $$select count(*) from orders$$;
        "#,
        "public",
        &NoIgnore,
    )
    .unwrap();

    let dumped = parse_sql(
        r#"
        CREATE TABLE public.orders (
            id int4 NOT NULL,
            status character varying(20) DEFAULT 'new'::character varying NOT NULL,
            email character varying,
            CONSTRAINT orders_status_check CHECK (((status)::text = ANY ((ARRAY['new'::character varying, 'paid'::character varying])::text[]))),
            CONSTRAINT orders_pkey PRIMARY KEY (id)
        );
        CREATE INDEX orders_email_idx ON public.orders USING btree (lower((email)::text));
        CREATE OR REPLACE FUNCTION public.count_orders(since int4) RETURNS SETOF public.orders
            LANGUAGE SQL AS 'select count(*) from orders';
        "#,
        "public",
        &NoIgnore,
    )
    .unwrap();

    assert_eq!(written, dumped);

    let schema = written.schema("public").unwrap();
    let orders = schema.table("orders").unwrap();
    assert_eq!(orders.indexes["orders_pkey"].kind, IndexKind::Primary);
    assert!(!orders.column("id").unwrap().nullable);
    assert!(schema.function("count_orders(integer)").is_some());
}

#[test]
fn test_statement_order_does_not_matter() {
    let backwards = parse_sql(
        r#"
        CREATE TRIGGER audit AFTER INSERT ON orders
            FOR EACH ROW EXECUTE FUNCTION log_change();
        CREATE TABLE archive (LIKE orders INCLUDING ALL);
        CREATE TABLE orders (id bigint PRIMARY KEY, note text);
        CREATE FUNCTION log_change() RETURNS trigger
            LANGUAGE plpgsql AS $$BEGIN RETURN NEW; END$$;
        "#,
        "public",
        &NoIgnore,
    )
    .unwrap();

    let forwards = parse_sql(
        r#"
        CREATE FUNCTION log_change() RETURNS trigger
            LANGUAGE plpgsql AS $$BEGIN RETURN NEW; END$$;
        CREATE TABLE orders (id bigint PRIMARY KEY, note text);
        CREATE TABLE archive (LIKE orders INCLUDING ALL);
        CREATE TRIGGER audit AFTER INSERT ON orders
            FOR EACH ROW EXECUTE FUNCTION log_change();
        "#,
        "public",
        &NoIgnore,
    )
    .unwrap();

    assert_eq!(backwards, forwards);
    let schema = forwards.schema("public").unwrap();
    assert!(schema.table("orders").unwrap().triggers.contains_key("audit"));
    assert_eq!(schema.table("archive").unwrap().columns.len(), 2);
}

#[test]
fn test_other_schemas() {
    let model = parse_sql(
        r#"
        CREATE SCHEMA app;
        CREATE TABLE app.users (id bigint PRIMARY KEY);
        CREATE TABLE events (user_id bigint REFERENCES app.users);
        "#,
        "public",
        &NoIgnore,
    )
    .unwrap();

    let users = model.schema("app").unwrap().table("users").unwrap();
    assert_eq!(users.schema, "app");
    let events = model.schema("public").unwrap().table("events").unwrap();
    let fk = events.constraints["events_user_id_fkey"]
        .foreign_key
        .as_ref()
        .unwrap();
    assert_eq!((fk.schema.as_str(), fk.table.as_str()), ("app", "users"));
    assert_eq!(fk.columns[0].name, "id");
}

#[test]
fn test_policies_and_comments() {
    let model = parse_sql(
        r#"
        CREATE TABLE documents (id bigint, owner name);
        ALTER TABLE documents ENABLE ROW LEVEL SECURITY;
        CREATE POLICY own ON documents USING (owner = current_user);
        COMMENT ON TABLE documents IS 'shared files';
        COMMENT ON COLUMN documents.owner IS 'login name';
        "#,
        "public",
        &NoIgnore,
    )
    .unwrap();

    let documents = model.schema("public").unwrap().table("documents").unwrap();
    assert!(documents.rls_enabled);
    assert!(!documents.rls_forced);
    assert_eq!(documents.comment.as_deref(), Some("shared files"));
    assert_eq!(
        documents.column("owner").unwrap().comment.as_deref(),
        Some("login name")
    );
    let policy = &documents.policies["own"];
    assert_eq!(policy.command, PolicyCommand::All);
    assert!(policy.permissive);
    assert_eq!(policy.roles, ["PUBLIC"]);
    assert_eq!(policy.using.as_deref(), Some("(owner = CURRENT_USER)"));
}

#[test]
fn test_ignored_tables_keep_their_triggers() {
    let ignore = IgnoreConfig::parse(
        r#"
        [tables]
        patterns = ["audit_*"]
        "#,
    )
    .unwrap();
    let model = parse_sql(
        r#"
        CREATE TABLE users (id bigint);
        CREATE TABLE audit_log (id bigint PRIMARY KEY, entry text);
        CREATE INDEX audit_log_entry_idx ON audit_log (entry);
        CREATE TABLE audit_quiet (id bigint);
        CREATE FUNCTION stamp() RETURNS trigger LANGUAGE plpgsql AS $$BEGIN RETURN NEW; END$$;
        CREATE TRIGGER stamp BEFORE INSERT ON audit_log FOR EACH ROW EXECUTE FUNCTION stamp();
        CREATE POLICY audit_readers ON audit_log USING (true);
        "#,
        "public",
        &ignore,
    )
    .unwrap();

    let schema = model.schema("public").unwrap();
    assert!(!schema.table("users").unwrap().external);
    assert!(schema.table("audit_quiet").is_none());
    let audit = schema.table("audit_log").unwrap();
    assert!(audit.external);
    assert!(audit.columns.is_empty());
    assert!(audit.constraints.is_empty());
    assert!(audit.indexes.is_empty());
    assert!(audit.policies.is_empty());
    assert!(audit.triggers.contains_key("stamp"));
}

#[test]
fn test_unresolved_like_source() {
    let err = parse_sql("CREATE TABLE copy (LIKE nowhere);", "public", &NoIgnore).unwrap_err();
    assert!(
        matches!(&err, Error::UnresolvedReference { kind: "table", name } if name == "public.nowhere"),
        "{err}"
    );
}

#[test]
fn test_syntax_error() {
    let err = parse_sql("CREATE TABLE t (a int,", "public", &NoIgnore).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }), "{err}");
}

#[test]
fn test_corpus_with_includes() {
    let dir = Utf8PathBuf::from(std::env::temp_dir().to_string_lossy().into_owned())
        .join(format!("pgir-parse-corpus-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("tables")).unwrap();
    std::fs::write(
        dir.join("schema.sql"),
        "\\i tables/users.sql\nCREATE INDEX users_email_idx ON users (email);\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("tables/users.sql"),
        "CREATE TABLE users (id bigint PRIMARY KEY, email text);\n",
    )
    .unwrap();

    let corpus = Corpus::load(&dir.join("schema.sql")).unwrap();
    let model = parse_corpus(&corpus, "public", &NoIgnore).unwrap();
    let users = model.schema("public").unwrap().table("users").unwrap();
    assert!(users.indexes.contains_key("users_email_idx"));
    assert!(users.indexes.contains_key("users_pkey"));

    std::fs::remove_dir_all(dir).unwrap();
}
