//! A schema inspected from a database equals the schema parsed from the DDL
//! that built it.
//!
//! Needs a server: `POSTGRES_URL`, or docker for a throwaway container.
//! Run with `cargo test -p pgir --features test-postgres`.

#![cfg(feature = "test-postgres")]

use std::sync::Arc;

use pgir::{Error, IgnoreConfig, IgnorePredicate, InspectOptions, NoIgnore, inspect, parse_sql};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::testcontainers::{ContainerAsync, ImageExt};
use tokio_postgres::{Client, NoTls};

struct Server {
    client: Arc<Client>,
    _container: Option<ContainerAsync<Postgres>>,
}

async fn server() -> Server {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let (url, container) = match std::env::var("POSTGRES_URL") {
        Ok(url) => (url, None),
        Err(_) => {
            let container = Postgres::default()
                .with_tag("17-alpine")
                .start()
                .await
                .expect("start postgres container");
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            (
                format!("postgres://postgres:postgres@{host}:{port}/postgres"),
                Some(container),
            )
        }
    };
    let (client, connection) = tokio_postgres::connect(&url, NoTls).await.unwrap();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("connection error: {e}");
        }
    });
    Server {
        client: Arc::new(client),
        _container: container,
    }
}

/// Apply `ddl` to a fresh `schema`, then compare the inspected model with
/// the parsed one.
async fn assert_round_trip(
    server: &Server,
    schema: &str,
    ddl: &str,
    ignore: Arc<dyn IgnorePredicate>,
) -> pgir::Model {
    server
        .client
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema}; SET search_path TO {schema};"
        ))
        .await
        .unwrap();
    server.client.batch_execute(ddl).await.unwrap();

    let live = inspect(
        server.client.clone(),
        schema,
        ignore.clone(),
        &InspectOptions::default(),
    )
    .await
    .unwrap();
    let parsed = parse_sql(ddl, schema, ignore.as_ref()).unwrap();
    assert_eq!(live, parsed, "schema {schema}");
    assert!(live.server_version().is_some());
    live
}

const TABLES: &str = r#"
CREATE TABLE customers (
    id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    email text NOT NULL UNIQUE,
    name varchar(100),
    created_at timestamptz NOT NULL DEFAULT now()
);
CREATE TABLE orders (
    id serial PRIMARY KEY,
    customer_id bigint NOT NULL REFERENCES customers (id) ON DELETE CASCADE,
    status text DEFAULT 'new' CHECK (status <> ''),
    note text COLLATE "C"
);
CREATE INDEX orders_customer_idx ON orders (customer_id);
CREATE UNIQUE INDEX orders_open_idx ON orders (customer_id) WHERE status = 'new';
COMMENT ON TABLE orders IS 'customer orders';
COMMENT ON COLUMN orders.note IS 'free text';
"#;

const OBJECTS: &str = r#"
CREATE TYPE mood AS ENUM ('sad', 'ok', 'happy');
CREATE TYPE pair AS (a integer, b text);
CREATE DOMAIN posint AS integer CHECK (VALUE > 0);
CREATE SEQUENCE tickets START 100 INCREMENT 5;
CREATE FUNCTION add_one(x integer) RETURNS integer LANGUAGE sql IMMUTABLE AS $$SELECT x + 1$$;
CREATE FUNCTION greet(who text DEFAULT 'world') RETURNS text LANGUAGE sql STABLE AS $$SELECT 'hi ' || who$$;
CREATE PROCEDURE noop(n integer) LANGUAGE plpgsql AS $$BEGIN PERFORM n; END$$;
ALTER DEFAULT PRIVILEGES IN SCHEMA pgir_objects GRANT SELECT ON TABLES TO PUBLIC;
"#;

const DEPENDENTS: &str = r#"
CREATE TABLE notes (id bigint PRIMARY KEY, owner name NOT NULL, body text);
CREATE VIEW constants AS SELECT 1 AS one;
CREATE VIEW written_notes AS SELECT id, body FROM notes WHERE body <> '' AND id > 10;
CREATE MATERIALIZED VIEW snapshot AS SELECT 1 AS one;
CREATE UNIQUE INDEX snapshot_one_idx ON snapshot (one);
CREATE FUNCTION touch_note() RETURNS trigger LANGUAGE plpgsql AS $$BEGIN RETURN NEW; END$$;
CREATE TRIGGER notes_touch BEFORE UPDATE ON notes FOR EACH ROW EXECUTE FUNCTION touch_note();
ALTER TABLE notes ENABLE ROW LEVEL SECURITY;
CREATE POLICY notes_owner ON notes USING (owner = current_user);
"#;

const PARTITIONS: &str = r#"
CREATE TABLE measurements (
    id bigint NOT NULL,
    region text NOT NULL,
    reading double precision,
    PRIMARY KEY (id, region)
) PARTITION BY LIST (region);
CREATE TABLE measurements_eu PARTITION OF measurements FOR VALUES IN ('eu');
CREATE TABLE measurements_us PARTITION OF measurements FOR VALUES IN ('us');
"#;

const IGNORED: &str = r#"
CREATE TABLE users (id bigint PRIMARY KEY);
CREATE TABLE audit_log (id bigint PRIMARY KEY, entry text);
CREATE INDEX audit_log_entry_idx ON audit_log (entry);
CREATE FUNCTION stamp() RETURNS trigger LANGUAGE plpgsql AS $$BEGIN RETURN NEW; END$$;
CREATE TRIGGER stamp BEFORE INSERT ON audit_log FOR EACH ROW EXECUTE FUNCTION stamp();
CREATE POLICY audit_readers ON audit_log USING (true);
"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_inspected_equals_parsed() {
    let server = server().await;

    let model = assert_round_trip(&server, "pgir_tables", TABLES, Arc::new(NoIgnore)).await;
    let schema = model.schema("pgir_tables").unwrap();
    assert!(schema.sequence("orders_id_seq").is_some());
    assert!(schema.table("orders").unwrap().indexes.contains_key("orders_open_idx"));

    let model = assert_round_trip(&server, "pgir_objects", OBJECTS, Arc::new(NoIgnore)).await;
    let schema = model.schema("pgir_objects").unwrap();
    assert!(schema.function("greet(text)").is_some());
    assert_eq!(schema.default_privileges().len(), 1);

    let model = assert_round_trip(&server, "pgir_dependents", DEPENDENTS, Arc::new(NoIgnore)).await;
    let schema = model.schema("pgir_dependents").unwrap();
    assert!(schema.view("snapshot").unwrap().indexes.contains_key("snapshot_one_idx"));
    assert_eq!(
        schema.view("written_notes").unwrap().definition,
        "SELECT id, body FROM notes WHERE body <> '' AND id > 10"
    );

    let model = assert_round_trip(&server, "pgir_partitions", PARTITIONS, Arc::new(NoIgnore)).await;
    let schema = model.schema("pgir_partitions").unwrap();
    let child = schema.table("measurements_eu").unwrap();
    assert_eq!(child.primary_key().unwrap().column_names(), ["region", "id"]);

    let ignore = IgnoreConfig::parse("[tables]\npatterns = [\"audit_*\"]\n").unwrap();
    let model = assert_round_trip(&server, "pgir_ignored", IGNORED, Arc::new(ignore)).await;
    let audit = model.schema("pgir_ignored").unwrap().table("audit_log").unwrap();
    assert!(audit.external);
    assert!(audit.triggers.contains_key("stamp"));
    assert!(audit.indexes.is_empty());
    assert!(audit.policies.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_and_system_schemas() {
    let server = server().await;
    for name in ["pgir_does_not_exist", "pg_catalog"] {
        let err = inspect(
            server.client.clone(),
            name,
            Arc::new(NoIgnore),
            &InspectOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err.root(), Error::SchemaNotFound(schema) if schema == name),
            "{err}"
        );
    }
}
