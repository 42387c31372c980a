//! Canonical PostgreSQL schema models.
//!
//! A [`Model`] describes the objects of one or more schemas: tables with
//! their columns, constraints, indexes, triggers and policies, plus views,
//! routines, sequences, types and default privileges. Two producers build
//! one:
//!
//! - [`inspect`] reads a live database through its system catalogs
//! - [`parse_sql`] (and [`parse_corpus`]) applies a DDL script
//!
//! Both finish by running [`normalize::normalize`], so a model inspected
//! from a database and a model parsed from the DDL that created it compare
//! equal.
//!
//! ```ignore
//! let pool = TracedPool::new(config.create_pool(None, NoTls)?);
//! let live = pgir::inspect(Arc::new(pool), "public", Arc::new(NoIgnore), &InspectOptions::default()).await?;
//! let wanted = pgir::parse_sql(&std::fs::read_to_string("schema.sql")?, "public", &NoIgnore)?;
//! assert!(live == wanted);
//! ```
//!
//! Turning the difference between two models into DDL is left to a
//! [`MigrationGenerator`].

mod error;
mod ignore;
mod inspect;
pub mod normalize;
pub mod parse;
mod traced;

pub use error::{Error, Result};
pub use ignore::{IgnoreConfig, IgnorePredicate, NoIgnore, ObjectKind};
pub use inspect::{InspectOptions, inspect};
pub use parse::{Corpus, parse_corpus, parse_sql};
pub use traced::{Catalog, CatalogFuture, TracedPool};

pub use pgir_model::*;
pub use pgir_sql::{needs_quoting, qualified_name, quote_ident};

/// Turns the difference between two models into a list of changes.
///
/// `old` is usually an inspected database and `new` a parsed corpus;
/// `target_schema` names the schema the changes apply to.
pub trait MigrationGenerator {
    type Change;

    fn generate_migration(&self, old: &Model, new: &Model, target_schema: &str)
    -> Vec<Self::Change>;
}
