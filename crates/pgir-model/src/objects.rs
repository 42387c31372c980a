//! Schema-level objects that are not tables or routines.

use indexmap::IndexMap;

use crate::{Index, Keyed};

/// A view or materialized view.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub schema: String,
    pub name: String,
    /// Query text, canonicalized by the normalizer
    pub definition: String,
    pub materialized: bool,
    /// Indexes; only materialized views have any
    pub indexes: IndexMap<String, Index>,
    pub comment: Option<String>,
}

impl View {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            definition: definition.into(),
            materialized: false,
            indexes: IndexMap::new(),
            comment: None,
        }
    }
}

impl Keyed for View {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Column that owns a sequence (`OWNED BY table.column`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOwner {
    pub table: String,
    pub column: String,
}

/// Largest value of a sequence whose type is `data_type`; no type means bigint.
pub fn implicit_max(data_type: Option<&str>) -> i64 {
    match data_type {
        Some("smallint") => i16::MAX as i64,
        Some("integer") => i32::MAX as i64,
        _ => i64::MAX,
    }
}

/// A sequence.
///
/// Settings that match what a bare `CREATE SEQUENCE` implies are stored as
/// `None`, so that catalog output (which reports everything) and DDL (which
/// usually says nothing) compare equal. See [`Sequence::suppress_defaults`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub schema: String,
    pub name: String,
    /// `AS type`; omitted for the bigint default
    pub data_type: Option<String>,
    pub start: i64,
    pub increment: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub cache: Option<i64>,
    pub cycle: bool,
    pub owned_by: Option<SequenceOwner>,
    pub comment: Option<String>,
}

impl Sequence {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            data_type: None,
            start: 1,
            increment: 1,
            min: None,
            max: None,
            cache: None,
            cycle: false,
            owned_by: None,
            comment: None,
        }
    }

    /// Clear settings that equal their implied values.
    ///
    /// - min is dropped when 1
    /// - max is dropped when it is the largest value of the data type
    /// - cache is dropped when 1
    /// - the data type is dropped when it is bigint and both bounds were dropped
    pub fn suppress_defaults(&mut self) {
        if self.min == Some(1) {
            self.min = None;
        }
        if self.max == Some(implicit_max(self.data_type.as_deref())) {
            self.max = None;
        }
        if self.cache == Some(1) {
            self.cache = None;
        }
        if self.data_type.as_deref() == Some("bigint") && self.min.is_none() && self.max.is_none() {
            self.data_type = None;
        }
    }
}

impl Keyed for Sequence {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Attribute of a composite type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeAttribute {
    pub name: String,
    pub data_type: String,
}

/// Named `CHECK` on a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConstraint {
    pub name: String,
    /// `CHECK (...)`
    pub check_clause: String,
}

/// Domain definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub base_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub collation: Option<String>,
    pub constraints: Vec<DomainConstraint>,
}

/// What kind of user-defined type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Enum labels, in sort order
    Enum(Vec<String>),
    Composite(Vec<CompositeAttribute>),
    Domain(Domain),
}

/// A user-defined type.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub schema: String,
    pub name: String,
    pub kind: TypeKind,
    pub comment: Option<String>,
}

impl Keyed for Type {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Object class a default privilege applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrivilegeObjectType {
    Tables,
    Sequences,
    Functions,
    Types,
    Schemas,
}

impl PrivilegeObjectType {
    pub fn as_sql(self) -> &'static str {
        match self {
            PrivilegeObjectType::Tables => "TABLES",
            PrivilegeObjectType::Sequences => "SEQUENCES",
            PrivilegeObjectType::Functions => "FUNCTIONS",
            PrivilegeObjectType::Types => "TYPES",
            PrivilegeObjectType::Schemas => "SCHEMAS",
        }
    }

    /// Decode `pg_default_acl.defaclobjtype`.
    pub fn from_catalog(code: &str) -> Option<Self> {
        match code {
            "r" => Some(PrivilegeObjectType::Tables),
            "S" => Some(PrivilegeObjectType::Sequences),
            "f" => Some(PrivilegeObjectType::Functions),
            "T" => Some(PrivilegeObjectType::Types),
            "n" => Some(PrivilegeObjectType::Schemas),
            _ => None,
        }
    }

    /// Every privilege `ALL` grants on this object class, not counting
    /// `MAINTAIN`, which only newer servers have.
    pub fn all_privileges(self) -> &'static [&'static str] {
        match self {
            PrivilegeObjectType::Tables => &[
                "DELETE",
                "INSERT",
                "REFERENCES",
                "SELECT",
                "TRIGGER",
                "TRUNCATE",
                "UPDATE",
            ],
            PrivilegeObjectType::Sequences => &["SELECT", "UPDATE", "USAGE"],
            PrivilegeObjectType::Functions => &["EXECUTE"],
            PrivilegeObjectType::Types => &["USAGE"],
            PrivilegeObjectType::Schemas => &["CREATE", "USAGE"],
        }
    }
}

/// One `ALTER DEFAULT PRIVILEGES ... GRANT` entry for the schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DefaultPrivilege {
    pub object_type: PrivilegeObjectType,
    /// Role name, or `PUBLIC`
    pub grantee: String,
    /// Privilege names, upper-case and sorted after normalization
    pub privileges: Vec<String>,
    pub grantable: bool,
}
