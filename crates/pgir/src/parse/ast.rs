//! Statement syntax tree.
//!
//! Only the statements that describe schema objects get a node; everything
//! else parses to [`Statement::Other`]. Expressions are kept as source text
//! and canonicalized later by the normalizer.

use pgir_model::{
    IdentityGeneration, MatchType, NullsOrder, ParallelSafety, ParameterMode, PartitionStrategy,
    PolicyCommand, PrivilegeObjectType, ReferentialAction, SortOrder, TriggerEvent, TriggerLevel,
    TriggerTiming, Volatility,
};

/// `[schema.]name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn schema_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(default)
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}", pgir_sql::qualified_name(schema, &self.name)),
            None => write!(f, "{}", pgir_sql::quote_ident(&self.name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateSchema(String),
    CreateTable(CreateTable),
    CreateIndex(CreateIndex),
    CreateView(CreateView),
    CreateRoutine(CreateRoutine),
    CreateAggregate(CreateAggregate),
    CreateSequence(SequenceDef),
    AlterSequence(SequenceDef),
    CreateType(CreateType),
    CreateDomain(CreateDomain),
    CreateTrigger(CreateTrigger),
    CreatePolicy(CreatePolicy),
    AlterTable(AlterTable),
    Comment(CommentOn),
    DefaultPrivileges(DefaultGrant),
    /// Anything that does not define schema objects; the leading keywords
    /// are kept for logging.
    Other(String),
}

/// `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: QualifiedName,
    pub elements: Vec<TableElement>,
    /// `PARTITION BY strategy (key)`
    pub partition_by: Option<(PartitionStrategy, String)>,
    /// `PARTITION OF parent FOR VALUES ...`
    pub partition_of: Option<PartitionOf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOf {
    pub parent: QualifiedName,
    /// `FOR VALUES ...` or `DEFAULT`
    pub bound: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableElement {
    Column(ColumnDef),
    Constraint(TableConstraint),
    Like(LikeClause),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Canonical type; empty for partition-column option lists
    pub data_type: String,
    pub collation: Option<String>,
    pub constraints: Vec<ColumnConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnConstraint {
    pub name: Option<String>,
    pub kind: ColumnConstraintKind,
    pub deferrable: bool,
    pub initially_deferred: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraintKind {
    NotNull,
    Null,
    Default(String),
    PrimaryKey,
    Unique { nulls_not_distinct: bool },
    Check { expr: String, no_inherit: bool },
    References(ForeignKeyTarget),
    Identity {
        generation: IdentityGeneration,
        options: SequenceOptions,
    },
    Generated { expr: String, stored: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyTarget {
    pub table: QualifiedName,
    /// Empty means the referenced table's primary key
    pub columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableConstraint {
    pub name: Option<String>,
    pub kind: TableConstraintKind,
    pub deferrable: bool,
    pub initially_deferred: bool,
    pub not_valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraintKind {
    PrimaryKey {
        columns: Vec<String>,
        include: Vec<String>,
    },
    Unique {
        columns: Vec<String>,
        include: Vec<String>,
        nulls_not_distinct: bool,
    },
    Check {
        expr: String,
    },
    ForeignKey {
        columns: Vec<String>,
        target: ForeignKeyTarget,
    },
    /// Full `EXCLUDE ...` text
    Exclude(String),
}

/// `LIKE source [INCLUDING ... | EXCLUDING ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LikeClause {
    pub source: QualifiedName,
    pub options: LikeOptions,
}

/// `LIKE` option bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LikeOptions(pub u32);

impl LikeOptions {
    pub const COMMENTS: u32 = 1;
    pub const COMPRESSION: u32 = 1 << 1;
    pub const CONSTRAINTS: u32 = 1 << 2;
    pub const DEFAULTS: u32 = 1 << 3;
    pub const GENERATED: u32 = 1 << 4;
    pub const IDENTITY: u32 = 1 << 5;
    pub const INDEXES: u32 = 1 << 6;
    pub const STATISTICS: u32 = 1 << 7;
    pub const STORAGE: u32 = 1 << 8;
    pub const ALL: u32 = 0x7FFF_FFFF;

    /// Bit for an option keyword.
    pub fn bit(word: &str) -> Option<u32> {
        Some(match word {
            "comments" => Self::COMMENTS,
            "compression" => Self::COMPRESSION,
            "constraints" => Self::CONSTRAINTS,
            "defaults" => Self::DEFAULTS,
            "generated" => Self::GENERATED,
            "identity" => Self::IDENTITY,
            "indexes" => Self::INDEXES,
            "statistics" => Self::STATISTICS,
            "storage" => Self::STORAGE,
            "all" => Self::ALL,
            _ => return None,
        })
    }

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// `CREATE [UNIQUE] INDEX`; also the shape of `pg_get_indexdef` output.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub name: Option<String>,
    pub unique: bool,
    pub table: QualifiedName,
    pub method: Option<String>,
    pub elements: Vec<IndexElement>,
    pub include: Vec<String>,
    pub nulls_not_distinct: bool,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexElement {
    /// Column name or expression text
    pub text: String,
    pub expression: bool,
    pub collation: Option<String>,
    pub opclass: Option<String>,
    pub order: SortOrder,
    pub nulls: NullsOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateView {
    pub name: QualifiedName,
    pub materialized: bool,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub mode: ParameterMode,
    pub name: Option<String>,
    pub data_type: String,
    pub default: Option<String>,
}

/// `CREATE FUNCTION` or `CREATE PROCEDURE`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRoutine {
    pub name: QualifiedName,
    pub procedure: bool,
    pub params: Vec<ParamDef>,
    /// `RETURNS` clause text; `TABLE` columns are also added to `params`
    pub returns: Option<String>,
    pub language: Option<String>,
    pub body: String,
    pub volatility: Volatility,
    pub strict: bool,
    pub security_definer: bool,
    pub leakproof: bool,
    pub parallel: ParallelSafety,
    pub search_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateAggregate {
    pub name: QualifiedName,
    pub arguments: Vec<String>,
    pub state_function: String,
    pub state_type: String,
    pub final_function: Option<String>,
    pub combine_function: Option<String>,
    pub initial_condition: Option<String>,
    pub parallel: ParallelSafety,
}

/// `CREATE SEQUENCE` / `ALTER SEQUENCE`, and identity options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceOptions {
    pub data_type: Option<String>,
    pub start: Option<i64>,
    pub increment: Option<i64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub cache: Option<i64>,
    pub cycle: Option<bool>,
    /// `OWNED BY table.column`; `Some(None)` for `OWNED BY NONE`
    pub owned_by: Option<Option<(QualifiedName, String)>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDef {
    pub name: QualifiedName,
    pub options: SequenceOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateType {
    Enum {
        name: QualifiedName,
        labels: Vec<String>,
    },
    Composite {
        name: QualifiedName,
        attributes: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateDomain {
    pub name: QualifiedName,
    pub base_type: String,
    pub collation: Option<String>,
    pub default: Option<String>,
    pub not_null: bool,
    /// Optional name and `CHECK` expression text
    pub checks: Vec<(Option<String>, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTrigger {
    pub name: String,
    pub constraint: bool,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub update_columns: Vec<String>,
    pub table: QualifiedName,
    pub referenced_table: Option<QualifiedName>,
    pub deferrable: bool,
    pub initially_deferred: bool,
    pub old_table: Option<String>,
    pub new_table: Option<String>,
    pub level: TriggerLevel,
    pub condition: Option<String>,
    pub function: QualifiedName,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePolicy {
    pub name: String,
    pub table: QualifiedName,
    pub permissive: bool,
    pub command: PolicyCommand,
    pub roles: Vec<String>,
    pub using: Option<String>,
    pub with_check: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub name: QualifiedName,
    pub actions: Vec<AlterAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    AddConstraint(TableConstraint),
    SetDefault { column: String, default: Option<String> },
    SetNotNull { column: String, not_null: bool },
    /// `ALTER COLUMN c ADD GENERATED ... AS IDENTITY`
    AddIdentity {
        column: String,
        generation: IdentityGeneration,
        options: SequenceOptions,
    },
    RowLevelSecurity { enabled: Option<bool>, forced: Option<bool> },
    AttachPartition { child: QualifiedName, bound: String },
    /// Recognized but without effect on the model
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentTarget {
    Table(QualifiedName),
    View(QualifiedName),
    Column { table: QualifiedName, column: String },
    Index(QualifiedName),
    Sequence(QualifiedName),
    Type(QualifiedName),
    Constraint { name: String, table: QualifiedName },
    Function { name: QualifiedName, arguments: Option<Vec<String>> },
    Procedure { name: QualifiedName, arguments: Option<Vec<String>> },
    Aggregate { name: QualifiedName, arguments: Vec<String> },
    /// Objects the model keeps no comment for
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentOn {
    pub target: CommentTarget,
    /// `None` for `IS NULL`
    pub text: Option<String>,
}

/// `ALTER DEFAULT PRIVILEGES [IN SCHEMA ...] GRANT ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultGrant {
    pub schemas: Vec<String>,
    pub object_type: PrivilegeObjectType,
    pub privileges: Vec<String>,
    pub grantees: Vec<String>,
    pub grantable: bool,
}
