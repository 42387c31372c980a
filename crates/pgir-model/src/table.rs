//! Tables and the objects that hang off them.

use indexmap::IndexMap;
use pgir_sql::{Ident, Token, TokenKind, TypeName, tokenize};

use crate::{Keyed, implicit_max};

/// A table, partitioned table or partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Owning schema
    pub schema: String,
    /// Table name
    pub name: String,
    /// Columns, in position order
    pub columns: Vec<Column>,
    /// Constraints keyed by name
    pub constraints: IndexMap<String, Constraint>,
    /// Indexes keyed by name
    pub indexes: IndexMap<String, Index>,
    /// Triggers keyed by name
    pub triggers: IndexMap<String, Trigger>,
    /// Row-level security policies keyed by name
    pub policies: IndexMap<String, RlsPolicy>,
    /// Partitioning strategy, when this table is partitioned
    pub partition_strategy: Option<PartitionStrategy>,
    /// Partition key list without the strategy, e.g. `created_at` or `lower(name), id`
    pub partition_key: Option<String>,
    /// Parent table, when this table is a partition
    pub partition_of: Option<TableRef>,
    /// Bound spec of a partition, e.g. `FOR VALUES IN ('eu')`
    pub partition_bound: Option<String>,
    /// `ENABLE ROW LEVEL SECURITY`
    pub rls_enabled: bool,
    /// `FORCE ROW LEVEL SECURITY`
    pub rls_forced: bool,
    /// Stand-in for an ignored table that other objects still reference
    pub external: bool,
    /// `COMMENT ON TABLE`
    pub comment: Option<String>,
}

/// Reference to a table by schema and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", Ident(&self.schema), Ident(&self.name))
    }
}

impl Keyed for Table {
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            constraints: IndexMap::new(),
            indexes: IndexMap::new(),
            triggers: IndexMap::new(),
            policies: IndexMap::new(),
            partition_strategy: None,
            partition_key: None,
            partition_of: None,
            partition_bound: None,
            rls_enabled: false,
            rls_forced: false,
            external: false,
            comment: None,
        }
    }

    /// A placeholder for a table outside the model.
    pub fn external(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            external: true,
            ..Self::new(schema, name)
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Append a column at the next position.
    pub fn add_column(&mut self, mut column: Column) {
        column.position = self.columns.len() as u32 + 1;
        self.columns.push(column);
    }

    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints
            .values()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
    }

    /// Plain column names in the partition key; expression keys are skipped.
    pub fn partition_key_columns(&self) -> Vec<String> {
        let Some(key) = &self.partition_key else {
            return Vec::new();
        };
        let Ok(tokens) = tokenize(key) else {
            return Vec::new();
        };

        let mut parts: Vec<Vec<&Token>> = vec![Vec::new()];
        let mut depth = 0usize;
        for tok in &tokens {
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                TokenKind::Comma if depth == 0 => {
                    parts.push(Vec::new());
                    continue;
                }
                _ => {}
            }
            if let Some(part) = parts.last_mut() {
                part.push(tok);
            }
        }

        // a bare identifier, possibly followed by an opclass or COLLATE
        parts
            .iter()
            .filter(|part| part.len() == 1 || part.get(1).is_some_and(|t| t.kind == TokenKind::Word))
            .filter_map(|part| part.first().and_then(|t| t.ident()))
            .collect()
    }

    /// Move `key` columns to the front of the primary key and its index.
    pub fn reorder_primary_key_by(&mut self, key: &[String]) {
        if key.is_empty() {
            return;
        }
        let Some(pk) = self
            .constraints
            .values_mut()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
        else {
            return;
        };
        reorder_key_first(&mut pk.columns, key);
        let pk_name = pk.name.clone();

        if let Some(index) = self.indexes.get_mut(&pk_name) {
            let mut reordered: Vec<IndexColumn> = key
                .iter()
                .filter_map(|k| index.columns.iter().find(|c| &c.name == k).cloned())
                .collect();
            reordered.extend(
                index
                    .columns
                    .iter()
                    .filter(|c| !key.contains(&c.name))
                    .cloned(),
            );
            index.columns = reordered;
        }
    }
}

/// Reorder so that `key` columns come first (in key order), then renumber.
pub fn reorder_key_first(columns: &mut Vec<ConstraintColumn>, key: &[String]) {
    let mut reordered: Vec<ConstraintColumn> = key
        .iter()
        .filter_map(|k| columns.iter().find(|c| &c.name == k).cloned())
        .collect();
    reordered.extend(columns.iter().filter(|c| !key.contains(&c.name)).cloned());
    for (i, column) in reordered.iter_mut().enumerate() {
        column.position = i as u32 + 1;
    }
    *columns = reordered;
}

/// Partitioning strategy of a partitioned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    Range,
    List,
    Hash,
}

impl PartitionStrategy {
    pub fn as_sql(self) -> &'static str {
        match self {
            PartitionStrategy::Range => "RANGE",
            PartitionStrategy::List => "LIST",
            PartitionStrategy::Hash => "HASH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "range" | "r" => Some(PartitionStrategy::Range),
            "list" | "l" => Some(PartitionStrategy::List),
            "hash" | "h" => Some(PartitionStrategy::Hash),
            _ => None,
        }
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// 1-based position, dense
    pub position: u32,
    /// Canonical base type with array suffixes, typmods split out
    pub data_type: String,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default expression
    pub default: Option<String>,
    /// Length of `varchar(n)`, `char(n)`, `bit(n)`
    pub max_length: Option<i32>,
    /// Precision of `numeric(p, s)` or fractional seconds of time types
    pub precision: Option<i32>,
    /// Scale of `numeric(p, s)`
    pub scale: Option<i32>,
    /// Identity specification
    pub identity: Option<Identity>,
    /// Generated-column expression
    pub generated: Option<GeneratedColumn>,
    /// Explicit collation
    pub collation: Option<String>,
    /// `COMMENT ON COLUMN`
    pub comment: Option<String>,
}

impl Column {
    /// A nullable column of the given type; typmods are split into
    /// length/precision/scale.
    pub fn new(name: impl Into<String>, data_type: &str) -> Self {
        let split = TypeName::parse(data_type).column_type();
        Self {
            name: name.into(),
            position: 0,
            data_type: split.data_type,
            nullable: true,
            default: None,
            max_length: split.max_length,
            precision: split.precision,
            scale: split.scale,
            identity: None,
            generated: None,
            collation: None,
            comment: None,
        }
    }

    /// Full type with typmods, e.g. `varchar(255)` or `numeric(10,2)[]`.
    pub fn full_type(&self) -> String {
        let (base, arrays) = match self.data_type.find('[') {
            Some(i) => self.data_type.split_at(i),
            None => (self.data_type.as_str(), ""),
        };
        let mods = match (self.max_length, self.precision, self.scale) {
            (Some(len), _, _) => format!("({len})"),
            (None, Some(p), Some(s)) => format!("({p},{s})"),
            (None, Some(p), None) => format!("({p})"),
            _ => String::new(),
        };
        format!("{base}{mods}{arrays}")
    }
}

/// How an identity column generates values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityGeneration {
    Always,
    ByDefault,
}

impl IdentityGeneration {
    pub fn as_sql(self) -> &'static str {
        match self {
            IdentityGeneration::Always => "ALWAYS",
            IdentityGeneration::ByDefault => "BY DEFAULT",
        }
    }
}

/// `GENERATED ... AS IDENTITY` settings.
///
/// Bounds and cache follow the same suppression rules as [`crate::Sequence`],
/// relative to the column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub generation: IdentityGeneration,
    pub start: i64,
    pub increment: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub cache: Option<i64>,
    pub cycle: bool,
}

impl Identity {
    pub fn new(generation: IdentityGeneration) -> Self {
        Self {
            generation,
            start: 1,
            increment: 1,
            min: None,
            max: None,
            cache: None,
            cycle: false,
        }
    }

    /// Drop bounds that equal what the column type implies.
    pub fn suppress_defaults(&mut self, column_type: &str) {
        if self.min == Some(1) {
            self.min = None;
        }
        if self.max == Some(implicit_max(Some(column_type))) {
            self.max = None;
        }
        if self.cache == Some(1) {
            self.cache = None;
        }
    }
}

/// `GENERATED ALWAYS AS (expr) [STORED | VIRTUAL]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedColumn {
    pub expression: String,
    pub stored: bool,
}

/// Constraint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
    Exclusion,
}

impl ConstraintKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Check => "CHECK",
            ConstraintKind::Exclusion => "EXCLUDE",
        }
    }

    /// Decode `pg_constraint.contype`.
    pub fn from_catalog(contype: &str) -> Option<Self> {
        match contype {
            "p" => Some(ConstraintKind::PrimaryKey),
            "u" => Some(ConstraintKind::Unique),
            "f" => Some(ConstraintKind::ForeignKey),
            "c" => Some(ConstraintKind::Check),
            "x" => Some(ConstraintKind::Exclusion),
            _ => None,
        }
    }
}

/// A column named by a constraint, with its 1-based place in the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintColumn {
    pub name: String,
    pub position: u32,
}

impl ConstraintColumn {
    /// Number names 1..n in order.
    pub fn numbered<S: AsRef<str>>(names: &[S]) -> Vec<ConstraintColumn> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ConstraintColumn {
                name: n.as_ref().to_string(),
                position: i as u32 + 1,
            })
            .collect()
    }
}

/// `ON DELETE` / `ON UPDATE` behaviour of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Decode `pg_constraint.confdeltype` / `confupdtype`.
    pub fn from_catalog(code: &str) -> Self {
        match code {
            "r" => ReferentialAction::Restrict,
            "c" => ReferentialAction::Cascade,
            "n" => ReferentialAction::SetNull,
            "d" => ReferentialAction::SetDefault,
            _ => ReferentialAction::NoAction,
        }
    }
}

/// `MATCH` type of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    Simple,
    Full,
    Partial,
}

impl MatchType {
    pub fn from_catalog(code: &str) -> Self {
        match code {
            "f" => MatchType::Full,
            "p" => MatchType::Partial,
            _ => MatchType::Simple,
        }
    }
}

/// The referenced side of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ConstraintColumn>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    pub match_type: MatchType,
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub kind: ConstraintKind,
    /// Constrained columns in key order
    pub columns: Vec<ConstraintColumn>,
    /// Present for foreign keys
    pub foreign_key: Option<ForeignKeyRef>,
    /// `CHECK (...)`, for check constraints
    pub check_clause: Option<String>,
    /// `EXCLUDE USING ...`, for exclusion constraints
    pub exclusion: Option<String>,
    /// False for `NOT VALID` constraints
    pub valid: bool,
    pub deferrable: bool,
    pub initially_deferred: bool,
    pub comment: Option<String>,
}

impl Keyed for Constraint {
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Constraint {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
        kind: ConstraintKind,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            name: name.into(),
            kind,
            columns: Vec::new(),
            foreign_key: None,
            check_clause: None,
            exclusion: None,
            valid: true,
            deferrable: false,
            initially_deferred: false,
            comment: None,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Sort order for index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending order (default)
    #[default]
    Asc,
    /// Descending order
    Desc,
}

impl SortOrder {
    /// Returns the SQL keyword for this sort order, or empty string for ASC (default).
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "",
            SortOrder::Desc => " DESC",
        }
    }
}

/// Nulls ordering for index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullsOrder {
    /// Use database default (NULLS LAST for ASC, NULLS FIRST for DESC)
    #[default]
    Default,
    /// Sort nulls before non-null values
    First,
    /// Sort nulls after non-null values
    Last,
}

impl NullsOrder {
    /// Returns the SQL clause for this nulls ordering, or empty string for default.
    pub fn to_sql(&self) -> &'static str {
        match self {
            NullsOrder::Default => "",
            NullsOrder::First => " NULLS FIRST",
            NullsOrder::Last => " NULLS LAST",
        }
    }

    /// Collapse explicit orderings that match the default for `order`.
    pub fn effective(self, order: SortOrder) -> Self {
        match (self, order) {
            (NullsOrder::Last, SortOrder::Asc) | (NullsOrder::First, SortOrder::Desc) => {
                NullsOrder::Default
            }
            (other, _) => other,
        }
    }
}

/// One key of an index: a column or an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column name, or canonical expression text when `expression` is set
    pub name: String,
    /// Whether `name` holds an expression
    pub expression: bool,
    /// Sort order (ASC or DESC)
    pub order: SortOrder,
    /// Nulls ordering (NULLS FIRST, NULLS LAST, or default)
    pub nulls: NullsOrder,
    /// Operator class, when not the type default
    pub opclass: Option<String>,
    /// Explicit collation
    pub collation: Option<String>,
}

impl IndexColumn {
    /// Create a new index column with default (ASC) ordering and default nulls.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: false,
            order: SortOrder::Asc,
            nulls: NullsOrder::Default,
            opclass: None,
            collation: None,
        }
    }

    /// Returns the SQL fragment for this key (name + opclass + order + nulls).
    pub fn to_sql(&self) -> String {
        let mut out = if self.expression {
            format!("({})", self.name)
        } else {
            Ident(&self.name).to_string()
        };
        if let Some(collation) = &self.collation {
            out.push_str(&format!(" COLLATE {collation}"));
        }
        if let Some(opclass) = &self.opclass {
            out.push(' ');
            out.push_str(opclass);
        }
        out.push_str(self.order.to_sql());
        out.push_str(self.nulls.to_sql());
        out
    }
}

/// Index kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Regular,
    Unique,
    Primary,
}

/// A table or materialized-view index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub schema: String,
    /// Table (or materialized view) the index is on
    pub table: String,
    pub name: String,
    pub kind: IndexKind,
    /// Access method, e.g. `btree`, `gin`
    pub method: String,
    pub columns: Vec<IndexColumn>,
    /// `INCLUDE (...)` columns
    pub include: Vec<String>,
    /// `WHERE` predicate of a partial index
    pub predicate: Option<String>,
    /// `NULLS NOT DISTINCT`
    pub nulls_not_distinct: bool,
    /// Whether any key is an expression
    pub is_expression: bool,
    pub comment: Option<String>,
}

impl Keyed for Index {
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Index {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
        kind: IndexKind,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            name: name.into(),
            kind,
            method: "btree".into(),
            columns: Vec::new(),
            include: Vec::new(),
            predicate: None,
            nulls_not_distinct: false,
            is_expression: false,
            comment: None,
        }
    }

    /// Key definition as it would appear in `CREATE INDEX`, for display.
    pub fn to_sql(&self) -> String {
        let unique = if self.kind == IndexKind::Regular {
            ""
        } else {
            "UNIQUE "
        };
        let keys: Vec<String> = self.columns.iter().map(IndexColumn::to_sql).collect();
        let mut out = format!(
            "CREATE {unique}INDEX {} ON {}.{} USING {} ({})",
            Ident(&self.name),
            Ident(&self.schema),
            Ident(&self.table),
            self.method,
            keys.join(", ")
        );
        if !self.include.is_empty() {
            let include: Vec<String> = self.include.iter().map(|c| Ident(c).to_string()).collect();
            out.push_str(&format!(" INCLUDE ({})", include.join(", ")));
        }
        if self.nulls_not_distinct {
            out.push_str(" NULLS NOT DISTINCT");
        }
        if let Some(predicate) = &self.predicate {
            out.push_str(&format!(" WHERE {predicate}"));
        }
        out
    }
}

/// When a trigger fires relative to the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    pub fn as_sql(self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

/// Trigger events, declared in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl TriggerEvent {
    pub fn as_sql(self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
            TriggerEvent::Truncate => "TRUNCATE",
        }
    }
}

/// Row- or statement-level trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLevel {
    Row,
    Statement,
}

/// A table trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub timing: TriggerTiming,
    /// Events, in canonical order after normalization
    pub events: Vec<TriggerEvent>,
    /// `UPDATE OF col, ...`
    pub update_columns: Vec<String>,
    pub level: TriggerLevel,
    /// Called function, possibly schema-qualified
    pub function: String,
    /// Arguments passed to the function, as strings
    pub arguments: Vec<String>,
    /// `WHEN (...)` condition
    pub condition: Option<String>,
    /// `CREATE CONSTRAINT TRIGGER`
    pub constraint: bool,
    pub deferrable: bool,
    pub initially_deferred: bool,
    /// `FROM referenced_table` of a constraint trigger
    pub referenced_table: Option<String>,
    /// `REFERENCING OLD TABLE AS ...`
    pub old_table: Option<String>,
    /// `REFERENCING NEW TABLE AS ...`
    pub new_table: Option<String>,
}

impl Keyed for Trigger {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Command a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCommand {
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyCommand {
    pub fn as_sql(self) -> &'static str {
        match self {
            PolicyCommand::All => "ALL",
            PolicyCommand::Select => "SELECT",
            PolicyCommand::Insert => "INSERT",
            PolicyCommand::Update => "UPDATE",
            PolicyCommand::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" | "*" => Some(PolicyCommand::All),
            "SELECT" | "R" => Some(PolicyCommand::Select),
            "INSERT" | "A" => Some(PolicyCommand::Insert),
            "UPDATE" | "W" => Some(PolicyCommand::Update),
            "DELETE" | "D" => Some(PolicyCommand::Delete),
            _ => None,
        }
    }
}

/// A row-level security policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RlsPolicy {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub command: PolicyCommand,
    /// PERMISSIVE (true) or RESTRICTIVE
    pub permissive: bool,
    /// Roles, sorted after normalization; `PUBLIC` for everyone
    pub roles: Vec<String>,
    /// `USING (...)`
    pub using: Option<String>,
    /// `WITH CHECK (...)`
    pub with_check: Option<String>,
}

impl Keyed for RlsPolicy {
    fn key(&self) -> String {
        self.name.clone()
    }
}
