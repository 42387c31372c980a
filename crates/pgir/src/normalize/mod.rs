//! Canonicalization of a [`Model`].
//!
//! The catalog and DDL text describe the same object in different spellings:
//! `int4` vs `integer`, `(status)::text = ANY (ARRAY[...])` vs
//! `status IN (...)`, explicit sequence bounds vs implied ones. [`normalize`]
//! rewrites every field that has more than one spelling into a single one,
//! so that a model inspected from a database and a model parsed from the DDL
//! that built it compare equal.
//!
//! Normalization is idempotent. Text that cannot be parsed is still cleaned
//! up at the token level and reported as an [`Ambiguity`] at debug level.

use std::collections::BTreeMap;
use std::fmt;

use pgir_model::{
    Aggregate, Column, DefaultPrivilege, Function, Index, Model, Parameter, Procedure,
    Schema, Sequence, Table, Type, TypeKind, View,
};
use pgir_sql::{TypeName, is_string_type, quote_ident, tokenize};

mod expr;
pub use expr::*;

mod view;
pub use view::*;

#[cfg(test)]
mod tests;

/// Text the normalizer could not canonicalize structurally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    pub value: String,
    pub reason: String,
}

impl Ambiguity {
    pub fn new(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Log at debug level; ambiguities never fail normalization.
    pub fn report(&self) {
        tracing::debug!(value = %self.value, reason = %self.reason, "kept text as written");
    }
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.value)
    }
}

/// Canonicalize every schema of `model` in place.
pub fn normalize(model: &Model) {
    for schema in model.schemas() {
        normalize_schema(&schema);
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(schema = %schema.name))]
fn normalize_schema(schema: &Schema) {
    let name = schema.name.as_str();
    schema.tables_mut(|tables| {
        for table in tables.values_mut() {
            normalize_table(table, name);
        }
    });
    schema.views_mut(|views| {
        for view in views.values_mut() {
            normalize_view(view, name);
        }
    });
    schema.functions_mut(|functions| functions.rekey(|f| normalize_function(f, name)));
    schema.procedures_mut(|procedures| procedures.rekey(|p| normalize_procedure(p, name)));
    schema.aggregates_mut(|aggregates| aggregates.rekey(|a| normalize_aggregate(a, name)));
    schema.sequences_mut(|sequences| {
        for sequence in sequences.values_mut() {
            normalize_sequence(sequence, name);
        }
    });
    schema.types_mut(|types| {
        for ty in types.values_mut() {
            normalize_type(ty, name);
        }
    });
    schema.default_privileges_mut(normalize_default_privileges);
}

/// Canonical type text with the typmods split back out.
fn normalize_column_type(column: &mut Column, schema: &str) -> String {
    let full = canonical_cast_type(&column.full_type(), schema);
    let split = TypeName::parse(&full).column_type();
    column.data_type = split.data_type;
    column.max_length = split.max_length;
    column.precision = split.precision;
    column.scale = split.scale;
    full
}

fn strip_catalog(name: &str, schema: &str) -> String {
    canonical_routine_name(name, schema)
}

fn normalize_table(table: &mut Table, schema: &str) {
    let mut text_columns = Vec::new();
    let mut types = Vec::with_capacity(table.columns.len());
    for column in &mut table.columns {
        let full = normalize_column_type(column, schema);
        if is_string_type(&column.data_type) {
            text_columns.push(column.name.clone());
        }
        types.push(full);
    }
    let ctx = ExprContext::new(schema).with_text_columns(text_columns);

    for (column, full) in table.columns.iter_mut().zip(&types) {
        if let Some(identity) = &mut column.identity {
            identity.suppress_defaults(full);
            column.nullable = false;
            column.default = None;
        }
        if let Some(generated) = &mut column.generated {
            generated.expression = canonical_expr(&generated.expression, &ctx);
            column.nullable = false;
            column.default = None;
        }
        if let Some(default) = &column.default {
            let value_ctx = ctx.clone().with_value_type(full);
            column.default = Some(canonical_expr(default, &value_ctx));
        }
        if let Some(collation) = &column.collation {
            column.collation = Some(strip_catalog(collation, schema));
        }
    }

    for constraint in table.constraints.values_mut() {
        if let Some(check) = &constraint.check_clause {
            constraint.check_clause = Some(canonical_check(check, &ctx));
        }
        if let Some(exclusion) = &constraint.exclusion {
            constraint.exclusion = Some(canonical_text(exclusion, schema));
        }
    }

    for index in table.indexes.values_mut() {
        normalize_index(index, &ctx);
    }

    for trigger in table.triggers.values_mut() {
        trigger.events.sort();
        trigger.events.dedup();
        trigger.function = strip_catalog(&trigger.function, schema);
        if let Some(condition) = &trigger.condition {
            trigger.condition = Some(canonical_expr(condition, &ctx));
        }
    }

    for policy in table.policies.values_mut() {
        for role in &mut policy.roles {
            *role = if role.eq_ignore_ascii_case("public") {
                "PUBLIC".to_string()
            } else {
                role.to_lowercase()
            };
        }
        policy.roles.sort();
        policy.roles.dedup();
        if let Some(using) = &policy.using {
            policy.using = Some(canonical_policy_expr(using, &ctx));
        }
        if let Some(check) = &policy.with_check {
            policy.with_check = Some(canonical_policy_expr(check, &ctx));
        }
    }

    if let Some(key) = &table.partition_key {
        table.partition_key = Some(canonical_text(key, schema));
    }
    if let Some(bound) = &table.partition_bound {
        table.partition_bound = Some(canonical_text(bound, schema));
    }
}

fn normalize_index(index: &mut Index, ctx: &ExprContext<'_>) {
    let schema = ctx.schema();
    index.method = index.method.to_lowercase();
    for column in &mut index.columns {
        column.nulls = column.nulls.effective(column.order);
        if let Some(opclass) = &column.opclass {
            column.opclass = Some(strip_catalog(&opclass.to_lowercase(), schema));
        }
        if let Some(collation) = &column.collation {
            column.collation = Some(strip_catalog(collation, schema));
        }
        if column.expression {
            let text = canonical_expr(&column.name, ctx);
            match as_plain_column(&text) {
                Some(name) => {
                    column.name = name;
                    column.expression = false;
                }
                None => column.name = text,
            }
        }
    }
    index.is_expression = index.columns.iter().any(|c| c.expression);
    if let Some(predicate) = &index.predicate {
        index.predicate = Some(canonical_expr(predicate, ctx));
    }
}

fn normalize_view(view: &mut View, schema: &str) {
    view.definition = canonical_view(&view.definition, schema);
    let ctx = ExprContext::new(schema);
    for index in view.indexes.values_mut() {
        normalize_index(index, &ctx);
    }
}

/// Trailing whitespace is dropped from every line; blank lines stay.
fn normalize_body(body: &str) -> String {
    body.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_parameters(parameters: &mut [Parameter], schema: &str) {
    for param in parameters {
        param.data_type = canonical_cast_type(&param.data_type, schema);
        if let Some(default) = &param.default {
            let ctx = ExprContext::new(schema).with_value_type(&param.data_type);
            param.default = Some(canonical_expr(default, &ctx));
        }
    }
}

/// `a, "B", c` with each entry unquoted and trimmed.
pub fn canonical_search_path(path: &str) -> String {
    path.split(',')
        .map(|entry| {
            let entry = entry.trim();
            match entry.strip_prefix('"').and_then(|e| e.strip_suffix('"')) {
                Some(quoted) => quoted.replace("\"\"", "\""),
                None => entry.to_string(),
            }
        })
        .filter(|entry| !entry.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split at commas outside parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Canonical `RETURNS` clause: a type, `SETOF type` or `TABLE(name type, ...)`.
pub fn canonical_return_type(text: &str, schema: &str) -> String {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("setof ") {
        let inner = &text[text.len() - rest.len()..];
        return format!("SETOF {}", canonical_cast_type(inner, schema));
    }
    if lower.starts_with("table") {
        let columns = text[5..].trim();
        if let Some(columns) = columns.strip_prefix('(').and_then(|c| c.strip_suffix(')')) {
            let columns: Vec<String> = split_top_level(columns)
                .into_iter()
                .map(|column| canonical_table_column(column, schema))
                .collect();
            return format!("TABLE({})", columns.join(", "));
        }
    }
    canonical_cast_type(text, schema)
}

fn canonical_table_column(column: &str, schema: &str) -> String {
    let column = column.trim();
    let Ok(tokens) = tokenize(column) else {
        return column.to_string();
    };
    match (tokens.first().and_then(|t| t.ident()), tokens.get(1)) {
        (Some(name), Some(ty)) => format!(
            "{} {}",
            quote_ident(&name),
            canonical_cast_type(&column[ty.span.start..], schema)
        ),
        _ => column.to_string(),
    }
}

fn normalize_function(function: &mut Function, schema: &str) {
    function.language = function.language.to_lowercase();
    function.definition = normalize_body(&function.definition);
    function.return_type = canonical_return_type(&function.return_type, schema);
    normalize_parameters(&mut function.parameters, schema);
    if let Some(path) = &function.search_path {
        function.search_path = Some(canonical_search_path(path));
    }
}

fn normalize_procedure(procedure: &mut Procedure, schema: &str) {
    procedure.language = procedure.language.to_lowercase();
    procedure.definition = normalize_body(&procedure.definition);
    normalize_parameters(&mut procedure.parameters, schema);
    if let Some(path) = &procedure.search_path {
        procedure.search_path = Some(canonical_search_path(path));
    }
}

fn normalize_aggregate(aggregate: &mut Aggregate, schema: &str) {
    for arg in &mut aggregate.arguments {
        *arg = canonical_cast_type(arg, schema);
    }
    aggregate.state_function = strip_catalog(&aggregate.state_function, schema);
    aggregate.state_type = canonical_cast_type(&aggregate.state_type, schema);
    for f in [&mut aggregate.final_function, &mut aggregate.combine_function]
        .into_iter()
        .flatten()
    {
        *f = strip_catalog(f, schema);
    }
}

fn normalize_sequence(sequence: &mut Sequence, schema: &str) {
    if let Some(ty) = &sequence.data_type {
        sequence.data_type = Some(canonical_cast_type(ty, schema));
    }
    sequence.suppress_defaults();
}

fn normalize_type(ty: &mut Type, schema: &str) {
    match &mut ty.kind {
        TypeKind::Enum(_) => {}
        TypeKind::Composite(attributes) => {
            for attr in attributes {
                attr.data_type = canonical_cast_type(&attr.data_type, schema);
            }
        }
        TypeKind::Domain(domain) => {
            domain.base_type = canonical_cast_type(&domain.base_type, schema);
            let mut ctx = ExprContext::new(schema);
            if is_string_type(&domain.base_type) {
                ctx = ctx.with_text_columns(["value".to_string()]);
            }
            if let Some(default) = &domain.default {
                let value_ctx = ctx.clone().with_value_type(&domain.base_type);
                domain.default = Some(canonical_expr(default, &value_ctx));
            }
            if let Some(collation) = &domain.collation {
                domain.collation = Some(strip_catalog(collation, schema));
            }
            for constraint in &mut domain.constraints {
                constraint.check_clause = canonical_check(&constraint.check_clause, &ctx);
            }
            domain.constraints.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }
}

/// Merge entries per grantee and grant option, upper-case and sort the
/// privilege lists, and forget `MAINTAIN` when the rest already amounts to
/// `ALL`.
fn normalize_default_privileges(entries: &mut Vec<DefaultPrivilege>) {
    let mut merged: BTreeMap<_, Vec<String>> = BTreeMap::new();
    for entry in entries.drain(..) {
        let grantee = if entry.grantee.eq_ignore_ascii_case("public") {
            "PUBLIC".to_string()
        } else {
            entry.grantee
        };
        merged
            .entry((entry.object_type, grantee, entry.grantable))
            .or_default()
            .extend(entry.privileges.iter().map(|p| p.trim().to_ascii_uppercase()));
    }
    for ((object_type, grantee, grantable), mut privileges) in merged {
        privileges.sort();
        privileges.dedup();
        let all = object_type.all_privileges();
        if all.iter().all(|p| privileges.iter().any(|q| q == p)) {
            privileges.retain(|p| p != "MAINTAIN");
        }
        entries.push(DefaultPrivilege {
            object_type,
            grantee,
            privileges,
            grantable,
        });
    }
    entries.sort();
}
