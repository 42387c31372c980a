//! Statement grammar.
//!
//! Recursive descent over the token stream of a single statement. Clauses
//! that carry expressions keep their source text; the builder and the
//! normalizer take it from there.

use pgir_model::{
    IdentityGeneration, MatchType, NullsOrder, ParallelSafety, ParameterMode, PartitionStrategy,
    PolicyCommand, PrivilegeObjectType, ReferentialAction, SortOrder, TriggerEvent, TriggerLevel,
    TriggerTiming, Volatility,
};
use pgir_sql::{Token, TokenKind, quote_ident};

use super::ast::*;
use super::cursor::Cursor;
use crate::Result;

/// Words that end a column `DEFAULT` expression.
const COLUMN_STOP: &[&str] = &[
    "not",
    "null",
    "constraint",
    "primary",
    "unique",
    "check",
    "references",
    "generated",
    "default",
    "collate",
    "deferrable",
    "initially",
];

/// Parse one statement, without its terminating semicolon.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let mut c = Cursor::new(sql)?;
    let parsed = if c.eat_word("create") {
        c.eat_words(&["or", "replace"]);
        create(&mut c)?
    } else if c.eat_word("alter") {
        alter(&mut c)?
    } else if c.eat_word("comment") {
        comment(&mut c)?
    } else {
        None
    };
    Ok(parsed.unwrap_or_else(|| {
        let head: Vec<&str> = sql.split_whitespace().take(2).collect();
        Statement::Other(head.join(" ").to_ascii_uppercase())
    }))
}

fn create(c: &mut Cursor) -> Result<Option<Statement>> {
    let unique = c.eat_word("unique");
    if unique || c.peek_word("index") {
        c.expect_word("index")?;
        return create_index(c, unique).map(|i| Some(Statement::CreateIndex(i)));
    }
    if c.eat_word("schema") {
        c.eat_words(&["if", "not", "exists"]);
        // `CREATE SCHEMA AUTHORIZATION role` names the schema after the role
        c.eat_word("authorization");
        return Ok(Some(Statement::CreateSchema(c.ident()?)));
    }
    if c.eat_word("global") || c.eat_word("local") || c.peek_word("temp") || c.peek_word("temporary")
    {
        return Ok(None);
    }
    c.eat_word("unlogged");

    if c.eat_word("table") {
        return create_table(c).map(|t| t.map(Statement::CreateTable));
    }
    if c.eat_word("view") {
        return create_view(c, false).map(|v| Some(Statement::CreateView(v)));
    }
    if c.eat_words(&["materialized", "view"]) {
        return create_view(c, true).map(|v| Some(Statement::CreateView(v)));
    }
    if c.eat_word("function") {
        return create_routine(c, false).map(|r| Some(Statement::CreateRoutine(r)));
    }
    if c.eat_word("procedure") {
        return create_routine(c, true).map(|r| Some(Statement::CreateRoutine(r)));
    }
    if c.eat_word("aggregate") {
        return create_aggregate(c).map(|a| Some(Statement::CreateAggregate(a)));
    }
    if c.eat_word("sequence") {
        c.eat_words(&["if", "not", "exists"]);
        let name = c.qualified_name()?;
        let options = sequence_options(c)?;
        c.expect_end()?;
        return Ok(Some(Statement::CreateSequence(SequenceDef { name, options })));
    }
    if c.eat_word("type") {
        return create_type(c).map(|t| t.map(Statement::CreateType));
    }
    if c.eat_word("domain") {
        return create_domain(c).map(|d| Some(Statement::CreateDomain(d)));
    }
    if c.eat_word("trigger") {
        return create_trigger(c, false).map(|t| Some(Statement::CreateTrigger(t)));
    }
    if c.eat_words(&["constraint", "trigger"]) {
        return create_trigger(c, true).map(|t| Some(Statement::CreateTrigger(t)));
    }
    if c.eat_word("policy") {
        return create_policy(c).map(|p| Some(Statement::CreatePolicy(p)));
    }
    Ok(None)
}

fn create_table(c: &mut Cursor) -> Result<Option<CreateTable>> {
    c.eat_words(&["if", "not", "exists"]);
    let name = c.qualified_name()?;
    // typed tables and CREATE TABLE AS
    if c.peek_word("of") || c.peek_word("as") {
        return Ok(None);
    }

    let mut table = CreateTable {
        name,
        elements: Vec::new(),
        partition_by: None,
        partition_of: None,
    };
    if c.eat_words(&["partition", "of"]) {
        let parent = c.qualified_name()?;
        if c.peek_kind(TokenKind::LParen) {
            table.elements = table_elements(c, true)?;
        }
        let bound = partition_bound(c)?;
        table.partition_of = Some(PartitionOf { parent, bound });
    } else {
        table.elements = table_elements(c, false)?;
    }

    loop {
        if c.eat_word("inherits") {
            c.paren_text()?;
        } else if c.eat_words(&["partition", "by"]) {
            let word = c.ident()?;
            let strategy = PartitionStrategy::parse(&word)
                .ok_or_else(|| c.error(format!("unknown partition strategy {word:?}")))?;
            let key = c.paren_text()?;
            table.partition_by = Some((strategy, key));
        } else if c.eat_word("using") || c.eat_word("tablespace") {
            c.ident()?;
        } else if c.eat_word("with") {
            c.paren_text()?;
        } else if c.eat_words(&["without", "oids"]) {
        } else if c.eat_words(&["on", "commit"]) {
            c.rest_text();
        } else {
            break;
        }
    }
    c.expect_end()?;
    Ok(Some(table))
}

/// `( element, ... )`. Partition children may list columns without types.
fn table_elements(c: &mut Cursor, partition: bool) -> Result<Vec<TableElement>> {
    c.expect_kind(TokenKind::LParen)?;
    let mut elements = Vec::new();
    if c.eat_kind(TokenKind::RParen) {
        return Ok(elements);
    }
    loop {
        let element = if c.eat_word("like") {
            TableElement::Like(like_clause(c)?)
        } else if starts_table_constraint(c) {
            TableElement::Constraint(table_constraint(c)?)
        } else {
            TableElement::Column(column_def(c, partition)?)
        };
        elements.push(element);
        if !c.eat_kind(TokenKind::Comma) {
            break;
        }
    }
    c.expect_kind(TokenKind::RParen)?;
    Ok(elements)
}

fn starts_table_constraint(c: &Cursor) -> bool {
    ["constraint", "primary", "unique", "check", "foreign", "exclude"]
        .iter()
        .any(|w| c.peek_word(w))
}

fn like_clause(c: &mut Cursor) -> Result<LikeClause> {
    let source = c.qualified_name()?;
    let mut options = LikeOptions::default();
    loop {
        let including = if c.eat_word("including") {
            true
        } else if c.eat_word("excluding") {
            false
        } else {
            break;
        };
        let word = c.ident()?;
        let bit = LikeOptions::bit(&word)
            .ok_or_else(|| c.error(format!("unknown LIKE option {word:?}")))?;
        if including {
            options.0 |= bit;
        } else {
            options.0 &= !bit;
        }
    }
    Ok(LikeClause { source, options })
}

fn column_def(c: &mut Cursor, partition: bool) -> Result<ColumnDef> {
    let name = c.ident()?;
    let data_type = if partition {
        c.eat_words(&["with", "options"]);
        String::new()
    } else {
        c.type_name()?
    };
    let mut column = ColumnDef {
        name,
        data_type,
        collation: None,
        constraints: Vec::new(),
    };
    loop {
        if c.eat_word("collate") {
            column.collation = Some(c.qualified_name()?.to_string());
        } else if c.eat_word("compression") || c.eat_word("storage") {
            c.ident()?;
        } else if let Some(constraint) = column_constraint(c)? {
            column.constraints.push(constraint);
        } else {
            break;
        }
    }
    Ok(column)
}

fn column_constraint(c: &mut Cursor) -> Result<Option<ColumnConstraint>> {
    let name = if c.eat_word("constraint") {
        Some(c.ident()?)
    } else {
        None
    };
    let kind = if c.eat_words(&["not", "null"]) {
        ColumnConstraintKind::NotNull
    } else if c.eat_word("null") {
        ColumnConstraintKind::Null
    } else if c.eat_word("default") {
        ColumnConstraintKind::Default(c.expr_text(COLUMN_STOP)?)
    } else if c.eat_words(&["primary", "key"]) {
        index_parameters(c)?;
        ColumnConstraintKind::PrimaryKey
    } else if c.eat_word("unique") {
        let nulls_not_distinct = nulls_distinct(c);
        index_parameters(c)?;
        ColumnConstraintKind::Unique { nulls_not_distinct }
    } else if c.eat_word("check") {
        let expr = c.paren_text()?;
        let no_inherit = c.eat_words(&["no", "inherit"]);
        ColumnConstraintKind::Check { expr, no_inherit }
    } else if c.eat_word("references") {
        ColumnConstraintKind::References(foreign_key_target(c)?)
    } else if c.eat_word("generated") {
        generated(c)?
    } else if name.is_some() {
        return Err(c.error("expected a constraint after CONSTRAINT name"));
    } else {
        return Ok(None);
    };
    let (deferrable, initially_deferred) = deferral(c);
    Ok(Some(ColumnConstraint {
        name,
        kind,
        deferrable,
        initially_deferred,
    }))
}

/// After `GENERATED`: identity or generated-column expression.
fn generated(c: &mut Cursor) -> Result<ColumnConstraintKind> {
    let generation = if c.eat_word("always") {
        IdentityGeneration::Always
    } else {
        c.expect_words(&["by", "default"])?;
        IdentityGeneration::ByDefault
    };
    c.expect_word("as")?;
    if c.eat_word("identity") {
        let options = if c.eat_kind(TokenKind::LParen) {
            let options = sequence_options(c)?;
            c.expect_kind(TokenKind::RParen)?;
            options
        } else {
            SequenceOptions::default()
        };
        return Ok(ColumnConstraintKind::Identity {
            generation,
            options,
        });
    }
    if generation == IdentityGeneration::ByDefault {
        return Err(c.error("expected IDENTITY"));
    }
    let expr = c.paren_text()?;
    let stored = if c.eat_word("virtual") {
        false
    } else {
        c.eat_word("stored");
        true
    };
    Ok(ColumnConstraintKind::Generated { expr, stored })
}

/// `NULLS [NOT] DISTINCT`; true for `NOT DISTINCT`.
fn nulls_distinct(c: &mut Cursor) -> bool {
    if c.eat_words(&["nulls", "not", "distinct"]) {
        return true;
    }
    c.eat_words(&["nulls", "distinct"]);
    false
}

/// Index options of a PRIMARY KEY or UNIQUE constraint; returns `INCLUDE`.
fn index_parameters(c: &mut Cursor) -> Result<Vec<String>> {
    let mut include = Vec::new();
    loop {
        if c.eat_word("include") {
            include = c.ident_list()?;
        } else if c.peek_word("with") && c.peek_nth(1).is_some_and(|t| t.kind == TokenKind::LParen)
        {
            c.expect_word("with")?;
            c.paren_text()?;
        } else if c.eat_words(&["using", "index", "tablespace"]) {
            c.ident()?;
        } else {
            return Ok(include);
        }
    }
}

fn foreign_key_target(c: &mut Cursor) -> Result<ForeignKeyTarget> {
    let table = c.qualified_name()?;
    let columns = if c.peek_kind(TokenKind::LParen) {
        c.ident_list()?
    } else {
        Vec::new()
    };
    let mut target = ForeignKeyTarget {
        table,
        columns,
        on_delete: ReferentialAction::NoAction,
        on_update: ReferentialAction::NoAction,
        match_type: MatchType::Simple,
    };
    loop {
        if c.eat_word("match") {
            target.match_type = if c.eat_word("full") {
                MatchType::Full
            } else if c.eat_word("partial") {
                MatchType::Partial
            } else {
                c.expect_word("simple")?;
                MatchType::Simple
            };
        } else if c.eat_words(&["on", "delete"]) {
            target.on_delete = referential_action(c)?;
        } else if c.eat_words(&["on", "update"]) {
            target.on_update = referential_action(c)?;
        } else {
            return Ok(target);
        }
    }
}

fn referential_action(c: &mut Cursor) -> Result<ReferentialAction> {
    if c.eat_word("cascade") {
        return Ok(ReferentialAction::Cascade);
    }
    if c.eat_word("restrict") {
        return Ok(ReferentialAction::Restrict);
    }
    if c.eat_words(&["no", "action"]) {
        return Ok(ReferentialAction::NoAction);
    }
    c.expect_word("set")?;
    let action = if c.eat_word("null") {
        ReferentialAction::SetNull
    } else {
        c.expect_word("default")?;
        ReferentialAction::SetDefault
    };
    // column list of SET NULL (a, b)
    if c.peek_kind(TokenKind::LParen) {
        c.ident_list()?;
    }
    Ok(action)
}

/// `[NOT] DEFERRABLE`, `INITIALLY {DEFERRED | IMMEDIATE}` in any order.
fn deferral(c: &mut Cursor) -> (bool, bool) {
    let mut deferrable = false;
    let mut initially_deferred = false;
    loop {
        if c.eat_words(&["not", "deferrable"]) {
            deferrable = false;
        } else if c.eat_word("deferrable") {
            deferrable = true;
        } else if c.eat_words(&["initially", "deferred"]) {
            deferrable = true;
            initially_deferred = true;
        } else if c.eat_words(&["initially", "immediate"]) {
            initially_deferred = false;
        } else {
            return (deferrable, initially_deferred);
        }
    }
}

fn table_constraint(c: &mut Cursor) -> Result<TableConstraint> {
    let name = if c.eat_word("constraint") {
        Some(c.ident()?)
    } else {
        None
    };
    let kind = if c.eat_words(&["primary", "key"]) {
        let columns = c.ident_list()?;
        let include = index_parameters(c)?;
        TableConstraintKind::PrimaryKey { columns, include }
    } else if c.eat_word("unique") {
        let nulls_not_distinct = nulls_distinct(c);
        let columns = c.ident_list()?;
        let include = index_parameters(c)?;
        TableConstraintKind::Unique {
            columns,
            include,
            nulls_not_distinct,
        }
    } else if c.eat_word("check") {
        let expr = c.paren_text()?;
        c.eat_words(&["no", "inherit"]);
        TableConstraintKind::Check { expr }
    } else if c.eat_words(&["foreign", "key"]) {
        let columns = c.ident_list()?;
        c.expect_word("references")?;
        let target = foreign_key_target(c)?;
        TableConstraintKind::ForeignKey { columns, target }
    } else if c.peek_word("exclude") {
        TableConstraintKind::Exclude(c.scan_text(&["deferrable", "initially", "not"])?)
    } else {
        return Err(c.error("expected a table constraint"));
    };
    let (deferrable, initially_deferred) = deferral(c);
    let not_valid = c.eat_words(&["not", "valid"]);
    Ok(TableConstraint {
        name,
        kind,
        deferrable,
        initially_deferred,
        not_valid,
    })
}

/// `FOR VALUES ...` or `DEFAULT`, as written.
fn partition_bound(c: &mut Cursor) -> Result<String> {
    if c.eat_word("default") {
        return Ok("DEFAULT".into());
    }
    let start = c.position();
    c.expect_words(&["for", "values"])?;
    if c.eat_word("in") {
        c.paren_text()?;
    } else if c.eat_word("from") {
        c.paren_text()?;
        c.expect_word("to")?;
        c.paren_text()?;
    } else {
        c.expect_word("with")?;
        c.paren_text()?;
    }
    Ok(c.text_since(start))
}

fn sequence_options(c: &mut Cursor) -> Result<SequenceOptions> {
    let mut options = SequenceOptions::default();
    loop {
        if c.eat_word("as") {
            options.data_type = Some(c.type_name()?);
        } else if c.eat_word("increment") {
            c.eat_word("by");
            options.increment = Some(c.integer()?);
        } else if c.eat_words(&["no", "minvalue"]) {
            options.min = None;
        } else if c.eat_words(&["no", "maxvalue"]) {
            options.max = None;
        } else if c.eat_word("minvalue") {
            options.min = Some(c.integer()?);
        } else if c.eat_word("maxvalue") {
            options.max = Some(c.integer()?);
        } else if c.eat_word("start") {
            c.eat_word("with");
            options.start = Some(c.integer()?);
        } else if c.eat_word("restart") {
            c.eat_word("with");
            if c.peek_kind(TokenKind::Number) {
                c.integer()?;
            }
        } else if c.eat_word("cache") {
            options.cache = Some(c.integer()?);
        } else if c.eat_words(&["no", "cycle"]) {
            options.cycle = Some(false);
        } else if c.eat_word("cycle") {
            options.cycle = Some(true);
        } else if c.eat_words(&["owned", "by"]) {
            options.owned_by = Some(if c.eat_word("none") {
                None
            } else {
                Some(owner_column(c)?)
            });
        } else if c.eat_words(&["sequence", "name"]) {
            c.qualified_name()?;
        } else if c.eat_word("logged") || c.eat_word("unlogged") {
        } else {
            return Ok(options);
        }
    }
}

/// `[schema.]table.column`.
fn owner_column(c: &mut Cursor) -> Result<(QualifiedName, String)> {
    let mut parts = c.dotted()?;
    let column = parts.pop().unwrap_or_default();
    let table = match parts.as_slice() {
        [table] => QualifiedName {
            schema: None,
            name: table.clone(),
        },
        [schema, table] => QualifiedName {
            schema: Some(schema.clone()),
            name: table.clone(),
        },
        _ => return Err(c.error("expected table.column")),
    };
    Ok((table, column))
}

fn create_index(c: &mut Cursor, unique: bool) -> Result<CreateIndex> {
    c.eat_word("concurrently");
    c.eat_words(&["if", "not", "exists"]);
    let name = if c.peek_word("on") {
        None
    } else {
        Some(c.ident()?)
    };
    c.expect_word("on")?;
    c.eat_word("only");
    let table = c.qualified_name()?;
    let method = if c.eat_word("using") {
        Some(c.ident()?)
    } else {
        None
    };

    c.expect_kind(TokenKind::LParen)?;
    let mut elements = Vec::new();
    loop {
        elements.push(index_element(c)?);
        if !c.eat_kind(TokenKind::Comma) {
            break;
        }
    }
    c.expect_kind(TokenKind::RParen)?;

    let include = if c.eat_word("include") {
        c.ident_list()?
    } else {
        Vec::new()
    };
    let nulls_not_distinct = nulls_distinct(c);
    if c.eat_word("with") {
        c.paren_text()?;
    }
    if c.eat_word("tablespace") {
        c.ident()?;
    }
    let predicate = if c.eat_word("where") {
        Some(c.rest_text())
    } else {
        None
    };
    c.expect_end()?;
    Ok(CreateIndex {
        name,
        unique,
        table,
        method,
        elements,
        include,
        nulls_not_distinct,
        predicate,
    })
}

fn index_element(c: &mut Cursor) -> Result<IndexElement> {
    let is_kind = |t: Option<&Token>, kind| t.is_some_and(|t| t.kind == kind);
    let call = is_kind(c.peek_nth(1), TokenKind::LParen)
        || (is_kind(c.peek_nth(1), TokenKind::Dot) && is_kind(c.peek_nth(3), TokenKind::LParen));
    let (text, expression) = if c.peek_kind(TokenKind::LParen) {
        (c.paren_text()?, true)
    } else if call {
        (c.expr_text(&["collate", "asc", "desc", "nulls"])?, true)
    } else {
        (c.ident()?, false)
    };

    let collation = if c.eat_word("collate") {
        Some(c.qualified_name()?.to_string())
    } else {
        None
    };
    let opclass = if c.peek().is_some_and(|t| t.ident().is_some())
        && !["asc", "desc", "nulls", "with"].iter().any(|w| c.peek_word(w))
    {
        let opclass = c.qualified_name()?.to_string();
        if c.peek_kind(TokenKind::LParen) {
            c.paren_text()?;
        }
        Some(opclass)
    } else {
        None
    };
    let order = if c.eat_word("desc") {
        SortOrder::Desc
    } else {
        c.eat_word("asc");
        SortOrder::Asc
    };
    let nulls = if c.eat_words(&["nulls", "first"]) {
        NullsOrder::First
    } else if c.eat_words(&["nulls", "last"]) {
        NullsOrder::Last
    } else {
        NullsOrder::Default
    };
    Ok(IndexElement {
        text,
        expression,
        collation,
        opclass,
        order,
        nulls,
    })
}

/// The index behind an `EXCLUDE [USING method] (element WITH op, ...)`
/// clause. The result has no name and no table.
pub fn exclusion_index(text: &str) -> Result<CreateIndex> {
    let mut c = Cursor::new(text)?;
    c.expect_word("exclude")?;
    let method = if c.eat_word("using") {
        Some(c.ident()?)
    } else {
        None
    };
    c.expect_kind(TokenKind::LParen)?;
    let mut elements = Vec::new();
    loop {
        elements.push(index_element(&mut c)?);
        c.expect_word("with")?;
        if c.eat_word("operator") {
            c.paren_text()?;
        } else if c.advance().is_none() {
            return Err(c.error("expected an exclusion operator"));
        }
        if !c.eat_kind(TokenKind::Comma) {
            break;
        }
    }
    c.expect_kind(TokenKind::RParen)?;
    let include = if c.eat_word("include") {
        c.ident_list()?
    } else {
        Vec::new()
    };
    if c.eat_word("with") {
        c.paren_text()?;
    }
    if c.eat_words(&["using", "index", "tablespace"]) {
        c.ident()?;
    }
    let predicate = if c.eat_word("where") {
        Some(c.paren_text()?)
    } else {
        None
    };
    c.expect_end()?;
    Ok(CreateIndex {
        name: None,
        unique: false,
        table: QualifiedName {
            schema: None,
            name: String::new(),
        },
        method,
        elements,
        include,
        nulls_not_distinct: false,
        predicate,
    })
}

fn create_view(c: &mut Cursor, materialized: bool) -> Result<CreateView> {
    c.eat_words(&["if", "not", "exists"]);
    let name = c.qualified_name()?;
    if c.peek_kind(TokenKind::LParen) {
        c.ident_list()?;
    }
    if c.eat_word("using") {
        c.ident()?;
    }
    if c.eat_word("with") {
        c.paren_text()?;
    }
    if c.eat_word("tablespace") {
        c.ident()?;
    }
    c.expect_word("as")?;
    let query = c.rest_text_without(&[
        &["with", "no", "data"],
        &["with", "data"],
        &["with", "cascaded", "check", "option"],
        &["with", "local", "check", "option"],
        &["with", "check", "option"],
    ]);
    Ok(CreateView {
        name,
        materialized,
        query,
    })
}

fn parameter_list(c: &mut Cursor) -> Result<Vec<ParamDef>> {
    c.expect_kind(TokenKind::LParen)?;
    let mut params = Vec::new();
    if c.eat_kind(TokenKind::RParen) {
        return Ok(params);
    }
    loop {
        params.push(parameter(c)?);
        if !c.eat_kind(TokenKind::Comma) {
            break;
        }
    }
    c.expect_kind(TokenKind::RParen)?;
    Ok(params)
}

/// `[mode] [name] type [DEFAULT expr]`.
fn parameter(c: &mut Cursor) -> Result<ParamDef> {
    let mode = if c.eat_word("inout") {
        ParameterMode::InOut
    } else if c.eat_word("out") {
        ParameterMode::Out
    } else if c.eat_word("variadic") {
        ParameterMode::Variadic
    } else {
        c.eat_word("in");
        ParameterMode::In
    };
    let ends_type = |t: &Token| {
        matches!(t.kind, TokenKind::Comma | TokenKind::RParen)
            || t.is_word("default")
            || t.is_op("=")
    };
    let name = if c.type_then(ends_type) {
        None
    } else {
        Some(c.ident()?)
    };
    let data_type = c.type_name()?;
    let default = if c.eat_word("default") || c.eat_op("=") {
        Some(c.expr_text(&[])?)
    } else {
        None
    };
    Ok(ParamDef {
        mode,
        name,
        data_type,
        default,
    })
}

fn create_routine(c: &mut Cursor, procedure: bool) -> Result<CreateRoutine> {
    let name = c.qualified_name()?;
    let mut params = parameter_list(c)?;
    let mut returns = None;
    if !procedure && c.eat_word("returns") {
        if c.eat_word("table") {
            c.expect_kind(TokenKind::LParen)?;
            let mut columns = Vec::new();
            loop {
                let column = c.ident()?;
                let data_type = c.type_name()?;
                columns.push((column, data_type));
                if !c.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
            c.expect_kind(TokenKind::RParen)?;
            let rendered: Vec<String> = columns
                .iter()
                .map(|(n, t)| format!("{} {t}", quote_ident(n)))
                .collect();
            returns = Some(format!("TABLE({})", rendered.join(", ")));
            params.extend(columns.into_iter().map(|(n, t)| ParamDef {
                mode: ParameterMode::Table,
                name: Some(n),
                data_type: t,
                default: None,
            }));
        } else if c.eat_word("setof") {
            returns = Some(format!("SETOF {}", c.type_name()?));
        } else {
            returns = Some(c.type_name()?);
        }
    }

    let mut routine = CreateRoutine {
        name,
        procedure,
        params,
        returns,
        language: None,
        body: String::new(),
        volatility: Volatility::Volatile,
        strict: false,
        security_definer: false,
        leakproof: false,
        parallel: ParallelSafety::Unsafe,
        search_path: None,
    };
    loop {
        if c.eat_word("language") {
            routine.language = Some(if c.peek_kind(TokenKind::String) {
                c.string()?
            } else {
                c.ident()?
            });
        } else if c.eat_word("as") {
            routine.body = c.string()?;
            // C functions: AS 'obj_file', 'link_symbol'
            if c.eat_kind(TokenKind::Comma) {
                c.string()?;
            }
        } else if c.eat_word("immutable") {
            routine.volatility = Volatility::Immutable;
        } else if c.eat_word("stable") {
            routine.volatility = Volatility::Stable;
        } else if c.eat_word("volatile") {
            routine.volatility = Volatility::Volatile;
        } else if c.eat_words(&["not", "leakproof"]) {
            routine.leakproof = false;
        } else if c.eat_word("leakproof") {
            routine.leakproof = true;
        } else if c.eat_word("strict") || c.eat_words(&["returns", "null", "on", "null", "input"]) {
            routine.strict = true;
        } else if c.eat_words(&["called", "on", "null", "input"]) {
            routine.strict = false;
        } else if c.eat_words(&["security", "definer"])
            || c.eat_words(&["external", "security", "definer"])
        {
            routine.security_definer = true;
        } else if c.eat_words(&["security", "invoker"])
            || c.eat_words(&["external", "security", "invoker"])
        {
            routine.security_definer = false;
        } else if c.eat_word("parallel") {
            routine.parallel = match c.ident()?.as_str() {
                "safe" => ParallelSafety::Safe,
                "restricted" => ParallelSafety::Restricted,
                "unsafe" => ParallelSafety::Unsafe,
                other => return Err(c.error(format!("unknown PARALLEL setting {other:?}"))),
            };
        } else if c.eat_word("cost") || c.eat_word("rows") {
            c.integer()?;
        } else if c.eat_word("support") {
            c.qualified_name()?;
        } else if c.eat_word("window") {
        } else if c.eat_word("transform") {
            loop {
                c.expect_words(&["for", "type"])?;
                c.type_name()?;
                if !c.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        } else if c.eat_word("set") {
            let parameter = c.ident()?;
            if c.eat_words(&["from", "current"]) {
                continue;
            }
            if !c.eat_word("to") && !c.eat_op("=") {
                return Err(c.error("expected TO or = after SET parameter"));
            }
            let value = setting_value(c)?;
            if parameter == "search_path" {
                routine.search_path = Some(value);
            }
        } else if c.peek_word("begin") || c.peek_word("return") {
            // SQL-standard body
            routine.body = c.rest_text();
        } else {
            break;
        }
    }
    c.expect_end()?;
    Ok(routine)
}

/// Comma-separated `SET` values, string literals unquoted.
fn setting_value(c: &mut Cursor) -> Result<String> {
    let mut values = Vec::new();
    loop {
        if c.peek_kind(TokenKind::String) {
            values.push(c.string()?);
        } else {
            let start = c.position();
            if c.advance().is_none() {
                return Err(c.error("expected a setting value"));
            }
            values.push(c.text_since(start));
        }
        if !c.eat_kind(TokenKind::Comma) {
            return Ok(values.join(", "));
        }
    }
}

fn create_aggregate(c: &mut Cursor) -> Result<CreateAggregate> {
    let name = c.qualified_name()?;
    c.expect_kind(TokenKind::LParen)?;
    let mut arguments = Vec::new();
    if !c.eat_op("*") && !c.peek_kind(TokenKind::RParen) {
        loop {
            let param = parameter(c)?;
            if param.mode.is_input() {
                arguments.push(param.data_type);
            }
            if !c.eat_kind(TokenKind::Comma) {
                break;
            }
        }
    }
    c.expect_kind(TokenKind::RParen)?;

    let mut aggregate = CreateAggregate {
        name,
        arguments,
        state_function: String::new(),
        state_type: String::new(),
        final_function: None,
        combine_function: None,
        initial_condition: None,
        parallel: ParallelSafety::Unsafe,
    };
    c.expect_kind(TokenKind::LParen)?;
    loop {
        let key = c.ident()?;
        if !c.eat_op("=") {
            return Err(c.error(format!("expected = after {key}")));
        }
        match key.as_str() {
            "sfunc" => aggregate.state_function = c.qualified_name()?.to_string(),
            "stype" => aggregate.state_type = c.type_name()?,
            "finalfunc" => aggregate.final_function = Some(c.qualified_name()?.to_string()),
            "combinefunc" => aggregate.combine_function = Some(c.qualified_name()?.to_string()),
            "initcond" => aggregate.initial_condition = Some(c.string()?),
            "parallel" => {
                aggregate.parallel = match c.ident()?.as_str() {
                    "safe" => ParallelSafety::Safe,
                    "restricted" => ParallelSafety::Restricted,
                    _ => ParallelSafety::Unsafe,
                }
            }
            _ => c.skip_item(),
        }
        if !c.eat_kind(TokenKind::Comma) {
            break;
        }
    }
    c.expect_kind(TokenKind::RParen)?;
    c.expect_end()?;
    Ok(aggregate)
}

fn create_type(c: &mut Cursor) -> Result<Option<CreateType>> {
    let name = c.qualified_name()?;
    // shell and base types
    if !c.eat_word("as") {
        return Ok(None);
    }
    if c.eat_word("enum") {
        c.expect_kind(TokenKind::LParen)?;
        let mut labels = Vec::new();
        if !c.peek_kind(TokenKind::RParen) {
            loop {
                labels.push(c.string()?);
                if !c.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        c.expect_kind(TokenKind::RParen)?;
        c.expect_end()?;
        return Ok(Some(CreateType::Enum { name, labels }));
    }
    if !c.peek_kind(TokenKind::LParen) {
        // RANGE, MULTIRANGE
        return Ok(None);
    }
    c.expect_kind(TokenKind::LParen)?;
    let mut attributes = Vec::new();
    if !c.peek_kind(TokenKind::RParen) {
        loop {
            let attribute = c.ident()?;
            let data_type = c.type_name()?;
            if c.eat_word("collate") {
                c.qualified_name()?;
            }
            attributes.push((attribute, data_type));
            if !c.eat_kind(TokenKind::Comma) {
                break;
            }
        }
    }
    c.expect_kind(TokenKind::RParen)?;
    c.expect_end()?;
    Ok(Some(CreateType::Composite { name, attributes }))
}

fn create_domain(c: &mut Cursor) -> Result<CreateDomain> {
    let name = c.qualified_name()?;
    c.eat_word("as");
    let mut domain = CreateDomain {
        name,
        base_type: c.type_name()?,
        collation: None,
        default: None,
        not_null: false,
        checks: Vec::new(),
    };
    loop {
        if c.eat_word("collate") {
            domain.collation = Some(c.qualified_name()?.to_string());
            continue;
        }
        if c.eat_word("default") {
            domain.default = Some(c.expr_text(&["constraint", "not", "null", "check"])?);
            continue;
        }
        let constraint = if c.eat_word("constraint") {
            Some(c.ident()?)
        } else {
            None
        };
        if c.eat_words(&["not", "null"]) {
            domain.not_null = true;
        } else if c.eat_word("null") {
            domain.not_null = false;
        } else if c.eat_word("check") {
            let expr = c.paren_text()?;
            domain.checks.push((constraint, expr));
        } else if constraint.is_some() {
            return Err(c.error("expected a domain constraint"));
        } else {
            break;
        }
    }
    c.expect_end()?;
    Ok(domain)
}

fn create_trigger(c: &mut Cursor, constraint: bool) -> Result<CreateTrigger> {
    let name = c.ident()?;
    let timing = if c.eat_word("before") {
        TriggerTiming::Before
    } else if c.eat_word("after") {
        TriggerTiming::After
    } else {
        c.expect_words(&["instead", "of"])?;
        TriggerTiming::InsteadOf
    };

    let mut events = Vec::new();
    let mut update_columns = Vec::new();
    loop {
        let event = if c.eat_word("insert") {
            TriggerEvent::Insert
        } else if c.eat_word("update") {
            if c.eat_word("of") {
                loop {
                    update_columns.push(c.ident()?);
                    if !c.eat_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            TriggerEvent::Update
        } else if c.eat_word("delete") {
            TriggerEvent::Delete
        } else {
            c.expect_word("truncate")?;
            TriggerEvent::Truncate
        };
        events.push(event);
        if !c.eat_word("or") {
            break;
        }
    }
    c.expect_word("on")?;

    let mut trigger = CreateTrigger {
        name,
        constraint,
        timing,
        events,
        update_columns,
        table: c.qualified_name()?,
        referenced_table: None,
        deferrable: false,
        initially_deferred: false,
        old_table: None,
        new_table: None,
        level: TriggerLevel::Statement,
        condition: None,
        function: QualifiedName {
            schema: None,
            name: String::new(),
        },
        arguments: Vec::new(),
    };
    loop {
        if c.eat_word("from") {
            trigger.referenced_table = Some(c.qualified_name()?);
        } else if c.eat_word("referencing") {
            loop {
                let old = if c.eat_word("old") {
                    true
                } else if c.eat_word("new") {
                    false
                } else {
                    break;
                };
                if !c.eat_word("table") {
                    c.expect_word("row")?;
                }
                c.eat_word("as");
                let alias = c.ident()?;
                if old {
                    trigger.old_table = Some(alias);
                } else {
                    trigger.new_table = Some(alias);
                }
            }
        } else if c.eat_word("for") {
            c.eat_word("each");
            trigger.level = if c.eat_word("row") {
                TriggerLevel::Row
            } else {
                c.expect_word("statement")?;
                TriggerLevel::Statement
            };
        } else if c.eat_word("when") {
            trigger.condition = Some(c.paren_text()?);
        } else {
            let before = c.position();
            let (deferrable, initially_deferred) = deferral(c);
            if c.position() == before {
                break;
            }
            trigger.deferrable = deferrable;
            trigger.initially_deferred = initially_deferred;
        }
    }

    c.expect_word("execute")?;
    if !c.eat_word("function") {
        c.expect_word("procedure")?;
    }
    trigger.function = c.qualified_name()?;
    c.expect_kind(TokenKind::LParen)?;
    if !c.peek_kind(TokenKind::RParen) {
        loop {
            trigger.arguments.push(trigger_argument(c)?);
            if !c.eat_kind(TokenKind::Comma) {
                break;
            }
        }
    }
    c.expect_kind(TokenKind::RParen)?;
    c.expect_end()?;
    Ok(trigger)
}

/// A trigger argument as the server stores it: the literal's value.
fn trigger_argument(c: &mut Cursor) -> Result<String> {
    let negative = c.eat_op("-");
    let value = c
        .advance()
        .filter(|tok| {
            matches!(
                tok.kind,
                TokenKind::String
                    | TokenKind::EscapeString
                    | TokenKind::DollarString
                    | TokenKind::Number
                    | TokenKind::Word
                    | TokenKind::QuotedIdent
            )
        })
        .map(|tok| tok.value.clone());
    let Some(value) = value else {
        return Err(c.error("expected a trigger argument"));
    };
    Ok(if negative { format!("-{value}") } else { value })
}

fn create_policy(c: &mut Cursor) -> Result<CreatePolicy> {
    let name = c.ident()?;
    c.expect_word("on")?;
    let mut policy = CreatePolicy {
        name,
        table: c.qualified_name()?,
        permissive: true,
        command: PolicyCommand::All,
        roles: Vec::new(),
        using: None,
        with_check: None,
    };
    if c.eat_word("as") {
        policy.permissive = if c.eat_word("restrictive") {
            false
        } else {
            c.expect_word("permissive")?;
            true
        };
    }
    if c.eat_word("for") {
        let word = c.ident()?;
        policy.command = PolicyCommand::parse(&word)
            .ok_or_else(|| c.error(format!("unknown policy command {word:?}")))?;
    }
    if c.eat_word("to") {
        loop {
            policy.roles.push(c.ident()?);
            if !c.eat_kind(TokenKind::Comma) {
                break;
            }
        }
    }
    if c.eat_word("using") {
        policy.using = Some(c.paren_text()?);
    }
    if c.eat_words(&["with", "check"]) {
        policy.with_check = Some(c.paren_text()?);
    }
    c.expect_end()?;
    Ok(policy)
}

fn alter(c: &mut Cursor) -> Result<Option<Statement>> {
    if c.eat_word("table") {
        c.eat_words(&["if", "exists"]);
        c.eat_word("only");
        let name = c.qualified_name()?;
        let mut actions = Vec::new();
        loop {
            actions.push(alter_action(c)?);
            if !c.eat_kind(TokenKind::Comma) {
                break;
            }
        }
        c.expect_end()?;
        return Ok(Some(Statement::AlterTable(AlterTable { name, actions })));
    }
    if c.eat_word("sequence") {
        c.eat_words(&["if", "exists"]);
        let name = c.qualified_name()?;
        let options = sequence_options(c)?;
        // RENAME, OWNER TO, SET SCHEMA
        if !c.at_end() {
            return Ok(None);
        }
        return Ok(Some(Statement::AlterSequence(SequenceDef { name, options })));
    }
    if c.eat_words(&["default", "privileges"]) {
        return default_privileges(c);
    }
    Ok(None)
}

fn alter_action(c: &mut Cursor) -> Result<AlterAction> {
    if c.eat_word("add") {
        if starts_table_constraint(c) {
            return Ok(AlterAction::AddConstraint(table_constraint(c)?));
        }
        c.eat_word("column");
        c.eat_words(&["if", "not", "exists"]);
        return Ok(AlterAction::AddColumn(column_def(c, false)?));
    }
    if c.eat_word("alter") {
        c.eat_word("column");
        let column = c.ident()?;
        return Ok(if c.eat_words(&["set", "default"]) {
            AlterAction::SetDefault {
                column,
                default: Some(c.expr_text(&[])?),
            }
        } else if c.eat_words(&["drop", "default"]) {
            AlterAction::SetDefault {
                column,
                default: None,
            }
        } else if c.eat_words(&["set", "not", "null"]) {
            AlterAction::SetNotNull {
                column,
                not_null: true,
            }
        } else if c.eat_words(&["drop", "not", "null"]) {
            AlterAction::SetNotNull {
                column,
                not_null: false,
            }
        } else if c.eat_words(&["add", "generated"]) {
            match generated(c)? {
                ColumnConstraintKind::Identity {
                    generation,
                    options,
                } => AlterAction::AddIdentity {
                    column,
                    generation,
                    options,
                },
                _ => return Err(c.error("expected AS IDENTITY")),
            }
        } else {
            c.skip_item();
            AlterAction::Other
        });
    }
    let rls = |enabled, forced| AlterAction::RowLevelSecurity { enabled, forced };
    if c.eat_words(&["enable", "row", "level", "security"]) {
        return Ok(rls(Some(true), None));
    }
    if c.eat_words(&["disable", "row", "level", "security"]) {
        return Ok(rls(Some(false), None));
    }
    if c.eat_words(&["force", "row", "level", "security"]) {
        return Ok(rls(None, Some(true)));
    }
    if c.eat_words(&["no", "force", "row", "level", "security"]) {
        return Ok(rls(None, Some(false)));
    }
    if c.eat_words(&["attach", "partition"]) {
        let child = c.qualified_name()?;
        let bound = partition_bound(c)?;
        return Ok(AlterAction::AttachPartition { child, bound });
    }
    c.skip_item();
    Ok(AlterAction::Other)
}

fn default_privileges(c: &mut Cursor) -> Result<Option<Statement>> {
    let mut schemas = Vec::new();
    loop {
        if c.eat_word("for") {
            if !c.eat_word("role") {
                c.expect_word("user")?;
            }
            loop {
                c.ident()?;
                if !c.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        } else if c.eat_words(&["in", "schema"]) {
            loop {
                schemas.push(c.ident()?);
                if !c.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        } else {
            break;
        }
    }
    // REVOKE only removes what the model never held
    if !c.eat_word("grant") {
        return Ok(None);
    }

    let mut privileges = Vec::new();
    if c.eat_word("all") {
        c.eat_word("privileges");
        privileges.push("ALL".to_string());
    } else {
        loop {
            privileges.push(c.ident()?.to_ascii_uppercase());
            if !c.eat_kind(TokenKind::Comma) {
                break;
            }
        }
    }
    c.expect_word("on")?;
    let object_type = match c.ident()?.as_str() {
        "tables" => PrivilegeObjectType::Tables,
        "sequences" => PrivilegeObjectType::Sequences,
        "functions" | "routines" => PrivilegeObjectType::Functions,
        "types" => PrivilegeObjectType::Types,
        "schemas" => PrivilegeObjectType::Schemas,
        other => return Err(c.error(format!("unknown object class {other:?}"))),
    };
    c.expect_word("to")?;
    let mut grantees = Vec::new();
    loop {
        c.eat_word("group");
        grantees.push(c.ident()?);
        if !c.eat_kind(TokenKind::Comma) {
            break;
        }
    }
    let grantable = c.eat_words(&["with", "grant", "option"]);
    c.expect_end()?;
    Ok(Some(Statement::DefaultPrivileges(DefaultGrant {
        schemas,
        object_type,
        privileges,
        grantees,
        grantable,
    })))
}

fn comment(c: &mut Cursor) -> Result<Option<Statement>> {
    c.expect_word("on")?;
    let target = if c.eat_word("table") {
        CommentTarget::Table(c.qualified_name()?)
    } else if c.eat_word("view") || c.eat_words(&["materialized", "view"]) {
        CommentTarget::View(c.qualified_name()?)
    } else if c.eat_word("column") {
        let mut parts = c.dotted()?;
        let column = parts.pop().unwrap_or_default();
        let table = match parts.as_slice() {
            [table] => QualifiedName {
                schema: None,
                name: table.clone(),
            },
            [schema, table] => QualifiedName {
                schema: Some(schema.clone()),
                name: table.clone(),
            },
            _ => return Err(c.error("expected table.column")),
        };
        CommentTarget::Column { table, column }
    } else if c.eat_word("index") {
        CommentTarget::Index(c.qualified_name()?)
    } else if c.eat_word("sequence") {
        CommentTarget::Sequence(c.qualified_name()?)
    } else if c.eat_word("type") || c.eat_word("domain") {
        CommentTarget::Type(c.qualified_name()?)
    } else if c.eat_word("constraint") {
        let name = c.ident()?;
        c.expect_word("on")?;
        let domain = c.eat_word("domain");
        let table = c.qualified_name()?;
        if domain {
            CommentTarget::Other
        } else {
            CommentTarget::Constraint { name, table }
        }
    } else if c.eat_word("function") {
        let name = c.qualified_name()?;
        CommentTarget::Function {
            name,
            arguments: argument_types(c)?,
        }
    } else if c.eat_word("procedure") {
        let name = c.qualified_name()?;
        CommentTarget::Procedure {
            name,
            arguments: argument_types(c)?,
        }
    } else if c.eat_word("aggregate") {
        let name = c.qualified_name()?;
        c.expect_kind(TokenKind::LParen)?;
        let mut arguments = Vec::new();
        if !c.eat_op("*") && !c.peek_kind(TokenKind::RParen) {
            loop {
                let param = parameter(c)?;
                arguments.push(param.data_type);
                if !c.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        c.expect_kind(TokenKind::RParen)?;
        CommentTarget::Aggregate { name, arguments }
    } else {
        while !c.at_end() && !c.peek_word("is") {
            c.advance();
        }
        CommentTarget::Other
    };
    c.expect_word("is")?;
    let text = if c.eat_word("null") {
        None
    } else {
        Some(c.string()?)
    };
    c.expect_end()?;
    Ok(Some(Statement::Comment(CommentOn { target, text })))
}

/// Optional `(argtypes)` of a routine reference; input types only.
fn argument_types(c: &mut Cursor) -> Result<Option<Vec<String>>> {
    if !c.peek_kind(TokenKind::LParen) {
        return Ok(None);
    }
    let params = parameter_list(c)?;
    Ok(Some(
        params
            .into_iter()
            .filter(|p| p.mode.is_input())
            .map(|p| p.data_type)
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(sql: &str) -> CreateTable {
        match parse_statement(sql).unwrap() {
            Statement::CreateTable(t) => t,
            other => panic!("expected CREATE TABLE, got {other:?}"),
        }
    }

    #[test]
    fn test_create_table_elements() {
        let t = table(
            "CREATE TABLE IF NOT EXISTS app.orders (
                id bigint GENERATED ALWAYS AS IDENTITY (START WITH 10 CACHE 5) PRIMARY KEY,
                status varchar(20) NOT NULL DEFAULT 'new' CHECK (status <> ''),
                customer_id int REFERENCES customers ON DELETE CASCADE,
                total numeric(10, 2) DEFAULT 0 NOT NULL,
                LIKE templates INCLUDING ALL EXCLUDING INDEXES,
                CONSTRAINT orders_total_check CHECK (total >= 0) NOT VALID,
                UNIQUE NULLS NOT DISTINCT (status, customer_id)
            ) PARTITION BY RANGE (id)",
        );
        assert_eq!(t.name.schema.as_deref(), Some("app"));
        assert_eq!(t.elements.len(), 7);

        let TableElement::Column(id) = &t.elements[0] else {
            panic!("id");
        };
        assert_eq!(id.data_type, "bigint");
        let ColumnConstraintKind::Identity { generation, options } = &id.constraints[0].kind else {
            panic!("identity");
        };
        assert_eq!(*generation, IdentityGeneration::Always);
        assert_eq!((options.start, options.cache), (Some(10), Some(5)));
        assert_eq!(id.constraints[1].kind, ColumnConstraintKind::PrimaryKey);

        let TableElement::Column(status) = &t.elements[1] else {
            panic!("status");
        };
        assert_eq!(status.data_type, "varchar(20)");
        let kinds: Vec<_> = status.constraints.iter().map(|c| &c.kind).collect();
        assert_eq!(
            kinds,
            [
                &ColumnConstraintKind::NotNull,
                &ColumnConstraintKind::Default("'new'".into()),
                &ColumnConstraintKind::Check {
                    expr: "status <> ''".into(),
                    no_inherit: false
                },
            ]
        );

        let TableElement::Column(total) = &t.elements[3] else {
            panic!("total");
        };
        assert_eq!(total.constraints[0].kind, ColumnConstraintKind::Default("0".into()));

        let TableElement::Like(like) = &t.elements[4] else {
            panic!("like");
        };
        assert!(like.options.has(LikeOptions::DEFAULTS));
        assert!(!like.options.has(LikeOptions::INDEXES));

        let TableElement::Constraint(check) = &t.elements[5] else {
            panic!("check");
        };
        assert!(check.not_valid);
        assert_eq!(check.name.as_deref(), Some("orders_total_check"));

        let (strategy, key) = t.partition_by.unwrap();
        assert_eq!((strategy, key.as_str()), (PartitionStrategy::Range, "id"));
    }

    #[test]
    fn test_partition_of() {
        let t = table(
            "CREATE TABLE events_eu PARTITION OF events (region WITH OPTIONS DEFAULT 'eu') FOR VALUES IN ('eu')",
        );
        let of = t.partition_of.unwrap();
        assert_eq!(of.parent.name, "events");
        assert_eq!(of.bound, "FOR VALUES IN ('eu')");
        let TableElement::Column(region) = &t.elements[0] else {
            panic!("region");
        };
        assert!(region.data_type.is_empty());
    }

    #[test]
    fn test_function_signature_and_options() {
        let Statement::CreateRoutine(f) = parse_statement(
            "CREATE OR REPLACE FUNCTION public.search(q text, lim int DEFAULT 10, OUT hits bigint)
             RETURNS TABLE (id integer, \"Title\" text)
             LANGUAGE plpgsql STABLE STRICT SECURITY DEFINER
             SET search_path = public, pg_temp
             AS $fn$ BEGIN RETURN; END $fn$",
        )
        .unwrap() else {
            panic!("routine");
        };
        let params: Vec<_> = f
            .params
            .iter()
            .map(|p| (p.mode, p.name.clone().unwrap_or_default(), p.data_type.clone()))
            .collect();
        insta::assert_debug_snapshot!(params, @r#"
        [
            (
                In,
                "q",
                "text",
            ),
            (
                In,
                "lim",
                "integer",
            ),
            (
                Out,
                "hits",
                "bigint",
            ),
            (
                Table,
                "id",
                "integer",
            ),
            (
                Table,
                "Title",
                "text",
            ),
        ]
        "#);
        assert_eq!(f.params[1].default.as_deref(), Some("10"));
        assert_eq!(f.returns.as_deref(), Some("TABLE(id integer, \"Title\" text)"));
        assert_eq!(f.language.as_deref(), Some("plpgsql"));
        assert_eq!(f.volatility, Volatility::Stable);
        assert!(f.strict && f.security_definer);
        assert_eq!(f.search_path.as_deref(), Some("public, pg_temp"));
        assert_eq!(f.body, " BEGIN RETURN; END ");
    }

    #[test]
    fn test_unnamed_parameters() {
        let Statement::CreateRoutine(p) =
            parse_statement("CREATE PROCEDURE p(integer, double precision) LANGUAGE sql AS 'select 1'")
                .unwrap()
        else {
            panic!("routine");
        };
        assert!(p.procedure);
        let types: Vec<_> = p.params.iter().map(|p| p.data_type.as_str()).collect();
        assert_eq!(types, ["integer", "double precision"]);
        assert!(p.params.iter().all(|p| p.name.is_none()));
    }

    #[test]
    fn test_index_elements() {
        let Statement::CreateIndex(idx) = parse_statement(
            "CREATE UNIQUE INDEX CONCURRENTLY ON ONLY public.users USING btree \
             (lower((email)::text) DESC NULLS LAST, name text_pattern_ops, (id + 1)) \
             INCLUDE (created_at) WHERE (deleted_at IS NULL)",
        )
        .unwrap() else {
            panic!("index");
        };
        assert!(idx.unique);
        assert_eq!(idx.name, None);
        assert_eq!(idx.method.as_deref(), Some("btree"));
        assert_eq!(idx.elements[0].text, "lower((email)::text)");
        assert!(idx.elements[0].expression);
        assert_eq!(
            (idx.elements[0].order, idx.elements[0].nulls),
            (SortOrder::Desc, NullsOrder::Last)
        );
        assert_eq!(idx.elements[1].text, "name");
        assert_eq!(idx.elements[1].opclass.as_deref(), Some("text_pattern_ops"));
        assert_eq!(idx.elements[2].text, "id + 1");
        assert_eq!(idx.include, ["created_at"]);
        assert_eq!(idx.predicate.as_deref(), Some("(deleted_at IS NULL)"));
    }

    #[test]
    fn test_trigger() {
        let Statement::CreateTrigger(t) = parse_statement(
            "CREATE CONSTRAINT TRIGGER audit AFTER INSERT OR UPDATE OF status, total ON orders \
             DEFERRABLE INITIALLY DEFERRED FOR EACH ROW WHEN (NEW.total > 0) \
             EXECUTE FUNCTION audit.log('orders', 42, -1)",
        )
        .unwrap() else {
            panic!("trigger");
        };
        assert!(t.constraint && t.deferrable && t.initially_deferred);
        assert_eq!(t.events, [TriggerEvent::Insert, TriggerEvent::Update]);
        assert_eq!(t.update_columns, ["status", "total"]);
        assert_eq!(t.level, TriggerLevel::Row);
        assert_eq!(t.condition.as_deref(), Some("NEW.total > 0"));
        assert_eq!(t.function.to_string(), "audit.log");
        assert_eq!(t.arguments, ["orders", "42", "-1"]);
    }

    #[test]
    fn test_policy_and_default_privileges() {
        let Statement::CreatePolicy(p) = parse_statement(
            "CREATE POLICY tenant_isolation ON accounts AS RESTRICTIVE FOR SELECT TO app_user, PUBLIC \
             USING (tenant_id = current_setting('app.tenant')::int)",
        )
        .unwrap() else {
            panic!("policy");
        };
        assert!(!p.permissive);
        assert_eq!(p.command, PolicyCommand::Select);
        assert_eq!(p.roles, ["app_user", "public"]);

        let Statement::DefaultPrivileges(g) = parse_statement(
            "ALTER DEFAULT PRIVILEGES FOR ROLE admin IN SCHEMA app GRANT SELECT, insert ON TABLES TO reporting WITH GRANT OPTION",
        )
        .unwrap() else {
            panic!("grant");
        };
        assert_eq!(g.schemas, ["app"]);
        assert_eq!(g.privileges, ["SELECT", "INSERT"]);
        assert!(g.grantable);
    }

    #[test]
    fn test_alter_table_actions() {
        let Statement::AlterTable(alter) = parse_statement(
            "ALTER TABLE ONLY public.users \
             ADD CONSTRAINT users_pkey PRIMARY KEY (id), \
             ALTER COLUMN name SET DEFAULT 'anon'::text, \
             ALTER COLUMN id ADD GENERATED BY DEFAULT AS IDENTITY (SEQUENCE NAME public.users_id_seq), \
             OWNER TO app, \
             ENABLE ROW LEVEL SECURITY",
        )
        .unwrap() else {
            panic!("alter");
        };
        assert_eq!(alter.actions.len(), 5);
        assert!(matches!(alter.actions[0], AlterAction::AddConstraint(_)));
        assert!(matches!(alter.actions[2], AlterAction::AddIdentity { .. }));
        assert_eq!(alter.actions[3], AlterAction::Other);
    }

    #[test]
    fn test_comments() {
        let Statement::Comment(comment) =
            parse_statement("COMMENT ON COLUMN app.users.email IS 'login address'").unwrap()
        else {
            panic!("comment");
        };
        assert_eq!(
            comment.target,
            CommentTarget::Column {
                table: QualifiedName {
                    schema: Some("app".into()),
                    name: "users".into()
                },
                column: "email".into()
            }
        );
        assert_eq!(comment.text.as_deref(), Some("login address"));

        let Statement::Comment(comment) =
            parse_statement("COMMENT ON FUNCTION f(a int4, OUT b text) IS NULL").unwrap()
        else {
            panic!("comment");
        };
        assert!(matches!(
            comment.target,
            CommentTarget::Function { arguments: Some(ref args), .. } if args == &["integer"]
        ));
        assert_eq!(comment.text, None);
    }

    #[test]
    fn test_other_statements() {
        assert_eq!(
            parse_statement("set search_path = public").unwrap(),
            Statement::Other("SET SEARCH_PATH".into())
        );
        assert!(matches!(
            parse_statement("CREATE EXTENSION IF NOT EXISTS pgcrypto").unwrap(),
            Statement::Other(_)
        ));
        assert!(parse_statement("CREATE TABLE t (a int,").is_err());
    }
}
