//! Functions, procedures and aggregates.
//!
//! Functions and procedures are built from the `pg_proc` columns: parameters
//! come from the per-argument type, mode and name arrays, so overloads and
//! `OUT`/`TABLE` parameters are exact. Routines those columns cannot
//! describe on their own (SQL-standard bodies, arrays that disagree) are
//! read back through `pg_get_functiondef` and the DDL grammar instead.

use pgir_model::{
    Aggregate, Function, ParallelSafety, Parameter, ParameterMode, Procedure, Volatility,
};
use pgir_sql::{TokenKind, tokenize};

use super::Ctx;
use crate::ignore::ObjectKind;
use crate::parse::{Routine, routine_from_definition};
use crate::Result;

/// Filter for routines created by extensions.
const NOT_FROM_EXTENSION: &str = r#"
NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_depend e
    WHERE e.classid = 'pg_catalog.pg_proc'::regclass
      AND e.objid = p.oid
      AND e.deptype = 'e')
"#;

/// One `pg_proc` row of a function or procedure.
#[derive(Debug, Default)]
struct ProcRow {
    name: String,
    procedure: bool,
    /// Every argument's type, `TABLE` columns included
    argument_types: Vec<String>,
    /// `proargmodes`; absent when every argument is `IN`
    argument_modes: Option<Vec<String>>,
    /// `proargnames`; empty strings for unnamed arguments
    argument_names: Option<Vec<String>>,
    /// Defaults of the trailing input arguments, comma-separated
    defaults: Option<String>,
    default_count: usize,
    result: Option<String>,
    language: String,
    body: String,
    volatility: String,
    strict: bool,
    security_definer: bool,
    leakproof: bool,
    parallel: String,
    config: Vec<String>,
}

pub(super) async fn functions(ctx: Ctx) -> Result<()> {
    let sql = format!(
        r#"
        SELECT p.proname::text,
               p.prokind::text,
               pg_catalog.pg_get_functiondef(p.oid),
               pg_catalog.obj_description(p.oid, 'pg_proc'),
               ARRAY(SELECT pg_catalog.format_type(t.oid, NULL)
                     FROM unnest(COALESCE(p.proallargtypes, p.proargtypes::oid[]))
                          WITH ORDINALITY AS t(oid, ord)
                     ORDER BY t.ord),
               p.proargmodes::text[],
               p.proargnames,
               pg_catalog.pg_get_expr(p.proargdefaults, 0),
               p.pronargdefaults::int4,
               pg_catalog.pg_get_function_result(p.oid),
               l.lanname::text,
               p.prosrc,
               p.provolatile::text,
               p.proisstrict,
               p.prosecdef,
               p.proleakproof,
               p.proparallel::text,
               COALESCE(p.proconfig, '{{}}'::text[])
        FROM pg_catalog.pg_proc p
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        JOIN pg_catalog.pg_language l ON l.oid = p.prolang
        WHERE n.nspname = $1 AND p.prokind IN ('f', 'p') AND {NOT_FROM_EXTENSION}
        ORDER BY p.proname, p.oid
        "#
    );
    let rows = ctx.query(&sql).await?;
    let mut kept = 0usize;
    for row in &rows {
        let proc = ProcRow {
            name: row.get(0),
            procedure: row.get::<_, String>(1) == "p",
            argument_types: row.get(4),
            argument_modes: row.get(5),
            argument_names: row.get(6),
            defaults: row.get(7),
            default_count: usize::try_from(row.get::<_, i32>(8)).unwrap_or(0),
            result: row.get(9),
            language: row.get(10),
            body: row.get(11),
            volatility: row.get(12),
            strict: row.get(13),
            security_definer: row.get(14),
            leakproof: row.get(15),
            parallel: row.get(16),
            config: row.get(17),
        };
        let kind = if proc.procedure {
            ObjectKind::Procedure
        } else {
            ObjectKind::Function
        };
        if ctx.is_ignored(kind, &proc.name) {
            tracing::debug!(routine = %proc.name, "ignored routine");
            continue;
        }
        let routine = match routine_from_catalog(ctx.name(), &proc) {
            Some(routine) => routine,
            None => {
                tracing::debug!(routine = %proc.name, "reading routine from its definition");
                let definition: String = row.get(2);
                routine_from_definition(&definition, ctx.name())?
            }
        };
        let comment: Option<String> = row.get(3);
        match routine {
            Routine::Function(mut function) => {
                function.comment = comment;
                ctx.schema.put_function(function);
            }
            Routine::Procedure(mut procedure) => {
                procedure.comment = comment;
                ctx.schema.put_procedure(procedure);
            }
        }
        kept += 1;
    }
    tracing::debug!(routines = kept, "functions and procedures");
    Ok(())
}

/// Build a routine from its catalog columns alone, or `None` when they do
/// not describe it fully.
fn routine_from_catalog(schema: &str, proc: &ProcRow) -> Option<Routine> {
    if proc.body.is_empty() {
        return None;
    }
    let parameters = parameters_from_catalog(proc)?;
    let search_path = search_path_from_config(&proc.config);

    if proc.procedure {
        let mut procedure = Procedure::new(schema, &proc.name);
        procedure.definition = proc.body.clone();
        procedure.language = proc.language.clone();
        procedure.parameters = parameters;
        procedure.security_definer = proc.security_definer;
        procedure.search_path = search_path;
        return Some(Routine::Procedure(procedure));
    }

    let mut function = Function::new(schema, &proc.name);
    function.return_type = proc.result.clone()?;
    function.definition = proc.body.clone();
    function.language = proc.language.clone();
    function.parameters = parameters;
    function.volatility = Volatility::from_catalog(&proc.volatility);
    function.strict = proc.strict;
    function.security_definer = proc.security_definer;
    function.leakproof = proc.leakproof;
    function.parallel = ParallelSafety::from_catalog(&proc.parallel);
    function.search_path = search_path;
    Some(Routine::Function(function))
}

/// Zip the argument arrays into parameters. `None` when the arrays
/// disagree in length or the defaults cannot be matched to arguments.
fn parameters_from_catalog(proc: &ProcRow) -> Option<Vec<Parameter>> {
    let count = proc.argument_types.len();
    let modes = match &proc.argument_modes {
        Some(modes) if modes.len() != count => return None,
        Some(modes) => modes.iter().map(|m| ParameterMode::from_catalog(m)).collect(),
        None => vec![ParameterMode::In; count],
    };
    let names = match &proc.argument_names {
        Some(names) if names.len() < count => return None,
        Some(names) => names.iter().map(|n| Some(n.clone()).filter(|n| !n.is_empty())).collect(),
        None => vec![None; count],
    };

    let mut parameters: Vec<Parameter> = proc
        .argument_types
        .iter()
        .zip(modes)
        .zip(names)
        .enumerate()
        .map(|(i, ((data_type, mode), name))| Parameter {
            name,
            data_type: data_type.clone(),
            mode,
            position: i as u32 + 1,
            default: None,
        })
        .collect();

    if proc.default_count > 0 {
        let defaults = split_top_level(proc.defaults.as_deref()?)?;
        if defaults.len() != proc.default_count {
            return None;
        }
        let inputs: Vec<&mut Parameter> =
            parameters.iter_mut().filter(|p| p.mode.is_input()).collect();
        let skip = inputs.len().checked_sub(defaults.len())?;
        for (parameter, default) in inputs.into_iter().skip(skip).zip(defaults) {
            parameter.default = Some(default);
        }
    }
    Some(parameters)
}

/// Split `text` at commas outside parentheses and brackets.
fn split_top_level(text: &str) -> Option<Vec<String>> {
    let tokens = tokenize(text).ok()?;
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for tok in &tokens {
        match tok.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                items.push(text[start..tok.span.start].trim().to_string());
                start = tok.span.end;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        items.push(last.to_string());
    }
    Some(items)
}

/// The `search_path` entry of `proconfig`, items unquoted and comma-joined.
fn search_path_from_config(config: &[String]) -> Option<String> {
    let value = config
        .iter()
        .find_map(|entry| entry.strip_prefix("search_path="))?;
    Some(
        value
            .split(',')
            .map(|item| item.trim().trim_matches('"'))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

pub(super) async fn aggregates(ctx: Ctx) -> Result<()> {
    let sql = format!(
        r#"
        SELECT p.proname::text,
               ARRAY(SELECT pg_catalog.format_type(t.oid, NULL)
                     FROM unnest(p.proargtypes::oid[]) WITH ORDINALITY AS t(oid, ord)
                     ORDER BY t.ord),
               a.aggtransfn::text,
               NULLIF(a.aggfinalfn::text, '-'),
               NULLIF(a.aggcombinefn::text, '-'),
               pg_catalog.format_type(a.aggtranstype, NULL),
               a.agginitval,
               p.proparallel::text,
               pg_catalog.obj_description(p.oid, 'pg_proc')
        FROM pg_catalog.pg_aggregate a
        JOIN pg_catalog.pg_proc p ON p.oid = a.aggfnoid
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        WHERE n.nspname = $1 AND p.prokind = 'a' AND {NOT_FROM_EXTENSION}
        ORDER BY p.proname, p.oid
        "#
    );
    let rows = ctx.query(&sql).await?;
    for row in &rows {
        let name: String = row.get(0);
        if ctx.is_ignored(ObjectKind::Function, &name) {
            tracing::debug!(aggregate = %name, "ignored aggregate");
            continue;
        }
        let mut aggregate = Aggregate::new(ctx.name(), name);
        aggregate.arguments = row.get(1);
        aggregate.state_function = row.get(2);
        aggregate.final_function = row.get(3);
        aggregate.combine_function = row.get(4);
        aggregate.state_type = row.get(5);
        aggregate.initial_condition = row.get(6);
        aggregate.parallel = ParallelSafety::from_catalog(&row.get::<_, String>(7));
        aggregate.comment = row.get(8);
        ctx.schema.put_aggregate(aggregate);
    }
    tracing::debug!(aggregates = rows.len(), "aggregates");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgir_model::Keyed;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_out_variadic_and_default_parameters() {
        let proc = ProcRow {
            name: "total".into(),
            argument_types: strings(&["integer", "integer[]", "bigint"]),
            argument_modes: Some(strings(&["i", "v", "o"])),
            argument_names: Some(strings(&["base", "rest", "sum"])),
            defaults: Some("'{}'::integer[]".into()),
            default_count: 1,
            result: Some("bigint".into()),
            language: "sql".into(),
            body: "SELECT base + 0".into(),
            volatility: "i".into(),
            parallel: "s".into(),
            config: strings(&["search_path=app, \"$user\""]),
            ..ProcRow::default()
        };
        let Some(Routine::Function(function)) = routine_from_catalog("app", &proc) else {
            panic!("expected a function");
        };
        assert_eq!(function.key(), "total(integer, integer[])");
        assert_eq!(function.return_type, "bigint");
        assert_eq!(function.volatility, Volatility::Immutable);
        assert_eq!(function.parallel, ParallelSafety::Safe);
        assert_eq!(function.search_path.as_deref(), Some("app, $user"));

        let modes: Vec<ParameterMode> = function.parameters.iter().map(|p| p.mode).collect();
        assert_eq!(
            modes,
            [ParameterMode::In, ParameterMode::Variadic, ParameterMode::Out]
        );
        let positions: Vec<u32> = function.parameters.iter().map(|p| p.position).collect();
        assert_eq!(positions, [1, 2, 3]);
        assert_eq!(function.parameters[0].default, None);
        assert_eq!(function.parameters[1].default.as_deref(), Some("'{}'::integer[]"));
        assert_eq!(function.parameters[2].name.as_deref(), Some("sum"));
    }

    #[test]
    fn test_defaults_follow_the_last_inputs() {
        let proc = ProcRow {
            name: "greet".into(),
            argument_types: strings(&["text", "integer", "text"]),
            argument_names: Some(strings(&["who", "", "punct"])),
            defaults: Some("1, concat('!', '?')".into()),
            default_count: 2,
            ..ProcRow::default()
        };
        let parameters = parameters_from_catalog(&proc).unwrap();
        assert_eq!(parameters[0].default, None);
        assert_eq!(parameters[1].name, None);
        assert_eq!(parameters[1].default.as_deref(), Some("1"));
        assert_eq!(parameters[2].default.as_deref(), Some("concat('!', '?')"));
    }

    #[test]
    fn test_procedure_without_result() {
        let proc = ProcRow {
            name: "noop".into(),
            procedure: true,
            argument_types: strings(&["integer"]),
            argument_names: Some(strings(&["n"])),
            language: "plpgsql".into(),
            body: "BEGIN PERFORM n; END".into(),
            ..ProcRow::default()
        };
        let Some(Routine::Procedure(procedure)) = routine_from_catalog("public", &proc) else {
            panic!("expected a procedure");
        };
        assert_eq!(procedure.key(), "noop(integer)");
        assert_eq!(procedure.language, "plpgsql");
    }

    #[test]
    fn test_incomplete_rows_fall_back() {
        let sql_standard = ProcRow {
            name: "one".into(),
            result: Some("integer".into()),
            ..ProcRow::default()
        };
        assert!(routine_from_catalog("public", &sql_standard).is_none());

        let mismatched = ProcRow {
            name: "f".into(),
            argument_types: strings(&["integer", "text"]),
            argument_modes: Some(strings(&["i"])),
            result: Some("void".into()),
            body: "SELECT 1".into(),
            ..ProcRow::default()
        };
        assert!(routine_from_catalog("public", &mismatched).is_none());
    }
}
