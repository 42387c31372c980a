//! Expression-level canonicalization.
//!
//! Expressions are parsed into the [`pgir_sql::Expr`] AST, rewritten so that
//! what the server stores and what a person writes end up as the same tree,
//! and rendered back in the canonical spelling. Text that does not parse is
//! kept, tokenized and re-joined, as an [`Ambiguity`].

use std::collections::HashSet;

use pgir_sql::{
    Expr, LikeKind, Literal, Quantifier, Token, TokenKind, canonical_type_in, collapse_whitespace,
    is_string_type, parse_expr, render_tokens, strip_schema, tokenize,
};

use super::Ambiguity;

const NUMERIC_TYPES: &[&str] = &[
    "bigint",
    "double precision",
    "integer",
    "numeric",
    "real",
    "smallint",
];

const DECIMAL_TYPES: &[&str] = &["double precision", "numeric", "real"];

/// What the normalizer knows about the place an expression sits in.
#[derive(Debug, Clone, Default)]
pub struct ExprContext<'a> {
    /// Schema of the owning object; qualifiers naming it are dropped.
    schema: &'a str,
    /// Columns of the owning table whose values are already text-like, so a
    /// `::text` cast on them is a no-op.
    text_columns: HashSet<String>,
    /// Type the whole expression is assigned to (a column default), if any.
    value_type: Option<String>,
}

impl<'a> ExprContext<'a> {
    pub fn new(schema: &'a str) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    pub fn with_text_columns(mut self, columns: impl IntoIterator<Item = String>) -> Self {
        self.text_columns.extend(columns);
        self
    }

    pub fn with_value_type(mut self, ty: &str) -> Self {
        self.value_type = Some(canonical_cast_type(ty, self.schema));
        self
    }

    pub fn schema(&self) -> &str {
        self.schema
    }

    fn is_text_column(&self, parts: &[String]) -> bool {
        parts.len() == 1 && self.text_columns.contains(&parts[0])
    }
}

/// Canonical text of a scalar expression.
pub fn try_canonical_expr(text: &str, ctx: &ExprContext<'_>) -> Result<String, Ambiguity> {
    let expr = parse_expr(text).map_err(|e| Ambiguity::new(text, e.to_string()))?;
    Ok(rewrite(expr, ctx).to_string())
}

/// Canonical text of a scalar expression, falling back to token-level
/// cleanup when it cannot be parsed.
pub fn canonical_expr(text: &str, ctx: &ExprContext<'_>) -> String {
    try_canonical_expr(text, ctx).unwrap_or_else(|ambiguity| {
        ambiguity.report();
        canonical_text(text, ctx.schema)
    })
}

/// The column name, when canonical expression text is just one column.
pub fn as_plain_column(text: &str) -> Option<String> {
    match parse_expr(text) {
        Ok(Expr::Column(mut parts)) if parts.len() == 1 && parts[0] != "*" => parts.pop(),
        _ => None,
    }
}

/// `CHECK (<expr>)`, with `NOT VALID` / `NO INHERIT` suffixes dropped.
pub fn canonical_check(clause: &str, ctx: &ExprContext<'_>) -> String {
    let Ok(tokens) = tokenize(clause) else {
        return collapse_whitespace(clause.trim());
    };
    let mut body = tokens.as_slice();
    if body.first().is_some_and(|t| t.is_word("check")) {
        body = &body[1..];
    }
    loop {
        let n = body.len();
        let suffix = n >= 2
            && ((body[n - 2].is_word("not") && body[n - 1].is_word("valid"))
                || (body[n - 2].is_word("no") && body[n - 1].is_word("inherit")));
        if suffix {
            body = &body[..n - 2];
        } else {
            break;
        }
    }
    match (body.first(), body.last()) {
        (Some(first), Some(last)) => {
            let inner = &clause[first.span.start..last.span.end];
            format!("CHECK ({})", canonical_expr(inner, ctx))
        }
        _ => collapse_whitespace(clause.trim()),
    }
}

/// A policy `USING` / `WITH CHECK` expression, wrapped in exactly one pair of
/// parentheses as `CREATE POLICY` requires.
pub fn canonical_policy_expr(text: &str, ctx: &ExprContext<'_>) -> String {
    format!("({})", canonical_expr(text, ctx))
}

/// Token-level cleanup: canonical spacing and case, enclosing parentheses
/// and same-schema qualifiers dropped.
pub fn canonical_text(text: &str, schema: &str) -> String {
    match tokenize(text) {
        Ok(tokens) => render_tokens(&strip_qualifier_tokens(strip_outer_parens(&tokens), schema)),
        Err(_) => collapse_whitespace(text.trim()),
    }
}

/// A type name with same-schema and `pg_catalog` qualifiers dropped.
pub fn canonical_cast_type(ty: &str, schema: &str) -> String {
    let ty = canonical_type_in(ty, schema);
    strip_schema(&ty, "pg_catalog").to_string()
}

/// A possibly-qualified routine name with same-schema and `pg_catalog`
/// qualifiers dropped.
pub fn canonical_routine_name(name: &str, schema: &str) -> String {
    let stripped = strip_schema(name, schema);
    strip_schema(stripped, "pg_catalog").to_string()
}

/// Drop enclosing parentheses that wrap the whole token list.
pub fn strip_outer_parens(mut tokens: &[Token]) -> &[Token] {
    while tokens.len() >= 2
        && tokens[0].kind == TokenKind::LParen
        && matching_close(tokens, 0) == Some(tokens.len() - 1)
    {
        tokens = &tokens[1..tokens.len() - 1];
    }
    tokens
}

/// Index of the `)` matching the `(` at `open`.
fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop `schema.` (and `pg_catalog.`) in front of names.
pub fn strip_qualifier_tokens(tokens: &[Token], schema: &str) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        let qualifies = tok
            .ident()
            .is_some_and(|name| name == schema || name == "pg_catalog")
            && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::Dot)
            && tokens
                .get(i + 2)
                .is_some_and(|t| matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent))
            && (i == 0 || tokens[i - 1].kind != TokenKind::Dot);
        if qualifies {
            i += 2;
            continue;
        }
        out.push(tok.clone());
        i += 1;
    }
    out
}

fn rewrite(mut expr: Expr, ctx: &ExprContext<'_>) -> Expr {
    expr.walk_mut(&mut |e| {
        let taken = std::mem::replace(e, Expr::Literal(Literal::Null));
        *e = rewrite_node(taken, ctx);
    });
    // the server casts an assigned string literal to the target type
    if let Some(target) = &ctx.value_type {
        if let Expr::Cast { expr: inner, ty } = &expr {
            if ty == target && is_string_literal(inner) {
                return (**inner).clone();
            }
        }
    }
    expr
}

fn rewrite_node(expr: Expr, ctx: &ExprContext<'_>) -> Expr {
    match expr {
        Expr::Column(mut parts) => {
            if parts.len() == 3 && parts[0] == ctx.schema {
                parts.remove(0);
            }
            Expr::Column(parts)
        }
        Expr::Function {
            mut name,
            mut args,
            distinct,
            star,
        } => {
            if name.len() == 2 && (name[0] == ctx.schema || name[0] == "pg_catalog") {
                name.remove(0);
            }
            let sequence_fn = name.len() == 1
                && matches!(name[0].as_str(), "nextval" | "currval" | "setval");
            if sequence_fn && !args.is_empty() {
                let first = args.remove(0);
                args.insert(0, regclass_arg(first, ctx.schema));
            }
            Expr::Function {
                name,
                args,
                distinct,
                star,
            }
        }
        Expr::Cast { expr, ty } => {
            let ty = canonical_cast_type(&ty, ctx.schema);
            strip_cast(*expr, ty, ctx)
        }
        Expr::Binary { left, op, right } => match like_operator(&op) {
            Some((kind, negated)) => Expr::Like {
                expr: left,
                pattern: right,
                kind,
                negated,
                escape: None,
            },
            None if is_comparison(&op) => comparison(*left, op, *right),
            None => Expr::Binary { left, op, right },
        },
        Expr::AnyAll {
            left,
            op,
            quantifier,
            right,
        } => {
            let negated = match (op.as_str(), quantifier) {
                ("=", Quantifier::Any) => Some(false),
                ("<>", Quantifier::All) => Some(true),
                _ => None,
            };
            let Some(negated) = negated else {
                return Expr::AnyAll {
                    left,
                    op,
                    quantifier,
                    right,
                };
            };
            match array_items(*right) {
                Ok(items) => {
                    let list = items.into_iter().map(strip_string_cast).collect();
                    in_list(*left, list, negated)
                }
                Err(right) => Expr::AnyAll {
                    left,
                    op,
                    quantifier,
                    right: Box::new(right),
                },
            }
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => in_list(*expr, list, negated),
        Expr::Unary { op, expr } if op == "NOT" => match *expr {
            Expr::IsDistinctFrom {
                left,
                right,
                negated,
            } => Expr::IsDistinctFrom {
                left,
                right,
                negated: !negated,
            },
            inner => Expr::Unary {
                op,
                expr: Box::new(inner),
            },
        },
        Expr::Between {
            expr,
            low,
            high,
            negated,
            symmetric,
        } => expand_between(*expr, *low, *high, negated, symmetric),
        other => other,
    }
}

fn is_string_literal(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Literal(Literal::String(_) | Literal::EscapeString(_))
    )
}

fn is_comparison(op: &str) -> bool {
    matches!(op, "=" | "<>" | "<" | ">" | "<=" | ">=")
}

fn like_operator(op: &str) -> Option<(LikeKind, bool)> {
    match op {
        "~~" => Some((LikeKind::Like, false)),
        "!~~" => Some((LikeKind::Like, true)),
        "~~*" => Some((LikeKind::ILike, false)),
        "!~~*" => Some((LikeKind::ILike, true)),
        _ => None,
    }
}

/// Integer text, sign allowed.
fn is_integer_text(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Plain decimal text like `-1.5`.
fn is_decimal_text(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    match digits.split_once('.') {
        Some((int, frac)) => {
            !(int.is_empty() && frac.is_empty())
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Whether casting numeric text `n` to `ty` leaves its value unchanged.
fn numeric_cast_is_noop(n: &str, ty: &str) -> bool {
    if is_integer_text(n) {
        NUMERIC_TYPES.contains(&ty)
    } else {
        is_decimal_text(n) && DECIMAL_TYPES.contains(&ty)
    }
}

fn strip_cast(inner: Expr, ty: String, ctx: &ExprContext<'_>) -> Expr {
    match inner {
        Expr::Literal(Literal::String(s)) if is_string_type(&ty) && !ty.contains('(') => {
            Expr::string(s)
        }
        Expr::Literal(Literal::String(s)) if numeric_cast_is_noop(&s, &ty) => Expr::number(s),
        Expr::Literal(Literal::Number(n)) if numeric_cast_is_noop(&n, &ty) => Expr::number(n),
        Expr::Column(parts) if ty == "text" && ctx.is_text_column(&parts) => Expr::Column(parts),
        other => other.cast(ty),
    }
}

/// A string literal compared against a column needs no cast: the column's
/// type decides.
fn comparison(left: Expr, op: String, right: Expr) -> Expr {
    let right = if is_column_like(&left) {
        strip_string_cast(right)
    } else {
        right
    };
    let left = if is_column_like(&right) {
        strip_string_cast(left)
    } else {
        left
    };
    left.binary(op, right)
}

fn is_column_like(expr: &Expr) -> bool {
    match expr {
        Expr::Column(_) => true,
        Expr::Cast { expr, .. } => matches!(**expr, Expr::Column(_)),
        _ => false,
    }
}

fn strip_string_cast(expr: Expr) -> Expr {
    match expr {
        Expr::Cast { expr, ty } => {
            if is_string_literal(&expr) {
                *expr
            } else {
                Expr::Cast { expr, ty }
            }
        }
        other => other,
    }
}

fn array_items(expr: Expr) -> Result<Vec<Expr>, Expr> {
    match expr {
        Expr::Array(items) => Ok(items),
        Expr::Cast { expr, ty } => match *expr {
            Expr::Array(items) => Ok(items),
            inner => Err(inner.cast(ty)),
        },
        other => Err(other),
    }
}

/// `x IN (a)` is stored as `x = a`.
fn in_list(expr: Expr, mut list: Vec<Expr>, negated: bool) -> Expr {
    if list.len() == 1 {
        if let Some(only) = list.pop() {
            let op = if negated { "<>" } else { "=" };
            return comparison(expr, op.to_string(), only);
        }
    }
    Expr::InList {
        expr: Box::new(expr),
        list,
        negated,
    }
}

/// The server stores `BETWEEN` as a pair of comparisons.
fn expand_between(expr: Expr, low: Expr, high: Expr, negated: bool, symmetric: bool) -> Expr {
    let range = |lo: Expr, hi: Expr| {
        let (lo_op, join, hi_op) = if negated {
            ("<", "OR", ">")
        } else {
            (">=", "AND", "<=")
        };
        comparison(expr.clone(), lo_op.into(), lo)
            .binary(join, comparison(expr.clone(), hi_op.into(), hi))
    };
    if !symmetric {
        return range(low, high);
    }
    let forward = range(low.clone(), high.clone());
    let backward = range(high, low);
    if negated {
        forward.binary("AND", backward)
    } else {
        forward.binary("OR", backward)
    }
}

/// First argument of `nextval` and friends: always `'name'::regclass`,
/// without a same-schema qualifier.
fn regclass_arg(arg: Expr, schema: &str) -> Expr {
    let name = match arg {
        Expr::Literal(Literal::String(s)) => s,
        Expr::Cast { expr, ty } if ty == "regclass" => match *expr {
            Expr::Literal(Literal::String(s)) => s,
            inner => return inner.cast(ty),
        },
        other => return other,
    };
    Expr::string(strip_schema(&name, schema)).cast("regclass")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(text: &str) -> String {
        try_canonical_expr(text, &ExprContext::new("public")).unwrap()
    }

    #[test]
    fn test_any_array_becomes_in() {
        insta::assert_snapshot!(
            canon("(status)::text = ANY (ARRAY['x'::text, 'y'::text])"),
            @"status::text IN ('x', 'y')"
        );
        insta::assert_snapshot!(
            canon("(kind)::text = ANY ((ARRAY['a'::character varying, 'b'::character varying])::text[])"),
            @"kind::text IN ('a', 'b')"
        );
        insta::assert_snapshot!(
            canon("kind <> ALL (ARRAY['a'::text, 'b'::text])"),
            @"kind NOT IN ('a', 'b')"
        );
        insta::assert_snapshot!(canon("x IN (1)"), @"x = 1");
    }

    #[test]
    fn test_text_columns_drop_text_casts() {
        let ctx = ExprContext::new("public").with_text_columns(["status".to_string()]);
        let out = try_canonical_expr("(status)::text = ANY (ARRAY['x'::text, 'y'::text])", &ctx);
        insta::assert_snapshot!(out.unwrap(), @"status IN ('x', 'y')");
    }

    #[test]
    fn test_like_operators() {
        insta::assert_snapshot!(canon("(name ~~ 'a%'::text)"), @"name LIKE 'a%'");
        insta::assert_snapshot!(canon("name !~~* 'a%'"), @"name NOT ILIKE 'a%'");
    }

    #[test]
    fn test_literal_casts() {
        insta::assert_snapshot!(canon("(price > (0)::numeric)"), @"price > 0");
        insta::assert_snapshot!(canon("price > '-1'::integer"), @"price > -1");
        insta::assert_snapshot!(canon("1.5::integer"), @"1.5::integer");
        insta::assert_snapshot!(canon("'{}'::jsonb"), @"'{}'::jsonb");
        insta::assert_snapshot!(canon("created_at > '2024-01-01'::date"), @"created_at > '2024-01-01'");
    }

    #[test]
    fn test_value_type_cast_dropped() {
        let ctx = ExprContext::new("public").with_value_type("jsonb");
        assert_eq!(try_canonical_expr("'{}'::jsonb", &ctx).unwrap(), "'{}'");
        let ctx = ExprContext::new("public").with_value_type("public.status");
        assert_eq!(try_canonical_expr("'draft'::status", &ctx).unwrap(), "'draft'");
    }

    #[test]
    fn test_not_distinct() {
        insta::assert_snapshot!(canon("NOT (a IS DISTINCT FROM b)"), @"a IS NOT DISTINCT FROM b");
    }

    #[test]
    fn test_between_expands() {
        insta::assert_snapshot!(canon("x BETWEEN 1 AND 10"), @"x >= 1 AND x <= 10");
        insta::assert_snapshot!(canon("x NOT BETWEEN 1 AND 10"), @"x < 1 OR x > 10");
    }

    #[test]
    fn test_same_schema_qualifiers() {
        assert_eq!(canon("public.now()"), "now()");
        assert_eq!(canon("pg_catalog.lower(name)"), "lower(name)");
        let tenant = ExprContext::new("tenant");
        assert_eq!(try_canonical_expr("other.now()", &tenant).unwrap(), "other.now()");
        assert_eq!(try_canonical_expr("public.now()", &tenant).unwrap(), "public.now()");
        assert_eq!(
            canon("nextval('public.users_id_seq'::regclass)"),
            "nextval('users_id_seq'::regclass)"
        );
        assert_eq!(canon("nextval('users_id_seq')"), "nextval('users_id_seq'::regclass)");
        assert_eq!(canon("'x'::public.mood"), "'x'::mood");
    }

    #[test]
    fn test_check_clause() {
        let ctx = ExprContext::new("public");
        insta::assert_snapshot!(
            canonical_check("CHECK ((status)::text = ANY (ARRAY['x'::text,'y'::text]))", &ctx),
            @"CHECK (status::text IN ('x', 'y'))"
        );
        insta::assert_snapshot!(
            canonical_check("CHECK ((qty > 0)) NOT VALID", &ctx),
            @"CHECK (qty > 0)"
        );
    }

    #[test]
    fn test_policy_parens() {
        let ctx = ExprContext::new("public");
        assert_eq!(
            canonical_policy_expr("(owner = CURRENT_USER)", &ctx),
            "(owner = CURRENT_USER)"
        );
        assert_eq!(canonical_policy_expr("owner = current_user", &ctx), "(owner = CURRENT_USER)");
    }

    #[test]
    fn test_unparseable_falls_back_to_tokens() {
        let ctx = ExprContext::new("public");
        let text = "((ts AT   TIME ZONE 'utc') > public.cutoff())";
        assert!(try_canonical_expr(text, &ctx).is_err());
        insta::assert_snapshot!(canonical_expr(text, &ctx), @"(ts at time zone 'utc') > cutoff()");
    }
}
