//! View query canonicalization.
//!
//! Queries are compared at the token level: spacing, keyword case and
//! same-schema qualifiers are normalized, and an `ORDER BY` item that repeats
//! an aliased select expression is replaced by the alias, which is how the
//! server prints it back.
//!
//! The server also qualifies every column with its relation. When the query
//! reads a single relation that qualifier is dropped, and the `WHERE` clause
//! goes through expression canonicalization, so `WHERE active = true` and
//! `WHERE (users.active = true)` agree.

use pgir_sql::{Token, TokenKind, collapse_whitespace, render_tokens, tokenize};

use super::expr::{ExprContext, strip_outer_parens, strip_qualifier_tokens, try_canonical_expr};

/// Words that end an `ORDER BY` item's expression.
const ORDER_MODIFIERS: &[&str] = &["asc", "desc", "nulls", "using"];

/// Words that end an `ORDER BY` list.
const ORDER_END: &[&str] = &["limit", "offset", "fetch", "for", "union", "except", "intersect"];

/// Words that end a `FROM` list or a `WHERE` clause.
const CLAUSE_END: &[&str] = &[
    "where", "group", "having", "window", "order", "limit", "offset", "fetch", "for", "union",
    "except", "intersect",
];

/// Canonical text of a view query.
pub fn canonical_view(definition: &str, schema: &str) -> String {
    let Ok(tokens) = tokenize(definition) else {
        return collapse_whitespace(definition.trim().trim_end_matches(';'));
    };
    let mut tokens = strip_qualifier_tokens(&tokens, schema);
    while tokens.last().is_some_and(|t| t.kind == TokenKind::Semicolon) {
        tokens.pop();
    }
    let tokens = strip_outer_parens(&tokens).to_vec();
    let tokens = strip_relation_qualifier(tokens);
    let tokens = canonical_where(tokens, schema);
    render_tokens(&fold_order_by_aliases(tokens))
}

/// Depth of every token relative to the start of the list.
fn depths(tokens: &[Token]) -> Vec<usize> {
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|tok| match tok.kind {
            TokenKind::LParen | TokenKind::LBracket => {
                depth += 1;
                depth - 1
            }
            TokenKind::RParen | TokenKind::RBracket => {
                depth = depth.saturating_sub(1);
                depth
            }
            _ => depth,
        })
        .collect()
}

/// Split `range` of `tokens` at depth-0 commas.
fn split_items(
    tokens: &[Token],
    depth: &[usize],
    range: std::ops::Range<usize>,
) -> Vec<std::ops::Range<usize>> {
    let mut items = Vec::new();
    let mut start = range.start;
    for i in range.clone() {
        if depth[i] == 0 && tokens[i].kind == TokenKind::Comma {
            items.push(start..i);
            start = i + 1;
        }
    }
    if start < range.end {
        items.push(start..range.end);
    }
    items
}

/// First depth-0 position in `range` holding one of `words`.
fn find_top(
    tokens: &[Token],
    depth: &[usize],
    range: std::ops::Range<usize>,
    words: &[&str],
) -> Option<usize> {
    range
        .into_iter()
        .find(|&i| depth[i] == 0 && words.iter().any(|w| tokens[i].is_word(w)))
}

/// The name columns are qualified with when the top-level `FROM` list is one
/// plain relation: its alias, or the relation name itself.
fn single_relation(tokens: &[Token], depth: &[usize]) -> Option<String> {
    let select = find_top(tokens, depth, 0..tokens.len(), &["select"])?;
    let from = find_top(tokens, depth, select + 1..tokens.len(), &["from"])?;
    let end = find_top(tokens, depth, from + 1..tokens.len(), CLAUSE_END).unwrap_or(tokens.len());
    let items = split_items(tokens, depth, from + 1..end);
    let [item] = items.as_slice() else {
        return None;
    };
    let mut item = &tokens[item.clone()];
    if item.len() >= 3 && item[1].kind == TokenKind::Dot {
        item = &item[2..];
    }
    match item {
        [name] => name.ident(),
        [_, alias] if !alias.is_word("join") => alias.ident(),
        [_, kw, alias] if kw.is_word("as") => alias.ident(),
        _ => None,
    }
}

/// Drop `relation.` in front of column names when the query reads only
/// that relation. Subqueries keep their qualifiers.
fn strip_relation_qualifier(tokens: Vec<Token>) -> Vec<Token> {
    let depth = depths(&tokens);
    let Some(relation) = single_relation(&tokens, &depth) else {
        return tokens;
    };
    let mut subquery_until: Option<usize> = None;
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if subquery_until.is_some_and(|d| depth[i] < d) {
            subquery_until = None;
        }
        let tok = &tokens[i];
        if subquery_until.is_none()
            && tok.kind == TokenKind::LParen
            && tokens.get(i + 1).is_some_and(|t| t.is_word("select"))
        {
            subquery_until = Some(depth[i] + 1);
        }
        let qualifies = subquery_until.is_none()
            && tok.ident().as_deref() == Some(relation.as_str())
            && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::Dot)
            && tokens
                .get(i + 2)
                .is_some_and(|t| matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent))
            && tokens.get(i + 3).is_none_or(|t| t.kind != TokenKind::LParen)
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

/// Run the top-level `WHERE` condition through expression canonicalization.
fn canonical_where(tokens: Vec<Token>, schema: &str) -> Vec<Token> {
    let depth = depths(&tokens);
    let Some(from) = find_top(&tokens, &depth, 0..tokens.len(), &["from"]) else {
        return tokens;
    };
    let Some(start) = find_top(&tokens, &depth, from + 1..tokens.len(), &["where"]) else {
        return tokens;
    };
    let end = find_top(&tokens, &depth, start + 1..tokens.len(), &CLAUSE_END[1..])
        .unwrap_or(tokens.len());
    let condition = render_tokens(&tokens[start + 1..end]);
    let canonical = match try_canonical_expr(&condition, &ExprContext::new(schema)) {
        Ok(text) => text,
        Err(ambiguity) => {
            ambiguity.report();
            return tokens;
        }
    };
    let Ok(replacement) = tokenize(&canonical) else {
        return tokens;
    };
    let mut out = Vec::with_capacity(tokens.len());
    out.extend_from_slice(&tokens[..=start]);
    out.extend(replacement);
    out.extend_from_slice(&tokens[end..]);
    out
}

fn render_expr(tokens: &[Token]) -> String {
    render_tokens(strip_outer_parens(tokens))
}

fn fold_order_by_aliases(tokens: Vec<Token>) -> Vec<Token> {
    let depth = depths(&tokens);
    let at_top = |i: usize, word: &str| depth[i] == 0 && tokens[i].is_word(word);

    let Some(select) = (0..tokens.len()).find(|&i| at_top(i, "select")) else {
        return tokens;
    };
    let Some(from) = (select + 1..tokens.len()).find(|&i| at_top(i, "from")) else {
        return tokens;
    };
    let aliases: Vec<(String, usize)> = split_items(&tokens, &depth, select + 1..from)
        .into_iter()
        .filter_map(|item| {
            let n = item.len();
            if n < 3 || !tokens[item.end - 2].is_word("as") {
                return None;
            }
            let expr = render_expr(&tokens[item.start..item.end - 2]);
            Some((expr, item.end - 1))
        })
        .collect();
    if aliases.is_empty() {
        return tokens;
    }

    let Some(order) = (select..tokens.len().saturating_sub(1))
        .rev()
        .find(|&i| at_top(i, "order") && tokens[i + 1].is_word("by"))
    else {
        return tokens;
    };
    let list_start = order + 2;
    let list_end = (list_start..tokens.len())
        .find(|&i| depth[i] == 0 && ORDER_END.iter().any(|w| tokens[i].is_word(w)))
        .unwrap_or(tokens.len());

    let mut replacements = Vec::new();
    for item in split_items(&tokens, &depth, list_start..list_end) {
        let expr_end = item
            .clone()
            .find(|&i| depth[i] == 0 && ORDER_MODIFIERS.iter().any(|w| tokens[i].is_word(w)))
            .unwrap_or(item.end);
        let rendered = render_expr(&tokens[item.start..expr_end]);
        if let Some((_, alias_at)) = aliases.iter().find(|(expr, _)| *expr == rendered) {
            replacements.push((item.start..expr_end, *alias_at));
        }
    }

    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    for (range, alias_at) in replacements {
        out.extend_from_slice(&tokens[i..range.start]);
        out.push(tokens[alias_at].clone());
        i = range.end;
    }
    out.extend_from_slice(&tokens[i..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_spacing_and_qualifiers() {
        insta::assert_snapshot!(
            canonical_view(
                " SELECT users.id,\n    users.name\n   FROM public.users\n  WHERE (users.active = true);",
                "public",
            ),
            @"SELECT id, name FROM users WHERE active = TRUE"
        );
    }

    #[test]
    fn test_single_relation_qualifiers_match_written_form() {
        let server = " SELECT users.id,\n    users.name\n   FROM users\n  WHERE users.active;";
        let written = "SELECT id, name FROM users WHERE active";
        assert_eq!(canonical_view(server, "public"), canonical_view(written, "public"));

        let server = " SELECT u.id\n   FROM users u\n  WHERE ((u.status = 'new'::text) AND (u.id > 10));";
        let written = "select id from users u where status = 'new' and id > 10";
        assert_eq!(canonical_view(server, "public"), canonical_view(written, "public"));
    }

    #[test]
    fn test_joins_keep_qualifiers() {
        let text = "SELECT u.id, o.id FROM users u JOIN orders o ON o.user_id = u.id";
        assert_eq!(canonical_view(text, "public"), text);
    }

    #[test]
    fn test_order_by_uses_alias() {
        insta::assert_snapshot!(
            canonical_view(
                "select lower(u.name) as n, u.id from users u order by lower(u.name) desc, u.id",
                "public",
            ),
            @"SELECT lower(u.name) AS n, u.id FROM users u ORDER BY n DESC, u.id"
        );
    }

    #[test]
    fn test_order_by_in_subquery_untouched() {
        let text = "SELECT x FROM (SELECT a AS x FROM t ORDER BY a) s";
        assert_eq!(canonical_view(text, "public"), text);
    }
}
