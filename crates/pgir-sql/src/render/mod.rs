//! Render expressions and token runs in canonical form.
//!
//! The printer adds parentheses only where precedence requires them, spells
//! keywords upper-case and identifiers folded, and quotes names only when the
//! server would need quotes. Parsing the output yields the same tree.

use std::fmt;

use crate::parse::{binary_prec, prec};
use crate::{Expr, Ident, Lit, Literal, Token, TokenKind, is_sql_word, needs_quoting};

#[cfg(test)]
mod tests;

/// Function names the server prints as upper-case special forms.
const SPECIAL_FUNCTIONS: &[&str] = &["coalesce", "greatest", "least", "nullif"];

/// Binding power of the node at the top of `expr`.
pub fn expr_prec(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => binary_prec(op),
        Expr::Unary { op, .. } => match op.as_str() {
            "NOT" => prec::NOT,
            "-" | "+" => prec::UNARY,
            _ => prec::OTHER,
        },
        Expr::IsNull { .. } | Expr::IsBool { .. } | Expr::IsDistinctFrom { .. } => prec::IS,
        Expr::AnyAll { op, .. } => binary_prec(op),
        Expr::InList { .. }
        | Expr::InSubquery { .. }
        | Expr::Between { .. }
        | Expr::Like { .. } => prec::LIKE,
        Expr::Collate { .. } | Expr::Subscript { .. } => prec::POSTFIX,
        Expr::Cast { .. } => prec::CAST,
        _ => prec::PRIMARY,
    }
}

/// Writes `expr`, parenthesized when it binds looser than `min`.
struct Operand<'a>(&'a Expr, u8);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if expr_prec(self.0) < self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Writes items separated by `, `.
struct List<'a>(&'a [Expr]);

impl fmt::Display for List<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

fn not(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

fn write_function_name(f: &mut fmt::Formatter<'_>, name: &[String]) -> fmt::Result {
    if let [only] = name {
        if SPECIAL_FUNCTIONS.contains(&only.as_str()) {
            return write!(f, "{}", only.to_ascii_uppercase());
        }
    }
    for (i, part) in name.iter().enumerate() {
        if i > 0 {
            write!(f, ".")?;
        }
        // Function names may be keywords (`left`, `right`); quote for case only.
        let plain = part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if plain && !part.is_empty() {
            write!(f, "{part}")?;
        } else {
            write!(f, "{}", Ident(part))?;
        }
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{}", Lit(s)),
            Literal::EscapeString(s) => write!(f, "E'{s}'"),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Bool(true) => write!(f, "true"),
            Literal::Bool(false) => write!(f, "false"),
            Literal::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = expr_prec(self);
        match self {
            Expr::Column(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    if part == "*" {
                        write!(f, "*")?;
                    } else {
                        write!(f, "{}", Ident(part))?;
                    }
                }
                Ok(())
            }
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::Param(n) => write!(f, "${n}"),
            Expr::Keyword(k) => write!(f, "{k}"),
            Expr::Cast { expr, ty } => write!(f, "{}::{ty}", Operand(expr, prec::CAST)),
            Expr::Function {
                name,
                args,
                distinct,
                star,
            } => {
                write_function_name(f, name)?;
                if *star {
                    return write!(f, "(*)");
                }
                let distinct = if *distinct { "DISTINCT " } else { "" };
                write!(f, "({distinct}{})", List(args))
            }
            Expr::Unary { op, expr } if op == "NOT" => {
                write!(f, "NOT {}", Operand(expr, p))
            }
            Expr::Unary { op, expr } => {
                let operand = Operand(expr, p).to_string();
                if operand.starts_with('-') || operand.starts_with('+') {
                    write!(f, "{op} {operand}")
                } else {
                    write!(f, "{op}{operand}")
                }
            }
            Expr::Binary { left, op, right } => {
                // comparisons do not chain
                let left_min = if p == prec::CMP { p + 1 } else { p };
                write!(
                    f,
                    "{} {op} {}",
                    Operand(left, left_min),
                    Operand(right, p + 1)
                )
            }
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", Operand(expr, p), not(*negated))
            }
            Expr::IsBool {
                expr,
                value,
                negated,
            } => write!(f, "{} IS {}{value}", Operand(expr, p), not(*negated)),
            Expr::IsDistinctFrom {
                left,
                right,
                negated,
            } => write!(
                f,
                "{} IS {}DISTINCT FROM {}",
                Operand(left, p),
                not(*negated),
                Operand(right, p + 1)
            ),
            Expr::InList {
                expr,
                list,
                negated,
            } => write!(
                f,
                "{} {}IN ({})",
                Operand(expr, p),
                not(*negated),
                List(list)
            ),
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => write!(f, "{} {}IN ({query})", Operand(expr, p), not(*negated)),
            Expr::Between {
                expr,
                low,
                high,
                negated,
                symmetric,
            } => {
                let symmetric = if *symmetric { "SYMMETRIC " } else { "" };
                write!(
                    f,
                    "{} {}BETWEEN {symmetric}{} AND {}",
                    Operand(expr, p),
                    not(*negated),
                    Operand(low, p + 1),
                    Operand(high, p + 1)
                )
            }
            Expr::Like {
                expr,
                pattern,
                kind,
                negated,
                escape,
            } => {
                write!(
                    f,
                    "{} {}{} {}",
                    Operand(expr, p),
                    not(*negated),
                    kind.as_str(),
                    Operand(pattern, p + 1)
                )?;
                if let Some(escape) = escape {
                    write!(f, " ESCAPE {}", Operand(escape, p + 1))?;
                }
                Ok(())
            }
            Expr::AnyAll {
                left,
                op,
                quantifier,
                right,
            } => write!(
                f,
                "{} {op} {} ({right})",
                Operand(left, p + 1),
                quantifier.as_str()
            ),
            Expr::Array(items) => {
                write!(f, "ARRAY[{}]", List(items))
            }
            Expr::Row { items, explicit } => {
                if *explicit {
                    write!(f, "ROW({})", List(items))
                } else {
                    write!(f, "({})", List(items))
                }
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {operand}")?;
                }
                for (when, then) in branches {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {else_result}")?;
                }
                write!(f, " END")
            }
            Expr::Subscript {
                expr,
                lower,
                upper,
                slice,
            } => {
                write!(f, "{}[", Operand(expr, prec::PRIMARY))?;
                if let Some(lower) = lower {
                    write!(f, "{lower}")?;
                }
                if *slice {
                    write!(f, ":")?;
                }
                if let Some(upper) = upper {
                    write!(f, "{upper}")?;
                }
                write!(f, "]")
            }
            Expr::Field { expr, field } => write!(f, "({expr}).{}", Ident(field)),
            Expr::Collate { expr, collation } => {
                write!(f, "{} COLLATE {collation}", Operand(expr, p))
            }
            Expr::Subquery(query) => write!(f, "({query})"),
            Expr::Exists(query) => write!(f, "EXISTS ({query})"),
            Expr::ArraySubquery(query) => write!(f, "ARRAY({query})"),
        }
    }
}

/// Render an expression to its canonical string.
pub fn render(expr: &Expr) -> String {
    expr.to_string()
}

fn token_text(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Word => {
            if is_sql_word(&tok.value) {
                tok.value.to_ascii_uppercase()
            } else {
                tok.value.to_lowercase()
            }
        }
        TokenKind::QuotedIdent => {
            if needs_quoting(&tok.value) {
                Ident(&tok.value).to_string()
            } else {
                tok.value.clone()
            }
        }
        TokenKind::String | TokenKind::DollarString => Lit(&tok.value).to_string(),
        TokenKind::EscapeString => format!("E'{}'", tok.value),
        TokenKind::Param => format!("${}", tok.value),
        _ => tok.value.clone(),
    }
}

fn space_between(prev: &Token, next: &Token) -> bool {
    use TokenKind::*;
    match (prev.kind, next.kind) {
        (LParen | LBracket | Dot | Typecast, _) => false,
        (_, RParen | RBracket | Comma | Dot | Typecast | Semicolon | LBracket) => false,
        (Word, LParen) => is_sql_word(&prev.value),
        (QuotedIdent, LParen) => false,
        _ => true,
    }
}

/// Join tokens into canonical text: single spaces, keyword case folded,
/// unnecessary identifier quotes dropped.
pub fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for tok in tokens {
        if let Some(prev) = prev {
            if space_between(prev, tok) {
                out.push(' ');
            }
        }
        out.push_str(&token_text(tok));
        prev = Some(tok);
    }
    out
}
