//! PostgreSQL SQL text handling.
//!
//! Tokenize SQL, parse scalar expressions into an AST, and render them back
//! in one canonical spelling. Also hosts the identifier quoting rules and the
//! server's naming conventions for implicit objects.

mod expr;
pub use expr::*;

mod keywords;
pub use keywords::*;

mod lexer;
pub use lexer::*;

mod naming;
pub use naming::*;

mod parse;
pub use parse::*;

mod render;
pub use render::*;

mod types;
pub use types::*;

#[cfg(test)]
mod tests;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use pgir_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value bare when the server would accept it unquoted,
/// and double-quoted (with embedded quotes doubled) otherwise.
///
/// # Example
/// ```
/// use pgir_sql::Ident;
/// assert_eq!(format!("{}", Ident("users")), "users");
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("Bla\"h")), "\"Bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.0.as_ref();
        if !needs_quoting(name) {
            return write!(f, "{name}");
        }
        write!(f, "\"")?;
        for c in name.chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// Quote a PostgreSQL identifier only when required.
///
/// An identifier needs quotes when it is empty, contains anything other than
/// lowercase letters, digits, `_` and `$`, starts with a digit or `$`, or is a
/// keyword the server will not accept as a bare column name.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Whether `name` must be double-quoted to round-trip through the server.
pub fn needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !(first.is_ascii_lowercase() || first == '_' || is_plain_unicode(first)) {
        return true;
    }
    let plain = |c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$' || is_plain_unicode(c)
    };
    if !name.chars().all(plain) {
        return true;
    }
    is_quoted_keyword(name)
}

fn is_plain_unicode(c: char) -> bool {
    !c.is_ascii() && c.is_alphabetic() && !c.is_uppercase()
}

/// Render `schema.name` with each part quoted as needed.
pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", Ident(schema), Ident(name))
}

/// Collapse runs of whitespace outside of quotes into single spaces.
///
/// Quoted literals, quoted identifiers and dollar-quoted bodies are copied
/// untouched.
pub fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    let mut i = 0;
    while let Some(ch) = sql[i..].chars().next() {
        if ch.is_whitespace() {
            pending_space = true;
            i += ch.len_utf8();
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        let len = match ch {
            '\'' | '"' => quoted_len(&sql[i..], ch),
            // `a$b` and `$1` are not dollar quotes
            '$' if !out.ends_with(|c: char| c.is_alphanumeric() || c == '_') => {
                dollar_quoted_len(&sql[i..]).unwrap_or(1)
            }
            _ => ch.len_utf8(),
        };
        out.push_str(&sql[i..i + len]);
        i += len;
    }
    out
}

/// Length of the quoted run opening `s`, closing quote included. A doubled
/// quote stays inside the run; an unterminated run takes the rest.
fn quoted_len(s: &str, quote: char) -> usize {
    let mut chars = s.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == quote && chars.next_if(|&(_, next)| next == quote).is_none() {
            return i + 1;
        }
    }
    s.len()
}

/// Length of the `$tag$...$tag$` literal opening `s`, if `s` opens one.
fn dollar_quoted_len(s: &str) -> Option<usize> {
    let tag_end = s[1..].find('$')? + 1;
    let tag = &s[1..tag_end];
    let valid = tag.chars().next().is_none_or(|c| !c.is_ascii_digit())
        && tag.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid {
        return None;
    }
    let delimiter = &s[..=tag_end];
    let body = tag_end + 1;
    Some(match s[body..].find(delimiter) {
        Some(at) => body + at + delimiter.len(),
        None => s.len(),
    })
}
