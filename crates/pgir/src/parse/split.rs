//! Splitting a script into statements.

use pgir_sql::{TokenKind, tokenize};

use crate::{Error, Result};

/// Blank out psql meta-command lines (`\set`, `\i`, ...), keeping offsets.
pub fn strip_meta_commands(sql: &str) -> String {
    sql.split_inclusive('\n')
        .map(|line| {
            if line.trim_start().starts_with('\\') {
                line.chars()
                    .map(|c| if c == '\n' { '\n' } else { ' ' })
                    .collect()
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Split `sql` into statement texts at top-level semicolons.
///
/// Semicolons inside parentheses, quoted text, dollar-quoted bodies and
/// `BEGIN ATOMIC ... END` routine bodies do not end a statement.
pub fn split_statements(sql: &str) -> Result<Vec<String>> {
    let sql = strip_meta_commands(sql);
    let tokens = tokenize(&sql).map_err(|e| {
        let snippet: String = sql[e.position.min(sql.len())..].chars().take(80).collect();
        Error::parse(snippet, e.to_string())
    })?;

    let mut statements = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    // nesting of BEGIN ATOMIC / CASE ... END
    let mut atomic = 0usize;

    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Word if atomic > 0 && tok.is_word("case") => atomic += 1,
            TokenKind::Word if atomic > 0 && tok.is_word("end") => atomic -= 1,
            TokenKind::Word
                if tok.is_word("atomic") && i > 0 && tokens[i - 1].is_word("begin") =>
            {
                atomic += 1;
            }
            TokenKind::Semicolon if depth == 0 && atomic == 0 => {
                if let Some(s) = start.take() {
                    statements.push(sql[tokens[s].span.start..tokens[i - 1].span.end].to_string());
                }
                continue;
            }
            _ => {}
        }
        if start.is_none() {
            start = Some(i);
        }
    }
    if let (Some(s), Some(last)) = (start, tokens.last()) {
        statements.push(sql[tokens[s].span.start..last.span.end].to_string());
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolons_inside_bodies() {
        let sql = r#"
\set ON_ERROR_STOP on
CREATE TABLE t (a int); -- trailing
CREATE FUNCTION f() RETURNS int LANGUAGE sql AS $$ select 1; $$;
CREATE FUNCTION g() RETURNS int LANGUAGE sql
BEGIN ATOMIC
  SELECT CASE WHEN true THEN 1 ELSE 2 END;
  SELECT 2;
END;
;
SELECT 'a;b'
"#;
        let statements = split_statements(sql).unwrap();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0], "CREATE TABLE t (a int)");
        assert!(statements[1].ends_with("$$ select 1; $$"));
        assert!(statements[2].ends_with("SELECT 2;\nEND"));
        assert_eq!(statements[3], "SELECT 'a;b'");
    }
}
