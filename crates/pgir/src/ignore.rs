//! Name filters that keep objects out of the model.
//!
//! Loaded from a TOML document with one optional section per object kind:
//!
//! ```toml
//! [tables]
//! patterns = ["audit_*", "!audit_keep"]
//!
//! [functions]
//! patterns = ["pg_stat_*"]
//! ```
//!
//! `*` matches any run of characters and `?` any single one. A leading `!`
//! re-includes a name matched by an earlier pattern; the last matching
//! pattern wins.

use std::collections::HashMap;

use camino::Utf8Path;
use regex::Regex;
use serde::Deserialize;

use crate::{Error, Result};

/// Object kinds an ignore predicate can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    View,
    /// Functions and aggregates
    Function,
    Procedure,
    Sequence,
    /// Enums, composites and domains
    Type,
}

/// Decides which objects the builders leave out.
pub trait IgnorePredicate: Send + Sync {
    fn is_ignored(&self, kind: ObjectKind, name: &str) -> bool;
}

/// Keeps everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIgnore;

impl IgnorePredicate for NoIgnore {
    fn is_ignored(&self, _kind: ObjectKind, _name: &str) -> bool {
        false
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    tables: Option<Section>,
    views: Option<Section>,
    functions: Option<Section>,
    procedures: Option<Section>,
    sequences: Option<Section>,
    types: Option<Section>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Section {
    #[serde(default)]
    patterns: Vec<String>,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    negated: bool,
}

/// Glob-based ignore rules, compiled once.
#[derive(Debug, Clone, Default)]
pub struct IgnoreConfig {
    rules: HashMap<ObjectKind, Vec<Rule>>,
}

impl IgnoreConfig {
    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        let mut config = IgnoreConfig::default();
        let sections = [
            (ObjectKind::Table, raw.tables),
            (ObjectKind::View, raw.views),
            (ObjectKind::Function, raw.functions),
            (ObjectKind::Procedure, raw.procedures),
            (ObjectKind::Sequence, raw.sequences),
            (ObjectKind::Type, raw.types),
        ];
        for (kind, section) in sections {
            for pattern in section.map(|s| s.patterns).unwrap_or_default() {
                config.add(kind, &pattern)?;
            }
        }
        Ok(config)
    }

    /// Read a config file; a missing file is an empty config.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map_err(|e| match e {
                Error::Config(msg) => Error::Config(format!("{path}: {msg}")),
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%path, "no ignore config, keeping everything");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append a pattern for `kind`.
    pub fn add(&mut self, kind: ObjectKind, pattern: &str) -> Result<()> {
        let (negated, glob) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let pattern = Regex::new(&glob_to_regex(glob))
            .map_err(|e| Error::Config(format!("bad pattern {glob:?}: {e}")))?;
        self.rules
            .entry(kind)
            .or_default()
            .push(Rule { pattern, negated });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }
}

impl IgnorePredicate for IgnoreConfig {
    fn is_ignored(&self, kind: ObjectKind, name: &str) -> bool {
        let Some(rules) = self.rules.get(&kind) else {
            return false;
        };
        rules
            .iter()
            .rev()
            .find(|r| r.pattern.is_match(name))
            .is_some_and(|r| !r.negated)
    }
}

/// Translate a glob into an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_match_wins() {
        let config = IgnoreConfig::parse(
            r#"
            [tables]
            patterns = ["audit_*", "!audit_keep"]
            "#,
        )
        .unwrap();
        assert!(config.is_ignored(ObjectKind::Table, "audit_log"));
        assert!(!config.is_ignored(ObjectKind::Table, "audit_keep"));
        assert!(!config.is_ignored(ObjectKind::Table, "users"));
        assert!(!config.is_ignored(ObjectKind::View, "audit_log"));
    }

    #[test]
    fn test_glob_metacharacters() {
        let mut config = IgnoreConfig::default();
        config.add(ObjectKind::Function, "f_?.x").unwrap();
        assert!(config.is_ignored(ObjectKind::Function, "f_a.x"));
        assert!(!config.is_ignored(ObjectKind::Function, "f_ab.x"));
        assert!(!config.is_ignored(ObjectKind::Function, "f_a_x"));
    }

    #[test]
    fn test_unknown_section_is_config_error() {
        let err = IgnoreConfig::parse("[indexes]\npatterns = []\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let config = IgnoreConfig::load(Utf8Path::new("/nonexistent/pgir-ignore.toml")).unwrap();
        assert!(config.is_empty());
    }
}
