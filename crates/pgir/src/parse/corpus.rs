//! Loading a DDL corpus from files.

use camino::{Utf8Path, Utf8PathBuf};

use crate::{Error, Result};

/// DDL text assembled from one or more files.
///
/// psql include directives (`\i file`, `\ir file`) are replaced by the
/// included file's text. Both forms resolve relative to the including file.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sql: String,
    files: Vec<Utf8PathBuf>,
}

impl Corpus {
    /// Read `path`, expanding includes.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let mut corpus = Corpus::default();
        let mut stack = Vec::new();
        corpus.include(path, &mut stack)?;
        tracing::debug!(%path, files = corpus.files.len(), bytes = corpus.sql.len(), "loaded corpus");
        Ok(corpus)
    }

    /// A corpus that is just `sql`, with no files behind it.
    pub fn from_sql(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            files: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Every file read, in the order it was first included.
    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    fn include(&mut self, path: &Utf8Path, stack: &mut Vec<Utf8PathBuf>) -> Result<()> {
        let canonical = path
            .canonicalize_utf8()
            .map_err(|e| Error::Config(format!("{path}: {e}")))?;
        if stack.contains(&canonical) {
            let chain: Vec<&str> = stack.iter().map(|p| p.as_str()).collect();
            return Err(Error::Config(format!(
                "include cycle: {} -> {canonical}",
                chain.join(" -> ")
            )));
        }
        let text = std::fs::read_to_string(&canonical)?;
        if !self.files.contains(&canonical) {
            self.files.push(canonical.clone());
        }
        let dir = canonical
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        stack.push(canonical);

        for line in text.split_inclusive('\n') {
            match include_target(line) {
                Some(target) => {
                    let target = dir.join(target);
                    tracing::trace!(%target, "include");
                    self.include(&target, stack)?;
                    if !self.sql.ends_with('\n') {
                        self.sql.push('\n');
                    }
                }
                None => self.sql.push_str(line),
            }
        }
        if !self.sql.ends_with('\n') {
            self.sql.push('\n');
        }
        stack.pop();
        Ok(())
    }
}

/// File named by a `\i`, `\include`, `\ir` or `\include_relative` line.
fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix('\\')?;
    let (command, arg) = rest.split_once(char::is_whitespace)?;
    if !matches!(command, "i" | "include" | "ir" | "include_relative") {
        return None;
    }
    let arg = arg.trim();
    let arg = arg
        .strip_prefix('\'')
        .and_then(|a| a.strip_suffix('\''))
        .unwrap_or(arg);
    (!arg.is_empty()).then_some(arg)
}
