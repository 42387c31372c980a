//! Canonical spelling of type names.
//!
//! The catalog reports `character varying(255)`, `timestamp with time zone`
//! or `_int4`, while hand-written DDL says `varchar(255)`, `timestamptz` and
//! `int[]`. Everything is folded to one spelling here.

/// A parsed type reference: base name, typmod arguments and array depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    /// Canonical base name, possibly schema-qualified (`public.mood`).
    pub name: String,
    /// Raw typmod arguments, e.g. `["10", "2"]` for `numeric(10,2)`.
    pub modifiers: Vec<String>,
    /// Number of `[]` suffixes.
    pub array_dims: usize,
}

/// Column-level split of a type: base plus length/precision/scale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnType {
    /// Canonical base name with array suffixes, no typmods.
    pub data_type: String,
    pub max_length: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
}

/// Map a builtin type name or alias to its canonical spelling.
pub fn canonical_base(name: &str) -> &str {
    match name {
        "int" | "int4" | "integer" => "integer",
        "int2" | "smallint" => "smallint",
        "int8" | "bigint" => "bigint",
        "float4" | "real" => "real",
        "float8" | "float" | "double precision" => "double precision",
        "bool" | "boolean" => "boolean",
        "varchar" | "character varying" => "varchar",
        "char" | "character" | "bpchar" => "char",
        "decimal" | "numeric" => "numeric",
        "timestamptz" | "timestamp with time zone" => "timestamptz",
        "timestamp" | "timestamp without time zone" => "timestamp",
        "timetz" | "time with time zone" => "timetz",
        "time" | "time without time zone" => "time",
        "varbit" | "bit varying" => "varbit",
        "serial4" => "serial",
        "serial8" => "bigserial",
        "serial2" => "smallserial",
        other => other,
    }
}

fn is_builtin(name: &str) -> bool {
    canonical_base(name) != name
        || matches!(
            name,
            "text"
                | "bytea"
                | "uuid"
                | "json"
                | "jsonb"
                | "date"
                | "interval"
                | "inet"
                | "cidr"
                | "macaddr"
                | "money"
                | "oid"
                | "xml"
                | "bit"
                | "tsvector"
                | "tsquery"
                | "point"
                | "name"
                | "regclass"
                | "regproc"
                | "regtype"
        )
}

impl TypeName {
    /// Parse a type reference as written in DDL or reported by `format_type`.
    pub fn parse(text: &str) -> TypeName {
        let mut rest = text.trim();

        let mut array_dims = 0;
        loop {
            let trimmed = rest.trim_end();
            if let Some(stripped) = trimmed.strip_suffix(']') {
                if let Some(open) = stripped.rfind('[') {
                    rest = &stripped[..open];
                    array_dims += 1;
                    continue;
                }
            }
            if let Some(stripped) = trimmed.strip_suffix(" array").or_else(|| trimmed.strip_suffix(" ARRAY")) {
                rest = stripped;
                array_dims += 1;
                continue;
            }
            break;
        }

        // Pull the typmod group out wherever it sits: `timestamp(3) with time zone`.
        let mut words = String::new();
        let mut modifiers = Vec::new();
        let mut depth = 0;
        let mut current = String::new();
        let mut in_quotes = false;
        for c in rest.chars() {
            if in_quotes {
                words.push(c);
                if c == '"' {
                    in_quotes = false;
                }
                continue;
            }
            match c {
                '"' if depth == 0 => {
                    in_quotes = true;
                    words.push(c);
                }
                '(' => {
                    depth += 1;
                    if depth > 1 {
                        current.push(c);
                    }
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let m = current.trim().to_string();
                        if !m.is_empty() {
                            modifiers.push(m);
                        }
                        current.clear();
                        words.push(' ');
                    } else {
                        current.push(c);
                    }
                }
                ',' if depth == 1 => {
                    modifiers.push(current.trim().to_string());
                    current.clear();
                }
                c if depth > 0 => current.push(c),
                c => words.push(c),
            }
        }

        let words = normalize_words(&words);
        let mut name = words.strip_prefix("pg_catalog.").unwrap_or(&words).to_string();

        if let Some(element) = name.strip_prefix('_') {
            if is_builtin(element) {
                name = element.to_string();
                array_dims += 1;
            }
        }

        let mut name = canonical_base(&name).to_string();

        // float(p) picks real or double precision by the requested bits.
        if name == "double precision" && words.ends_with("float") {
            if let Some(bits) = modifiers.first().and_then(|m| m.parse::<u32>().ok()) {
                if bits <= 24 {
                    name = "real".to_string();
                }
            }
            modifiers.clear();
        }

        TypeName {
            name,
            modifiers,
            array_dims,
        }
    }

    /// Render with typmods and array suffixes.
    pub fn to_sql(&self) -> String {
        let mut out = self.name.clone();
        if !self.modifiers.is_empty() {
            out.push('(');
            out.push_str(&self.modifiers.join(","));
            out.push(')');
        }
        for _ in 0..self.array_dims {
            out.push_str("[]");
        }
        out
    }

    /// Split typmods into column length/precision/scale.
    pub fn column_type(&self) -> ColumnType {
        let first = self.modifiers.first().and_then(|m| m.parse::<i32>().ok());
        let second = self.modifiers.get(1).and_then(|m| m.parse::<i32>().ok());
        let mut data_type = self.name.clone();
        for _ in 0..self.array_dims {
            data_type.push_str("[]");
        }
        let mut out = ColumnType {
            data_type,
            ..ColumnType::default()
        };
        match self.name.as_str() {
            "varchar" | "bit" | "varbit" => out.max_length = first,
            // A bare `char` is `char(1)`.
            "char" => out.max_length = first.or(Some(1)),
            "numeric" => {
                out.precision = first;
                out.scale = second.or(first.map(|_| 0));
            }
            "timestamp" | "timestamptz" | "time" | "timetz" | "interval" => out.precision = first,
            _ => {}
        }
        out
    }
}

/// Lowercase unquoted words, collapse whitespace, and tighten dots.
fn normalize_words(words: &str) -> String {
    let mut out = String::new();
    let mut in_quotes = false;
    let mut pending_space = false;
    for c in words.chars() {
        if in_quotes {
            out.push(c);
            if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() && c != '.' && !out.ends_with('.') {
            out.push(' ');
        }
        pending_space = false;
        if c == '"' {
            in_quotes = true;
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Canonical spelling of a full type reference, typmods included.
///
/// # Example
/// ```
/// use pgir_sql::canonical_type;
/// assert_eq!(canonical_type("character varying(255)"), "varchar(255)");
/// assert_eq!(canonical_type("pg_catalog.int4"), "integer");
/// assert_eq!(canonical_type("_text"), "text[]");
/// assert_eq!(canonical_type("timestamp(3) with time zone"), "timestamptz(3)");
/// ```
pub fn canonical_type(text: &str) -> String {
    TypeName::parse(text).to_sql()
}

/// Like [`canonical_type`], but drops a `schema.` qualifier equal to `schema`.
pub fn canonical_type_in(text: &str, schema: &str) -> String {
    let mut ty = TypeName::parse(text);
    ty.name = strip_schema(&ty.name, schema).to_string();
    ty.to_sql()
}

/// Drop a leading `schema.` from a possibly-qualified name.
pub fn strip_schema<'a>(name: &'a str, schema: &str) -> &'a str {
    let quoted = format!("{}.", crate::Ident(schema));
    let bare = format!("{schema}.");
    name.strip_prefix(quoted.as_str())
        .or_else(|| name.strip_prefix(bare.as_str()))
        .unwrap_or(name)
}

/// Whether a canonical type is one of the character string types.
pub fn is_string_type(name: &str) -> bool {
    let base = name.split('(').next().unwrap_or(name).trim();
    matches!(base, "text" | "varchar" | "char" | "name")
}
