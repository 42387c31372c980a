//! Functions, procedures and aggregates.

use crate::Keyed;

/// Parameter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
    Variadic,
    /// Column of a `RETURNS TABLE (...)` result
    Table,
}

impl ParameterMode {
    /// Whether the parameter is part of the call signature.
    pub fn is_input(self) -> bool {
        matches!(
            self,
            ParameterMode::In | ParameterMode::InOut | ParameterMode::Variadic
        )
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            ParameterMode::In => "IN",
            ParameterMode::Out => "OUT",
            ParameterMode::InOut => "INOUT",
            ParameterMode::Variadic => "VARIADIC",
            ParameterMode::Table => "TABLE",
        }
    }

    /// Decode one element of `pg_proc.proargmodes`.
    pub fn from_catalog(code: &str) -> Self {
        match code {
            "o" => ParameterMode::Out,
            "b" => ParameterMode::InOut,
            "v" => ParameterMode::Variadic,
            "t" => ParameterMode::Table,
            _ => ParameterMode::In,
        }
    }
}

/// A routine parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name, if given
    pub name: Option<String>,
    /// Canonical type
    pub data_type: String,
    pub mode: ParameterMode,
    /// 1-based position among all parameters
    pub position: u32,
    /// Default expression
    pub default: Option<String>,
}

/// Comma-joined input parameter types: the part of a signature inside the parens.
pub fn signature<'a>(parameters: impl IntoIterator<Item = &'a Parameter>) -> String {
    parameters
        .into_iter()
        .filter(|p| p.mode.is_input())
        .map(|p| p.data_type.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `name(argtypes)`, the identity of an overloaded routine.
pub fn routine_key(name: &str, parameters: &[Parameter]) -> String {
    format!("{name}({})", signature(parameters))
}

/// Function volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Volatility {
    Immutable,
    Stable,
    #[default]
    Volatile,
}

impl Volatility {
    pub fn as_sql(self) -> &'static str {
        match self {
            Volatility::Immutable => "IMMUTABLE",
            Volatility::Stable => "STABLE",
            Volatility::Volatile => "VOLATILE",
        }
    }

    /// Decode `pg_proc.provolatile`.
    pub fn from_catalog(code: &str) -> Self {
        match code {
            "i" => Volatility::Immutable,
            "s" => Volatility::Stable,
            _ => Volatility::Volatile,
        }
    }
}

/// Parallel-safety marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelSafety {
    Safe,
    Restricted,
    #[default]
    Unsafe,
}

impl ParallelSafety {
    pub fn as_sql(self) -> &'static str {
        match self {
            ParallelSafety::Safe => "SAFE",
            ParallelSafety::Restricted => "RESTRICTED",
            ParallelSafety::Unsafe => "UNSAFE",
        }
    }

    /// Decode `pg_proc.proparallel`.
    pub fn from_catalog(code: &str) -> Self {
        match code {
            "s" => ParallelSafety::Safe,
            "r" => ParallelSafety::Restricted,
            _ => ParallelSafety::Unsafe,
        }
    }
}

/// A function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub schema: String,
    pub name: String,
    /// Body text (what sits between the dollar quotes)
    pub definition: String,
    /// Language name, lowercase after normalization
    pub language: String,
    pub parameters: Vec<Parameter>,
    /// Result type, e.g. `integer`, `SETOF text`, `TABLE(id integer)`, `trigger`
    pub return_type: String,
    pub volatility: Volatility,
    /// `STRICT` / `RETURNS NULL ON NULL INPUT`
    pub strict: bool,
    pub security_definer: bool,
    pub leakproof: bool,
    pub parallel: ParallelSafety,
    /// `SET search_path = ...`
    pub search_path: Option<String>,
    pub comment: Option<String>,
}

impl Function {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            definition: String::new(),
            language: "sql".into(),
            parameters: Vec::new(),
            return_type: "void".into(),
            volatility: Volatility::default(),
            strict: false,
            security_definer: false,
            leakproof: false,
            parallel: ParallelSafety::default(),
            search_path: None,
            comment: None,
        }
    }

    /// Input parameter types, e.g. `integer, text`.
    pub fn signature(&self) -> String {
        signature(&self.parameters)
    }
}

impl Keyed for Function {
    fn key(&self) -> String {
        routine_key(&self.name, &self.parameters)
    }
}

/// A procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub schema: String,
    pub name: String,
    pub definition: String,
    pub language: String,
    pub parameters: Vec<Parameter>,
    pub security_definer: bool,
    pub search_path: Option<String>,
    pub comment: Option<String>,
}

impl Procedure {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            definition: String::new(),
            language: "sql".into(),
            parameters: Vec::new(),
            security_definer: false,
            search_path: None,
            comment: None,
        }
    }

    pub fn signature(&self) -> String {
        signature(&self.parameters)
    }
}

impl Keyed for Procedure {
    fn key(&self) -> String {
        routine_key(&self.name, &self.parameters)
    }
}

/// A user-defined aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub schema: String,
    pub name: String,
    /// Input types
    pub arguments: Vec<String>,
    /// `SFUNC`
    pub state_function: String,
    /// `STYPE`
    pub state_type: String,
    /// `FINALFUNC`
    pub final_function: Option<String>,
    /// `COMBINEFUNC`
    pub combine_function: Option<String>,
    /// `INITCOND`
    pub initial_condition: Option<String>,
    pub parallel: ParallelSafety,
    pub comment: Option<String>,
}

impl Aggregate {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            arguments: Vec::new(),
            state_function: String::new(),
            state_type: String::new(),
            final_function: None,
            combine_function: None,
            initial_condition: None,
            parallel: ParallelSafety::default(),
            comment: None,
        }
    }
}

impl Keyed for Aggregate {
    fn key(&self) -> String {
        format!("{}({})", self.name, self.arguments.join(", "))
    }
}
