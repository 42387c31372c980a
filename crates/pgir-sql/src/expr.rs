//! SQL scalar expressions.

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `'text'`, stored unescaped.
    String(String),
    /// `E'text'`, stored with backslash escapes intact.
    EscapeString(String),
    /// Numeric constant as written, sign included.
    Number(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// Whether this is an integer constant (no point, no exponent).
    pub fn is_integer(&self) -> bool {
        match self {
            Literal::Number(n) => {
                let digits = n.strip_prefix('-').unwrap_or(n);
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            }
            _ => false,
        }
    }
}

/// Which pattern-matching operator a [`Expr::Like`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeKind {
    Like,
    ILike,
    SimilarTo,
}

impl LikeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LikeKind::Like => "LIKE",
            LikeKind::ILike => "ILIKE",
            LikeKind::SimilarTo => "SIMILAR TO",
        }
    }
}

/// `ANY` / `ALL` quantifier on a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
}

impl Quantifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Quantifier::Any => "ANY",
            Quantifier::All => "ALL",
        }
    }
}

/// A SQL scalar expression.
///
/// Names are stored folded: unquoted identifiers lowercased, quoted ones as
/// written. Subqueries are kept as canonical text rather than parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, optionally qualified (`t.col`, `s.t.col`, `t.*`).
    Column(Vec<String>),
    Literal(Literal),
    /// Positional parameter `$n`.
    Param(String),
    /// Parenthesis-free value function, stored upper-case (`CURRENT_TIMESTAMP`).
    Keyword(String),
    /// `expr::type`; the type is stored canonical.
    Cast { expr: Box<Expr>, ty: String },
    /// Function call. `star` is `count(*)`.
    Function {
        name: Vec<String>,
        args: Vec<Expr>,
        distinct: bool,
        star: bool,
    },
    /// Prefix operator: `NOT`, `-`, `+`, `~`, ...
    Unary { op: String, expr: Box<Expr> },
    /// Infix operator; `AND`/`OR` are stored upper-case.
    Binary {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
    },
    IsNull { expr: Box<Expr>, negated: bool },
    /// `IS [NOT] TRUE | FALSE | UNKNOWN`.
    IsBool {
        expr: Box<Expr>,
        value: String,
        negated: bool,
    },
    IsDistinctFrom {
        left: Box<Expr>,
        right: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: String,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
        symmetric: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        kind: LikeKind,
        negated: bool,
        escape: Option<Box<Expr>>,
    },
    /// `left op ANY (right)` / `left op ALL (right)`.
    AnyAll {
        left: Box<Expr>,
        op: String,
        quantifier: Quantifier,
        right: Box<Expr>,
    },
    /// `ARRAY[...]`.
    Array(Vec<Expr>),
    /// `ROW(...)` when `explicit`, otherwise a bare `(a, b)`.
    Row { items: Vec<Expr>, explicit: bool },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
    /// `expr[index]` or `expr[lower:upper]`.
    Subscript {
        expr: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        slice: bool,
    },
    /// `(expr).field`.
    Field { expr: Box<Expr>, field: String },
    Collate { expr: Box<Expr>, collation: String },
    /// Parenthesized subquery, canonical text without the parentheses.
    Subquery(String),
    Exists(String),
    /// `ARRAY(subquery)`.
    ArraySubquery(String),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(vec![name.into()])
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn number(n: impl Into<String>) -> Self {
        Expr::Literal(Literal::Number(n.into()))
    }

    pub fn cast(self, ty: impl Into<String>) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            ty: ty.into(),
        }
    }

    pub fn binary(self, op: impl Into<String>, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op: op.into(),
            right: Box::new(right),
        }
    }

    /// Direct children, left to right.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Column(_)
            | Expr::Literal(_)
            | Expr::Param(_)
            | Expr::Keyword(_)
            | Expr::Subquery(_)
            | Expr::Exists(_)
            | Expr::ArraySubquery(_) => Vec::new(),
            Expr::Cast { expr, .. }
            | Expr::Unary { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::IsBool { expr, .. }
            | Expr::InSubquery { expr, .. }
            | Expr::Field { expr, .. }
            | Expr::Collate { expr, .. } => vec![expr.as_mut()],
            Expr::Function { args, .. } | Expr::Array(args) | Expr::Row { items: args, .. } => {
                args.iter_mut().collect()
            }
            Expr::Binary { left, right, .. }
            | Expr::IsDistinctFrom { left, right, .. }
            | Expr::AnyAll { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::InList { expr, list, .. } => {
                let mut out = vec![expr.as_mut()];
                out.extend(list.iter_mut());
                out
            }
            Expr::Between { expr, low, high, .. } => {
                vec![expr.as_mut(), low.as_mut(), high.as_mut()]
            }
            Expr::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut out = vec![expr.as_mut(), pattern.as_mut()];
                out.extend(escape.as_deref_mut());
                out
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut out: Vec<&mut Expr> = operand.as_deref_mut().into_iter().collect();
                for (when, then) in branches {
                    out.push(when);
                    out.push(then);
                }
                out.extend(else_result.as_deref_mut());
                out
            }
            Expr::Subscript {
                expr, lower, upper, ..
            } => {
                let mut out = vec![expr.as_mut()];
                out.extend(lower.as_deref_mut());
                out.extend(upper.as_deref_mut());
                out
            }
        }
    }

    /// Visit every node bottom-up, children before parents.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        for child in self.children_mut() {
            child.walk_mut(f);
        }
        f(self);
    }

    /// Unqualified names of every column this expression references.
    pub fn column_names(&self) -> Vec<String> {
        let mut copy = self.clone();
        let mut names = Vec::new();
        copy.walk_mut(&mut |e| {
            if let Expr::Column(parts) = e {
                if let Some(last) = parts.last() {
                    if last != "*" && !names.contains(last) {
                        names.push(last.clone());
                    }
                }
            }
        });
        names
    }
}
