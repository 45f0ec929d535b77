//! Host-language AST (spec §6, the accepted source subset).
//!
//! This is not a general-purpose host-language AST — it only has enough
//! shape to represent the statement forms of §4.6.3 and the expression
//! forms of §4.6.8. Anything else simply has no constructor here; the
//! parser rejects it before an `Expr`/`Stmt` value can exist.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    None,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::None => write!(f, "None"),
        }
    }
}

/// A parameter's statically-known type, captured from a `name: Type`
/// annotation on the `def` line (spec §4.2 "if the declared type is
/// known (bool/str/int/float), emit the narrower form"). `None` (no
/// entry) means "narrow nothing, use the generic truthiness form".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    Bool,
    Str,
    Int,
    Float,
}

impl DeclaredType {
    /// Recognizes the annotation spellings the condition builder narrows
    /// on; any other annotation text (a custom class, a generic, etc.)
    /// yields `None` and falls back to generic truthiness.
    pub fn from_annotation(text: &str) -> Option<Self> {
        match text.trim() {
            "bool" => Some(DeclaredType::Bool),
            "str" => Some(DeclaredType::Str),
            "int" => Some(DeclaredType::Int),
            "float" => Some(DeclaredType::Float),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Gt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Literal(Literal),
    /// `self.field` — resolved against the host environment at compile time.
    SelfAttr(String),
    List(Vec<Expr>),
    Dict(Vec<(String, Expr)>),
    /// `base[index]`, index restricted to a constant or a simple expr.
    Subscript(Box<Expr>, Box<Expr>),
    /// `base.attr` (non-call attribute access, e.g. before a method call).
    Attribute(Box<Expr>, String),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    Compare {
        left: Box<Expr>,
        op: CmpOp,
        right: Box<Expr>,
    },
    /// `[elt for target in iter]`
    ListComp {
        elt: Box<Expr>,
        target: String,
        iter: Box<Expr>,
    },
    Tuple(Vec<Expr>),
}

impl Expr {
    /// Best-effort source-like rendering, used only in error messages.
    pub fn repr(&self) -> String {
        match self {
            Expr::Name(n) => n.clone(),
            Expr::Literal(l) => l.to_string(),
            Expr::SelfAttr(n) => format!("self.{n}"),
            Expr::List(items) => format!(
                "[{}]",
                items.iter().map(Expr::repr).collect::<Vec<_>>().join(", ")
            ),
            Expr::Dict(items) => format!(
                "{{{}}}",
                items
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Expr::Subscript(b, i) => format!("{}[{}]", b.repr(), i.repr()),
            Expr::Attribute(b, a) => format!("{}.{a}", b.repr()),
            Expr::Call { func, args, keywords } => {
                let mut parts: Vec<String> = args.iter().map(Expr::repr).collect();
                parts.extend(keywords.iter().map(|(k, v)| format!("{k}={}", v.repr())));
                format!("{}({})", func.repr(), parts.join(", "))
            }
            Expr::Compare { left, op, right } => {
                let sym = match op {
                    CmpOp::Eq => "==",
                    CmpOp::Lt => "<",
                    CmpOp::Gt => ">",
                };
                format!("{} {sym} {}", left.repr(), right.repr())
            }
            Expr::ListComp { elt, target, iter } => {
                format!("[{} for {target} in {}]", elt.repr(), iter.repr())
            }
            Expr::Tuple(items) => items
                .iter()
                .map(Expr::repr)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// `None` means a bare `except:`; `Some("Exception")` is the only
    /// supported catch-all type name.
    pub type_name: Option<String>,
    pub bound_name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `x = expr` or `x, y = expr` or `x[k] = expr` (single target only;
    /// tuple targets are represented as `Expr::Tuple` on the left).
    Assign { target: Expr, value: Expr },
    AugAssign { target: Expr, op: AugOp, value: Expr },
    /// bare expression statement, e.g. a call with a discarded result,
    /// or `list.append(x)`.
    Expr(Expr),
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    /// `with Retry(...): body` — only a single-item `with` over a `Retry`
    /// call is supported; anything else is `CompileError::WithScopeMisuse`.
    With { retry_call: Expr, body: Vec<Stmt> },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
    },
    Return(Vec<Expr>),
    Pass,
}

/// A parsed function body plus its declared parameters, ready for the
/// compiler (§4.6) and the attribute collector (§4.3) to consume.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFunction {
    pub name: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<(String, Literal)>,
    pub body: Vec<Stmt>,
    /// Output field names from a `-> (a, b)` return annotation, if
    /// present (spec §4.3b). Absent when the decorator supplies the
    /// output schema explicitly instead.
    pub declared_outputs: Option<Vec<String>>,
    /// Parameter type annotations recognized by [`DeclaredType`], keyed
    /// by parameter name (spec §4.2). Parameters with no annotation, or
    /// an annotation `DeclaredType::from_annotation` doesn't recognize,
    /// have no entry.
    pub param_types: std::collections::BTreeMap<String, DeclaredType>,
}
