//! Value lowering (spec §4.6.8).
//!
//! Expressions used as call arguments, assignment right-hand sides, or
//! return elements lower to either a literal JSON value or a register
//! path string by syntactic shape alone — no type inference beyond what
//! §4.6.8 names.

use serde_json::{json, Value as Json};

use crate::ast::{Expr, Literal};
use crate::compiler::scope::ScopeStack;
use crate::error::{CompileError, CompileResult};

/// An already-lowered value: a literal to embed verbatim, or a register
/// path to write with the builder's `.$` path-parameter convention.
#[derive(Debug, Clone, PartialEq)]
pub enum LoweredArg {
    Literal(Json),
    Path(String),
}

impl LoweredArg {
    /// Inserts this value into `params` under `key`, applying the `.$`
    /// suffix convention for paths (spec §4.6.2).
    pub fn put(&self, params: &mut serde_json::Map<String, Json>, key: &str) {
        match self {
            LoweredArg::Literal(v) => {
                params.insert(key.to_string(), v.clone());
            }
            LoweredArg::Path(p) => {
                params.insert(format!("{key}.$"), json!(p));
            }
        }
    }

    pub fn into_json_value(self) -> Json {
        match self {
            LoweredArg::Literal(v) => v,
            LoweredArg::Path(p) => json!(p),
        }
    }
}

/// Renders one already-lowered element as an ASL intrinsic-function
/// argument token: a register path verbatim, a string literal
/// single-quoted, any other literal via its JSON text (numbers/bools
/// read back the same in both).
fn intrinsic_arg_repr(arg: &LoweredArg) -> String {
    match arg {
        LoweredArg::Path(p) => p.clone(),
        LoweredArg::Literal(Json::String(s)) => format!("'{s}'"),
        LoweredArg::Literal(other) => other.to_string(),
    }
}

/// Lowers a list/tuple literal's elements, then either embeds them as a
/// plain JSON array (no symbolic elements) or wraps them in the
/// builder's `States.Array` intrinsic so each `Path` element resolves to
/// its register value instead of its literal path string (spec §4.6.8:
/// "List -> recursively lowered, wrapped as the builder's array
/// intrinsic").
fn lower_sequence(items: &[Expr], scope: &ScopeStack) -> CompileResult<LoweredArg> {
    let lowered: Vec<LoweredArg> = items.iter().map(|item| lower_value(item, scope)).collect::<CompileResult<_>>()?;
    if lowered.iter().any(|v| matches!(v, LoweredArg::Path(_))) {
        let args = lowered.iter().map(intrinsic_arg_repr).collect::<Vec<_>>().join(", ");
        Ok(LoweredArg::Path(format!("States.Array({args})")))
    } else {
        Ok(LoweredArg::Literal(Json::Array(lowered.into_iter().map(LoweredArg::into_json_value).collect())))
    }
}

pub fn literal_to_json(lit: &Literal) -> Json {
    match lit {
        Literal::Bool(b) => json!(b),
        Literal::Int(i) => json!(i),
        Literal::Float(f) => json!(f),
        // Null preservation (P3): a literal `None` becomes the empty
        // string, never a missing key or a JSON null.
        Literal::Str(s) => json!(s),
        Literal::None => json!(""),
    }
}

fn register_path_of(expr: &Expr, scope: &ScopeStack) -> CompileResult<String> {
    match expr {
        Expr::Name(n) => {
            if !scope.is_defined(n) {
                return Err(CompileError::UndefinedVariable { name: n.clone() });
            }
            Ok(format!("$.register.{n}"))
        }
        Expr::Subscript(base, idx) => {
            let base_path = register_path_of(base, scope)?;
            match idx.as_ref() {
                Expr::Literal(Literal::Str(s)) => Ok(format!("{base_path}.{s}")),
                Expr::Literal(Literal::Int(i)) => Ok(format!("{base_path}[{i}]")),
                other => lower_value(other, scope).and_then(|v| match v {
                    LoweredArg::Literal(Json::String(s)) => Ok(format!("{base_path}.{s}")),
                    _ => Err(CompileError::UnsupportedSyntax { repr: expr.repr() }),
                }),
            }
        }
        Expr::Attribute(base, name) => {
            let base_path = register_path_of(base, scope)?;
            Ok(format!("{base_path}.{name}"))
        }
        other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    }
}

/// Lowers one expression per spec §4.6.8's shape table.
pub fn lower_value(expr: &Expr, scope: &ScopeStack) -> CompileResult<LoweredArg> {
    match expr {
        Expr::Literal(lit) => Ok(LoweredArg::Literal(literal_to_json(lit))),
        Expr::Name(_) | Expr::Subscript(..) | Expr::Attribute(..) => {
            Ok(LoweredArg::Path(register_path_of(expr, scope)?))
        }
        Expr::SelfAttr(name) => Err(CompileError::UnsupportedSyntax {
            repr: format!("self.{name} (host-environment self-attribute resolution is a compile-time concern the caller must supply before lowering)"),
        }),
        Expr::List(items) => lower_sequence(items, scope),
        Expr::Dict(entries) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries {
                let lowered = lower_value(v, scope)?;
                match &lowered {
                    LoweredArg::Literal(val) => {
                        map.insert(k.clone(), val.clone());
                    }
                    LoweredArg::Path(p) => {
                        map.insert(format!("{k}.$"), json!(p));
                    }
                }
            }
            Ok(LoweredArg::Literal(Json::Object(map)))
        }
        Expr::Tuple(items) => lower_sequence(items, scope),
        other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_with(vars: &[&str]) -> ScopeStack {
        let mut s = ScopeStack::new();
        s.push_root(vars.iter().map(|v| v.to_string()));
        s
    }

    #[test]
    fn name_lowers_to_register_path() {
        let scope = scope_with(&["s"]);
        let v = lower_value(&Expr::Name("s".into()), &scope).unwrap();
        assert_eq!(v, LoweredArg::Path("$.register.s".into()));
    }

    #[test]
    fn none_literal_becomes_empty_string() {
        let scope = scope_with(&[]);
        let v = lower_value(&Expr::Literal(Literal::None), &scope).unwrap();
        assert_eq!(v, LoweredArg::Literal(json!("")));
    }

    #[test]
    fn undefined_name_is_an_error() {
        let scope = scope_with(&[]);
        assert!(lower_value(&Expr::Name("missing".into()), &scope).is_err());
    }

    #[test]
    fn subscript_chain_flattens() {
        let scope = scope_with(&["a"]);
        let expr = Expr::Subscript(
            Box::new(Expr::Name("a".into())),
            Box::new(Expr::Literal(Literal::Int(0))),
        );
        let v = lower_value(&expr, &scope).unwrap();
        assert_eq!(v, LoweredArg::Path("$.register.a[0]".into()));
    }

    #[test]
    fn list_of_names_wraps_in_array_intrinsic() {
        let scope = scope_with(&["a", "b"]);
        let expr = Expr::List(vec![Expr::Name("a".into()), Expr::Name("b".into())]);
        let v = lower_value(&expr, &scope).unwrap();
        assert_eq!(v, LoweredArg::Path("States.Array($.register.a, $.register.b)".into()));
    }

    #[test]
    fn list_of_literals_stays_a_plain_array() {
        let scope = scope_with(&[]);
        let expr = Expr::List(vec![Expr::Literal(Literal::Int(1)), Expr::Literal(Literal::Str("x".into()))]);
        let v = lower_value(&expr, &scope).unwrap();
        assert_eq!(v, LoweredArg::Literal(json!([1, "x"])));
    }

    #[test]
    fn mixed_list_wraps_literals_as_intrinsic_arguments() {
        let scope = scope_with(&["a"]);
        let expr = Expr::List(vec![Expr::Name("a".into()), Expr::Literal(Literal::Str("x".into()))]);
        let v = lower_value(&expr, &scope).unwrap();
        assert_eq!(v, LoweredArg::Path("States.Array($.register.a, 'x')".into()));
    }

    #[test]
    fn tuple_of_names_wraps_in_array_intrinsic() {
        let scope = scope_with(&["a", "b"]);
        let expr = Expr::Tuple(vec![Expr::Name("a".into()), Expr::Name("b".into())]);
        let v = lower_value(&expr, &scope).unwrap();
        assert_eq!(v, LoweredArg::Path("States.Array($.register.a, $.register.b)".into()));
    }
}
