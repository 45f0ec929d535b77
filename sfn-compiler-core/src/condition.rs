//! Condition builder (spec §4.2).
//!
//! Lowers an `if`-test AST expression into a Step Functions Choice-rule
//! JSON fragment plus a human-readable label for the emitted state's ID.
//! Grounded on `examples/original_source/pysfn/condition.py`'s
//! `comparator_map` / `build_condition` / `if_value` shape, redesigned
//! around this crate's own [`Expr`]/[`DeclaredType`] types instead of
//! reflecting on live Python values.

use serde_json::{json, Value as Json};

use crate::ast::{CmpOp, DeclaredType, Expr, Literal};
use crate::error::{CompileError, CompileResult};

fn register_path(expr: &Expr) -> CompileResult<String> {
    match expr {
        Expr::Name(n) => Ok(format!("$.register.{n}")),
        Expr::Subscript(base, idx) => {
            let base_path = register_path(base)?;
            match idx.as_ref() {
                Expr::Literal(Literal::Str(s)) => Ok(format!("{base_path}.{s}")),
                Expr::Literal(Literal::Int(i)) => Ok(format!("{base_path}[{i}]")),
                other => Err(CompileError::UnsupportedTest { repr: other.repr() }),
            }
        }
        other => Err(CompileError::UnsupportedTest { repr: other.repr() }),
    }
}

/// Generic truthiness: present, not null, and (bool-true OR non-empty
/// string OR non-zero number OR first-element-present).
fn truthiness(path: &str, declared: Option<DeclaredType>) -> Json {
    let is_present = json!({ "Variable": path, "IsPresent": true });
    let is_not_null = json!({ "Variable": path, "IsNull": false });

    let narrowed = match declared {
        Some(DeclaredType::Bool) => json!({ "Variable": path, "BooleanEquals": true }),
        Some(DeclaredType::Str) => json!({ "Not": { "Variable": path, "StringEquals": "" } }),
        Some(DeclaredType::Int) => json!({ "Not": { "Variable": path, "NumericEquals": 0 } }),
        Some(DeclaredType::Float) => json!({ "Not": { "Variable": path, "NumericEquals": 0.0 } }),
        None => json!({
            "Or": [
                { "Variable": path, "BooleanEquals": true },
                { "Not": { "Variable": path, "StringEquals": "" } },
                { "Not": { "Variable": path, "NumericEquals": 0 } },
                { "Variable": format!("{path}[0]"), "IsPresent": true },
            ]
        }),
    };

    json!({ "And": [is_present, is_not_null, narrowed] })
}

fn comparator_name(lit: &Literal, op: CmpOp) -> CompileResult<&'static str> {
    match (lit, op) {
        (Literal::Str(_), CmpOp::Eq) => Ok("StringEquals"),
        (Literal::Bool(_), CmpOp::Eq) => Ok("BooleanEquals"),
        (Literal::Int(_), CmpOp::Eq) | (Literal::Float(_), CmpOp::Eq) => Ok("NumericEquals"),
        (Literal::Int(_), CmpOp::Lt) | (Literal::Float(_), CmpOp::Lt) => Ok("NumericLessThan"),
        (Literal::Int(_), CmpOp::Gt) | (Literal::Float(_), CmpOp::Gt) => Ok("NumericGreaterThan"),
        _ => Err(CompileError::UnsupportedTest {
            repr: format!("{lit} {op:?}"),
        }),
    }
}

fn literal_json(lit: &Literal) -> Json {
    match lit {
        Literal::Bool(b) => json!(b),
        Literal::Int(i) => json!(i),
        Literal::Float(f) => json!(f),
        Literal::Str(s) => json!(s),
        Literal::None => Json::Null,
    }
}

/// Builds the Choice-rule JSON and a label for one `if`-test expression.
pub fn build_condition(test: &Expr, declared: Option<DeclaredType>) -> CompileResult<(Json, String)> {
    match test {
        Expr::Name(n) => {
            let path = format!("$.register.{n}");
            Ok((truthiness(&path, declared), format!("{n} is truthy")))
        }
        Expr::Subscript(..) => {
            let path = register_path(test)?;
            Ok((truthiness(&path, declared), format!("{} is truthy", test.repr())))
        }
        Expr::Compare { left, op, right } => {
            let path = register_path(left)?;
            let lit = match right.as_ref() {
                Expr::Literal(l) => l,
                other => {
                    return Err(CompileError::UnsupportedTest { repr: other.repr() })
                }
            };
            let comparator = comparator_name(lit, *op)?;
            let label = format!("{} {}", left.repr(), test.repr());
            Ok((
                json!({ "Variable": path, comparator: literal_json(lit) }),
                label,
            ))
        }
        Expr::Call { func, args, keywords } if keywords.is_empty() && args.len() == 1 => {
            match func.as_ref() {
                Expr::Attribute(base, method) if method == "startswith" => {
                    let path = register_path(base)?;
                    let prefix = match &args[0] {
                        Expr::Literal(Literal::Str(s)) => s.clone(),
                        other => return Err(CompileError::UnsupportedTest { repr: other.repr() }),
                    };
                    let cond = json!({
                        "And": [
                            { "Variable": path, "IsPresent": true },
                            { "Not": { "Variable": path, "IsNull": true } },
                            { "Variable": path, "StringMatches": format!("{prefix}*") },
                        ]
                    });
                    Ok((cond, format!("{}.startswith({prefix:?})", base.repr())))
                }
                _ => Err(CompileError::UnsupportedTest { repr: test.repr() }),
            }
        }
        other => Err(CompileError::UnsupportedTest { repr: other.repr() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_truthiness_with_no_declared_type() {
        let (json, label) = build_condition(&Expr::Name("a".into()), None).unwrap();
        assert_eq!(label, "a is truthy");
        assert!(json["And"].is_array());
    }

    #[test]
    fn numeric_equality_picks_numeric_comparator() {
        let test = Expr::Compare {
            left: Box::new(Expr::Name("code".into())),
            op: CmpOp::Eq,
            right: Box::new(Expr::Literal(Literal::Int(2))),
        };
        let (json, _) = build_condition(&test, None).unwrap();
        assert_eq!(json["Variable"], "$.register.code");
        assert_eq!(json["NumericEquals"], 2);
    }

    #[test]
    fn startswith_builds_conjunction() {
        let test = Expr::Call {
            func: Box::new(Expr::Attribute(Box::new(Expr::Name("name".into())), "startswith".into())),
            args: vec![Expr::Literal(Literal::Str("pre".into()))],
            keywords: vec![],
        };
        let (json, label) = build_condition(&test, None).unwrap();
        assert!(label.contains("startswith"));
        assert_eq!(json["And"][2]["Variable"], "$.register.name");
    }

    #[test]
    fn unsupported_shape_is_an_error() {
        let test = Expr::Literal(Literal::Int(1));
        assert!(build_condition(&test, None).is_err());
    }
}
