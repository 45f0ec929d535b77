//! Per-statement lowering (spec §4.6.3's table, the leaf rows — the
//! control-flow rows delegate to [`super::control`]).

use serde_json::{json, Value as Json};

use super::control;
use super::register::{self, Binding};
use super::scope::ScopeStack;
use super::CompilerContext;
use crate::ast::{AugOp, Expr, Literal, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::graph::SuccessorSink;
use crate::value::{self, LoweredArg};

/// Lowers a statement list, chaining each statement's dangling
/// successors into the next one's entry. `Stmt::Pass` contributes no
/// emission when `ctx.skip_pass` is set (spec §4.6.3 "pass" row) and is
/// simply skipped — the surrounding chain is unaffected.
pub fn lower_stmts(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    outputs: &[String],
    stmts: &[Stmt],
) -> CompileResult<Option<(String, SuccessorSink)>> {
    let mut entry: Option<String> = None;
    let mut tail: Option<SuccessorSink> = None;
    for stmt in stmts {
        if let Some((id, sink)) = lower_stmt(ctx, scope, outputs, stmt)? {
            if entry.is_none() {
                entry = Some(id.clone());
            }
            if let Some(prev) = tail.take() {
                prev.resolve(&mut ctx.arena, &id);
            }
            tail = Some(sink);
        }
    }
    Ok(entry.map(|e| (e, tail.unwrap_or_default())))
}

fn lower_stmt(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    outputs: &[String],
    stmt: &Stmt,
) -> CompileResult<Option<(String, SuccessorSink)>> {
    match stmt {
        Stmt::Pass => {
            if ctx.skip_pass {
                Ok(None)
            } else {
                Ok(Some(register::build_raw_pass(ctx, "Pass", json!({}), None)))
            }
        }
        Stmt::Assign { target, value } => Ok(Some(lower_assign(ctx, scope, target, value)?)),
        Stmt::AugAssign { target, op, value } => Ok(Some(lower_aug_assign(ctx, scope, target, *op, value)?)),
        Stmt::Expr(e) => Ok(Some(lower_expr_stmt(ctx, scope, e)?)),
        Stmt::If { test, body, orelse } => Ok(Some(control::lower_if(ctx, scope, outputs, test, body, orelse)?)),
        Stmt::For { target, iter, body } => Ok(Some(control::lower_for(ctx, scope, outputs, target, iter, body)?)),
        Stmt::With { retry_call, body } => Ok(Some(control::lower_with(ctx, scope, outputs, retry_call, body)?)),
        Stmt::Try { body, handlers } => Ok(Some(control::lower_try(ctx, scope, outputs, body, handlers)?)),
        Stmt::Return(values) => Ok(Some(lower_return(ctx, scope, outputs, values)?)),
    }
}

fn lower_assign(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    target: &Expr,
    value: &Expr,
) -> CompileResult<(String, SuccessorSink)> {
    match target {
        Expr::Name(name) => lower_single_assign(ctx, scope, name, value),
        Expr::Tuple(items) => {
            let names: Vec<String> = items
                .iter()
                .map(|e| match e {
                    Expr::Name(n) => Ok(n.clone()),
                    other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
                })
                .collect::<CompileResult<Vec<_>>>()?;
            match value {
                Expr::Call { .. } => super::call::lower_call_expr(ctx, scope, value, Some(names)),
                other => Err(CompileError::UnsupportedSyntax {
                    repr: format!("tuple assignment from non-call: {}", other.repr()),
                }),
            }
        }
        Expr::Subscript(base, idx) => lower_subscript_assign(ctx, scope, base, idx, value),
        other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    }
}

fn lower_single_assign(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    name: &str,
    value: &Expr,
) -> CompileResult<(String, SuccessorSink)> {
    match value {
        Expr::Call { .. } => super::call::lower_call_expr(ctx, scope, value, Some(vec![name.to_string()])),
        Expr::ListComp { elt, target, iter } => control::lower_list_comp(ctx, scope, name, elt, target, iter),
        _ => {
            let lowered = value::lower_value(value, scope)?;
            Ok(register::build_register_update(ctx, scope, "Assign", vec![Binding::new(name.to_string(), lowered)]))
        }
    }
}

/// `x[k] = expr` (spec §4.6.3): a Pass computing `{k: expr}` into a
/// scratch slot, then a Pass merging it into `x` with a shallow
/// `States.JsonMerge` (spec §9 Open Questions — shallow confirmed).
fn lower_subscript_assign(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    base: &Expr,
    idx: &Expr,
    value: &Expr,
) -> CompileResult<(String, SuccessorSink)> {
    let var_name = match base {
        Expr::Name(n) => n.clone(),
        other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    };
    if !scope.is_defined(&var_name) {
        return Err(CompileError::UndefinedVariable { name: var_name });
    }
    let key = match idx {
        Expr::Literal(Literal::Str(s)) => s.clone(),
        other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    };
    let lowered = value::lower_value(value, scope)?;
    let mut itm_params = serde_json::Map::new();
    lowered.put(&mut itm_params, &key);
    let (prep_id, prep_sink) = register::build_raw_pass(
        ctx,
        &format!("Prep {var_name}.{key}"),
        Json::Object(itm_params),
        Some("$.register.itm".to_string()),
    );
    let merge_expr = format!("States.JsonMerge($.register.{var_name}, $.register.itm, false)");
    let bindings = vec![Binding::new(var_name.clone(), LoweredArg::Path(merge_expr))];
    let (assign_id, assign_sink) = register::build_register_update(ctx, scope, &format!("Assign {var_name}.{key}"), bindings);
    prep_sink.resolve(&mut ctx.arena, &assign_id);
    Ok((prep_id, assign_sink))
}

fn lower_aug_assign(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    target: &Expr,
    op: AugOp,
    value: &Expr,
) -> CompileResult<(String, SuccessorSink)> {
    let name = match target {
        Expr::Name(n) => n.clone(),
        other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    };
    if !scope.is_defined(&name) {
        return Err(CompileError::UndefinedVariable { name });
    }
    let sign = if op == AugOp::Sub { -1.0 } else { 1.0 };
    let delta = match value {
        Expr::Literal(Literal::Int(i)) => (*i as f64 * sign).to_string(),
        Expr::Literal(Literal::Float(f)) => (*f * sign).to_string(),
        other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    };
    let expr_str = format!("States.MathAdd($.register.{name}, {delta})");
    let bindings = vec![Binding::new(name.clone(), LoweredArg::Path(expr_str))];
    Ok(register::build_register_update(ctx, scope, &format!("Add to {name}"), bindings))
}

fn lower_expr_stmt(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    expr: &Expr,
) -> CompileResult<(String, SuccessorSink)> {
    if let Expr::Call { func, args, .. } = expr {
        if let Expr::Attribute(base, method) = func.as_ref() {
            if method == "append" {
                let base_name = match base.as_ref() {
                    Expr::Name(n) => n.clone(),
                    other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
                };
                let arg = args.first().ok_or_else(|| CompileError::UnsupportedSyntax {
                    repr: "append() requires one argument".into(),
                })?;
                return lower_append(ctx, scope, &base_name, arg);
            }
        }
        return super::call::lower_call_expr(ctx, scope, expr, None);
    }
    Err(CompileError::UnsupportedSyntax { repr: expr.repr() })
}

/// `list.append(x)` (spec §4.6.3): a Pass building the two-element
/// nested array `[existing, [item]]` via `States.Array`, then a Pass
/// that flattens it back onto `list` (one level, since the concat only
/// ever nests one extra level deep).
fn lower_append(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    base_name: &str,
    arg: &Expr,
) -> CompileResult<(String, SuccessorSink)> {
    if !scope.is_defined(base_name) {
        return Err(CompileError::UndefinedVariable { name: base_name.to_string() });
    }

    let (pre, item_path) = match arg {
        Expr::Call { .. } => {
            let (id, sink) = super::call::lower_call_expr(ctx, scope, arg, Some(vec!["_appendItem".to_string()]))?;
            (Some((id, sink)), "$.register._appendItem".to_string())
        }
        Expr::Name(n) => {
            if !scope.is_defined(n) {
                return Err(CompileError::UndefinedVariable { name: n.clone() });
            }
            (None, format!("$.register.{n}"))
        }
        Expr::Literal(lit) => {
            let json = value::literal_to_json(lit);
            let repr = match json {
                Json::String(s) => format!("{s:?}"),
                other => other.to_string(),
            };
            (None, repr)
        }
        other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    };

    let concat_expr = format!("States.Array($.register.{base_name}, States.Array({item_path}))");
    let (concat_id, concat_sink) = register::build_raw_pass(
        ctx,
        &format!("Append to {base_name}"),
        json!({ "arrayConcat.$": concat_expr }),
        Some("$.register.meta".to_string()),
    );

    let entry = match &pre {
        Some((id, _)) => id.clone(),
        None => concat_id.clone(),
    };
    if let Some((_, pre_sink)) = pre {
        pre_sink.resolve(&mut ctx.arena, &concat_id);
    }

    let flatten_bindings = vec![Binding::new(base_name.to_string(), LoweredArg::Path("$.register.meta.arrayConcat[*][*]".to_string()))];
    let (flatten_id, flatten_sink) = register::build_register_update(ctx, scope, &format!("Flatten {base_name}"), flatten_bindings);
    concat_sink.resolve(&mut ctx.arena, &flatten_id);

    Ok((entry, flatten_sink))
}

/// Return lowering (spec §4.6.7): the terminal Pass's shape is fixed by
/// the declared output schema, not by however many values the `return`
/// happens to carry.
fn lower_return(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    outputs: &[String],
    values: &[Expr],
) -> CompileResult<(String, SuccessorSink)> {
    if values.is_empty() {
        if !outputs.is_empty() {
            return Err(CompileError::ArityMismatch { expected: outputs.len(), actual: 0 });
        }
        let id = ctx.idgen.next_id("Return");
        ctx.arena.insert(crate::graph::StateNode::Pass {
            id: id.clone(),
            parameters: None,
            result_path: None,
            next: None,
            end: true,
        });
        return Ok((id, SuccessorSink::new()));
    }

    if values.len() != outputs.len() {
        return Err(CompileError::ArityMismatch { expected: outputs.len(), actual: values.len() });
    }
    let mut params = serde_json::Map::new();
    for (name, expr) in outputs.iter().zip(values.iter()) {
        value::lower_value(expr, scope)?.put(&mut params, name);
    }
    let id = ctx.idgen.next_id("Return");
    ctx.arena.insert(crate::graph::StateNode::Pass {
        id: id.clone(),
        parameters: Some(Json::Object(params)),
        result_path: None,
        next: None,
        end: true,
    });
    Ok((id, SuccessorSink::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerContext as Ctx;
    use crate::graph::StateArena;
    use crate::ident::IdGen;
    use crate::registry::SymbolTable;

    fn ctx() -> Ctx<'static> {
        let symbols: &'static SymbolTable = Box::leak(Box::new(SymbolTable::new()));
        Ctx { idgen: IdGen::new(0), arena: StateArena::new(), symbols, skip_pass: false }
    }

    fn scope_with(vars: &[&str]) -> ScopeStack {
        let mut s = ScopeStack::new();
        s.push_root(vars.iter().map(|v| v.to_string()));
        s
    }

    #[test]
    fn bare_name_assign_emits_a_register_pass() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["s"]);
        let (id, _) = lower_assign(&mut ctx, &mut scope, &Expr::Name("a".into()), &Expr::Name("s".into())).unwrap();
        assert!(matches!(ctx.arena.get(&id), Some(crate::graph::StateNode::Pass { .. })));
        assert!(scope.is_defined("a"));
    }

    #[test]
    fn return_with_wrong_arity_is_rejected() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["a"]);
        let err = lower_return(&mut ctx, &mut scope, &["x".to_string(), "y".to_string()], &[Expr::Name("a".into())]).unwrap_err();
        assert_eq!(err, CompileError::ArityMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn return_bare_with_no_outputs_emits_trivial_pass() {
        let mut ctx = ctx();
        let mut scope = scope_with(&[]);
        let (id, sink) = lower_return(&mut ctx, &mut scope, &[], &[]).unwrap();
        assert!(sink.is_empty());
        match ctx.arena.get(&id) {
            Some(crate::graph::StateNode::Pass { end, parameters, .. }) => {
                assert!(*end);
                assert!(parameters.is_none());
            }
            other => panic!("expected terminal Pass, got {other:?}"),
        }
    }

    #[test]
    fn append_emits_concat_then_flatten() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["results", "v"]);
        let (id, sink) = lower_append(&mut ctx, &mut scope, "results", &Expr::Name("v".into())).unwrap();
        assert!(matches!(ctx.arena.get(&id), Some(crate::graph::StateNode::Pass { .. })));
        assert!(!sink.is_empty());
    }

    #[test]
    fn append_of_undefined_list_is_rejected() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["v"]);
        let err = lower_append(&mut ctx, &mut scope, "results", &Expr::Name("v".into())).unwrap_err();
        assert_eq!(err, CompileError::UndefinedVariable { name: "results".to_string() });
    }
}
