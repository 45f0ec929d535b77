//! Call lowering (spec §4.6.4).

use serde_json::{json, Map, Value as Json};

use super::register::{build_raw_pass, build_register_update, Binding};
use super::scope::ScopeStack;
use super::CompilerContext;
use crate::ast::{Expr, Literal};
use crate::error::{CompileError, CompileResult};
use crate::graph::{CatchHandler, RetryPolicy, StateNode, Successor, SuccessorSink, TaskIntegration, WaitDuration};
use crate::registry::{resolve_callable, CallableRef, ComputeUnitDef, ForeignDef, IntrinsicKind, StateMachineRefDef};
use crate::templates;
use crate::value::{lower_value, LoweredArg};

fn callee_name(func: &Expr) -> Option<String> {
    match func {
        Expr::Name(n) => Some(n.clone()),
        Expr::Attribute(base, attr) => match base.as_ref() {
            Expr::Name(n) => Some(format!("{n}.{attr}")),
            _ => None,
        },
        _ => None,
    }
}

fn as_literal_int(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(Literal::Int(i)) => Some(*i),
        _ => None,
    }
}

fn as_literal_str(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(Literal::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Top-level entry: lowers a call expression used either as a statement
/// (`result_targets = None`) or as an assignment RHS (`result_targets =
/// Some(names)` — one per declared output field, in order).
pub fn lower_call_expr(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    call: &Expr,
    result_targets: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    lower_call_inner(ctx, scope, call, result_targets, None, None)
}

fn lower_call_inner(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    call: &Expr,
    result_targets: Option<Vec<String>>,
    integration_override: Option<TaskIntegration>,
    outputs_override: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    let (func, args, keywords) = match call {
        Expr::Call { func, args, keywords } => (func, args, keywords),
        other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    };
    let name = callee_name(func).ok_or_else(|| CompileError::UnsupportedSyntax { repr: call.repr() })?;

    if let Some(op) = templates::lookup(&name) {
        return lower_service_op(ctx, scope, op, &name, args, keywords, result_targets);
    }

    match resolve_callable(&name, ctx.symbols)? {
        CallableRef::Sleep => lower_sleep(ctx, args),
        CallableRef::Intrinsic(kind) => lower_intrinsic(ctx, scope, kind, args, result_targets),
        CallableRef::EventWrapper => {
            let inner = args.first().ok_or_else(|| CompileError::UnsupportedSyntax {
                repr: "event() requires a call argument".into(),
            })?;
            lower_call_inner(ctx, scope, inner, None, Some(TaskIntegration::FireAndForget), None)
        }
        CallableRef::AwaitTokenWrapper => {
            let inner = args.first().ok_or_else(|| CompileError::UnsupportedSyntax {
                repr: "await_token() requires a call argument".into(),
            })?;
            let returns = match args.get(1) {
                Some(Expr::List(items)) => items
                    .iter()
                    .map(|e| as_literal_str(e).ok_or_else(|| CompileError::UnsupportedSyntax { repr: e.repr() }))
                    .collect::<CompileResult<Vec<_>>>()?,
                _ => {
                    return Err(CompileError::UnsupportedSyntax {
                        repr: "await_token()'s second argument must be a list of output names".into(),
                    })
                }
            };
            let heartbeat = args.get(2).and_then(as_literal_int).map(|s| s as u32);
            lower_call_inner(
                ctx,
                scope,
                inner,
                result_targets,
                Some(TaskIntegration::WaitForTaskToken { heartbeat_seconds: heartbeat }),
                Some(returns),
            )
        }
        CallableRef::ComputeUnitRef(def) => lower_native(
            ctx,
            scope,
            &def,
            args,
            keywords,
            result_targets,
            integration_override,
            outputs_override,
        ),
        CallableRef::ForeignRef(def) => lower_foreign(
            ctx,
            scope,
            &def,
            args,
            keywords,
            result_targets,
            integration_override,
            outputs_override,
        ),
        CallableRef::StateMachineRef(def) => {
            lower_nested_machine(ctx, scope, &def, args, keywords, result_targets)
        }
    }
}

fn lower_sleep(ctx: &mut CompilerContext, args: &[Expr]) -> CompileResult<(String, SuccessorSink)> {
    let first = args.first().ok_or_else(|| CompileError::UnsupportedSyntax {
        repr: "sleep() requires a duration argument".into(),
    })?;
    let seconds = match first {
        Expr::Literal(Literal::Int(i)) => WaitDuration::Seconds(*i as f64),
        Expr::Literal(Literal::Float(f)) => WaitDuration::Seconds(*f),
        Expr::Name(n) => WaitDuration::SecondsPath(format!("$.register.{n}")),
        other => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    };
    let id = ctx.idgen.next_id("Wait");
    ctx.arena.insert(StateNode::Wait { id: id.clone(), seconds, next: None });
    Ok((id.clone(), SuccessorSink::single(Successor::PlainNext(id))))
}

fn lower_intrinsic(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    kind: IntrinsicKind,
    args: &[Expr],
    result_targets: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    let scratch = "_scratch";
    let expr_str = match kind {
        IntrinsicKind::Len => {
            let path = match args.first() {
                Some(Expr::Name(n)) => format!("$.register.{n}"),
                other => return Err(CompileError::UnsupportedSyntax { repr: format!("{other:?}") }),
            };
            format!("States.ArrayLength({path})")
        }
        IntrinsicKind::Range => build_range_expr(args)?,
    };
    let (pass_id, pass_sink) = build_raw_pass(
        ctx,
        "Precompute",
        json!({ format!("{scratch}.$"): expr_str }),
        Some(format!("$.register.{scratch}")),
    );
    match result_targets {
        None => Ok((pass_id, pass_sink)),
        Some(targets) => {
            let target = targets.into_iter().next().ok_or_else(|| CompileError::ArityMismatch {
                expected: 1,
                actual: 0,
            })?;
            let bindings = vec![Binding::new(target, LoweredArg::Path(format!("$.register.{scratch}")))];
            let (update_id, update_sink) = build_register_update(ctx, scope, "Assign", bindings);
            pass_sink.resolve(&mut ctx.arena, &update_id);
            Ok((pass_id, update_sink))
        }
    }
}

/// `range(a, b, c)` lowers as `ArrayRange(a, MathAdd(b, -1), c)` (spec
/// §4.6.4) so the upper bound is inclusive the way the source language's
/// `range` expects.
fn build_range_expr(args: &[Expr]) -> CompileResult<String> {
    let arg_src = |e: &Expr| -> CompileResult<String> {
        match e {
            Expr::Literal(Literal::Int(i)) => Ok(i.to_string()),
            Expr::Name(n) => Ok(format!("$.register.{n}")),
            other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
        }
    };
    match args.len() {
        1 => Ok(format!("States.ArrayRange(0, States.MathAdd({}, -1), 1)", arg_src(&args[0])?)),
        2 => Ok(format!(
            "States.ArrayRange({}, States.MathAdd({}, -1), 1)",
            arg_src(&args[0])?,
            arg_src(&args[1])?
        )),
        3 => Ok(format!(
            "States.ArrayRange({}, States.MathAdd({}, -1), {})",
            arg_src(&args[0])?,
            arg_src(&args[1])?,
            arg_src(&args[2])?
        )),
        _ => Err(CompileError::UnsupportedSyntax { repr: "range() takes 1-3 arguments".into() }),
    }
}

fn lower_service_op(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    op: &templates::ServiceOperation,
    label: &str,
    args: &[Expr],
    keywords: &[(String, Expr)],
    result_targets: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    let mut positional = Vec::with_capacity(args.len());
    for a in args {
        positional.push(lower_value(a, scope)?);
    }
    let mut keyword = Vec::with_capacity(keywords.len());
    for (k, v) in keywords {
        keyword.push((k.clone(), lower_value(v, scope)?));
    }
    let bound = templates::bind_args(op, positional, keyword)?;
    let (resource, parameters, result_selector) = (op.build)(&bound);
    emit_task_with_outputs(
        ctx,
        scope,
        label,
        resource,
        parameters,
        result_selector,
        op.outputs.iter().map(|s| s.to_string()).collect(),
        TaskIntegration::Standard,
        vec![],
        vec![],
        result_targets,
    )
}

#[allow(clippy::too_many_arguments)]
fn lower_native(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    def: &ComputeUnitDef,
    args: &[Expr],
    keywords: &[(String, Expr)],
    result_targets: Option<Vec<String>>,
    integration_override: Option<TaskIntegration>,
    outputs_override: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    let param_names: Vec<String> = def
        .attrs
        .required_params
        .iter()
        .chain(def.attrs.optional_params.iter().map(|(n, _)| n))
        .cloned()
        .collect();
    let mut payload = Map::new();
    for (i, a) in args.iter().enumerate() {
        let pname = param_names.get(i).ok_or_else(|| CompileError::ArityMismatch {
            expected: param_names.len(),
            actual: args.len(),
        })?;
        lower_value(a, scope)?.put(&mut payload, pname);
    }
    for (k, v) in keywords {
        lower_value(v, scope)?.put(&mut payload, k);
    }
    payload.insert("launcher_target".to_string(), json!(def.dispatcher_key));

    let parameters = json!({ "Payload": Json::Object(payload) });
    let outputs = outputs_override.unwrap_or_else(|| def.attrs.outputs.clone());
    let result_selector = json!({
        "Payload": outputs.iter().map(|f| (format!("{f}.$"), json!(format!("$.Payload.{f}")))).collect::<Map<_, _>>()
    });
    emit_task_with_outputs(
        ctx,
        scope,
        &def.name,
        "arn:aws:states:::lambda:invoke".to_string(),
        parameters,
        Some(result_selector),
        outputs,
        integration_override.unwrap_or(TaskIntegration::Standard),
        vec![],
        vec![],
        result_targets,
    )
}

#[allow(clippy::too_many_arguments)]
fn lower_foreign(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    def: &ForeignDef,
    args: &[Expr],
    keywords: &[(String, Expr)],
    result_targets: Option<Vec<String>>,
    integration_override: Option<TaskIntegration>,
    outputs_override: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    let mut payload = Map::new();
    for (i, a) in args.iter().enumerate() {
        let pname = def.inputs.get(i).ok_or_else(|| CompileError::ArityMismatch {
            expected: def.inputs.len(),
            actual: args.len(),
        })?;
        lower_value(a, scope)?.put(&mut payload, pname);
    }
    for (k, v) in keywords {
        lower_value(v, scope)?.put(&mut payload, k);
    }
    let parameters = json!({ "Payload": Json::Object(payload) });
    let outputs = outputs_override.unwrap_or_else(|| def.outputs.clone());
    let result_selector = json!({
        "Payload": outputs.iter().map(|f| (format!("{f}.$"), json!(format!("$.Payload.{f}")))).collect::<Map<_, _>>()
    });
    emit_task_with_outputs(
        ctx,
        scope,
        &def.name,
        "arn:aws:states:::lambda:invoke".to_string(),
        parameters,
        Some(result_selector),
        outputs,
        integration_override.unwrap_or(TaskIntegration::Standard),
        vec![],
        vec![],
        result_targets,
    )
}

fn lower_nested_machine(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    def: &StateMachineRefDef,
    args: &[Expr],
    keywords: &[(String, Expr)],
    result_targets: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    let mut input = Map::new();
    for (i, a) in args.iter().enumerate() {
        lower_value(a, scope)?.put(&mut input, &format!("arg{i}"));
    }
    for (k, v) in keywords {
        lower_value(v, scope)?.put(&mut input, k);
    }
    let parameters = json!({
        "StateMachineArn": format!("${{{}StateMachineArn}}", def.name),
        "Input": Json::Object(input),
    });
    let result_selector = json!({
        "Output": def.outputs.iter().map(|f| (format!("{f}.$"), json!(format!("$.Output.{f}")))).collect::<Map<_, _>>()
    });
    emit_task_with_outputs(
        ctx,
        scope,
        &def.name,
        "arn:aws:states:::aws-sdk:sfn:startExecution".to_string(),
        parameters,
        Some(result_selector),
        def.outputs.clone(),
        TaskIntegration::StartExecutionSync,
        vec![],
        vec![],
        result_targets,
    )
}

#[allow(clippy::too_many_arguments)]
fn emit_task_with_outputs(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    label: &str,
    resource: String,
    parameters: Json,
    result_selector: Option<Json>,
    outputs: Vec<String>,
    integration: TaskIntegration,
    retry: Vec<RetryPolicy>,
    catch: Vec<CatchHandler>,
    result_targets: Option<Vec<String>>,
) -> CompileResult<(String, SuccessorSink)> {
    if let (TaskIntegration::FireAndForget, Some(_)) = (&integration, &result_targets) {
        return Err(CompileError::UnsupportedSyntax {
            repr: "event(...) discards its result; it cannot be assigned".into(),
        });
    }

    let task_id = ctx.idgen.next_id(label);
    ctx.arena.insert(StateNode::Task {
        id: task_id.clone(),
        resource,
        parameters,
        input_path: Some("$.register".to_string()),
        result_path: Some("$.register.out".to_string()),
        result_selector,
        retry,
        catch,
        integration,
        next: None,
        end: false,
    });
    let task_sink = SuccessorSink::single(Successor::PlainNext(task_id.clone()));

    match result_targets {
        None => Ok((task_id, task_sink)),
        Some(targets) => {
            if targets.len() != outputs.len() {
                return Err(CompileError::ArityMismatch {
                    expected: outputs.len(),
                    actual: targets.len(),
                });
            }
            let bindings: Vec<Binding> = targets
                .into_iter()
                .zip(outputs.iter())
                .map(|(target, field)| {
                    Binding::new(target, LoweredArg::Path(format!("$.register.out.Payload.{field}")))
                })
                .collect();
            let (update_id, update_sink) = build_register_update(ctx, scope, "Assign", bindings);
            task_sink.resolve(&mut ctx.arena, &update_id);
            Ok((task_id, update_sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FunctionAttributes;
    use crate::compiler::CompilerContext;
    use crate::ident::IdGen;
    use crate::registry::SymbolTable;
    use crate::graph::StateArena;

    fn ctx_with_symbols(symbols: SymbolTable) -> CompilerContext<'static> {
        let symbols: &'static SymbolTable = Box::leak(Box::new(symbols));
        CompilerContext {
            idgen: IdGen::new(0),
            arena: StateArena::new(),
            symbols,
            skip_pass: false,
        }
    }

    #[test]
    fn sleep_emits_a_wait_state() {
        let mut ctx = ctx_with_symbols(SymbolTable::new());
        let args = vec![Expr::Literal(Literal::Int(5))];
        let (id, _) = lower_sleep(&mut ctx, &args).unwrap();
        assert!(matches!(ctx.arena.get(&id), Some(StateNode::Wait { .. })));
    }

    #[test]
    fn native_unit_call_emits_task_then_register_update() {
        let mut symbols = SymbolTable::new();
        symbols.insert(
            "step1",
            CallableRef::ComputeUnitRef(ComputeUnitDef {
                name: "step1".into(),
                attrs: FunctionAttributes {
                    required_params: vec!["s".into()],
                    optional_params: vec![],
                    outputs: vec!["a".into(), "b".into()],
                    ..Default::default()
                },
                dispatcher_key: "step1".into(),
            }),
        );
        let mut ctx = ctx_with_symbols(symbols);
        let mut scope = ScopeStack::new();
        scope.push_root(["s".to_string()]);
        let call = Expr::Call {
            func: Box::new(Expr::Name("step1".into())),
            args: vec![Expr::Name("s".into())],
            keywords: vec![],
        };
        let (task_id, sink) = lower_call_expr(&mut ctx, &mut scope, &call, Some(vec!["x".into(), "y".into()])).unwrap();
        assert!(matches!(ctx.arena.get(&task_id), Some(StateNode::Task { .. })));
        assert!(!sink.is_empty());
        assert!(scope.is_defined("x"));
        assert!(scope.is_defined("y"));
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut symbols = SymbolTable::new();
        symbols.insert(
            "step1",
            CallableRef::ComputeUnitRef(ComputeUnitDef {
                name: "step1".into(),
                attrs: FunctionAttributes {
                    required_params: vec![],
                    optional_params: vec![],
                    outputs: vec!["a".into()],
                    ..Default::default()
                },
                dispatcher_key: "step1".into(),
            }),
        );
        let mut ctx = ctx_with_symbols(symbols);
        let mut scope = ScopeStack::new();
        scope.push_root(Vec::<String>::new());
        let call = Expr::Call {
            func: Box::new(Expr::Name("step1".into())),
            args: vec![],
            keywords: vec![],
        };
        let err = lower_call_expr(&mut ctx, &mut scope, &call, Some(vec!["x".into(), "y".into()])).unwrap_err();
        assert_eq!(err, CompileError::ArityMismatch { expected: 1, actual: 2 });
    }
}
