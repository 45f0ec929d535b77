//! Control-flow lowering (spec §4.6.1 step 2, §4.6.3's control rows,
//! §4.6.5, §4.6.6): everything that pushes a child/Map scope or wires
//! more than one dangling successor into place.

use std::collections::{BTreeMap, HashSet};
use std::mem;

use serde_json::{json, Map as JsonMap, Value as Json};

use super::call;
use super::register::{self, Binding};
use super::scope::ScopeStack;
use super::stmt;
use super::CompilerContext;
use crate::ast::{Expr, ExceptHandler, Literal, Stmt};
use crate::condition;
use crate::error::{CompileError, CompileResult};
use crate::graph::{CatchHandler, ChoiceBranch, RetryPolicy, StateArena, StateNode, Successor, SuccessorSink};
use crate::value::{self, LoweredArg};

/// `Choice(is-not-present) -> Pass(assign default)` pair for one
/// optional parameter (spec §4.6.1 step 2). Both the Choice's default
/// branch and the Pass's own successor are left dangling, and must
/// converge on the same next target.
pub fn lower_default_parameter(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    name: &str,
    default: &Literal,
) -> (String, SuccessorSink) {
    let path = format!("$.register.{name}");
    let bindings = vec![Binding::new(name.to_string(), LoweredArg::Literal(value::literal_to_json(default)))];
    let (pass_id, pass_sink) = register::build_register_update(ctx, scope, &format!("Default {name}"), bindings);

    let choice_id = ctx.idgen.next_id(&format!("HasDefault {name}"));
    ctx.arena.insert(StateNode::Choice {
        id: choice_id.clone(),
        branches: vec![ChoiceBranch {
            condition: json!({ "Variable": path, "IsPresent": false }),
            label: format!("{name} is missing"),
            next: Some(pass_id),
        }],
        default: None,
    });

    let dangling = SuccessorSink::single(Successor::ChoiceDefault(choice_id.clone())).merge(pass_sink);
    (choice_id, dangling)
}

/// `if test: body else: orelse` (spec §4.6.3): a Choice with one branch
/// on `test`, each arm compiled in its own child scope (spec §3 "Child
/// scope" — inherits by value). A name first assigned in only one arm
/// is folded back into the enclosing scope as known once both arms
/// close, so later statements may still reference it (P6: it may simply
/// be absent from the register on the untaken path).
pub fn lower_if(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    outputs: &[String],
    test: &Expr,
    body: &[Stmt],
    orelse: &[Stmt],
) -> CompileResult<(String, SuccessorSink)> {
    // spec §4.2: narrow the truthiness test when the tested name still
    // carries a declared parameter type in this scope.
    let declared = match test {
        Expr::Name(n) => scope.declared_type(n),
        _ => None,
    };
    let (condition, label) = condition::build_condition(test, declared)?;

    scope.push_child();
    let then = stmt::lower_stmts(ctx, scope, outputs, body)?;
    let then_scope = scope.pop();

    scope.push_child();
    let els = stmt::lower_stmts(ctx, scope, outputs, orelse)?;
    let else_scope = scope.pop();

    // A name first assigned on only one arm is still a legal reference
    // afterward (the host language resolves names at function scope);
    // it just may be missing from the register on the untaken path
    // (spec P6). Merge both arms' brand-new names back in as known,
    // without touching the register itself.
    for name in then_scope.new_locals().into_iter().chain(else_scope.new_locals()) {
        scope.record_write(&name);
    }

    let choice_id = ctx.idgen.next_id("If");
    ctx.arena.insert(StateNode::Choice {
        id: choice_id.clone(),
        branches: vec![ChoiceBranch { condition, label, next: then.as_ref().map(|(id, _)| id.clone()) }],
        default: els.as_ref().map(|(id, _)| id.clone()),
    });

    let mut tail = match then {
        Some((_, sink)) => sink,
        None => SuccessorSink::single(Successor::ChoiceBranch(choice_id.clone(), 0)),
    };
    tail = tail.merge(match els {
        Some((_, sink)) => sink,
        None => SuccessorSink::single(Successor::ChoiceDefault(choice_id.clone())),
    });

    Ok((choice_id, tail))
}

fn concurrent_callee(expr: &Expr) -> Option<(&Expr, Option<&Expr>)> {
    match expr {
        Expr::Call { func, args, .. } => match func.as_ref() {
            Expr::Name(n) if n == "concurrent" => Some((args.first()?, args.get(1))),
            _ => None,
        },
        _ => None,
    }
}

/// Resolves a plain (non-`concurrent`-wrapped) iteration source: a bare
/// name, or a call whose result becomes the source (spec §4.6.5 step 1).
fn resolve_plain_iterator(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    expr: &Expr,
) -> CompileResult<(Option<(String, SuccessorSink)>, String)> {
    match expr {
        Expr::Name(n) => {
            if !scope.is_defined(n) {
                return Err(CompileError::UndefinedVariable { name: n.clone() });
            }
            Ok((None, format!("$.register.{n}")))
        }
        Expr::Call { .. } => {
            let (id, sink) = call::lower_call_expr(ctx, scope, expr, Some(vec!["_iterSrc".to_string()]))?;
            Ok((Some((id, sink)), "$.register._iterSrc".to_string()))
        }
        other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    }
}

/// Resolves the full iterator clause, unwrapping `concurrent(inner, N)`
/// when present. Missing `N` on a `concurrent(...)` wrapper resolves as
/// unbounded (0); no wrapper at all defaults to strictly sequential (1)
/// (spec §4.6.5 step 2 "default 1"; SPEC_FULL §D).
fn resolve_iterator(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    iter: &Expr,
) -> CompileResult<(Option<(String, SuccessorSink)>, String, u32)> {
    if let Some((inner, n)) = concurrent_callee(iter) {
        let max_concurrency = match n {
            None => 0,
            Some(Expr::Literal(Literal::Int(i))) => *i as u32,
            Some(other) => return Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
        };
        let (pre, path) = resolve_plain_iterator(ctx, scope, inner)?;
        Ok((pre, path, max_concurrency))
    } else {
        let (pre, path) = resolve_plain_iterator(ctx, scope, iter)?;
        Ok((pre, path, 1))
    }
}

/// Marks a just-emitted Pass as the iterator body's terminal (Map
/// requires every iteration to end cleanly, spec §4.6.5 step 5).
fn mark_terminal(ctx: &mut CompilerContext, id: &str) {
    if let Some(StateNode::Pass { end, .. }) = ctx.arena.get_mut(id) {
        *end = true;
    }
}

/// `for target in iter: body` (spec §4.6.5).
pub fn lower_for(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    outputs: &[String],
    target: &str,
    iter: &Expr,
    body: &[Stmt],
) -> CompileResult<(String, SuccessorSink)> {
    let (pre, items_path, max_concurrency) = resolve_iterator(ctx, scope, iter)?;

    let mut map_params = JsonMap::new();
    for name in scope.visible_vars() {
        map_params.insert(format!("{name}.$"), json!(format!("$.register.{name}")));
    }
    map_params.insert(format!("{target}.$"), json!("$$.Map.Item.Value"));

    scope.push_map(target);
    let outer_arena = mem::replace(&mut ctx.arena, StateArena::new());

    let entry_id = ctx.idgen.next_id("IterEntry");
    ctx.arena.insert(StateNode::Pass {
        id: entry_id.clone(),
        parameters: None,
        result_path: Some("$.register".to_string()),
        next: None,
        end: false,
    });
    let mut tail = SuccessorSink::single(Successor::PlainNext(entry_id.clone()));

    if let Some((body_entry, body_tail)) = stmt::lower_stmts(ctx, scope, outputs, body)? {
        tail.resolve(&mut ctx.arena, &body_entry);
        tail = body_tail;
    }

    let mutated_outer = scope.mutated_outer_vars();

    let terminal_params = if mutated_outer.is_empty() {
        json!({})
    } else {
        let mut proj = JsonMap::new();
        for v in &mutated_outer {
            proj.insert(format!("{v}.$"), json!(format!("$.register.{v}")));
        }
        Json::Object(proj)
    };
    let (end_id, _) = register::build_raw_pass(ctx, "IterEnd", terminal_params, None);
    mark_terminal(ctx, &end_id);
    tail.resolve(&mut ctx.arena, &end_id);

    scope.pop();
    let inner_arena = mem::replace(&mut ctx.arena, outer_arena);
    let iterator_states: BTreeMap<String, StateNode> = inner_arena.states.into_iter().collect();

    let map_id = ctx.idgen.next_id("Loop");
    ctx.arena.insert(StateNode::Map {
        id: map_id.clone(),
        items_path,
        max_concurrency,
        parameters: Json::Object(map_params),
        result_path: "$.register.loopResult".to_string(),
        iterator_start_at: entry_id,
        iterator_states,
        retry: vec![],
        catch: vec![],
        next: None,
        end: false,
    });
    let map_sink = SuccessorSink::single(Successor::PlainNext(map_id.clone()));

    let final_tail = if mutated_outer.is_empty() {
        map_sink
    } else {
        let bindings: Vec<Binding> = mutated_outer
            .iter()
            .map(|v| Binding::new(v.clone(), LoweredArg::Path(format!("$.register.loopResult[*].{v}[*]"))))
            .collect();
        let (consolidate_id, consolidate_sink) = register::build_register_update(ctx, scope, "Consolidate", bindings);
        map_sink.resolve(&mut ctx.arena, &consolidate_id);
        consolidate_sink
    };

    let overall_entry = match &pre {
        Some((id, _)) => id.clone(),
        None => map_id.clone(),
    };
    if let Some((_, pre_sink)) = pre {
        pre_sink.resolve(&mut ctx.arena, &map_id);
    }

    Ok((overall_entry, final_tail))
}

/// `[elt for target in iter]` (spec §4.6.3/§4.6.5): the same Map
/// mechanism as `for`, with the comprehension's element expression as
/// the sole per-iteration output and the result flattened straight into
/// the assignment target (no outer-variable consolidation involved).
pub fn lower_list_comp(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    assign_name: &str,
    elt: &Expr,
    target: &str,
    iter: &Expr,
) -> CompileResult<(String, SuccessorSink)> {
    let (pre, items_path, max_concurrency) = resolve_iterator(ctx, scope, iter)?;

    let mut map_params = JsonMap::new();
    for name in scope.visible_vars() {
        map_params.insert(format!("{name}.$"), json!(format!("$.register.{name}")));
    }
    map_params.insert(format!("{target}.$"), json!("$$.Map.Item.Value"));

    scope.push_map(target);
    let outer_arena = mem::replace(&mut ctx.arena, StateArena::new());

    let entry_id = ctx.idgen.next_id("IterEntry");
    ctx.arena.insert(StateNode::Pass {
        id: entry_id.clone(),
        parameters: None,
        result_path: Some("$.register".to_string()),
        next: None,
        end: false,
    });

    let (elt_entry, elt_tail) = match elt {
        Expr::Call { .. } => call::lower_call_expr(ctx, scope, elt, Some(vec!["_item".to_string()]))?,
        _ => {
            let lowered = value::lower_value(elt, scope)?;
            register::build_register_update(ctx, scope, "Elt", vec![Binding::new("_item".to_string(), lowered)])
        }
    };
    SuccessorSink::single(Successor::PlainNext(entry_id.clone())).resolve(&mut ctx.arena, &elt_entry);

    let mut proj = JsonMap::new();
    proj.insert("_item.$".to_string(), json!("$.register._item"));
    let (end_id, _) = register::build_raw_pass(ctx, "IterEnd", Json::Object(proj), None);
    mark_terminal(ctx, &end_id);
    elt_tail.resolve(&mut ctx.arena, &end_id);

    scope.pop();
    let inner_arena = mem::replace(&mut ctx.arena, outer_arena);
    let iterator_states: BTreeMap<String, StateNode> = inner_arena.states.into_iter().collect();

    let map_id = ctx.idgen.next_id("Loop");
    ctx.arena.insert(StateNode::Map {
        id: map_id.clone(),
        items_path,
        max_concurrency,
        parameters: Json::Object(map_params),
        result_path: "$.register.loopResult".to_string(),
        iterator_start_at: entry_id,
        iterator_states,
        retry: vec![],
        catch: vec![],
        next: None,
        end: false,
    });
    let map_sink = SuccessorSink::single(Successor::PlainNext(map_id.clone()));

    let bindings = vec![Binding::new(assign_name.to_string(), LoweredArg::Path("$.register.loopResult[*]._item".to_string()))];
    let (consolidate_id, consolidate_sink) = register::build_register_update(ctx, scope, "Collect", bindings);
    map_sink.resolve(&mut ctx.arena, &consolidate_id);

    let overall_entry = match &pre {
        Some((id, _)) => id.clone(),
        None => map_id.clone(),
    };
    if let Some((_, pre_sink)) = pre {
        pre_sink.resolve(&mut ctx.arena, &map_id);
    }

    Ok((overall_entry, consolidate_sink))
}

fn as_u32(e: &Expr) -> CompileResult<u32> {
    match e {
        Expr::Literal(Literal::Int(i)) => Ok(*i as u32),
        other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    }
}

fn as_f64(e: &Expr) -> CompileResult<f64> {
    match e {
        Expr::Literal(Literal::Float(f)) => Ok(*f),
        Expr::Literal(Literal::Int(i)) => Ok(*i as f64),
        other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
    }
}

/// Parses the single `Retry(['Error'], interval_seconds=.., max_attempts=..,
/// backoff_rate=..)` with-item. Defaults match the ASL service defaults
/// (IntervalSeconds 1, MaxAttempts 3, BackoffRate 2.0).
fn parse_retry(expr: &Expr) -> CompileResult<RetryPolicy> {
    let (func, args, keywords) = match expr {
        Expr::Call { func, args, keywords } => (func, args, keywords),
        other => {
            return Err(CompileError::WithScopeMisuse {
                reason: format!("with-item must be a Retry(...) call, got `{}`", other.repr()),
            })
        }
    };
    match func.as_ref() {
        Expr::Name(n) if n == "Retry" => {}
        other => {
            return Err(CompileError::WithScopeMisuse {
                reason: format!("with-item must be a Retry(...) call, got `{}`", other.repr()),
            })
        }
    }
    let errors = match args.first() {
        Some(Expr::List(items)) => items
            .iter()
            .map(|e| match e {
                Expr::Literal(Literal::Str(s)) => Ok(s.clone()),
                other => Err(CompileError::UnsupportedSyntax { repr: other.repr() }),
            })
            .collect::<CompileResult<Vec<_>>>()?,
        _ => {
            return Err(CompileError::WithScopeMisuse {
                reason: "Retry(...) requires a list of error selectors as its first argument".into(),
            })
        }
    };

    let mut interval_seconds = 1u32;
    let mut max_attempts = 3u32;
    let mut backoff_rate = 2.0f64;
    for (k, v) in keywords {
        match k.as_str() {
            "interval_seconds" => interval_seconds = as_u32(v)?,
            "max_attempts" => max_attempts = as_u32(v)?,
            "backoff_rate" => backoff_rate = as_f64(v)?,
            other => {
                return Err(CompileError::UnsupportedSyntax {
                    repr: format!("unknown Retry() keyword `{other}`"),
                })
            }
        }
    }

    Ok(RetryPolicy { errors, interval_seconds, max_attempts, backoff_rate })
}

/// `with Retry(...): body` (spec §4.6.3): compiles the body with no new
/// scope pushed, then attaches the parsed policy to every Task/Map state
/// the body just emitted.
pub fn lower_with(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    outputs: &[String],
    retry_call: &Expr,
    body: &[Stmt],
) -> CompileResult<(String, SuccessorSink)> {
    let retry = parse_retry(retry_call)?;

    let before: HashSet<String> = ctx.arena.states.keys().cloned().collect();
    let (entry, tail) = stmt::lower_stmts(ctx, scope, outputs, body)?.ok_or_else(|| CompileError::WithScopeMisuse {
        reason: "with Retry(...) body must contain at least one statement".into(),
    })?;

    let newly_emitted: Vec<String> = ctx.arena.states.keys().filter(|id| !before.contains(id.as_str())).cloned().collect();
    for id in newly_emitted {
        match ctx.arena.get_mut(&id) {
            Some(StateNode::Task { retry: r, .. }) => r.push(retry.clone()),
            Some(StateNode::Map { retry: r, .. }) => r.push(retry.clone()),
            _ => {}
        }
    }

    Ok((entry, tail))
}

/// `try: body except Exception [as e]: handler` (spec §4.6.6).
pub fn lower_try(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    outputs: &[String],
    body: &[Stmt],
    handlers: &[ExceptHandler],
) -> CompileResult<(String, SuccessorSink)> {
    scope.push_child();
    let before: HashSet<String> = ctx.arena.states.keys().cloned().collect();
    let body_result = stmt::lower_stmts(ctx, scope, outputs, body)?;
    scope.pop();
    let (body_entry, body_tail) = body_result.ok_or_else(|| CompileError::WithScopeMisuse {
        reason: "try body must contain at least one statement".into(),
    })?;

    let catchable_ids: Vec<String> = ctx
        .arena
        .states
        .iter()
        .filter(|(id, _)| !before.contains(id.as_str()))
        .filter_map(|(id, node)| matches!(node, StateNode::Task { .. } | StateNode::Map { .. }).then(|| id.clone()))
        .collect();

    let mut overall_tail = body_tail;
    for handler in handlers {
        scope.push_child();
        let result_path = match &handler.bound_name {
            Some(name) => {
                scope.record_write(name);
                format!("$.register.{name}")
            }
            None => "$.register._error".to_string(),
        };
        let handler_result = stmt::lower_stmts(ctx, scope, outputs, &handler.body)?;
        scope.pop();

        let handler_entry = match handler_result {
            Some((entry, tail)) => {
                overall_tail = overall_tail.merge(tail);
                entry
            }
            None => {
                let (id, sink) = register::build_raw_pass(ctx, "Handler", json!({}), None);
                overall_tail = overall_tail.merge(sink);
                id
            }
        };

        for task_id in &catchable_ids {
            let handler_entry = handler_entry.clone();
            let result_path = result_path.clone();
            match ctx.arena.get_mut(task_id) {
                Some(StateNode::Task { catch, .. }) => {
                    catch.push(CatchHandler { errors: vec!["States.ALL".to_string()], next: Some(handler_entry), result_path })
                }
                Some(StateNode::Map { catch, .. }) => {
                    catch.push(CatchHandler { errors: vec!["States.ALL".to_string()], next: Some(handler_entry), result_path })
                }
                _ => {}
            }
        }
    }

    Ok((body_entry, overall_tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StateNode;
    use crate::registry::SymbolTable;
    use crate::ident::IdGen;

    fn ctx() -> CompilerContext<'static> {
        let symbols: &'static SymbolTable = Box::leak(Box::new(SymbolTable::new()));
        CompilerContext { idgen: IdGen::new(0), arena: StateArena::new(), symbols, skip_pass: false }
    }

    fn scope_with(vars: &[&str]) -> ScopeStack {
        let mut s = ScopeStack::new();
        s.push_root(vars.iter().map(|v| v.to_string()));
        s
    }

    #[test]
    fn default_parameter_pair_converges_on_same_target() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["limit"]);
        let (choice_id, sink) = lower_default_parameter(&mut ctx, &mut scope, "limit", &Literal::Int(10));
        assert!(matches!(ctx.arena.get(&choice_id), Some(StateNode::Choice { .. })));
        assert_eq!(sink.0.len(), 2);
    }

    #[test]
    fn if_without_else_leaves_choice_default_dangling() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["flag", "s"]);
        let test = Expr::Name("flag".into());
        let body = vec![Stmt::Assign { target: Expr::Name("s".into()), value: Expr::Literal(Literal::Str("x".into())) }];
        let (choice_id, tail) = lower_if(&mut ctx, &mut scope, &[], &test, &body, &[]).unwrap();
        assert!(matches!(ctx.arena.get(&choice_id), Some(StateNode::Choice { .. })));
        assert_eq!(tail.0.len(), 2);
    }

    #[test]
    fn for_loop_builds_a_map_with_nested_iterator_states() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["items"]);
        let body = vec![Stmt::Pass];
        let (entry, _) = lower_for(&mut ctx, &mut scope, &[], "v", &Expr::Name("items".into()), &body).unwrap();
        match ctx.arena.get(&entry) {
            Some(StateNode::Map { iterator_states, max_concurrency, .. }) => {
                assert_eq!(*max_concurrency, 1);
                assert!(!iterator_states.is_empty());
            }
            other => panic!("expected Map state, got {other:?}"),
        }
        assert!(!scope.is_defined("v"));
    }

    #[test]
    fn concurrent_without_n_is_unbounded() {
        let mut ctx = ctx();
        let mut scope = scope_with(&["items"]);
        let iter = Expr::Call {
            func: Box::new(Expr::Name("concurrent".into())),
            args: vec![Expr::Name("items".into())],
            keywords: vec![],
        };
        let (entry, _) = lower_for(&mut ctx, &mut scope, &[], "v", &iter, &[Stmt::Pass]).unwrap();
        match ctx.arena.get(&entry) {
            Some(StateNode::Map { max_concurrency, .. }) => assert_eq!(*max_concurrency, 0),
            other => panic!("expected Map state, got {other:?}"),
        }
    }

    #[test]
    fn with_retry_attaches_policy_to_the_emitted_task() {
        let mut symbols = SymbolTable::new();
        symbols.insert(
            "step1",
            crate::registry::CallableRef::ComputeUnitRef(crate::registry::ComputeUnitDef {
                name: "step1".into(),
                attrs: crate::attributes::FunctionAttributes {
                    required_params: vec![],
                    optional_params: vec![],
                    outputs: vec!["a".into()],
                    ..Default::default()
                },
                dispatcher_key: "step1".into(),
            }),
        );
        let symbols: &'static SymbolTable = Box::leak(Box::new(symbols));
        let mut ctx = CompilerContext { idgen: IdGen::new(0), arena: StateArena::new(), symbols, skip_pass: false };
        let mut scope = ScopeStack::new();
        scope.push_root(Vec::<String>::new());

        let retry_call = Expr::Call {
            func: Box::new(Expr::Name("Retry".into())),
            args: vec![Expr::List(vec![Expr::Literal(Literal::Str("States.ALL".into()))])],
            keywords: vec![("max_attempts".to_string(), Expr::Literal(Literal::Int(5)))],
        };
        let body = vec![Stmt::Expr(Expr::Call {
            func: Box::new(Expr::Name("step1".into())),
            args: vec![],
            keywords: vec![],
        })];
        let (_, _) = lower_with(&mut ctx, &mut scope, &[], &retry_call, &body).unwrap();
        let task = ctx.arena.states.values().find(|n| matches!(n, StateNode::Task { .. })).unwrap();
        match task {
            StateNode::Task { retry, .. } => {
                assert_eq!(retry.len(), 1);
                assert_eq!(retry[0].max_attempts, 5);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn try_except_attaches_catch_to_body_task() {
        let mut symbols = SymbolTable::new();
        symbols.insert(
            "step1",
            crate::registry::CallableRef::ComputeUnitRef(crate::registry::ComputeUnitDef {
                name: "step1".into(),
                attrs: crate::attributes::FunctionAttributes {
                    required_params: vec![],
                    optional_params: vec![],
                    outputs: vec!["a".into()],
                    ..Default::default()
                },
                dispatcher_key: "step1".into(),
            }),
        );
        let symbols: &'static SymbolTable = Box::leak(Box::new(symbols));
        let mut ctx = CompilerContext { idgen: IdGen::new(0), arena: StateArena::new(), symbols, skip_pass: false };
        let mut scope = ScopeStack::new();
        scope.push_root(Vec::<String>::new());

        let body = vec![Stmt::Expr(Expr::Call {
            func: Box::new(Expr::Name("step1".into())),
            args: vec![],
            keywords: vec![],
        })];
        let handlers = vec![ExceptHandler { type_name: Some("Exception".into()), bound_name: None, body: vec![Stmt::Pass] }];
        let (_, tail) = lower_try(&mut ctx, &mut scope, &[], &body, &handlers).unwrap();
        assert!(!tail.is_empty());
        let task = ctx.arena.states.values().find(|n| matches!(n, StateNode::Task { .. })).unwrap();
        match task {
            StateNode::Task { catch, .. } => assert_eq!(catch.len(), 1),
            _ => unreachable!(),
        }
    }
}
