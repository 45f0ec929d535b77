//! Compiler core (spec §4.6): the statement-by-statement AST lowering
//! driven by a scope stack and an explicit [`CompilerContext`] (spec §9
//! "global mutable state" — the machine-index counter and the registry
//! live here, not behind a hidden global).

pub mod call;
pub mod control;
pub mod register;
pub mod scope;
pub mod stmt;

use crate::ast::ParsedFunction;
use crate::attributes::FunctionAttributes;
use crate::error::CompileResult;
use crate::graph::StateArena;
use crate::ident::IdGen;
use crate::registry::SymbolTable;
use scope::ScopeStack;

/// Threaded through every lowering call: the per-machine ID allocator,
/// the arena being built, the caller's symbol table, and the `pass`
/// compile option (spec §6 "skip_pass"). Swapped out for a fresh arena
/// while compiling a Map iterator's body (see [`control::lower_for`]) so
/// the iterator's states never leak into the parent machine's arena.
pub struct CompilerContext<'a> {
    pub idgen: IdGen,
    pub arena: StateArena,
    pub symbols: &'a SymbolTable,
    pub skip_pass: bool,
}

/// The result of compiling one function: the arena of emitted states
/// plus the id of the entry state (spec §4.6.1 step 4).
pub struct CompiledMachine {
    pub start_at: String,
    pub arena: StateArena,
}

/// Compiles one parsed orchestrator function into a state-machine arena
/// (spec §4.6.1).
pub fn compile_function(
    parsed: &ParsedFunction,
    attrs: &FunctionAttributes,
    symbols: &SymbolTable,
    skip_pass: bool,
) -> CompileResult<CompiledMachine> {
    let machine_index = crate::ident::next_machine_index();
    let mut ctx = CompilerContext {
        idgen: IdGen::new(machine_index),
        arena: StateArena::new(),
        symbols,
        skip_pass,
    };

    let mut scope = ScopeStack::new();
    let initial_vars: Vec<String> = attrs
        .required_params
        .iter()
        .cloned()
        .chain(attrs.optional_params.iter().map(|(n, _)| n.clone()))
        .collect();
    let initial_types = attrs.param_types.iter().map(|(n, t)| (n.clone(), *t)).collect();
    scope.push_root_typed(initial_vars, initial_types);

    // Step 1: copy the entire input object into $.register. ASL leaves a
    // Pass's output as the (filtered) input when Parameters is absent,
    // so an empty `parameters` with `result_path = $.register` is
    // exactly "copy the whole input in" (no new StateNode field needed).
    let entry_id = ctx.idgen.next_id("Entry");
    ctx.arena.insert(crate::graph::StateNode::Pass {
        id: entry_id.clone(),
        parameters: None,
        result_path: Some("$.register".to_string()),
        next: None,
        end: false,
    });
    let mut tail = crate::graph::SuccessorSink::single(crate::graph::Successor::PlainNext(entry_id.clone()));

    // Step 2: one Choice(is-not-present) -> Pass(assign default) pair per
    // optional parameter, in declaration order.
    for (name, default) in &attrs.optional_params {
        let (choice_id, default_sink) = control::lower_default_parameter(&mut ctx, &mut scope, name, default);
        tail.resolve(&mut ctx.arena, &choice_id);
        tail = default_sink;
    }

    // Step 3: lower the body.
    tracing::info!(function = %parsed.name, statements = parsed.body.len(), "lowering function body");
    if let Some((body_entry, body_tail)) = stmt::lower_stmts(&mut ctx, &mut scope, &attrs.outputs, &parsed.body)? {
        tail.resolve(&mut ctx.arena, &body_entry);
        tail = body_tail;
    }

    // A body that never reaches a `return` still needs a terminal; close
    // any still-dangling successors with a trivial Pass (unless the
    // compile option says to elide it and there is nothing to close).
    if !tail.is_empty() {
        let (end_id, _) = register::build_raw_pass(&mut ctx, "End", serde_json::json!({}), None);
        if let Some(crate::graph::StateNode::Pass { end, .. }) = ctx.arena.get_mut(&end_id) {
            *end = true;
        }
        tail.resolve(&mut ctx.arena, &end_id);
    }

    Ok(CompiledMachine { start_at: entry_id, arena: ctx.arena })
}

/// End-to-end scenarios from spec §8 (S1, S4, S5): a full
/// `collect_attributes` -> `compile_function` pass against registered
/// compute units, asserting the structural properties those scenarios
/// name rather than exercising one lowering function in isolation.
#[cfg(test)]
mod end_to_end_tests {
    use super::*;
    use crate::attributes::collect_attributes;
    use crate::graph::{StateNode, TaskIntegration};
    use crate::registry::{CallableRef, ComputeUnitDef, SymbolTable};

    fn unit(symbols: &mut SymbolTable, name: &str, params: &[&str], outputs: &[&str]) {
        let attrs = FunctionAttributes {
            required_params: params.iter().map(|s| s.to_string()).collect(),
            optional_params: vec![],
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        symbols.insert(
            name,
            CallableRef::ComputeUnitRef(ComputeUnitDef { name: name.to_string(), attrs, dispatcher_key: name.to_string() }),
        );
    }

    #[test]
    fn s1_simple_conditional_emits_one_choice_and_a_seven_field_return() {
        let src = "def simple_conditional(s, lst, opt=False) -> (mode, code, secs, a, uri, ct, opt2):\n    \
                    (a, mode, opt2, secs, code, ct) = step1(s, opt)\n    \
                    if a:\n        \
                    (a, lst, uri) = step2(s, lst)\n    \
                    return (mode, code, secs, a, uri, None, opt2)\n";
        let mut symbols = SymbolTable::new();
        unit(&mut symbols, "step1", &["s", "opt"], &["a", "mode", "opt2", "secs", "code", "ct"]);
        unit(&mut symbols, "step2", &["s", "lst"], &["a", "lst", "uri"]);

        let (parsed, attrs) = collect_attributes(src, None).unwrap();
        let compiled = compile_function(&parsed, &attrs, &symbols, false).unwrap();

        let choices: Vec<_> = compiled.arena.states.values().filter(|n| matches!(n, StateNode::Choice { .. })).collect();
        assert_eq!(choices.len(), 1, "expected exactly one Choice on $.register.a");
        match choices[0] {
            StateNode::Choice { branches, default, .. } => {
                assert_eq!(branches.len(), 1);
                assert!(default.is_some(), "P1: every Choice needs a default branch");
            }
            _ => unreachable!(),
        }

        let tasks: Vec<_> = compiled.arena.states.values().filter(|n| matches!(n, StateNode::Task { .. })).collect();
        assert_eq!(tasks.len(), 2, "step1 is unconditional, step2 only on the true arm");

        let terminal = compiled
            .arena
            .states
            .values()
            .find(|n| matches!(n, StateNode::Pass { end: true, .. }))
            .expect("a terminal return Pass");
        match terminal {
            StateNode::Pass { parameters: Some(serde_json::Value::Object(map)), .. } => {
                assert_eq!(map.len(), 7, "P5: 7 declared outputs");
            }
            other => panic!("expected a parameterized terminal Pass, got {other:?}"),
        }

        for id in compiled.arena.reachable_from(&compiled.start_at) {
            assert!(compiled.arena.get(&id).is_some(), "P1: every reachable id resolves to a real state");
        }
    }

    #[test]
    fn s4_bounded_concurrency_loop_builds_a_map_and_consolidates_results() {
        let src = "def bounded_concurrency_loop(uri, n) -> (results,):\n    \
                    results = []\n    \
                    for v in concurrent(step10(uri, n), 3):\n        \
                    step11(v)\n        \
                    results.append(step12(v))\n    \
                    return (results,)\n";
        let mut symbols = SymbolTable::new();
        unit(&mut symbols, "step10", &["uri", "n"], &["items"]);
        unit(&mut symbols, "step11", &["v"], &["ack"]);
        unit(&mut symbols, "step12", &["v"], &["item"]);

        let (parsed, attrs) = collect_attributes(src, None).unwrap();
        let compiled = compile_function(&parsed, &attrs, &symbols, false).unwrap();

        let map = compiled
            .arena
            .states
            .values()
            .find_map(|n| match n {
                StateNode::Map { max_concurrency, iterator_states, .. } => Some((*max_concurrency, iterator_states)),
                _ => None,
            })
            .expect("a Map state for the concurrent loop");
        assert_eq!(map.0, 3);
        assert!(!map.1.is_empty());

        let consolidates_results = compiled.arena.states.values().any(|n| match n {
            StateNode::Pass { parameters: Some(serde_json::Value::Object(p)), .. } => p
                .get("results.$")
                .and_then(|v| v.as_str())
                .is_some_and(|p| p == "$.register.loopResult[*].results[*]"),
            _ => false,
        });
        assert!(consolidates_results, "expected a consolidation Pass projecting results from loopResult");
    }

    #[test]
    fn s5_callback_with_heartbeat_uses_wait_for_task_token_and_overridden_outputs() {
        let src = "def callback_with_heartbeat(s, token) -> (result,):\n    \
                    r = await_token(delayed(s, token, 20, 5), ['result'], 30)\n    \
                    return (r,)\n";
        let mut symbols = SymbolTable::new();
        unit(&mut symbols, "delayed", &["s", "token", "heartbeat", "wait"], &["result", "extra"]);

        let (parsed, attrs) = collect_attributes(src, None).unwrap();
        let compiled = compile_function(&parsed, &attrs, &symbols, false).unwrap();

        let task = compiled
            .arena
            .states
            .values()
            .find(|n| matches!(n, StateNode::Task { .. }))
            .expect("a Task for the delayed() call");
        match task {
            StateNode::Task { integration, result_selector, .. } => {
                match integration {
                    TaskIntegration::WaitForTaskToken { heartbeat_seconds } => {
                        assert_eq!(*heartbeat_seconds, Some(30));
                    }
                    other => panic!("expected WaitForTaskToken, got {other:?}"),
                }
                let selector = result_selector.as_ref().unwrap();
                let payload = selector.get("Payload").and_then(|v| v.as_object()).unwrap();
                assert_eq!(payload.len(), 1, "output schema rewritten to the single declared return name");
                assert!(payload.contains_key("result.$"));
            }
            _ => unreachable!(),
        }

        let terminal = compiled.arena.states.values().find(|n| matches!(n, StateNode::Pass { end: true, .. }));
        assert!(terminal.is_some());
    }
}
