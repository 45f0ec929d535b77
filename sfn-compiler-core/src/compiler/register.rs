//! Register assignment (spec §4.6.2) — the compiler's central
//! primitive: "emit a Pass that updates the register with these
//! new/overwritten bindings".

use serde_json::{json, Map, Value as Json};

use super::scope::ScopeStack;
use super::CompilerContext;
use crate::graph::{StateNode, Successor, SuccessorSink};
use crate::value::LoweredArg;

pub struct Binding {
    pub name: String,
    pub value: LoweredArg,
}

impl Binding {
    pub fn new(name: impl Into<String>, value: LoweredArg) -> Self {
        Binding { name: name.into(), value }
    }
}

/// Builds a Pass whose `Parameters` carry forward every variable
/// currently visible in `scope` untouched (`name.$: $.register.name`)
/// except for the names in `bindings`, which are written instead —
/// literal or `.$`-suffixed path, per [`LoweredArg`]. `ResultPath` is
/// always `$.register`, so the Parameters object becomes the machine's
/// entire new register (spec: "every not-named-in-this-binding variable
/// known to the current scope is carried forward").
///
/// Each binding also updates `scope` bookkeeping (new name vs.
/// overwrite-of-outer, the latter feeding Map-scope consolidation).
pub fn build_register_update(
    ctx: &mut CompilerContext,
    scope: &mut ScopeStack,
    label: &str,
    bindings: Vec<Binding>,
) -> (String, SuccessorSink) {
    let bound_names: std::collections::HashSet<&str> =
        bindings.iter().map(|b| b.name.as_str()).collect();

    let mut params = Map::new();
    for name in scope.visible_vars() {
        if !bound_names.contains(name.as_str()) {
            params.insert(format!("{name}.$"), json!(format!("$.register.{name}")));
        }
    }
    for b in &bindings {
        b.value.put(&mut params, &b.name);
    }
    for b in bindings {
        scope.record_write(&b.name);
    }

    let id = ctx.idgen.next_id(label);
    ctx.arena.insert(StateNode::Pass {
        id: id.clone(),
        parameters: Some(Json::Object(params)),
        result_path: Some("$.register".to_string()),
        next: None,
        end: false,
    });
    (id.clone(), SuccessorSink::single(Successor::PlainNext(id)))
}

/// A Pass with caller-supplied `Parameters`/`ResultPath`, bypassing the
/// carry-forward convention — used for scratch-slot computations (the
/// subscript-merge and list-append primitives, and Map iterator-source
/// precomputation).
pub fn build_raw_pass(
    ctx: &mut CompilerContext,
    label: &str,
    parameters: Json,
    result_path: Option<String>,
) -> (String, SuccessorSink) {
    let id = ctx.idgen.next_id(label);
    ctx.arena.insert(StateNode::Pass {
        id: id.clone(),
        parameters: Some(parameters),
        result_path,
        next: None,
        end: false,
    });
    (id.clone(), SuccessorSink::single(Successor::PlainNext(id)))
}
