//! The emitted state graph (spec §3 "Emitted state graph", §9 "cyclic
//! references" design note).
//!
//! Nodes are kept in an arena (`IndexMap<id, StateNode>`) rather than
//! owning their successors directly, exactly as the Design Notes ask:
//! "model as arena of state nodes with integer IDs; resolve
//! next-pointers lazily via a list of thunks". A `petgraph::DiGraph` is
//! built from the arena on demand purely for graph-shaped queries
//! (reachability, the P1 well-formedness checks) — the canonical,
//! mutated-during-compilation representation is the arena plus the
//! [`SuccessorSink`] thunk list, not the petgraph edges.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use petgraph::graph::DiGraph;
use petgraph::visit::Dfs;
use serde_json::Value as Json;

/// A retry policy (spec §3 "Retry policy").
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub errors: Vec<String>,
    pub interval_seconds: u32,
    pub max_attempts: u32,
    pub backoff_rate: f64,
}

/// A catch handler (spec §3 "Catch handler").
#[derive(Debug, Clone, PartialEq)]
pub struct CatchHandler {
    pub errors: Vec<String>,
    pub next: Option<String>,
    pub result_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskIntegration {
    Standard,
    FireAndForget,
    WaitForTaskToken { heartbeat_seconds: Option<u32> },
    StartExecutionSync,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceBranch {
    pub condition: Json,
    pub label: String,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateNode {
    Pass {
        id: String,
        parameters: Option<Json>,
        result_path: Option<String>,
        next: Option<String>,
        end: bool,
    },
    Choice {
        id: String,
        branches: Vec<ChoiceBranch>,
        default: Option<String>,
    },
    Wait {
        id: String,
        seconds: WaitDuration,
        next: Option<String>,
    },
    Task {
        id: String,
        resource: String,
        parameters: Json,
        input_path: Option<String>,
        result_path: Option<String>,
        result_selector: Option<Json>,
        retry: Vec<RetryPolicy>,
        catch: Vec<CatchHandler>,
        integration: TaskIntegration,
        next: Option<String>,
        end: bool,
    },
    Map {
        id: String,
        items_path: String,
        max_concurrency: u32,
        parameters: Json,
        result_path: String,
        iterator_start_at: String,
        iterator_states: BTreeMap<String, StateNode>,
        retry: Vec<RetryPolicy>,
        catch: Vec<CatchHandler>,
        next: Option<String>,
        end: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitDuration {
    Seconds(f64),
    SecondsPath(String),
}

impl StateNode {
    pub fn id(&self) -> &str {
        match self {
            StateNode::Pass { id, .. }
            | StateNode::Choice { id, .. }
            | StateNode::Wait { id, .. }
            | StateNode::Task { id, .. }
            | StateNode::Map { id, .. } => id,
        }
    }

    fn set_next(&mut self, target: &str) {
        match self {
            StateNode::Pass { next, .. } | StateNode::Wait { next, .. } => {
                *next = Some(target.to_string())
            }
            StateNode::Task { next, end, .. } | StateNode::Map { next, end, .. } => {
                *next = Some(target.to_string());
                *end = false;
            }
            StateNode::Choice { .. } => {
                // Choice nodes never receive a plain `next`; setting one
                // here would be a compiler bug.
            }
        }
    }
}

/// A pending "whoever compiles next, wire yourself up as my successor"
/// obligation (spec §9 "next thunks"). Each variant names exactly one
/// slot that must be filled exactly once.
#[derive(Debug, Clone)]
pub enum Successor {
    PlainNext(String),
    ChoiceBranch(String, usize),
    ChoiceDefault(String),
    CatchNext(String, usize),
}

/// A flattened list of dangling successor slots left open by a compiled
/// statement chain, to be resolved once the next statement's entry ID
/// is known (or left as a true terminal — Return, or an already-End
/// Task/Pass).
#[derive(Debug, Clone, Default)]
pub struct SuccessorSink(pub Vec<Successor>);

impl SuccessorSink {
    pub fn new() -> Self {
        SuccessorSink(Vec::new())
    }

    pub fn single(s: Successor) -> Self {
        SuccessorSink(vec![s])
    }

    pub fn merge(mut self, other: SuccessorSink) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies every pending setter, pointing them all at `target`.
    pub fn resolve(self, arena: &mut StateArena, target: &str) {
        for setter in self.0 {
            match setter {
                Successor::PlainNext(id) => {
                    if let Some(node) = arena.get_mut(&id) {
                        node.set_next(target);
                    }
                }
                Successor::ChoiceBranch(id, idx) => {
                    if let Some(StateNode::Choice { branches, .. }) = arena.get_mut(&id) {
                        if let Some(b) = branches.get_mut(idx) {
                            b.next = Some(target.to_string());
                        }
                    }
                }
                Successor::ChoiceDefault(id) => {
                    if let Some(StateNode::Choice { default, .. }) = arena.get_mut(&id) {
                        *default = Some(target.to_string());
                    }
                }
                Successor::CatchNext(id, idx) => {
                    if let Some(StateNode::Task { catch, .. }) = arena.get_mut(&id) {
                        if let Some(c) = catch.get_mut(idx) {
                            c.next = Some(target.to_string());
                        }
                    }
                }
            }
        }
    }
}

/// The arena of states for one compiled machine (or one nested Map
/// iterator sub-machine).
#[derive(Debug, Default)]
pub struct StateArena {
    pub states: IndexMap<String, StateNode>,
}

impl StateArena {
    pub fn new() -> Self {
        StateArena { states: IndexMap::new() }
    }

    pub fn insert(&mut self, node: StateNode) {
        self.states.insert(node.id().to_string(), node);
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut StateNode> {
        self.states.get_mut(id)
    }

    pub fn get(&self, id: &str) -> Option<&StateNode> {
        self.states.get(id)
    }

    /// Builds a petgraph view for reachability/well-formedness queries
    /// (P1). Only explicit transitions count as edges: `Next`, Choice
    /// branches, Choice default, and Catch targets. Map iterator bodies
    /// are their own nested machines and are checked independently by
    /// the caller.
    pub fn to_petgraph(&self, start_at: &str) -> (DiGraph<String, ()>, petgraph::graph::NodeIndex) {
        let mut g = DiGraph::new();
        let mut idx_of = std::collections::HashMap::new();
        for id in self.states.keys() {
            idx_of.insert(id.clone(), g.add_node(id.clone()));
        }
        for node in self.states.values() {
            let from = idx_of[node.id()];
            for target in self.successors_of(node) {
                if let Some(&to) = idx_of.get(&target) {
                    g.add_edge(from, to, ());
                }
            }
        }
        let start = idx_of
            .get(start_at)
            .copied()
            .unwrap_or_else(|| g.add_node(start_at.to_string()));
        (g, start)
    }

    fn successors_of(&self, node: &StateNode) -> Vec<String> {
        match node {
            StateNode::Pass { next, .. } | StateNode::Wait { next, .. } => {
                next.iter().cloned().collect()
            }
            StateNode::Task { next, catch, .. } | StateNode::Map { next, catch, .. } => {
                let mut v: Vec<String> = next.iter().cloned().collect();
                v.extend(catch.iter().filter_map(|c| c.next.clone()));
                v
            }
            StateNode::Choice { branches, default, .. } => {
                let mut v: Vec<String> = branches.iter().filter_map(|b| b.next.clone()).collect();
                v.extend(default.iter().cloned());
                v
            }
        }
    }

    /// Every state reachable from `start_at` (P1).
    pub fn reachable_from(&self, start_at: &str) -> Vec<String> {
        let (g, start) = self.to_petgraph(start_at);
        let mut dfs = Dfs::new(&g, start);
        let mut out = Vec::new();
        while let Some(n) = dfs.next(&g) {
            out.push(g[n].clone());
        }
        out
    }
}
