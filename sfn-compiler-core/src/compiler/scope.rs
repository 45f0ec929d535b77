//! Scope stack (spec §3 "Scope", §4.6.2/§4.6.5/§4.6.6).

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::ast::DeclaredType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Child,
    Map,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Variables defined (first written) while this scope is live,
    /// including those inherited from the parent at push time for
    /// Child/Map scopes (spec: "inherits parent variables by value").
    vars: IndexSet<String>,
    /// Variables *not* originally local to this scope that were written
    /// again while it was live — for a Map scope these are exactly the
    /// outer variables the post-loop consolidation step must project
    /// (spec §4.6.5 step 4).
    mutated_outer: IndexSet<String>,
    /// Names local to just this scope (defined after push, not inherited).
    locals: IndexSet<String>,
    /// Declared types inherited from parameter annotations (spec §4.2),
    /// keyed by variable name. Cleared for a name on any reassignment —
    /// the compiler does no type inference for computed values, so only
    /// an untouched parameter keeps its narrowing.
    types: HashMap<String, DeclaredType>,
}

impl Scope {
    /// Names first written while this (now-popped) scope was live — not
    /// inherited from its parent. Used to merge a branch's brand-new
    /// names back into the enclosing scope as "known" once the branch
    /// closes (the host language's own name resolution is hoisted to
    /// function scope; a name assigned only on one branch is still a
    /// legal reference afterward, it just may be absent from the
    /// register on the untaken path — spec §3 Scope / P6).
    pub fn new_locals(&self) -> Vec<String> {
        self.locals.iter().cloned().collect()
    }
}

pub struct ScopeStack {
    stack: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { stack: Vec::new() }
    }

    pub fn push_root(&mut self, initial_vars: impl IntoIterator<Item = String>) {
        self.push_root_typed(initial_vars, HashMap::new());
    }

    /// Like [`Self::push_root`], additionally seeding declared parameter
    /// types (spec §4.2) for the condition builder to narrow on.
    pub fn push_root_typed(
        &mut self,
        initial_vars: impl IntoIterator<Item = String>,
        initial_types: HashMap<String, DeclaredType>,
    ) {
        self.stack.push(Scope {
            kind: ScopeKind::Root,
            vars: initial_vars.into_iter().collect(),
            mutated_outer: IndexSet::new(),
            locals: IndexSet::new(),
            types: initial_types,
        });
    }

    fn inherited_vars(&self) -> IndexSet<String> {
        self.stack
            .last()
            .map(|s| s.vars.clone())
            .unwrap_or_default()
    }

    fn inherited_types(&self) -> HashMap<String, DeclaredType> {
        self.stack
            .last()
            .map(|s| s.types.clone())
            .unwrap_or_default()
    }

    pub fn push_child(&mut self) {
        let inherited = self.inherited_vars();
        let types = self.inherited_types();
        self.stack.push(Scope {
            kind: ScopeKind::Child,
            vars: inherited,
            mutated_outer: IndexSet::new(),
            locals: IndexSet::new(),
            types,
        });
    }

    pub fn push_map(&mut self, loop_var: &str) {
        let mut inherited = self.inherited_vars();
        inherited.insert(loop_var.to_string());
        let mut types = self.inherited_types();
        types.remove(loop_var);
        self.stack.push(Scope {
            kind: ScopeKind::Map,
            vars: inherited,
            mutated_outer: IndexSet::new(),
            locals: IndexSet::new(),
            types,
        });
    }

    pub fn pop(&mut self) -> Scope {
        self.stack.pop().expect("scope stack underflow")
    }

    pub fn current(&self) -> &Scope {
        self.stack.last().expect("empty scope stack")
    }

    /// Is `name` visible (defined in this scope or any enclosing one)?
    pub fn is_defined(&self, name: &str) -> bool {
        self.stack.last().is_some_and(|s| s.vars.contains(name))
    }

    /// Every variable visible at this program point, in definition
    /// order — used to carry forward untouched bindings in a register
    /// update (spec §4.6.2).
    pub fn visible_vars(&self) -> Vec<String> {
        self.current().vars.iter().cloned().collect()
    }

    /// Records a write to `name`. Returns whether this is a brand-new
    /// binding (not previously visible) in the current scope.
    pub fn record_write(&mut self, name: &str) -> bool {
        let was_defined = self.is_defined(name);
        let top_is_map = self.current().kind == ScopeKind::Map;
        let scope = self.stack.last_mut().expect("empty scope stack");
        let is_new = scope.vars.insert(name.to_string());
        if is_new {
            scope.locals.insert(name.to_string());
        } else {
            // A reassignment invalidates any declared-type narrowing —
            // the compiler infers no type for the new value.
            scope.types.remove(name);
        }
        if top_is_map && was_defined && !scope.locals.contains(name) {
            scope.mutated_outer.insert(name.to_string());
        }
        is_new
    }

    /// The declared type of `name` at this program point, if the
    /// compiler still has one (spec §4.2); `None` once the name has been
    /// reassigned or was never annotated.
    pub fn declared_type(&self, name: &str) -> Option<DeclaredType> {
        self.current().types.get(name).copied()
    }

    /// Outer variables mutated while the current (Map) scope was live —
    /// consumed by consolidation (spec §4.6.5 step 4).
    pub fn mutated_outer_vars(&self) -> Vec<String> {
        self.current().mutated_outer.iter().cloned().collect()
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scope_hides_locals_after_pop() {
        let mut s = ScopeStack::new();
        s.push_root(["s".to_string()]);
        s.push_child();
        s.record_write("a");
        assert!(s.is_defined("a"));
        assert!(s.is_defined("s"));
        s.pop();
        assert!(!s.is_defined("a"));
        assert!(s.is_defined("s"));
    }

    #[test]
    fn map_scope_tracks_outer_mutations_only() {
        let mut s = ScopeStack::new();
        s.push_root(["results".to_string()]);
        s.push_map("v");
        s.record_write("results"); // outer var reassigned in loop body
        s.record_write("tmp"); // brand new loop-local
        let mutated = s.mutated_outer_vars();
        assert_eq!(mutated, vec!["results".to_string()]);
    }

    #[test]
    fn declared_type_is_inherited_by_child_and_map_scopes() {
        let mut s = ScopeStack::new();
        let mut types = HashMap::new();
        types.insert("opt".to_string(), DeclaredType::Bool);
        s.push_root_typed(["opt".to_string()], types);
        assert_eq!(s.declared_type("opt"), Some(DeclaredType::Bool));

        s.push_child();
        assert_eq!(s.declared_type("opt"), Some(DeclaredType::Bool));
        s.pop();

        s.push_map("v");
        assert_eq!(s.declared_type("opt"), Some(DeclaredType::Bool));
    }

    #[test]
    fn reassignment_clears_declared_type() {
        let mut s = ScopeStack::new();
        let mut types = HashMap::new();
        types.insert("opt".to_string(), DeclaredType::Bool);
        s.push_root_typed(["opt".to_string()], types);
        s.record_write("opt");
        assert_eq!(s.declared_type("opt"), None);
    }
}
