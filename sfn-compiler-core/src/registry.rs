//! Compute-unit registry and the tagged-variant callable model (spec
//! §4.4, §9 "dynamic dispatch and reflection on callables").
//!
//! The original implementation threads compiler metadata by attaching
//! attributes to live Python function objects (`func.definition`,
//! `func.get_lambda`, ...) and resolves call targets by capturing the
//! caller's lexical frame. Per the Design Notes this is replaced here
//! with an explicit [`CallableRef`] enum and an explicit [`SymbolTable`]
//! (name → callable descriptor) passed into the compiler — no reflection,
//! no frame capture.

use std::collections::HashMap;

use serde::Deserialize;

use crate::attributes::FunctionAttributes;
use crate::error::{CompileError, CompileResult};

/// One registered native compute unit (spec §4.4a).
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeUnitDef {
    pub name: String,
    pub attrs: FunctionAttributes,
    /// The dispatcher routing key this unit answers to — equal to its
    /// registered name (spec: "an overlay carrying a dispatcher key
    /// equal to the unit's registered name").
    pub dispatcher_key: String,
}

/// A foreign (externally-deployed) compute unit (spec §4.4b): only
/// input/output schemas are declared, no dispatcher key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignDef {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// A reference to another `#[state_machine]`-compiled function (spec
/// §4.6.4 "Nested state machine").
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachineRefDef {
    pub name: String,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicKind {
    Range,
    Len,
}

/// The tagged callable model (spec §9): every call target resolves to
/// exactly one of these before lowering dispatches on it (§4.6.4).
#[derive(Debug, Clone, PartialEq)]
pub enum CallableRef {
    ComputeUnitRef(ComputeUnitDef),
    ForeignRef(ForeignDef),
    StateMachineRef(StateMachineRefDef),
    Intrinsic(IntrinsicKind),
    Sleep,
    EventWrapper,
    AwaitTokenWrapper,
}

/// Explicit symbol table: name in the orchestrator's lexical environment
/// → callable descriptor. Built by the caller (the decorator glue, spec
/// §4.8) from whatever compute units/state machines/foreign functions it
/// has registered, then passed into the compiler — replacing frame
/// capture entirely.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: HashMap<String, CallableRef>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, callable: CallableRef) {
        self.entries.insert(name.into(), callable);
    }

    pub fn get(&self, name: &str) -> Option<&CallableRef> {
        self.entries.get(name)
    }
}

/// Resolves a bare callee name to its tagged variant. Built-in wrapper
/// and intrinsic names are recognized before the symbol table is
/// consulted; anything else falls through to a user registration, or is
/// a compile error.
pub fn resolve_callable(name: &str, symbols: &SymbolTable) -> CompileResult<CallableRef> {
    match name {
        "sleep" | "time.sleep" => return Ok(CallableRef::Sleep),
        "range" => return Ok(CallableRef::Intrinsic(IntrinsicKind::Range)),
        "len" => return Ok(CallableRef::Intrinsic(IntrinsicKind::Len)),
        "event" => return Ok(CallableRef::EventWrapper),
        "await_token" => return Ok(CallableRef::AwaitTokenWrapper),
        _ => {}
    }
    symbols
        .get(name)
        .cloned()
        .ok_or_else(|| CompileError::UnknownCallee { name: name.to_string() })
}

/// The compute-unit registry (spec §4.4): records native/foreign
/// registrations, rejecting duplicate names.
#[derive(Debug, Default)]
pub struct Registry {
    native: Vec<ComputeUnitDef>,
    foreign: Vec<ForeignDef>,
    names: std::collections::HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register_native(&mut self, name: &str, attrs: FunctionAttributes) -> CompileResult<&ComputeUnitDef> {
        if !self.names.insert(name.to_string()) {
            return Err(CompileError::DuplicateRegistration { name: name.to_string() });
        }
        self.native.push(ComputeUnitDef {
            name: name.to_string(),
            attrs,
            dispatcher_key: name.to_string(),
        });
        Ok(self.native.last().unwrap())
    }

    pub fn register_foreign(&mut self, name: &str, inputs: Vec<String>, outputs: Vec<String>) -> CompileResult<&ForeignDef> {
        if !self.names.insert(name.to_string()) {
            return Err(CompileError::DuplicateRegistration { name: name.to_string() });
        }
        self.foreign.push(ForeignDef {
            name: name.to_string(),
            inputs,
            outputs,
        });
        Ok(self.foreign.last().unwrap())
    }

    pub fn native_units(&self) -> &[ComputeUnitDef] {
        &self.native
    }

    /// Registers every entry of a YAML schema document as a foreign
    /// compute unit (SPEC_FULL §B "serde_yaml ... optional YAML
    /// fixture/config files declaring a compute unit's output schema
    /// outside the decorator"). This is the escape hatch for a foreign
    /// unit whose input/output schema a team wants to check into a
    /// config file instead of inlining it at every `register_foreign`
    /// call site.
    pub fn register_foreign_schema_yaml(&mut self, yaml: &str) -> CompileResult<()> {
        let doc: ForeignSchemaDocument =
            serde_yaml::from_str(yaml).map_err(|e| CompileError::SchemaLoad(e.to_string()))?;
        for unit in doc.units {
            self.register_foreign(&unit.name, unit.inputs, unit.outputs)?;
        }
        Ok(())
    }
}

/// One foreign unit's schema as it appears in a YAML fixture file.
#[derive(Debug, Deserialize)]
struct ForeignSchemaUnit {
    name: String,
    #[serde(default)]
    inputs: Vec<String>,
    #[serde(default)]
    outputs: Vec<String>,
}

/// The top-level shape of a foreign-schema YAML document:
/// ```yaml
/// units:
///   - name: send_notification
///     inputs: [recipient, message]
///     outputs: [message_id]
/// ```
#[derive(Debug, Deserialize)]
struct ForeignSchemaDocument {
    units: Vec<ForeignSchemaUnit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FunctionAttributes;

    fn attrs() -> FunctionAttributes {
        FunctionAttributes {
            required_params: vec![],
            optional_params: vec![],
            outputs: vec![],
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_native_registration_is_rejected() {
        let mut r = Registry::new();
        r.register_native("step1", attrs()).unwrap();
        let err = r.register_native("step1", attrs()).unwrap_err();
        assert_eq!(err, CompileError::DuplicateRegistration { name: "step1".into() });
    }

    #[test]
    fn builtin_wrappers_resolve_without_a_symbol_table() {
        let symbols = SymbolTable::new();
        assert_eq!(resolve_callable("sleep", &symbols).unwrap(), CallableRef::Sleep);
        assert_eq!(
            resolve_callable("range", &symbols).unwrap(),
            CallableRef::Intrinsic(IntrinsicKind::Range)
        );
    }

    #[test]
    fn unknown_name_is_an_error() {
        let symbols = SymbolTable::new();
        assert!(resolve_callable("mystery", &symbols).is_err());
    }

    #[test]
    fn foreign_units_load_from_a_yaml_schema_document() {
        let yaml = "units:\n\
                     \x20 - name: send_notification\n\
                     \x20   inputs: [recipient, message]\n\
                     \x20   outputs: [message_id]\n\
                     \x20 - name: no_inputs_unit\n\
                     \x20   outputs: [ok]\n";
        let mut r = Registry::new();
        r.register_foreign_schema_yaml(yaml).unwrap();
        assert_eq!(r.foreign.len(), 2);
        assert_eq!(r.foreign[0].name, "send_notification");
        assert_eq!(r.foreign[0].inputs, vec!["recipient".to_string(), "message".to_string()]);
        assert_eq!(r.foreign[0].outputs, vec!["message_id".to_string()]);
        assert_eq!(r.foreign[1].inputs, Vec::<String>::new());
    }

    #[test]
    fn duplicate_name_across_yaml_and_native_is_rejected() {
        let mut r = Registry::new();
        r.register_native("send_notification", attrs()).unwrap();
        let yaml = "units:\n  - name: send_notification\n    outputs: [ok]\n";
        let err = r.register_foreign_schema_yaml(yaml).unwrap_err();
        assert_eq!(err, CompileError::DuplicateRegistration { name: "send_notification".into() });
    }

    #[test]
    fn malformed_yaml_is_a_schema_load_error() {
        let mut r = Registry::new();
        let err = r.register_foreign_schema_yaml("not: [valid, units: doc").unwrap_err();
        assert!(matches!(err, CompileError::SchemaLoad(_)));
    }
}
