//! Dev-tooling binary: compiles every fixture function under `demos/`
//! and writes its build artifacts. Not a deployment CLI — there is no
//! stack wiring or CDK synthesis here, only the library exercised
//! end-to-end against fixtures.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value as Json;

use sfn_compiler_core::attributes::FunctionAttributes;
use sfn_compiler_core::decorator::{build_state_machine_with_artifacts, ConstructBuilder, StateMachineSpec};
use sfn_compiler_core::registry::{CallableRef, Registry, SymbolTable};

/// A construct builder that does nothing but log; xtask has no real
/// deployment target to hand the definition to.
struct NoopBuilder;

impl ConstructBuilder for NoopBuilder {
    fn create_state_machine(&self, machine_name: &str, definition: &Json, express: bool) -> Arc<dyn std::any::Any> {
        tracing::info!(machine = machine_name, express, "would deploy state machine");
        Arc::new(())
    }
}

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..").join("demos")
}

fn build_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..").join("build")
}

/// Registers every compute unit the `demos/*.py` fixtures call, so the
/// driver can actually resolve them instead of failing on the first
/// `UnknownCallee`. Arities mirror each fixture's call sites exactly —
/// this is fixture scaffolding, not a schema registry for real units.
fn demo_symbols() -> Result<SymbolTable> {
    let mut registry = Registry::new();
    let mut symbols = SymbolTable::new();
    let mut register = |name: &str, params: &[&str], outputs: &[&str]| -> Result<()> {
        let attrs = FunctionAttributes {
            required_params: params.iter().map(|s| s.to_string()).collect(),
            optional_params: vec![],
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let def = registry.register_native(name, attrs)?;
        symbols.insert(name, CallableRef::ComputeUnitRef(def.clone()));
        Ok(())
    };

    register("step1", &["s", "opt"], &["a", "mode", "opt2", "secs", "code", "ct"])?;
    register("step2", &["s", "lst"], &["a", "lst", "uri"])?;
    register("step10", &["uri", "n"], &["items"])?;
    register("step11", &["v"], &["ack"])?;
    register("step12", &["v"], &["item"])?;
    register("get_result", &["job", "uri", "flag"], &["u", "ok"])?;
    register("step7", &["uri"], &["u"])?;
    register("step6", &["u"], &["v"])?;
    register("delayed", &["s", "token", "heartbeat", "wait"], &["result"])?;

    Ok(symbols)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let demos = demos_dir();
    let out_dir = build_dir();
    let symbols = demo_symbols()?;
    let builder = NoopBuilder;

    let entries = fs::read_dir(&demos).with_context(|| format!("reading {}", demos.display()))?;
    let mut compiled_any = false;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        compile_fixture(&path, &out_dir, &symbols, &builder)?;
        compiled_any = true;
    }

    if !compiled_any {
        tracing::warn!(dir = %demos.display(), "no fixture sources found under demos/");
    }
    Ok(())
}

fn compile_fixture(path: &Path, out_dir: &Path, symbols: &SymbolTable, builder: &dyn ConstructBuilder) -> Result<()> {
    let function_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("fixture path has no file stem")?
        .to_string();
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let spec = StateMachineSpec {
        machine_name: format!("{function_name}_machine"),
        symbols,
        express: false,
        skip_pass: false,
        return_vars: None,
    };

    tracing::info!(fixture = %path.display(), "compiling fixture");
    let deployed = build_state_machine_with_artifacts(&source, &function_name, &spec, builder, out_dir)
        .with_context(|| format!("compiling {}", path.display()))?;
    tracing::info!(machine = %deployed.machine_name, outputs = ?deployed.outputs, "compiled fixture");
    Ok(())
}
