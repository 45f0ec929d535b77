//! Compute-unit registry & launcher packager (spec §4.4): materializes
//! the single dispatcher source file that a deployed compute-unit bundle
//! routes through, from whatever native compute units are registered.
//!
//! The dispatcher itself is *generated text for the host runtime*, not
//! compiled Rust (spec §6: `<bundle>/<machine-id-slug>_pysfn_launcher.<ext>`),
//! so this module's job ends at producing that string and the bundle
//! path it belongs at — same split as the teacher's
//! `authoring::export_bpmn` producing BPMN XML text from an in-memory
//! graph.

use std::path::{Path, PathBuf};

use crate::registry::Registry;

/// One materialized dispatcher artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherModule {
    pub path: PathBuf,
    pub source: String,
}

/// Generates the dispatcher source file for `bundle_dir`, routing to
/// every native compute unit currently in `registry` (spec §4.4): it
/// imports every contributing module, reads the event's `launcher_target`
/// field, marshals the event's fields into the target's positional
/// parameters by declared order, invokes it, and normalizes the result
/// (mapping passes through; tuple becomes `{arg0, arg1, ...}`; anything
/// else becomes `{arg0: value}`).
///
/// `modules` names the host-language modules to import, one per
/// contributing file (caller-supplied — the registry itself has no
/// notion of source file layout).
pub fn materialize_dispatcher(
    registry: &Registry,
    bundle_dir: &Path,
    machine_slug: &str,
    modules: &[&str],
) -> DispatcherModule {
    let units = registry.native_units();
    tracing::debug!(
        machine = machine_slug,
        unit_count = units.len(),
        "packaging launcher dispatcher"
    );

    let mut src = String::new();
    src.push_str("# Generated by the compute-unit registry & launcher packager.\n");
    src.push_str("# Do not edit by hand; re-run the compiler to regenerate.\n\n");
    for m in modules {
        src.push_str(&format!("import {m}\n"));
    }
    src.push('\n');

    src.push_str("_DISPATCH = {\n");
    for unit in units {
        let param_names = unit
            .attrs
            .required_params
            .iter()
            .chain(unit.attrs.optional_params.iter().map(|(n, _)| n))
            .map(|p| format!("{p:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        src.push_str(&format!(
            "    {:?}: ({}, [{}]),\n",
            unit.dispatcher_key, unit.name, param_names,
        ));
    }
    src.push_str("}\n\n");

    src.push_str("def launcher_entry(event, context=None):\n");
    src.push_str("    print(f\"dispatch event: {event}\")\n");
    src.push_str("    target = event[\"launcher_target\"]\n");
    src.push_str("    func, param_names = _DISPATCH[target]\n");
    src.push_str("    kwargs = {name: event[name] for name in param_names if name in event}\n");
    src.push_str("    print(f\"dispatch kwargs: {kwargs}\")\n");
    src.push_str("    result = func(**kwargs)\n");
    src.push_str("    if isinstance(result, dict):\n");
    src.push_str("        normalized = result\n");
    src.push_str("    elif isinstance(result, tuple):\n");
    src.push_str("        normalized = {f\"arg{i}\": v for i, v in enumerate(result)}\n");
    src.push_str("    else:\n");
    src.push_str("        normalized = {\"arg0\": result}\n");
    src.push_str("    print(f\"dispatch result: {normalized}\")\n");
    src.push_str("    return normalized\n");

    let path = bundle_dir.join(format!("{machine_slug}_pysfn_launcher.py"));
    DispatcherModule { path, source: src }
}

/// Writes a materialized dispatcher module to disk under its bundle
/// directory.
pub fn write_dispatcher(module: &DispatcherModule) -> std::io::Result<()> {
    if let Some(parent) = module.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&module.path, &module.source)
}
