//! Identifier service (spec §4.1).
//!
//! Produces stable, human-readable state IDs of the form
//! `"<label> [<machine-index>:<state-index>]"`. The machine-index counter
//! is process-wide (monotonic, bumped once per compiled machine); the
//! state-index counter is per-machine and restarts at zero for every
//! compile. Both are carried in an explicit `CompilerContext`
//! (spec §9 "global mutable state" note) rather than as a hidden global,
//! so tests and repeated in-process compiles stay deterministic.

use std::sync::atomic::{AtomicU64, Ordering};

static MACHINE_INDEX: AtomicU64 = AtomicU64::new(0);

/// Allocates the next machine index. Called once per `#[state_machine]`
/// compile.
pub fn next_machine_index() -> u64 {
    MACHINE_INDEX.fetch_add(1, Ordering::SeqCst)
}

/// Per-machine monotonic state-index allocator plus label formatting.
#[derive(Debug)]
pub struct IdGen {
    machine_index: u64,
    next_state_index: u64,
}

impl IdGen {
    pub fn new(machine_index: u64) -> Self {
        IdGen {
            machine_index,
            next_state_index: 0,
        }
    }

    /// Allocates a fresh, unique ID for a state carrying the given label.
    pub fn next_id(&mut self, label: &str) -> String {
        let idx = self.next_state_index;
        self.next_state_index += 1;
        format!("{label} [{}:{idx}]", self.machine_index)
    }
}

/// Extracts the numeric state-index suffix used to sort the serialized
/// graph (spec §4.7). Returns `u64::MAX` if the ID doesn't match the
/// expected shape (defensive only; every ID the compiler emits matches).
pub fn state_index_of(id: &str) -> u64 {
    id.rsplit_once(':')
        .and_then(|(_, rest)| rest.strip_suffix(']'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}
