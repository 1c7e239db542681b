//! Dedupe store - idempotency state keyed by dedupe id.
//!
//! The lane claims an id before dispatching and the claim must be atomic
//! check-and-set, so two workers can never dispatch the same envelope
//! concurrently. The store is injected into the lane; the dashmap
//! implementation covers single-process deployments and tests.

use dashmap::DashMap;

/// Result of attempting to claim a dedupe id for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Id was free; caller now owns the in-flight claim.
    Claimed,
    /// Another worker holds the claim; defer and retry later.
    InFlight,
    /// A prior attempt already dispatched; short-circuit to success.
    AlreadyDispatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DedupeState {
    Processing,
    Dispatched,
}

/// Idempotency ledger the lane consults before invoking the dispatcher.
pub trait DedupeStore: Send + Sync {
    /// Atomically claims `dedupe_id` for processing.
    fn try_claim(&self, dedupe_id: &str) -> ClaimOutcome;

    /// Records terminal success; later claims short-circuit.
    fn mark_dispatched(&self, dedupe_id: &str);

    /// Releases an in-flight claim after a failed attempt so a retry can
    /// claim it again.
    fn release(&self, dedupe_id: &str);

    /// Read-only probe: has this id reached terminal success?
    fn is_dispatched(&self, dedupe_id: &str) -> bool;
}

/// In-memory dedupe store on dashmap's atomic entry API.
#[derive(Default)]
pub struct MemoryDedupeStore {
    entries: DashMap<String, DedupeState>,
}

impl MemoryDedupeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupeStore for MemoryDedupeStore {
    fn try_claim(&self, dedupe_id: &str) -> ClaimOutcome {
        // The entry API holds the shard lock, making check-and-set atomic
        match self.entries.entry(dedupe_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => match occupied.get() {
                DedupeState::Processing => ClaimOutcome::InFlight,
                DedupeState::Dispatched => ClaimOutcome::AlreadyDispatched,
            },
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(DedupeState::Processing);
                ClaimOutcome::Claimed
            }
        }
    }

    fn mark_dispatched(&self, dedupe_id: &str) {
        self.entries
            .insert(dedupe_id.to_string(), DedupeState::Dispatched);
    }

    fn release(&self, dedupe_id: &str) {
        // Only an in-flight claim is released; a dispatched marker stays
        self.entries
            .remove_if(dedupe_id, |_, state| *state == DedupeState::Processing);
    }

    fn is_dispatched(&self, dedupe_id: &str) -> bool {
        self.entries
            .get(dedupe_id)
            .map(|state| *state == DedupeState::Dispatched)
            .unwrap_or(false)
    }
}
