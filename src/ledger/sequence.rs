//! Per-identity sequence number allocation.
//!
//! The ledger orders and dedupes each identity's transactions by a strictly
//! increasing sequence number, so two in-flight submissions must never share
//! one. Allocation is serialized through a per-identity slot: a lease holds
//! the slot until the submission's outcome is known. A slot whose last
//! outcome was not a clean confirmation resynchronizes from the node's
//! authoritative counter before issuing the next number, which makes the
//! allocator self-healing across abandoned submissions and process restarts.

use crate::error::{ChainTraceError, Result};
use crate::ledger::rpc::LedgerNode;
use crate::ledger::Address;
use crate::monitoring::SubmissionMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// How an allocated sequence number ended its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// The transaction was durably included; the counter advances.
    Confirmed,
    /// The node or program refused the transaction. Whether the number was
    /// consumed depends on where the rejection happened, so the slot
    /// resynchronizes before the next allocation.
    Rejected,
    /// The submission's outcome is indeterminate; the slot resynchronizes
    /// before the next allocation.
    Abandoned,
}

struct SlotState {
    /// Next sequence number to hand out, when known
    next: Option<u64>,
    /// Forces a node resynchronization before the next allocation
    stale: bool,
}

/// Issues strictly increasing per-identity sequence numbers, serializing
/// allocation per identity. Distinct identities allocate independently.
pub struct SequenceAllocator {
    node: Arc<dyn LedgerNode>,
    slots: Mutex<HashMap<Address, Arc<Mutex<SlotState>>>>,
    metrics: Arc<SubmissionMetrics>,
}

impl SequenceAllocator {
    pub fn new(node: Arc<dyn LedgerNode>, metrics: Arc<SubmissionMetrics>) -> Self {
        Self {
            node,
            slots: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Wait for the identity's slot, resynchronize it if needed, and lease
    /// the next sequence number. The lease keeps the slot until it is
    /// released; dropping it unreleased counts as abandonment.
    pub async fn allocate(&self, identity: Address) -> Result<SequenceLease> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(identity)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(SlotState {
                        next: None,
                        stale: false,
                    }))
                })
                .clone()
        };

        let mut guard = slot.lock_owned().await;

        if guard.next.is_none() || guard.stale {
            let authoritative = self.node.sequence_for(&identity).await?;
            if guard.stale {
                self.metrics.record_sequence_resync();
                debug!(
                    "Resynchronized sequence for {} to {} after a non-confirmed outcome",
                    identity, authoritative
                );
            }
            guard.next = Some(authoritative);
            guard.stale = false;
        }

        let value = guard
            .next
            .ok_or_else(|| ChainTraceError::Internal("sequence slot uninitialized".to_string()))?;

        Ok(SequenceLease {
            identity,
            value,
            guard: Some(guard),
        })
    }
}

/// An in-flight sequence allocation. Holds the identity's slot, so no other
/// caller can allocate for the same identity until this lease is released.
pub struct SequenceLease {
    identity: Address,
    value: u64,
    guard: Option<OwnedMutexGuard<SlotState>>,
}

impl SequenceLease {
    /// The leased sequence number
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The identity this lease belongs to
    pub fn identity(&self) -> Address {
        self.identity
    }

    /// Release the slot with the submission's outcome. Called exactly once;
    /// consuming the lease enforces that.
    pub fn release(mut self, outcome: SequenceOutcome) {
        if let Some(mut guard) = self.guard.take() {
            match outcome {
                SequenceOutcome::Confirmed => {
                    guard.next = Some(self.value + 1);
                }
                SequenceOutcome::Rejected | SequenceOutcome::Abandoned => {
                    guard.stale = true;
                }
            }
        }
    }
}

impl Drop for SequenceLease {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            warn!(
                "Sequence lease for {} dropped without release, treating {} as abandoned",
                self.identity, self.value
            );
            guard.stale = true;
        }
    }
}
