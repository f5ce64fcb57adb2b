//! Shared test doubles for the orchestration modules.

use crate::error::{ChainTraceError, Result};
use crate::ledger::rpc::{LedgerNode, Receipt, ReceiptStatus};
use crate::ledger::{Address, TransactionId};
use async_trait::async_trait;
use primitive_types::U256;
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// How the mock answers receipt polls for submitted transactions
#[derive(Debug, Clone)]
pub(crate) enum ReceiptMode {
    /// Every submitted transaction gets a success receipt
    Include,
    /// Every submitted transaction gets a failure receipt
    Fail(String),
    /// No receipt ever appears
    Never,
    /// The first submitted transaction succeeds, later ones get failure
    /// receipts, mimicking program-side arbitration of racing writers
    FirstWins,
}

/// Scriptable in-memory ledger node
pub(crate) struct MockNode {
    sequences: Mutex<HashMap<Address, u64>>,
    sequence_call_count: AtomicU64,
    transient_submit_failures: AtomicU32,
    reject_submits: AtomicBool,
    submissions: Mutex<Vec<String>>,
    first_submitted: Mutex<Option<TransactionId>>,
    receipt_mode: Mutex<ReceiptMode>,
    receipt_delay_polls: AtomicU32,
    poll_counts: Mutex<HashMap<TransactionId, u32>>,
    call_responses: Mutex<VecDeque<Vec<u8>>>,
    recorded_calls: Mutex<Vec<Vec<u8>>>,
}

impl MockNode {
    pub(crate) fn new() -> Self {
        Self {
            sequences: Mutex::new(HashMap::new()),
            sequence_call_count: AtomicU64::new(0),
            transient_submit_failures: AtomicU32::new(0),
            reject_submits: AtomicBool::new(false),
            submissions: Mutex::new(Vec::new()),
            first_submitted: Mutex::new(None),
            receipt_mode: Mutex::new(ReceiptMode::Include),
            receipt_delay_polls: AtomicU32::new(0),
            poll_counts: Mutex::new(HashMap::new()),
            call_responses: Mutex::new(VecDeque::new()),
            recorded_calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn set_sequence(&self, identity: Address, value: u64) {
        self.sequences.lock().await.insert(identity, value);
    }

    pub(crate) fn sequence_calls(&self) -> u64 {
        self.sequence_call_count.load(Ordering::Relaxed)
    }

    /// Fail the next `count` submissions with a transient transport error
    pub(crate) fn fail_next_submits(&self, count: u32) {
        self.transient_submit_failures.store(count, Ordering::Relaxed);
    }

    /// Make the node refuse every submission outright
    pub(crate) fn reject_submits(&self) {
        self.reject_submits.store(true, Ordering::Relaxed);
    }

    pub(crate) async fn set_receipt_mode(&self, mode: ReceiptMode) {
        *self.receipt_mode.lock().await = mode;
    }

    /// Answer `None` to the first `polls` receipt polls per transaction
    pub(crate) fn set_receipt_delay(&self, polls: u32) {
        self.receipt_delay_polls.store(polls, Ordering::Relaxed);
    }

    pub(crate) async fn push_call_response(&self, data: Vec<u8>) {
        self.call_responses.lock().await.push_back(data);
    }

    pub(crate) async fn submissions(&self) -> Vec<String> {
        self.submissions.lock().await.clone()
    }

    pub(crate) async fn recorded_calls(&self) -> Vec<Vec<u8>> {
        self.recorded_calls.lock().await.clone()
    }

    fn id_for_raw(raw: &str) -> Result<TransactionId> {
        let stripped = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(stripped)
            .map_err(|_| ChainTraceError::Rpc("invalid raw envelope hex".to_string()))?;
        let digest = Keccak256::digest(&bytes);
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Ok(TransactionId(id))
    }
}

#[async_trait]
impl LedgerNode for MockNode {
    async fn sequence_for(&self, identity: &Address) -> Result<u64> {
        self.sequence_call_count.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .sequences
            .lock()
            .await
            .get(identity)
            .copied()
            .unwrap_or(0))
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn submit_raw(&self, raw: &str) -> Result<TransactionId> {
        if self
            .transient_submit_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainTraceError::ConnectionLost {
                endpoint: "mock".to_string(),
            });
        }

        if self.reject_submits.load(Ordering::Relaxed) {
            return Err(ChainTraceError::NodeRejected {
                code: -32000,
                message: "malformed envelope".to_string(),
            });
        }

        let id = Self::id_for_raw(raw)?;
        self.submissions.lock().await.push(raw.to_string());
        let mut first = self.first_submitted.lock().await;
        if first.is_none() {
            *first = Some(id);
        }
        Ok(id)
    }

    async fn transaction_receipt(&self, id: &TransactionId) -> Result<Option<Receipt>> {
        let polls = {
            let mut counts = self.poll_counts.lock().await;
            let entry = counts.entry(*id).or_insert(0);
            *entry += 1;
            *entry
        };
        if polls <= self.receipt_delay_polls.load(Ordering::Relaxed) {
            return Ok(None);
        }

        // only submitted transactions can have receipts
        let submitted = {
            let submissions = self.submissions.lock().await;
            submissions
                .iter()
                .any(|raw| Self::id_for_raw(raw).ok().as_ref() == Some(id))
        };
        if !submitted {
            return Ok(None);
        }

        let mode = self.receipt_mode.lock().await.clone();
        let receipt = match mode {
            ReceiptMode::Include => Receipt {
                transaction_id: *id,
                status: ReceiptStatus::Included,
                block_number: Some(1),
                reason: None,
            },
            ReceiptMode::Fail(reason) => Receipt {
                transaction_id: *id,
                status: ReceiptStatus::Failed,
                block_number: Some(1),
                reason: Some(reason),
            },
            ReceiptMode::Never => return Ok(None),
            ReceiptMode::FirstWins => {
                let first = *self.first_submitted.lock().await;
                if first == Some(*id) {
                    Receipt {
                        transaction_id: *id,
                        status: ReceiptStatus::Included,
                        block_number: Some(1),
                        reason: None,
                    }
                } else {
                    Receipt {
                        transaction_id: *id,
                        status: ReceiptStatus::Failed,
                        block_number: Some(1),
                        reason: Some("lost the race".to_string()),
                    }
                }
            }
        };
        Ok(Some(receipt))
    }

    async fn call(&self, _program: &Address, call_data: &[u8]) -> Result<Vec<u8>> {
        self.recorded_calls.lock().await.push(call_data.to_vec());
        self.call_responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ChainTraceError::Rpc("no scripted call response".to_string()))
    }
}
