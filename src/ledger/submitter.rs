//! Submission and confirmation state machine.
//!
//! A signed envelope moves through `submitted -> {confirmed, rejected,
//! unknown}`. Transient send failures resend the identical envelope (nodes
//! dedupe by envelope hash, so at-least-once is safe) up to a bounded retry
//! count; a node-reported rejection is terminal and never retried. After a
//! successful send, the receipt is polled with capped exponential backoff
//! until inclusion, explicit failure, or the confirmation budget elapses.
//! An exhausted budget yields `Unknown`: the transaction may still land
//! later, so the caller must resolve it through a history lookup rather
//! than resubmitting the same sequence number.

use crate::config::SubmissionConfig;
use crate::error::{ChainTraceError, Result};
use crate::ledger::rpc::LedgerNode;
use crate::ledger::{now_millis, SignedEnvelope, TransactionRecord, TransactionStatus};
use crate::monitoring::SubmissionMetrics;
use std::cmp;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Drives signed envelopes to a terminal classification
pub struct SubmissionClient {
    node: Arc<dyn LedgerNode>,
    config: SubmissionConfig,
    metrics: Arc<SubmissionMetrics>,
}

impl SubmissionClient {
    pub fn new(
        node: Arc<dyn LedgerNode>,
        config: SubmissionConfig,
        metrics: Arc<SubmissionMetrics>,
    ) -> Self {
        Self {
            node,
            config,
            metrics,
        }
    }

    /// Submit an envelope and wait for a terminal classification.
    ///
    /// `deadline` overrides the configured confirmation budget; either way a
    /// hard ceiling always produces `Unknown` rather than waiting forever.
    /// Cancelling the wait never retracts the envelope: once sent, the
    /// transaction is out of our hands.
    pub async fn submit_and_confirm(
        &self,
        envelope: &SignedEnvelope,
        sequence: u64,
        deadline: Option<Duration>,
    ) -> Result<TransactionRecord> {
        let raw = envelope.to_hex();
        let transaction_id = envelope.id();
        let budget = deadline.unwrap_or_else(|| self.config.confirmation_timeout());
        let started = Instant::now();

        let mut record = TransactionRecord {
            transaction_id,
            sequence,
            status: TransactionStatus::Pending,
            retry_count: 0,
            submitted_at: now_millis(),
        };

        // send phase: identical-envelope resends on transient failures only
        loop {
            match self.node.submit_raw(&raw).await {
                Ok(node_id) => {
                    if node_id != transaction_id {
                        warn!(
                            "Node reported envelope hash {} but local hash is {}",
                            node_id, transaction_id
                        );
                    }
                    self.metrics.record_submitted();
                    debug!(
                        "Submitted transaction {} with sequence {}",
                        transaction_id, sequence
                    );
                    break;
                }
                Err(ChainTraceError::NodeRejected { code, message }) => {
                    info!(
                        "Node rejected transaction {} ({}): {}",
                        transaction_id, code, message
                    );
                    record.status = TransactionStatus::Rejected;
                    self.metrics.record_rejected();
                    return Ok(record);
                }
                Err(e) if e.is_transient() => {
                    record.retry_count += 1;
                    self.metrics.record_send_retry();
                    if record.retry_count > self.config.max_submit_retries {
                        // the envelope may or may not have reached the node
                        warn!(
                            "Transaction {} exhausted {} send retries, outcome unknown",
                            transaction_id, self.config.max_submit_retries
                        );
                        record.status = TransactionStatus::Unknown;
                        self.metrics.record_unknown();
                        return Ok(record);
                    }
                    let delay = self.backoff_delay(record.retry_count);
                    warn!(
                        "Transient send failure for {} ({}), resending in {:?}",
                        transaction_id, e, delay
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        // confirmation phase: capped exponential backoff up to the budget
        let mut delay = self.config.poll_initial_delay();
        let mut polls: u32 = 0;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= budget {
                warn!(
                    "Transaction {} unconfirmed after {:?} and {} polls, outcome unknown",
                    transaction_id, elapsed, polls
                );
                record.status = TransactionStatus::Unknown;
                self.metrics.record_unknown();
                return Ok(record);
            }

            sleep(cmp::min(delay, budget - elapsed)).await;
            polls += 1;

            match self.node.transaction_receipt(&transaction_id).await {
                Ok(Some(receipt)) => {
                    if receipt.succeeded() {
                        info!(
                            "Transaction {} confirmed after {} polls",
                            transaction_id, polls
                        );
                        record.status = TransactionStatus::Confirmed;
                        self.metrics.record_confirmed();
                    } else {
                        info!(
                            "Transaction {} rejected by the ledger program: {}",
                            transaction_id,
                            receipt.reason.as_deref().unwrap_or("no reason given")
                        );
                        record.status = TransactionStatus::Rejected;
                        self.metrics.record_rejected();
                    }
                    return Ok(record);
                }
                Ok(None) => {
                    debug!(
                        "No receipt yet for {} (poll {}, next in {:?})",
                        transaction_id, polls, delay
                    );
                }
                Err(e) if e.is_transient() => {
                    debug!(
                        "Transient receipt poll failure for {}: {}",
                        transaction_id, e
                    );
                }
                Err(e) => return Err(e),
            }

            delay = cmp::min(delay * 2, self.config.poll_max_delay());
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.poll_initial_delay();
        let capped = base.saturating_mul(1u32 << attempt.min(16));
        cmp::min(capped, self.config.poll_max_delay())
    }
}
