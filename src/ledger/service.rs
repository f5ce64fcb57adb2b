//! The ledger service facade.
//!
//! Wires validation, fee resolution, sequence allocation, signing,
//! submission, and the read-side queries into one explicitly constructed
//! service. Built once at process start from configuration; per-request
//! identity secrets flow through call parameters and are never stored.

use crate::config::{Config, FeeConfig, GasPriceStrategy};
use crate::error::{ChainTraceError, Result};
use crate::ledger::builder::TransactionBuilder;
use crate::ledger::query::{HistoryPager, LedgerQuery, ProductSnapshot};
use crate::ledger::rpc::{HttpNodeClient, LedgerNode};
use crate::ledger::sequence::{SequenceAllocator, SequenceOutcome};
use crate::ledger::submitter::SubmissionClient;
use crate::ledger::{
    FeeSettings, Operation, TransactionIntent, TransactionRecord, TransactionStatus,
};
use crate::monitoring::{MetricsSnapshot, SubmissionMetrics};
use crate::product::{reconstruct_product, HistoryEntry, Product, ProductData, TrackingEvent};
use crate::product::ProductStatus;
use crate::signer::SigningIdentity;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Orchestrates ledger writes and reads for supply-chain products
pub struct LedgerService {
    node: Arc<dyn LedgerNode>,
    builder: TransactionBuilder,
    sequences: SequenceAllocator,
    submitter: SubmissionClient,
    query: LedgerQuery,
    fees: FeeConfig,
    metrics: Arc<SubmissionMetrics>,
}

impl LedgerService {
    /// Construct the service against the configured HTTP node
    pub fn new(config: &Config) -> Result<Self> {
        let node: Arc<dyn LedgerNode> = Arc::new(HttpNodeClient::new(&config.node)?);
        Self::with_node(node, config)
    }

    /// Construct the service against an arbitrary node implementation
    pub fn with_node(node: Arc<dyn LedgerNode>, config: &Config) -> Result<Self> {
        let program = config.ledger.program_address()?;
        if program.is_zero() {
            warn!("Ledger program address is the zero address; configure ledger.program_address");
        }

        let metrics = Arc::new(SubmissionMetrics::new());
        Ok(Self {
            builder: TransactionBuilder::new(program, config.ledger.chain_id),
            sequences: SequenceAllocator::new(node.clone(), metrics.clone()),
            submitter: SubmissionClient::new(
                node.clone(),
                config.submission.clone(),
                metrics.clone(),
            ),
            query: LedgerQuery::new(
                node.clone(),
                program,
                config.query.page_size,
                config.query.retry_attempts,
            ),
            node,
            fees: config.fees.clone(),
            metrics,
        })
    }

    /// Record a new product on the ledger. The product starts as
    /// `manufactured`.
    pub async fn create_product(
        &self,
        data: ProductData,
        secret: &str,
    ) -> Result<TransactionRecord> {
        self.submit_intent(TransactionIntent::create_product(data), secret, None)
            .await
    }

    /// Request a status transition for a product
    pub async fn update_status(
        &self,
        product_id: &str,
        status: ProductStatus,
        secret: &str,
    ) -> Result<TransactionRecord> {
        self.submit_intent(
            TransactionIntent::update_status(product_id, status),
            secret,
            None,
        )
        .await
    }

    /// Append a tracking event to a product's stream
    pub async fn add_tracking_event(
        &self,
        product_id: &str,
        event: TrackingEvent,
        secret: &str,
    ) -> Result<TransactionRecord> {
        self.submit_intent(
            TransactionIntent::add_tracking_event(product_id, event),
            secret,
            None,
        )
        .await
    }

    /// Validate and submit an intent, optionally bounding the confirmation
    /// wait with a caller deadline. A deadline that elapses yields a record
    /// with status `unknown`; the submission itself is never retracted.
    pub async fn submit_intent(
        &self,
        intent: TransactionIntent,
        secret: &str,
        deadline: Option<Duration>,
    ) -> Result<TransactionRecord> {
        self.validate_intent(&intent).await?;
        self.execute(intent, secret, deadline).await
    }

    /// Full confirmed history of a product, in ledger confirmation order
    pub async fn get_history(&self, product_id: &str) -> Result<Vec<HistoryEntry>> {
        self.query.history(product_id).await
    }

    /// Restartable history cursor for large result sets
    pub fn history_pager(&self, product_id: &str) -> HistoryPager {
        self.query.history_pager(product_id)
    }

    /// Current confirmed status and record hash of a product
    pub async fn verify(&self, product_id: &str) -> Result<ProductSnapshot> {
        self.query.verify(product_id).await
    }

    /// Reconstruct a product's current state from its confirmed history
    pub async fn get_product(&self, product_id: &str) -> Result<Product> {
        let history = self.query.history(product_id).await?;
        reconstruct_product(&history)
    }

    /// Point-in-time submission metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Pre-network validation. Transition legality is checked against the
    /// last confirmed status read from the ledger; two racing callers can
    /// both pass this check, and the ledger program arbitrates; the loser
    /// comes back as a `rejected` record, not an error.
    async fn validate_intent(&self, intent: &TransactionIntent) -> Result<()> {
        match &intent.operation {
            Operation::CreateProduct(data) => data.validate(),
            Operation::UpdateStatus { product_id, status } => {
                if product_id.trim().is_empty() {
                    return Err(ChainTraceError::Validation(
                        "product id must not be empty".to_string(),
                    ));
                }
                let snapshot = self.query.verify(product_id).await?;
                if !snapshot.status.can_transition_to(*status) {
                    return Err(ChainTraceError::IllegalTransition {
                        from: snapshot.status,
                        to: *status,
                    });
                }
                Ok(())
            }
            Operation::AddTrackingEvent { product_id, event } => {
                if product_id.trim().is_empty() {
                    return Err(ChainTraceError::Validation(
                        "product id must not be empty".to_string(),
                    ));
                }
                event.validate()
            }
        }
    }

    async fn execute(
        &self,
        intent: TransactionIntent,
        secret: &str,
        deadline: Option<Duration>,
    ) -> Result<TransactionRecord> {
        let identity = SigningIdentity::from_secret(secret)?;
        let fees = self.resolve_fees().await?;

        let lease = self.sequences.allocate(identity.address()).await?;
        debug!(
            "Executing {} for product {} as {} with sequence {}",
            intent.operation.kind(),
            intent.operation.product_id(),
            identity.address(),
            lease.value()
        );

        let unsigned = self.builder.build(&intent, lease.value(), &fees)?;
        let envelope = identity.sign(&unsigned);

        let record = match self
            .submitter
            .submit_and_confirm(&envelope, lease.value(), deadline)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                lease.release(SequenceOutcome::Abandoned);
                return Err(e);
            }
        };

        lease.release(match record.status {
            TransactionStatus::Confirmed => SequenceOutcome::Confirmed,
            TransactionStatus::Rejected => SequenceOutcome::Rejected,
            TransactionStatus::Pending | TransactionStatus::Unknown => SequenceOutcome::Abandoned,
        });

        info!(
            "{} for product {} -> {} ({:?})",
            intent.operation.kind(),
            intent.operation.product_id(),
            record.transaction_id,
            record.status
        );
        Ok(record)
    }

    async fn resolve_fees(&self) -> Result<FeeSettings> {
        let gas_price = match self.fees.strategy() {
            GasPriceStrategy::Fixed(price) => price,
            GasPriceStrategy::QueryNodeCurrent => self.node.gas_price().await?,
        };
        Ok(FeeSettings {
            gas_limit: self.fees.gas_limit,
            gas_price,
        })
    }
}
