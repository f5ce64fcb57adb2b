//! Read-only ledger queries: product history and verification.
//!
//! Pure reads against the ledger program. Only ordinary transient-network
//! retry applies; there is no visibility guarantee relative to in-flight
//! writes, so a transaction confirmed moments ago may not show up yet.

use crate::error::{ChainTraceError, Result};
use crate::ledger::abi::{self, AbiValue};
use crate::ledger::rpc::LedgerNode;
use crate::ledger::Address;
use crate::product::{HistoryEntry, ProductStatus};
use primitive_types::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

pub(crate) const GET_PRODUCT_HISTORY_PAGE: &str =
    "getProductHistoryPage(string,uint256,uint256)";
pub(crate) const VERIFY_PRODUCT: &str = "verifyProduct(string)";

/// Current confirmed view of a product, as attested by the ledger program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product_id: String,
    pub status: ProductStatus,
    /// Content hash of the product's confirmed record
    pub content_hash: [u8; 32],
}

impl ProductSnapshot {
    pub fn content_hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.content_hash))
    }
}

/// Read-only query surface against the ledger program
pub struct LedgerQuery {
    node: Arc<dyn LedgerNode>,
    program: Address,
    page_size: usize,
    retry_attempts: u32,
}

impl LedgerQuery {
    pub fn new(
        node: Arc<dyn LedgerNode>,
        program: Address,
        page_size: usize,
        retry_attempts: u32,
    ) -> Self {
        Self {
            node,
            program,
            page_size,
            retry_attempts,
        }
    }

    /// Full confirmed history of a product, in ledger confirmation order
    pub async fn history(&self, product_id: &str) -> Result<Vec<HistoryEntry>> {
        let mut pager = self.history_pager(product_id);
        let mut entries = Vec::new();
        while let Some(page) = pager.next_page().await? {
            entries.extend(page);
        }
        Ok(entries)
    }

    /// A restartable cursor over a product's history, reading one page of
    /// entries per call. Useful when the result set is large.
    pub fn history_pager(&self, product_id: &str) -> HistoryPager {
        self.history_pager_from(product_id, 0)
    }

    /// Resume a history read from a previously reached offset
    pub fn history_pager_from(&self, product_id: &str, offset: usize) -> HistoryPager {
        HistoryPager {
            node: self.node.clone(),
            program: self.program,
            product_id: product_id.to_string(),
            page_size: self.page_size,
            retry_attempts: self.retry_attempts,
            offset,
            done: false,
        }
    }

    /// Current confirmed status and record hash of a product
    pub async fn verify(&self, product_id: &str) -> Result<ProductSnapshot> {
        let call_data = abi::encode_call(
            VERIFY_PRODUCT,
            &[AbiValue::Str(product_id.to_string())],
        );
        let data = call_with_retry(
            &self.node,
            &self.program,
            call_data,
            self.retry_attempts,
        )
        .await?;
        let (status, content_hash) = abi::decode_string_bytes32(&data)?;
        Ok(ProductSnapshot {
            product_id: product_id.to_string(),
            status: status.parse().map_err(|_| {
                ChainTraceError::Rpc(format!("node reported unknown status '{}'", status))
            })?,
            content_hash,
        })
    }
}

/// Restartable history read cursor
pub struct HistoryPager {
    node: Arc<dyn LedgerNode>,
    program: Address,
    product_id: String,
    page_size: usize,
    retry_attempts: u32,
    offset: usize,
    done: bool,
}

impl HistoryPager {
    /// Entries consumed so far; hand this to `history_pager_from` to resume
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Fetch the next page of entries, or `None` once exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<HistoryEntry>>> {
        if self.done {
            return Ok(None);
        }

        let call_data = abi::encode_call(
            GET_PRODUCT_HISTORY_PAGE,
            &[
                AbiValue::Str(self.product_id.clone()),
                AbiValue::Uint(U256::from(self.offset as u64)),
                AbiValue::Uint(U256::from(self.page_size as u64)),
            ],
        );
        let data =
            call_with_retry(&self.node, &self.program, call_data, self.retry_attempts).await?;
        let raw_entries = abi::decode_string_array(&data)?;

        let mut entries = Vec::with_capacity(raw_entries.len());
        for raw in &raw_entries {
            let entry: HistoryEntry = serde_json::from_str(raw).map_err(|e| {
                ChainTraceError::Rpc(format!("malformed history entry '{}': {}", raw, e))
            })?;
            entries.push(entry);
        }

        if entries.len() < self.page_size {
            self.done = true;
        }
        self.offset += entries.len();

        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(entries))
    }
}

async fn call_with_retry(
    node: &Arc<dyn LedgerNode>,
    program: &Address,
    call_data: Vec<u8>,
    attempts: u32,
) -> Result<Vec<u8>> {
    let mut attempt: u32 = 0;
    loop {
        match node.call(program, &call_data).await {
            Ok(data) => return Ok(data),
            Err(e) if e.is_transient() && attempt + 1 < attempts.max(1) => {
                attempt += 1;
                debug!("Transient read failure (attempt {}): {}", attempt, e);
                sleep(Duration::from_millis(100 * u64::from(attempt))).await;
            }
            Err(e) => return Err(e),
        }
    }
}
