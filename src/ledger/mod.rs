//! Ledger transaction orchestration
//!
//! Turns a domain intent into a sequenced, signed, submitted, and confirmed
//! ledger write, and serves read-only history and verification queries.

use crate::error::{ChainTraceError, Result};
use crate::product::{ProductData, ProductStatus, TrackingEvent};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod abi;
pub mod builder;
pub mod query;
pub mod rpc;
pub mod sequence;
pub mod service;
pub mod submitter;

pub use builder::TransactionBuilder;
pub use query::{HistoryPager, LedgerQuery};
pub use rpc::{HttpNodeClient, LedgerNode, Receipt};
pub use sequence::{SequenceAllocator, SequenceLease, SequenceOutcome};
pub use service::LedgerService;
pub use submitter::SubmissionClient;

/// A 20-byte account or program address, hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address (0x0000...0000)
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create an address from a slice. Fails on wrong length.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 20 {
            return Err(ChainTraceError::Validation(format!(
                "address must be 20 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check for the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Address {
    type Err = ChainTraceError;

    fn from_str(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|_| ChainTraceError::Validation(format!("invalid address hex: {}", s)))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transaction identifier: Keccak-256 content hash of the signed envelope.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub [u8; 32]);

impl TransactionId {
    /// Parse a transaction id from its hex representation
    pub fn from_hex(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|_| ChainTraceError::Rpc(format!("invalid transaction id hex: {}", s)))?;
        if bytes.len() != 32 {
            return Err(ChainTraceError::Rpc(format!(
                "transaction id must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Serialize for TransactionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Terminal and in-flight transaction states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Submitted, outcome not yet known
    Pending,
    /// Durably included by the ledger
    Confirmed,
    /// Definitively refused by the node or the ledger program
    Rejected,
    /// Outcome indeterminate within the confirmation budget; the
    /// transaction may still land later and must be resolved by a
    /// history lookup, never assumed confirmed or rejected
    Unknown,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// A domain operation destined for the ledger program
#[derive(Debug, Clone)]
pub enum Operation {
    CreateProduct(ProductData),
    UpdateStatus {
        product_id: String,
        status: ProductStatus,
    },
    AddTrackingEvent {
        product_id: String,
        event: TrackingEvent,
    },
}

impl Operation {
    /// Stable operation kind name, used in logs and the dynamic constructor
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateProduct(_) => "create_product",
            Operation::UpdateStatus { .. } => "update_status",
            Operation::AddTrackingEvent { .. } => "add_tracking_event",
        }
    }

    /// The product this operation targets
    pub fn product_id(&self) -> &str {
        match self {
            Operation::CreateProduct(data) => &data.id,
            Operation::UpdateStatus { product_id, .. } => product_id,
            Operation::AddTrackingEvent { product_id, .. } => product_id,
        }
    }
}

/// A request to change ledger state. Ephemeral: exists only while a
/// submission is being orchestrated, then superseded by the
/// [`TransactionRecord`].
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    pub operation: Operation,
}

#[derive(Deserialize)]
struct UpdateStatusParams {
    product_id: String,
    status: ProductStatus,
}

#[derive(Deserialize)]
struct AddTrackingEventParams {
    product_id: String,
    #[serde(flatten)]
    event: TrackingEvent,
}

impl TransactionIntent {
    pub fn create_product(data: ProductData) -> Self {
        Self {
            operation: Operation::CreateProduct(data),
        }
    }

    pub fn update_status(product_id: impl Into<String>, status: ProductStatus) -> Self {
        Self {
            operation: Operation::UpdateStatus {
                product_id: product_id.into(),
                status,
            },
        }
    }

    pub fn add_tracking_event(product_id: impl Into<String>, event: TrackingEvent) -> Self {
        Self {
            operation: Operation::AddTrackingEvent {
                product_id: product_id.into(),
                event,
            },
        }
    }

    /// Construct an intent from a dynamic operation kind and a JSON payload,
    /// for callers that carry untyped requests (e.g. an API layer).
    pub fn from_parts(kind: &str, params: serde_json::Value) -> Result<Self> {
        match kind {
            "create_product" => Ok(Self::create_product(serde_json::from_value(params)?)),
            "update_status" => {
                let parsed: UpdateStatusParams = serde_json::from_value(params)?;
                Ok(Self::update_status(parsed.product_id, parsed.status))
            }
            "add_tracking_event" => {
                let parsed: AddTrackingEventParams = serde_json::from_value(params)?;
                Ok(Self::add_tracking_event(parsed.product_id, parsed.event))
            }
            other => Err(ChainTraceError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Resolved fee settings attached to a transaction
#[derive(Debug, Clone)]
pub struct FeeSettings {
    pub gas_limit: u64,
    pub gas_price: U256,
}

/// Wire-level transaction before signing
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub sequence: u64,
    pub program: Address,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub call_data: Vec<u8>,
}

impl UnsignedTransaction {
    /// Canonical binary payload. Field order and widths are fixed so the
    /// same transaction always encodes to the same bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(76 + self.call_data.len());
        out.extend_from_slice(&self.chain_id.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(self.program.as_bytes());
        out.extend_from_slice(&self.gas_limit.to_be_bytes());
        let mut price = [0u8; 32];
        self.gas_price.to_big_endian(&mut price);
        out.extend_from_slice(&price);
        out.extend_from_slice(&self.call_data);
        out
    }
}

/// The signed, wire-ready representation of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    payload: Vec<u8>,
    signature: [u8; 64],
    public_key: [u8; 33],
}

impl SignedEnvelope {
    pub fn new(payload: Vec<u8>, signature: [u8; 64], public_key: [u8; 33]) -> Self {
        Self {
            payload,
            signature,
            public_key,
        }
    }

    /// Full envelope bytes: payload, then signature, then public key
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 97);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.public_key);
        out
    }

    /// Hex representation submitted to the node
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encode()))
    }

    /// Transaction identifier: content hash of the envelope bytes
    pub fn id(&self) -> TransactionId {
        let digest = Keccak256::digest(self.encode());
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        TransactionId(id)
    }
}

/// The audit fact a submission leaves behind
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    /// Content hash of the signed envelope
    pub transaction_id: TransactionId,

    /// Sequence number the envelope was built with
    pub sequence: u64,

    /// Final (or in-flight) classification of the submission
    pub status: TransactionStatus,

    /// Identical-envelope resends performed after transient failures
    pub retry_count: u32,

    /// Submission wall-clock time in unix milliseconds
    pub submitted_at: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testutil;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr: Address = "0x00a329c0648769a73afac7f9381e08fb43dbea72"
            .parse()
            .unwrap();
        assert_eq!(
            addr.to_string(),
            "0x00a329c0648769a73afac7f9381e08fb43dbea72"
        );
        assert!(!addr.is_zero());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("zz".repeat(20).parse::<Address>().is_err());
    }

    #[test]
    fn test_unsigned_transaction_encoding_is_deterministic() {
        let tx = UnsignedTransaction {
            chain_id: 1,
            sequence: 7,
            program: Address([0xAB; 20]),
            gas_limit: 2_000_000,
            gas_price: U256::from(1_000_000_000u64),
            call_data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let first = tx.encode();
        let second = tx.encode();
        assert_eq!(first, second);
        // fixed header fields plus the call data tail
        assert_eq!(first.len(), 8 + 8 + 20 + 8 + 32 + 4);
        assert_eq!(&first[0..8], &1u64.to_be_bytes());
        assert_eq!(&first[8..16], &7u64.to_be_bytes());
    }

    #[test]
    fn test_envelope_id_differs_per_payload() {
        let a = SignedEnvelope::new(vec![1, 2, 3], [0u8; 64], [2u8; 33]);
        let b = SignedEnvelope::new(vec![1, 2, 4], [0u8; 64], [2u8; 33]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.id());
        assert!(a.to_hex().starts_with("0x"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Confirmed.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(TransactionStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_intent_from_parts_unknown_kind() {
        let err = TransactionIntent::from_parts("delete_product", serde_json::json!({}))
            .expect_err("unknown kinds must be refused");
        assert!(matches!(err, ChainTraceError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_intent_from_parts_update_status() {
        let intent = TransactionIntent::from_parts(
            "update_status",
            serde_json::json!({"product_id": "P1", "status": "in_transit"}),
        )
        .unwrap();
        assert_eq!(intent.operation.kind(), "update_status");
        assert_eq!(intent.operation.product_id(), "P1");
    }
}
