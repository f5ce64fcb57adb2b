//! Product lifecycle domain: status machine, tracking events, and the
//! read-side history model reconstructed from ledger records.

use crate::error::{ChainTraceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Product lifecycle status.
///
/// The ledger is append-only, so `Recalled` is a terminal marker rather
/// than a removal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Manufactured,
    InTransit,
    Delivered,
    Recalled,
}

impl ProductStatus {
    /// Statuses legally reachable from this one in a single transition
    pub fn allowed_transitions(&self) -> &'static [ProductStatus] {
        match self {
            ProductStatus::Manufactured => {
                &[ProductStatus::InTransit, ProductStatus::Recalled]
            }
            ProductStatus::InTransit => &[ProductStatus::Delivered, ProductStatus::Recalled],
            ProductStatus::Delivered => &[ProductStatus::Recalled],
            ProductStatus::Recalled => &[],
        }
    }

    pub fn can_transition_to(&self, target: ProductStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Manufactured => "manufactured",
            ProductStatus::InTransit => "in_transit",
            ProductStatus::Delivered => "delivered",
            ProductStatus::Recalled => "recalled",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = ChainTraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manufactured" => Ok(ProductStatus::Manufactured),
            "in_transit" => Ok(ProductStatus::InTransit),
            "delivered" => Ok(ProductStatus::Delivered),
            "recalled" => Ok(ProductStatus::Recalled),
            other => Err(ChainTraceError::Validation(format!(
                "unknown product status: {}",
                other
            ))),
        }
    }
}

/// Caller-supplied data for a product creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductData {
    /// Opaque product identifier
    pub id: String,

    /// Product name
    pub name: String,

    /// Manufacturer reference
    pub manufacturer: String,

    /// Batch number, `BATCH-YYYY-NNN`
    pub batch_number: String,
}

impl ProductData {
    /// Reject malformed creation data before any network call is made
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ChainTraceError::Validation(
                "product id must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(ChainTraceError::Validation(
                "product name must not be empty".to_string(),
            ));
        }
        if self.manufacturer.trim().is_empty() {
            return Err(ChainTraceError::Validation(
                "manufacturer must not be empty".to_string(),
            ));
        }
        if !is_valid_batch_number(&self.batch_number) {
            return Err(ChainTraceError::Validation(format!(
                "batch number must match BATCH-YYYY-NNN, got '{}'",
                self.batch_number
            )));
        }
        Ok(())
    }
}

/// Batch numbers look like `BATCH-2024-001`
fn is_valid_batch_number(s: &str) -> bool {
    let mut parts = s.split('-');
    let (prefix, year, serial) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(y), Some(n), None) => (p, y, n),
        _ => return false,
    };
    prefix == "BATCH"
        && year.len() == 4
        && year.chars().all(|c| c.is_ascii_digit())
        && serial.len() == 3
        && serial.chars().all(|c| c.is_ascii_digit())
}

/// Tracking event kinds recognized by the ledger program
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackingEventKind {
    Created,
    Shipped,
    Received,
    Stored,
    Delivered,
}

impl TrackingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingEventKind::Created => "created",
            TrackingEventKind::Shipped => "shipped",
            TrackingEventKind::Received => "received",
            TrackingEventKind::Stored => "stored",
            TrackingEventKind::Delivered => "delivered",
        }
    }
}

impl fmt::Display for TrackingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single tracking observation for a product.
///
/// Immutable once confirmed; ordering is the ledger's confirmation order,
/// not client submission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingEvent {
    /// Where the observation was made
    pub location: String,

    /// Observation time, unix seconds
    pub timestamp: u64,

    /// What happened
    pub event_type: TrackingEventKind,

    /// Optional environmental reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Optional environmental reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    /// Opaque structured payload carried alongside the event
    #[serde(default)]
    pub additional_data: serde_json::Value,
}

impl TrackingEvent {
    /// Reject malformed events before any network call is made
    pub fn validate(&self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(ChainTraceError::Validation(
                "event location must not be empty".to_string(),
            ));
        }
        if self.timestamp == 0 {
            return Err(ChainTraceError::Validation(
                "event timestamp must be set".to_string(),
            ));
        }
        Ok(())
    }
}

/// A product as reconstructed from its confirmed ledger history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub batch_number: String,

    /// Creation time, unix seconds
    pub created_at: u64,

    /// Last confirmed status
    pub status: ProductStatus,
}

/// One confirmed ledger record in a product's history, in confirmation order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Created {
        id: String,
        name: String,
        manufacturer: String,
        batch_number: String,
        timestamp: u64,
    },
    StatusChanged {
        status: ProductStatus,
        timestamp: u64,
    },
    Tracked(TrackingEvent),
}

impl HistoryEntry {
    pub fn timestamp(&self) -> u64 {
        match self {
            HistoryEntry::Created { timestamp, .. } => *timestamp,
            HistoryEntry::StatusChanged { timestamp, .. } => *timestamp,
            HistoryEntry::Tracked(event) => event.timestamp,
        }
    }
}

/// Fold a confirmed history back into the product's current state.
///
/// The history must begin with the creation record; status changes are
/// applied in ledger order. The ledger program is the arbiter of legality,
/// so a transition that looks illegal here is kept as-is rather than
/// rejected.
pub fn reconstruct_product(history: &[HistoryEntry]) -> Result<Product> {
    let mut entries = history.iter();

    let mut product = match entries.next() {
        Some(HistoryEntry::Created {
            id,
            name,
            manufacturer,
            batch_number,
            timestamp,
        }) => Product {
            id: id.clone(),
            name: name.clone(),
            manufacturer: manufacturer.clone(),
            batch_number: batch_number.clone(),
            created_at: *timestamp,
            status: ProductStatus::Manufactured,
        },
        Some(_) => {
            return Err(ChainTraceError::Rpc(
                "product history does not begin with a creation record".to_string(),
            ))
        }
        None => {
            return Err(ChainTraceError::Rpc(
                "product history is empty".to_string(),
            ))
        }
    };

    for entry in entries {
        if let HistoryEntry::StatusChanged { status, .. } = entry {
            product.status = *status;
        }
    }

    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: TrackingEventKind) -> TrackingEvent {
        TrackingEvent {
            location: "Rotterdam".to_string(),
            timestamp: 1_700_000_000,
            event_type: kind,
            temperature: Some(4.5),
            humidity: None,
            additional_data: serde_json::json!({"carrier": "MSC"}),
        }
    }

    #[test]
    fn test_transition_table() {
        use ProductStatus::*;

        assert!(Manufactured.can_transition_to(InTransit));
        assert!(Manufactured.can_transition_to(Recalled));
        assert!(!Manufactured.can_transition_to(Delivered));
        assert!(!Manufactured.can_transition_to(Manufactured));

        assert!(InTransit.can_transition_to(Delivered));
        assert!(InTransit.can_transition_to(Recalled));
        assert!(!InTransit.can_transition_to(Manufactured));

        assert!(Delivered.can_transition_to(Recalled));
        assert!(!Delivered.can_transition_to(InTransit));

        assert!(Recalled.is_terminal());
        assert!(!Recalled.can_transition_to(Manufactured));
        assert!(!Recalled.can_transition_to(Recalled));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            ProductStatus::Manufactured,
            ProductStatus::InTransit,
            ProductStatus::Delivered,
            ProductStatus::Recalled,
        ] {
            assert_eq!(status.as_str().parse::<ProductStatus>().unwrap(), status);
        }
        assert!("lost".parse::<ProductStatus>().is_err());
    }

    #[test]
    fn test_batch_number_format() {
        assert!(is_valid_batch_number("BATCH-2024-001"));
        assert!(is_valid_batch_number("BATCH-1999-999"));
        assert!(!is_valid_batch_number("BATCH-24-001"));
        assert!(!is_valid_batch_number("BATCH-2024-1"));
        assert!(!is_valid_batch_number("batch-2024-001"));
        assert!(!is_valid_batch_number("BATCH-2024-001-X"));
        assert!(!is_valid_batch_number(""));
    }

    #[test]
    fn test_product_data_validation() {
        let data = ProductData {
            id: "P1".to_string(),
            name: "Widget".to_string(),
            manufacturer: "M1".to_string(),
            batch_number: "BATCH-2024-001".to_string(),
        };
        assert!(data.validate().is_ok());

        let mut bad = data.clone();
        bad.name = "  ".to_string();
        assert!(matches!(
            bad.validate(),
            Err(ChainTraceError::Validation(_))
        ));

        let mut bad = data;
        bad.batch_number = "LOT-2024-001".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_tracking_event_validation() {
        assert!(event(TrackingEventKind::Shipped).validate().is_ok());

        let mut bad = event(TrackingEventKind::Shipped);
        bad.location.clear();
        assert!(bad.validate().is_err());

        let mut bad = event(TrackingEventKind::Shipped);
        bad.timestamp = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_history_entry_json_shape() {
        let json = r#"{"kind":"status_changed","status":"in_transit","timestamp":1700000100}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(
            entry,
            HistoryEntry::StatusChanged {
                status: ProductStatus::InTransit,
                timestamp: 1_700_000_100,
            }
        );

        let json = r#"{"kind":"tracked","location":"Rotterdam","timestamp":1700000000,
                       "event_type":"shipped","temperature":4.5,
                       "additional_data":{"carrier":"MSC"}}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry, HistoryEntry::Tracked(event(TrackingEventKind::Shipped)));
    }

    #[test]
    fn test_reconstruct_product() {
        let history = vec![
            HistoryEntry::Created {
                id: "P1".to_string(),
                name: "Widget".to_string(),
                manufacturer: "M1".to_string(),
                batch_number: "BATCH-2024-001".to_string(),
                timestamp: 1_700_000_000,
            },
            HistoryEntry::Tracked(event(TrackingEventKind::Shipped)),
            HistoryEntry::StatusChanged {
                status: ProductStatus::InTransit,
                timestamp: 1_700_000_200,
            },
            HistoryEntry::StatusChanged {
                status: ProductStatus::Delivered,
                timestamp: 1_700_000_300,
            },
        ];

        let product = reconstruct_product(&history).unwrap();
        assert_eq!(product.id, "P1");
        assert_eq!(product.created_at, 1_700_000_000);
        assert_eq!(product.status, ProductStatus::Delivered);
        assert_eq!(history[0].timestamp(), 1_700_000_000);
        assert_eq!(history[3].timestamp(), 1_700_000_300);
    }

    #[test]
    fn test_reconstruct_requires_creation_first() {
        let history = vec![HistoryEntry::StatusChanged {
            status: ProductStatus::InTransit,
            timestamp: 1,
        }];
        assert!(reconstruct_product(&history).is_err());
        assert!(reconstruct_product(&[]).is_err());
    }
}
