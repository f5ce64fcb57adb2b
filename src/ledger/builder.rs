//! Mapping domain intents onto ledger program calls.
//!
//! A pure translation step: given an intent, an allocated sequence number,
//! and resolved fee settings, produce the unsigned wire transaction against
//! the fixed program address. No network, no shared state.

use crate::error::Result;
use crate::ledger::abi::{self, AbiValue};
use crate::ledger::{Address, FeeSettings, Operation, TransactionIntent, UnsignedTransaction};
use primitive_types::U256;

pub(crate) const CREATE_PRODUCT: &str = "createProduct(string,string,string,string)";
pub(crate) const UPDATE_PRODUCT_STATUS: &str = "updateProductStatus(string,string)";
pub(crate) const ADD_TRACKING_EVENT: &str =
    "addTrackingEvent(string,string,uint256,string,string)";

/// Builds unsigned transactions against a fixed ledger program
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    program: Address,
    chain_id: u64,
}

impl TransactionBuilder {
    pub fn new(program: Address, chain_id: u64) -> Self {
        Self { program, chain_id }
    }

    /// The program address transactions are built against
    pub fn program(&self) -> Address {
        self.program
    }

    pub fn build(
        &self,
        intent: &TransactionIntent,
        sequence: u64,
        fees: &FeeSettings,
    ) -> Result<UnsignedTransaction> {
        let call_data = self.encode_operation(&intent.operation)?;
        Ok(UnsignedTransaction {
            chain_id: self.chain_id,
            sequence,
            program: self.program,
            gas_limit: fees.gas_limit,
            gas_price: fees.gas_price,
            call_data,
        })
    }

    fn encode_operation(&self, operation: &Operation) -> Result<Vec<u8>> {
        let data = match operation {
            Operation::CreateProduct(data) => abi::encode_call(
                CREATE_PRODUCT,
                &[
                    AbiValue::Str(data.id.clone()),
                    AbiValue::Str(data.name.clone()),
                    AbiValue::Str(data.manufacturer.clone()),
                    AbiValue::Str(data.batch_number.clone()),
                ],
            ),
            Operation::UpdateStatus { product_id, status } => abi::encode_call(
                UPDATE_PRODUCT_STATUS,
                &[
                    AbiValue::Str(product_id.clone()),
                    AbiValue::Str(status.as_str().to_string()),
                ],
            ),
            Operation::AddTrackingEvent { product_id, event } => abi::encode_call(
                ADD_TRACKING_EVENT,
                &[
                    AbiValue::Str(product_id.clone()),
                    AbiValue::Str(event.location.clone()),
                    AbiValue::Uint(U256::from(event.timestamp)),
                    AbiValue::Str(event.event_type.as_str().to_string()),
                    AbiValue::Str(serde_json::to_string(&event.additional_data)?),
                ],
            ),
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::abi::selector;
    use crate::product::{ProductData, TrackingEvent, TrackingEventKind};

    fn builder() -> TransactionBuilder {
        TransactionBuilder::new(Address([0x42; 20]), 1)
    }

    fn fees() -> FeeSettings {
        FeeSettings {
            gas_limit: 2_000_000,
            gas_price: U256::from(1_000_000_000u64),
        }
    }

    #[test]
    fn test_build_create_product() {
        let intent = TransactionIntent::create_product(ProductData {
            id: "P1".to_string(),
            name: "Widget".to_string(),
            manufacturer: "M1".to_string(),
            batch_number: "BATCH-2024-001".to_string(),
        });

        let tx = builder().build(&intent, 9, &fees()).unwrap();
        assert_eq!(tx.sequence, 9);
        assert_eq!(tx.chain_id, 1);
        assert_eq!(tx.program, Address([0x42; 20]));
        assert_eq!(tx.gas_limit, 2_000_000);
        assert_eq!(&tx.call_data[..4], &selector(CREATE_PRODUCT));
    }

    #[test]
    fn test_build_update_status_encodes_status_string() {
        let intent =
            TransactionIntent::update_status("P1", crate::product::ProductStatus::InTransit);
        let tx = builder().build(&intent, 0, &fees()).unwrap();
        assert_eq!(&tx.call_data[..4], &selector(UPDATE_PRODUCT_STATUS));
        // the status travels as its lowercase wire name
        let needle = b"in_transit";
        assert!(tx
            .call_data
            .windows(needle.len())
            .any(|window| window == needle));
    }

    #[test]
    fn test_build_tracking_event_serializes_payload() {
        let intent = TransactionIntent::add_tracking_event(
            "P1",
            TrackingEvent {
                location: "Rotterdam".to_string(),
                timestamp: 1_700_000_000,
                event_type: TrackingEventKind::Shipped,
                temperature: None,
                humidity: None,
                additional_data: serde_json::json!({"carrier": "MSC"}),
            },
        );
        let tx = builder().build(&intent, 2, &fees()).unwrap();
        assert_eq!(&tx.call_data[..4], &selector(ADD_TRACKING_EVENT));
        let needle = br#"{"carrier":"MSC"}"#;
        assert!(tx
            .call_data
            .windows(needle.len())
            .any(|window| window == needle));
    }

    #[test]
    fn test_identical_intents_build_identically() {
        let intent = TransactionIntent::update_status("P7", crate::product::ProductStatus::Recalled);
        let a = builder().build(&intent, 5, &fees()).unwrap();
        let b = builder().build(&intent, 5, &fees()).unwrap();
        assert_eq!(a.encode(), b.encode());
    }
}
