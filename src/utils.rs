//! Utility functions for customer-facing identifiers

use crate::error::StoreError;
use bech32::Bech32m;
use uuid7::uuid7;

pub const ORDER_REFERENCE_HRP: &str = "order_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// A fresh reference shown to buyers and sellers instead of the numeric id.
pub fn order_reference() -> Result<String, StoreError> {
    new_uuid_to_bech32(ORDER_REFERENCE_HRP)
        .map_err(|e| StoreError::Backend(format!("order reference: {e}")))
}
