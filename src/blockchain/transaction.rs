// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Unsigned EVM transfer transaction.

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
};
use serde::{Deserialize, Serialize};

/// A fully assembled legacy (gas-price) transaction, ready to be signed
/// locally or handed to an external signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransaction {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub chain_id: u64,
}

impl EvmTransaction {
    /// Maximum fee this transaction can burn: `gas_price * gas_limit`.
    pub fn max_fee(&self) -> U256 {
        self.gas_price.saturating_mul(self.gas_limit)
    }

    /// RPC request form, used for `eth_estimateGas` and signing.
    pub fn to_request(&self) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .with_from(self.from)
            .with_to(self.to)
            .with_value(self.value)
            .with_nonce(self.nonce)
            .with_gas_price(self.gas_price.saturating_to::<u128>())
            .with_gas_limit(self.gas_limit.saturating_to::<u64>())
            .with_chain_id(self.chain_id);
        if !self.data.is_empty() {
            request = request.with_input(self.data.clone());
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EvmTransaction {
        EvmTransaction {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            value: U256::from(5u64),
            data: Bytes::new(),
            nonce: 7,
            gas_price: U256::from(30_000_000_000u64),
            gas_limit: U256::from(21_000u64),
            chain_id: 1,
        }
    }

    #[test]
    fn max_fee_multiplies_price_and_limit() {
        assert_eq!(sample().max_fee(), U256::from(630_000_000_000_000u64));
    }

    #[test]
    fn request_carries_all_fields() {
        let request = sample().to_request();
        assert_eq!(request.from, Some(Address::repeat_byte(0x11)));
        assert_eq!(request.nonce, Some(7));
        assert_eq!(request.gas_price, Some(30_000_000_000u128));
        assert_eq!(request.gas, Some(21_000));
        assert_eq!(request.chain_id, Some(1));
        assert_eq!(request.value, Some(U256::from(5u64)));
    }
}
