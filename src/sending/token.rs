// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 token transfers.

use std::str::FromStr;

use alloy::primitives::{Address, U256};

use super::{SendError, SendingStrategy, TransferPayload};
use crate::blockchain::{erc20::transfer_calldata, find_token, ChainSpec, EvmTokenAmount};

/// Conservative gas limit of an ERC-20 `transfer`.
pub const TOKEN_TRANSFER_GAS_LIMIT: u64 = 100_000;

/// `transfer(to, amount)` call against a known token contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenSender;

impl TokenSender {
    fn contract(symbol: &str, chain: &ChainSpec) -> Option<(Address, u8)> {
        let token = find_token(symbol, chain.blockchain)?;
        let address = Address::from_str(token.address_for(chain.env)?).ok()?;
        Some((address, token.decimals))
    }
}

impl SendingStrategy for TokenSender {
    fn name(&self) -> &'static str {
        "erc20"
    }

    fn can_send(&self, symbol: &str, chain: &ChainSpec) -> bool {
        Self::contract(symbol, chain).is_some()
    }

    fn default_gas_limit(&self) -> U256 {
        U256::from(TOKEN_TRANSFER_GAS_LIMIT)
    }

    fn transfer_payload(
        &self,
        symbol: &str,
        chain: &ChainSpec,
        to: Address,
        amount: EvmTokenAmount,
    ) -> Result<TransferPayload, SendError> {
        let (contract, decimals) = Self::contract(symbol, chain).ok_or_else(|| {
            SendError::SendingNotSupported {
                symbol: symbol.to_string(),
                chain: *chain,
            }
        })?;

        Ok(TransferPayload {
            to: contract,
            value: U256::ZERO,
            data: transfer_calldata(to, amount.to_atomic(decimals)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Environment, USDT_ETHEREUM};

    #[test]
    fn matches_deployed_tokens_only() {
        let sender = TokenSender;
        assert!(sender.can_send("USDT", &ChainSpec::ethereum(Environment::Mainnet)));
        assert!(sender.can_send("usdc", &ChainSpec::polygon(Environment::Mainnet)));
        // USDT has no Polygon testnet deployment.
        assert!(!sender.can_send("USDT", &ChainSpec::polygon(Environment::Testnet)));
        assert!(!sender.can_send("ETH", &ChainSpec::ethereum(Environment::Mainnet)));
    }

    #[test]
    fn payload_calls_the_contract_with_zero_value() {
        let chain = ChainSpec::ethereum(Environment::Mainnet);
        let recipient = Address::repeat_byte(0x44);
        let amount = EvmTokenAmount::parse_units("2.5", 6).unwrap();

        let payload = TokenSender
            .transfer_payload("USDT", &chain, recipient, amount)
            .unwrap();

        let contract = Address::from_str(USDT_ETHEREUM.mainnet_address.unwrap()).unwrap();
        assert_eq!(payload.to, contract);
        assert_eq!(payload.value, U256::ZERO);
        assert_eq!(payload.data, transfer_calldata(recipient, U256::from(2_500_000u64)));
    }
}
