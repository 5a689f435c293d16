// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Native coin transfers (ETH on Ethereum, MATIC on Polygon).

use alloy::primitives::{Address, Bytes, U256};

use super::{SendError, SendingStrategy, TransferPayload};
use crate::blockchain::{ChainSpec, EvmTokenAmount};

/// Gas limit of a plain value transfer.
pub const NATIVE_TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Plain value transfer of the chain's native coin.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCoinSender;

impl SendingStrategy for NativeCoinSender {
    fn name(&self) -> &'static str {
        "native"
    }

    fn can_send(&self, symbol: &str, chain: &ChainSpec) -> bool {
        chain.blockchain.native_symbol().eq_ignore_ascii_case(symbol)
    }

    fn default_gas_limit(&self) -> U256 {
        U256::from(NATIVE_TRANSFER_GAS_LIMIT)
    }

    fn transfer_payload(
        &self,
        _symbol: &str,
        _chain: &ChainSpec,
        to: Address,
        amount: EvmTokenAmount,
    ) -> Result<TransferPayload, SendError> {
        Ok(TransferPayload {
            to,
            value: amount.wei(),
            data: Bytes::new(),
        })
    }
}
