// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! MPC connection errors.

use crate::blockchain::ChainSpec;
use crate::storage::StoreError;

use super::connector::ConnectorError;
use super::network::WalletsApiError;

#[derive(Debug, thiserror::Error)]
pub enum MpcError {
    /// A bootstrap step failed; the device's partial state was discarded.
    #[error("Bootstrap failed while {step}: {source}")]
    Bootstrap {
        step: &'static str,
        source: Box<MpcError>,
    },

    #[error(transparent)]
    Api(#[from] WalletsApiError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Access, refresh and bootstrap tokens are all expired.
    #[error("All auth tokens expired, the device must be bootstrapped again")]
    TokensExpired,

    #[error("No MPC wallet stored for device {0}")]
    WalletNotFound(String),

    #[error("Wallet account has no EVM address")]
    NoEvmAccount,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Asset {symbol} is not held on chain {}", chain.chain_id())]
    AssetNotFound { symbol: String, chain: ChainSpec },

    #[error("Transaction {transaction_id} not ready for signing after {attempts} attempts")]
    TransactionTimeout { transaction_id: String, attempts: u32 },

    #[error("Transaction {0} failed on the server")]
    TransactionFailed(String),

    #[error("Transaction {0} was already signed before this device joined")]
    TransactionAlreadyCompleted(String),

    #[error("Operation {operation_id} did not finish after {attempts} attempts")]
    OperationTimeout { operation_id: String, attempts: u32 },

    #[error("Operation {operation_id} failed: {reason}")]
    OperationFailed { operation_id: String, reason: String },

    #[error("Bootstrap was cancelled")]
    Cancelled,
}

impl MpcError {
    /// Step name of a bootstrap failure.
    pub fn bootstrap_step(&self) -> Option<&'static str> {
        match self {
            Self::Bootstrap { step, .. } => Some(step),
            _ => None,
        }
    }
}
