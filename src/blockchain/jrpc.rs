// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC client for EVM chains.
//!
//! Covers what a transfer needs: nonce, gas price, gas estimate and raw
//! transaction broadcast. The node connection sits behind [`EvmRpc`] so the
//! retry and error-mapping rules here can be exercised without a node.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::{
    primitives::{Address, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    transports::{RpcError, TransportErrorKind},
};
use async_trait::async_trait;

use super::signing::{sign_transaction, SigningError};
use super::transaction::EvmTransaction;
use crate::wallet::Wallet;

/// Delay before the single nonce retry.
pub const NONCE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Fast tier multiplier in percent of the node's gas price.
const FAST_TIER_PERCENT: u64 = 125;
/// Urgent tier multiplier in percent of the node's gas price.
const URGENT_TIER_PERCENT: u64 = 150;

/// JSON-RPC code nodes use for reverted calls.
const EXECUTION_ERROR_CODE: i64 = -32000;

/// Failure reported by the node transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFailure {
    /// JSON-RPC error code, when the node answered with an error object
    pub code: Option<i64>,
    pub message: String,
}

impl RpcFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Whether the node rejected a token call for lack of allowance.
    pub fn is_low_allowance(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        if message.contains("exceeds allowance")
            || message.contains("insufficient allowance")
            || message.contains("allowance exceeded")
        {
            return true;
        }
        // Geth-style execution error carrying a custom revert reason.
        self.code == Some(EXECUTION_ERROR_CODE) && message.contains("allowance")
    }
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for RpcFailure {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err.as_error_resp() {
            Some(payload) => Self {
                code: Some(payload.code),
                message: payload.message.to_string(),
            },
            None => Self::transport(err.to_string()),
        }
    }
}

/// Raw JSON-RPC methods used by the client.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// `eth_getTransactionCount` at the pending block.
    async fn transaction_count(&self, chain_id: u64, address: Address) -> Result<u64, RpcFailure>;

    /// `eth_gasPrice`
    async fn gas_price(&self, chain_id: u64) -> Result<u128, RpcFailure>;

    /// `eth_estimateGas`
    async fn estimate_gas(&self, chain_id: u64, tx: TransactionRequest) -> Result<u64, RpcFailure>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, chain_id: u64, raw: &[u8]) -> Result<B256, RpcFailure>;
}

/// [`EvmRpc`] over alloy HTTP providers, one per chain id.
pub struct AlloyRpc {
    providers: HashMap<u64, DynProvider>,
}

impl AlloyRpc {
    /// Build providers for `(chain_id, rpc_url)` pairs.
    pub fn new<'a>(
        endpoints: impl IntoIterator<Item = (u64, &'a str)>,
    ) -> Result<Self, JrpcError> {
        let mut providers = HashMap::new();
        for (chain_id, rpc_url) in endpoints {
            let url: url::Url = rpc_url
                .parse()
                .map_err(|e: url::ParseError| JrpcError::InvalidRpcUrl(e.to_string()))?;
            providers.insert(chain_id, ProviderBuilder::new().connect_http(url).erased());
        }
        Ok(Self { providers })
    }

    fn provider(&self, chain_id: u64) -> Result<&DynProvider, RpcFailure> {
        self.providers
            .get(&chain_id)
            .ok_or_else(|| RpcFailure::transport(format!("no RPC endpoint for chain {chain_id}")))
    }
}

#[async_trait]
impl EvmRpc for AlloyRpc {
    async fn transaction_count(&self, chain_id: u64, address: Address) -> Result<u64, RpcFailure> {
        let provider = self.provider(chain_id)?;
        Ok(provider.get_transaction_count(address).pending().await?)
    }

    async fn gas_price(&self, chain_id: u64) -> Result<u128, RpcFailure> {
        let provider = self.provider(chain_id)?;
        Ok(provider.get_gas_price().await?)
    }

    async fn estimate_gas(&self, chain_id: u64, tx: TransactionRequest) -> Result<u64, RpcFailure> {
        let provider = self.provider(chain_id)?;
        Ok(provider.estimate_gas(tx).await?)
    }

    async fn send_raw_transaction(&self, chain_id: u64, raw: &[u8]) -> Result<B256, RpcFailure> {
        let provider = self.provider(chain_id)?;
        let pending = provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }
}

/// Gas price tiers from a single estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatedGasPrices {
    pub normal: U256,
    pub fast: U256,
    pub urgent: U256,
}

impl EstimatedGasPrices {
    /// Derive the three tiers from the node's base gas price.
    pub fn from_base(base: U256) -> Self {
        let hundred = U256::from(100u64);
        Self {
            normal: base,
            fast: base * U256::from(FAST_TIER_PERCENT) / hundred,
            urgent: base * U256::from(URGENT_TIER_PERCENT) / hundred,
        }
    }
}

/// JSON-RPC client shared by every sender strategy.
#[derive(Clone)]
pub struct JrpcClient {
    rpc: Arc<dyn EvmRpc>,
    nonce_retry_delay: Duration,
}

impl JrpcClient {
    pub fn new(rpc: Arc<dyn EvmRpc>) -> Self {
        Self {
            rpc,
            nonce_retry_delay: NONCE_RETRY_DELAY,
        }
    }

    /// Override the nonce retry delay.
    pub fn with_nonce_retry_delay(mut self, delay: Duration) -> Self {
        self.nonce_retry_delay = delay;
        self
    }

    /// Fetch the next nonce for `address`. Retries once.
    pub async fn fetch_nonce(&self, address: &str, chain_id: u64) -> Result<u64, JrpcError> {
        let address = Address::from_str(address)
            .map_err(|e| JrpcError::InvalidAddress(e.to_string()))?;

        match self.rpc.transaction_count(chain_id, address).await {
            Ok(nonce) => Ok(nonce),
            Err(first) => {
                tracing::warn!(
                    chain_id,
                    %address,
                    error = %first,
                    "Nonce fetch failed, retrying once"
                );
                tokio::time::sleep(self.nonce_retry_delay).await;
                self.rpc
                    .transaction_count(chain_id, address)
                    .await
                    .map_err(|e| JrpcError::NonceFetchFailed(e.to_string()))
            }
        }
    }

    /// Fetch the node's current gas price.
    pub async fn fetch_gas_price(&self, chain_id: u64) -> Result<U256, JrpcError> {
        self.rpc
            .gas_price(chain_id)
            .await
            .map(U256::from)
            .map_err(|e| JrpcError::GasFetchFailed(e.to_string()))
    }

    /// Fetch normal / fast / urgent gas prices with one RPC call.
    pub async fn estimated_gas_prices(&self, chain_id: u64) -> Result<EstimatedGasPrices, JrpcError> {
        let base = self.fetch_gas_price(chain_id).await?;
        Ok(EstimatedGasPrices::from_base(base))
    }

    /// Estimate the gas limit of `tx` by simulation.
    pub async fn fetch_gas_limit(&self, tx: &EvmTransaction, chain_id: u64) -> Result<U256, JrpcError> {
        // The simulation must not be bounded by the conservative default.
        let mut request = tx.to_request();
        request.gas = None;

        match self.rpc.estimate_gas(chain_id, request).await {
            Ok(limit) => Ok(U256::from(limit)),
            Err(failure) if failure.is_low_allowance() => Err(JrpcError::LowAllowance),
            Err(failure) => Err(JrpcError::GasFetchFailed(failure.to_string())),
        }
    }

    /// Sign `tx` with the wallet's local key and broadcast it.
    pub async fn send_tx(
        &self,
        tx: &EvmTransaction,
        wallet: &Wallet,
        chain_id: u64,
    ) -> Result<String, JrpcError> {
        let signer = wallet.private_key().ok_or(JrpcError::NoPrivateKey)?;
        let signed = sign_transaction(tx, signer).await?;

        let hash = self
            .rpc
            .send_raw_transaction(chain_id, &signed.raw)
            .await
            .map_err(|e| JrpcError::SendFailed(e.to_string()))?;

        tracing::info!(chain_id, tx_hash = %hash, "Broadcast raw transaction");
        Ok(format!("{hash:#x}"))
    }
}

/// Errors that can occur during JSON-RPC operations.
#[derive(Debug, thiserror::Error)]
pub enum JrpcError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to fetch nonce: {0}")]
    NonceFetchFailed(String),

    #[error("Failed to fetch gas: {0}")]
    GasFetchFailed(String),

    #[error("Token allowance is too low for this transfer")]
    LowAllowance,

    #[error("Wallet has no local private key")]
    NoPrivateKey,

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("Failed to send transaction: {0}")]
    SendFailed(String),
}
