// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Crypto sending for EVM chains.
//!
//! A [`CryptoSender`] owns a registry of [`SendingStrategy`] implementations
//! (native coin, ERC-20 token). The first strategy whose capability check
//! accepts a `(symbol, chain)` pair builds the transfer payload; the
//! transaction assembly around it is shared:
//!
//! 1. fetch the sender nonce
//! 2. fetch tiered gas prices once and pick the requested tier
//! 3. build with the strategy's conservative gas limit
//! 4. refine the limit by simulation, keeping the default on failure
//! 5. hand off to the external wallet, or sign locally and broadcast

pub mod external;
pub mod native;
pub mod token;

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::blockchain::{ChainSpec, EvmTokenAmount, EvmTransaction, JrpcClient, JrpcError};
use crate::wallet::{Wallet, WalletSigner};

pub use external::{ExternalSignError, ExternalSignerBridge, ExternalWalletTransport};
pub use native::NativeCoinSender;
pub use token::TokenSender;

/// Requested confirmation speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    #[default]
    Normal,
    Fast,
    Urgent,
}

/// What to send: token symbol, amount and speed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoSendingSpec {
    pub symbol: String,
    pub amount: EvmTokenAmount,
    pub speed: SpeedTier,
}

impl CryptoSendingSpec {
    pub fn new(symbol: impl Into<String>, amount: EvmTokenAmount, speed: SpeedTier) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            speed,
        }
    }
}

/// Destination, value and calldata produced by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPayload {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// A way of transferring a class of assets.
pub trait SendingStrategy: Send + Sync {
    /// Short identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Whether this strategy can move `symbol` on `chain`.
    fn can_send(&self, symbol: &str, chain: &ChainSpec) -> bool;

    /// Gas limit used when simulation is unavailable.
    fn default_gas_limit(&self) -> U256;

    /// Build the call for sending `amount` of `symbol` to `to`.
    fn transfer_payload(
        &self,
        symbol: &str,
        chain: &ChainSpec,
        to: Address,
        amount: EvmTokenAmount,
    ) -> Result<TransferPayload, SendError>;
}

/// Builds, signs and dispatches transfers.
pub struct CryptoSender {
    jrpc: JrpcClient,
    external: Arc<ExternalSignerBridge>,
    strategies: Vec<Box<dyn SendingStrategy>>,
}

impl CryptoSender {
    /// Sender with the native-coin and ERC-20 strategies registered.
    pub fn new(jrpc: JrpcClient, external: Arc<ExternalSignerBridge>) -> Self {
        Self::with_strategies(
            jrpc,
            external,
            vec![Box::new(NativeCoinSender), Box::new(TokenSender)],
        )
    }

    pub fn with_strategies(
        jrpc: JrpcClient,
        external: Arc<ExternalSignerBridge>,
        strategies: Vec<Box<dyn SendingStrategy>>,
    ) -> Self {
        Self {
            jrpc,
            external,
            strategies,
        }
    }

    fn strategy_for(&self, symbol: &str, chain: &ChainSpec) -> Option<&dyn SendingStrategy> {
        self.strategies
            .iter()
            .find(|s| s.can_send(symbol, chain))
            .map(|s| s.as_ref())
    }

    /// Whether any registered strategy can send `symbol` on `chain`.
    pub fn can_send_crypto(&self, symbol: &str, chain: &ChainSpec) -> bool {
        self.strategy_for(symbol, chain).is_some()
    }

    /// Name of the strategy that would handle `symbol` on `chain`.
    pub fn strategy_name(&self, symbol: &str, chain: &ChainSpec) -> Option<&'static str> {
        self.strategy_for(symbol, chain).map(|s| s.name())
    }

    /// Send `spec` from `wallet` to `to_address`; returns the tx hash.
    pub async fn send_crypto(
        &self,
        spec: &CryptoSendingSpec,
        chain: ChainSpec,
        wallet: &Wallet,
        to_address: &str,
    ) -> Result<String, SendError> {
        let strategy = self.require_strategy(&spec.symbol, &chain)?;

        if let WalletSigner::Mpc(_) = wallet.signer() {
            // MPC wallets transfer through the MPC connection service.
            return Err(SendError::Jrpc(JrpcError::NoPrivateKey));
        }

        let to = parse_address(to_address)?;
        let tx = self
            .build_transaction(strategy, &spec.symbol, &chain, wallet.address(), to, spec.amount, spec.speed)
            .await?;

        tracing::info!(
            strategy = strategy.name(),
            symbol = %spec.symbol,
            chain_id = tx.chain_id,
            nonce = tx.nonce,
            gas_limit = %tx.gas_limit,
            "Dispatching transfer"
        );

        match wallet.external_session() {
            Some(session) => Ok(self.external.send_transaction(session, tx).await?),
            None => Ok(self.jrpc.send_tx(&tx, wallet, chain.chain_id()).await?),
        }
    }

    /// Fee a transfer of `max_amount` would cost at `speed`, without
    /// broadcasting anything.
    pub async fn compute_gas_fee_from(
        &self,
        max_amount: EvmTokenAmount,
        symbol: &str,
        chain: ChainSpec,
        from_address: &str,
        to_address: &str,
        speed: SpeedTier,
    ) -> Result<EvmTokenAmount, SendError> {
        let strategy = self.require_strategy(symbol, &chain)?;
        let from = parse_address(from_address)?;
        let to = parse_address(to_address)?;

        let tx = self
            .build_transaction(strategy, symbol, &chain, from, to, max_amount, speed)
            .await?;
        Ok(EvmTokenAmount::from_wei(tx.max_fee()))
    }

    fn require_strategy(
        &self,
        symbol: &str,
        chain: &ChainSpec,
    ) -> Result<&dyn SendingStrategy, SendError> {
        self.strategy_for(symbol, chain)
            .ok_or_else(|| SendError::SendingNotSupported {
                symbol: symbol.to_string(),
                chain: *chain,
            })
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_transaction(
        &self,
        strategy: &dyn SendingStrategy,
        symbol: &str,
        chain: &ChainSpec,
        from: Address,
        to: Address,
        amount: EvmTokenAmount,
        speed: SpeedTier,
    ) -> Result<EvmTransaction, SendError> {
        let chain_id = chain.chain_id();
        let payload = strategy.transfer_payload(symbol, chain, to, amount)?;

        let nonce = self
            .jrpc
            .fetch_nonce(&from.to_string(), chain_id)
            .await?;

        let prices = self
            .jrpc
            .estimated_gas_prices(chain_id)
            .await
            .map_err(|e| SendError::FailedToFetchGasPrice(e.to_string()))?;
        let gas_price = match speed {
            SpeedTier::Normal => prices.normal,
            SpeedTier::Fast => prices.fast,
            SpeedTier::Urgent => prices.urgent,
        };

        let mut tx = EvmTransaction {
            from,
            to: payload.to,
            value: payload.value,
            data: payload.data,
            nonce,
            gas_price,
            gas_limit: strategy.default_gas_limit(),
            chain_id,
        };

        match self.jrpc.fetch_gas_limit(&tx, chain_id).await {
            Ok(limit) => tx.gas_limit = limit,
            Err(e) => {
                tracing::debug!(
                    strategy = strategy.name(),
                    chain_id,
                    error = %e,
                    "Gas limit simulation failed, keeping default"
                );
            }
        }

        Ok(tx)
    }
}

fn parse_address(raw: &str) -> Result<Address, SendError> {
    Address::from_str(raw.trim()).map_err(|e| SendError::InvalidAddresses(e.to_string()))
}

/// Errors from crypto sending.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Sending {symbol} is not supported on chain {}", chain.chain_id())]
    SendingNotSupported { symbol: String, chain: ChainSpec },

    #[error("Invalid addresses: {0}")]
    InvalidAddresses(String),

    #[error("Failed to fetch gas price: {0}")]
    FailedToFetchGasPrice(String),

    #[error(transparent)]
    Jrpc(#[from] JrpcError),

    #[error(transparent)]
    External(#[from] ExternalSignError),
}
