// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! MPC connection service.
//!
//! ## Bootstrap
//!
//! [`MpcConnectionService::sign_for_new_device`] attaches this device to an
//! existing custodial wallet and reports each step over a channel:
//!
//! 1. exchange the bootstrap code for a device id and short-lived token
//! 2. build the device connector
//! 3. request to join the existing wallet
//! 4. authorise the new device with the recovery phrase
//! 5. wait for the device key share
//! 6. open a key-material transaction and wait until it needs our signature
//! 7. co-sign it
//! 8. confirm it, receiving access / refresh / bootstrap tokens
//! 9. verify the access token
//! 10. fetch accounts and assets
//! 11. persist tokens, details and the wallet record in one transaction
//!
//! Any failure (or cancellation) stops the join flow and clears everything
//! stored for the device.
//!
//! ## Steady state
//!
//! Signing and transfers run through [`ActionsQueue`], one at a time per
//! device, after the token refresh chain yields a valid access token.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::connector::{ConnectorFactory, DeviceSigner, PollPolicy};
use super::error::MpcError;
use super::network::WalletsApi;
use super::queue::ActionsQueue;
use super::types::{
    AuthTokens, ConnectedWalletDetails, JwtToken, OperationResult, OperationStatus,
    SetupProgress, SetupTransactionStatus, WalletAccountWithAssets,
};
use crate::blockchain::{
    amount::format_amount, find_token, BlockchainType, ChainSpec, EvmTokenAmount,
};
use crate::storage::{TokenCache, WalletRecord, WalletStore};
use crate::wallet::{MpcWalletMetadata, Wallet};

/// Key-material transaction readiness polling.
pub const TX_READY_POLL: PollPolicy = PollPolicy::new(50, Duration::from_millis(500));
/// Operation status polling.
pub const OPERATION_POLL: PollPolicy = PollPolicy::new(50, Duration::from_millis(500));

const PROGRESS_BUFFER: usize = 16;

pub type ProgressEvent = Result<SetupProgress, MpcError>;

/// Consumer side of a running bootstrap.
///
/// Dropping the handle cancels the bootstrap.
pub struct BootstrapHandle {
    progress: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
}

impl BootstrapHandle {
    /// Next progress event; `None` once the bootstrap has ended.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.progress.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for BootstrapHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State a bootstrap accumulates, needed for rollback.
#[derive(Default)]
struct BootstrapRun {
    step: &'static str,
    device_id: Option<String>,
    connector: Option<Arc<dyn DeviceSigner>>,
}

#[derive(Clone)]
pub struct MpcConnectionService {
    api: Arc<dyn WalletsApi>,
    connectors: Arc<dyn ConnectorFactory>,
    store: Arc<WalletStore>,
    tokens: Arc<TokenCache>,
    queue: Arc<ActionsQueue>,
    tx_ready_poll: PollPolicy,
    operation_poll: PollPolicy,
}

impl MpcConnectionService {
    pub fn new(
        api: Arc<dyn WalletsApi>,
        connectors: Arc<dyn ConnectorFactory>,
        store: Arc<WalletStore>,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            api,
            connectors,
            store,
            tokens,
            queue: Arc::new(ActionsQueue::new()),
            tx_ready_poll: TX_READY_POLL,
            operation_poll: OPERATION_POLL,
        }
    }

    pub fn with_polling(mut self, tx_ready: PollPolicy, operation: PollPolicy) -> Self {
        self.tx_ready_poll = tx_ready;
        self.operation_poll = operation;
        self
    }

    /// Whether a signing or transfer operation is running for `device_id`.
    pub fn is_active(&self, device_id: &str) -> bool {
        self.queue.is_active(device_id)
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Start bootstrapping this device with `code` and `recovery_phrase`.
    pub fn sign_for_new_device(
        &self,
        code: impl Into<String>,
        recovery_phrase: impl Into<String>,
    ) -> BootstrapHandle {
        let (progress_tx, progress) = mpsc::channel(PROGRESS_BUFFER);
        let cancel = CancellationToken::new();
        let service = self.clone();
        let code = code.into();
        let recovery_phrase = recovery_phrase.into();
        let shutdown = cancel.clone();

        tokio::spawn(async move {
            let mut run = BootstrapRun::default();
            let outcome = tokio::select! {
                result = service.bootstrap(&mut run, &code, &recovery_phrase, &progress_tx) => Some(result),
                _ = shutdown.cancelled() => None,
            };

            match outcome {
                Some(Ok(wallet)) => {
                    tracing::info!(address = %wallet.address_string(), "MPC wallet bootstrapped");
                    let _ = progress_tx.send(Ok(SetupProgress::Finished(wallet))).await;
                }
                Some(Err(MpcError::Cancelled)) | None => {
                    tracing::info!(step = run.step, "Bootstrap cancelled");
                    service.rollback(&run);
                }
                Some(Err(e)) => {
                    tracing::warn!(step = run.step, error = %e, "Bootstrap failed");
                    service.rollback(&run);
                    let _ = progress_tx
                        .send(Err(MpcError::Bootstrap {
                            step: run.step,
                            source: Box::new(e),
                        }))
                        .await;
                }
            }
        });

        BootstrapHandle { progress, cancel }
    }

    async fn bootstrap(
        &self,
        run: &mut BootstrapRun,
        code: &str,
        recovery_phrase: &str,
        progress: &mpsc::Sender<ProgressEvent>,
    ) -> Result<Wallet, MpcError> {
        enter(run, progress, SetupProgress::SubmittingCode).await?;
        let session = self.api.submit_bootstrap_code(code).await?;
        let device_id = session.device_id.clone();
        let token = session.access_token.as_str();
        run.device_id = Some(device_id.clone());

        enter(run, progress, SetupProgress::InitialiseFireblocks).await?;
        let connector = self.connectors.connect(&device_id, token)?;
        run.connector = Some(Arc::clone(&connector));

        enter(run, progress, SetupProgress::RequestingToJoinExistingWallet).await?;
        let join_request_id = connector.request_join_existing_wallet().await?;

        enter(run, progress, SetupProgress::AuthorisingNewDevice).await?;
        self.api
            .authorise_new_device(token, &join_request_id, recovery_phrase)
            .await?;

        enter(run, progress, SetupProgress::WaitingForKeysIsReady).await?;
        connector.wait_for_key_is_ready().await?;

        enter(run, progress, SetupProgress::InitialiseTransaction).await?;
        let transaction_id = self.api.init_transaction(token).await?;

        enter(run, progress, SetupProgress::WaitingForTransactionIsReady).await?;
        self.wait_for_transaction_ready(token, &transaction_id).await?;

        enter(run, progress, SetupProgress::SigningTransaction).await?;
        connector.sign_transaction_with(&transaction_id).await?;

        enter(run, progress, SetupProgress::ConfirmingTransaction).await?;
        let tokens = self.api.confirm_transaction(token).await?;

        enter(run, progress, SetupProgress::VerifyingAccessToken).await?;
        self.api.verify_access_token(&tokens.access.jwt).await?;

        enter(run, progress, SetupProgress::GetWalletAccountDetails).await?;
        let accounts = self.accounts_with_assets(&tokens.access.jwt).await?;

        enter(run, progress, SetupProgress::StoreWallet).await?;
        let details = connected_details(&device_id, tokens, accounts)?;
        let address = evm_address(&details.first_account)?;
        let metadata = MpcWalletMetadata::for_device(&device_id);
        let wallet = Wallet::mpc(address, metadata.clone());
        let record = WalletRecord {
            device_id: device_id.clone(),
            address: wallet.address_string(),
            metadata,
            created_at: Utc::now(),
        };
        self.store.store_connection(&details, &record)?;
        self.tokens.put(&device_id, details.tokens.clone());

        connector.stop_join_wallet();
        Ok(wallet)
    }

    fn rollback(&self, run: &BootstrapRun) {
        if let Some(connector) = &run.connector {
            connector.stop_join_wallet();
        }
        if let Some(device_id) = &run.device_id {
            self.tokens.invalidate(device_id);
            if let Err(e) = self.store.clear_device(device_id) {
                tracing::error!(device_id = %device_id, error = %e, "Failed to clear device after bootstrap failure");
            }
        }
    }

    async fn wait_for_transaction_ready(
        &self,
        token: &str,
        transaction_id: &str,
    ) -> Result<(), MpcError> {
        let policy = self.tx_ready_poll;
        for attempt in 1..=policy.attempts {
            match self.api.transaction_status(token, transaction_id).await? {
                SetupTransactionStatus::PendingSignature => {
                    tracing::debug!(transaction_id, attempt, "Transaction awaiting device signature");
                    return Ok(());
                }
                SetupTransactionStatus::Failed => {
                    return Err(MpcError::TransactionFailed(transaction_id.to_string()));
                }
                SetupTransactionStatus::Completed => {
                    return Err(MpcError::TransactionAlreadyCompleted(transaction_id.to_string()));
                }
                SetupTransactionStatus::Submitted => {}
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Err(MpcError::TransactionTimeout {
            transaction_id: transaction_id.to_string(),
            attempts: policy.attempts,
        })
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    fn stored_tokens(&self, device_id: &str) -> Result<AuthTokens, MpcError> {
        if let Some(tokens) = self.tokens.get(device_id) {
            return Ok(tokens);
        }
        let tokens = self
            .store
            .auth_tokens(device_id)?
            .ok_or_else(|| MpcError::WalletNotFound(device_id.to_string()))?;
        self.tokens.put(device_id, tokens.clone());
        Ok(tokens)
    }

    fn save_tokens(&self, device_id: &str, tokens: &AuthTokens) -> Result<(), MpcError> {
        self.store.store_auth_tokens(device_id, tokens)?;
        self.tokens.put(device_id, tokens.clone());
        Ok(())
    }

    /// A valid access token for `device_id`.
    ///
    /// Tries, in order: the stored access token, the refresh token, then a
    /// re-key ceremony with the bootstrap token.
    pub async fn get_auth_tokens(&self, device_id: &str) -> Result<JwtToken, MpcError> {
        let tokens = self.stored_tokens(device_id)?;
        let now = Utc::now();

        if !tokens.access.is_expired_at(now) {
            return Ok(tokens.access);
        }

        if !tokens.refresh.is_expired_at(now) {
            tracing::debug!(device_id, "Access token expired, using refresh token");
            let refreshed = self.api.refresh_tokens(&tokens.refresh.jwt).await?;
            self.save_tokens(device_id, &refreshed)?;
            return Ok(refreshed.access);
        }

        if !tokens.bootstrap.is_expired_at(now) {
            tracing::info!(device_id, "Refresh token expired, re-keying with bootstrap token");
            let refreshed = self.refresh_with_bootstrap_token(device_id, &tokens.bootstrap).await?;
            self.save_tokens(device_id, &refreshed)?;
            return Ok(refreshed.access);
        }

        tracing::warn!(device_id, "All auth tokens expired");
        Err(MpcError::TokensExpired)
    }

    async fn refresh_with_bootstrap_token(
        &self,
        device_id: &str,
        bootstrap: &JwtToken,
    ) -> Result<AuthTokens, MpcError> {
        let token = bootstrap.jwt.as_str();
        let connector = self.connectors.connect(device_id, token)?;

        let result = async {
            connector.wait_for_key_is_ready().await?;
            let transaction_id = self.api.init_transaction(token).await?;
            self.wait_for_transaction_ready(token, &transaction_id).await?;
            connector.sign_transaction_with(&transaction_id).await?;
            let tokens = self.api.confirm_transaction(token).await?;
            self.api.verify_access_token(&tokens.access.jwt).await?;
            Ok::<_, MpcError>(tokens)
        }
        .await;

        connector.stop_join_wallet();
        result
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn wallet_details(&self, device_id: &str) -> Result<ConnectedWalletDetails, MpcError> {
        self.store
            .wallet_details(device_id)?
            .ok_or_else(|| MpcError::WalletNotFound(device_id.to_string()))
    }

    /// Sign `message` with the device's MPC wallet; returns the signature.
    pub async fn sign_message(&self, device_id: &str, message: &str) -> Result<String, MpcError> {
        self.queue
            .run(device_id, async {
                let token = self.get_auth_tokens(device_id).await?;
                let details = self.wallet_details(device_id)?;
                let account = &details.first_account;
                let asset = account
                    .assets
                    .iter()
                    .find(|a| a.blockchain_type() == Some(BlockchainType::Ethereum))
                    .or_else(|| account.assets.first())
                    .ok_or(MpcError::NoEvmAccount)?;

                let operation_id = self
                    .api
                    .start_sign_message(&token.jwt, &account.id, &asset.id, message)
                    .await?;
                tracing::info!(device_id, operation_id = %operation_id, "Sign message operation started");

                let result = self.run_operation(device_id, &token.jwt, &operation_id).await?;
                Ok::<_, MpcError>(result.into_value())
            })
            .await
    }

    /// Transfer `amount` of `symbol` on `chain` to `destination`; returns
    /// the transaction hash.
    pub async fn transfer_assets(
        &self,
        device_id: &str,
        amount: EvmTokenAmount,
        symbol: &str,
        chain: ChainSpec,
        destination: &str,
    ) -> Result<String, MpcError> {
        let destination = Address::from_str(destination.trim())
            .map_err(|e| MpcError::InvalidAddress(e.to_string()))?
            .to_checksum(None);
        let decimals = find_token(symbol, chain.blockchain)
            .map(|t| t.decimals)
            .unwrap_or(crate::blockchain::amount::NATIVE_DECIMALS);
        let amount = format_amount(amount.to_atomic(decimals), decimals);

        self.queue
            .run(device_id, async {
                let token = self.get_auth_tokens(device_id).await?;
                let details = self.wallet_details(device_id)?;
                let account = &details.first_account;
                let asset = account.asset(symbol, chain.blockchain).ok_or_else(|| {
                    MpcError::AssetNotFound {
                        symbol: symbol.to_string(),
                        chain,
                    }
                })?;

                let operation_id = self
                    .api
                    .start_transfer(&token.jwt, &account.id, &asset.id, &destination, &amount)
                    .await?;
                tracing::info!(
                    device_id,
                    operation_id = %operation_id,
                    symbol,
                    chain_id = chain.chain_id(),
                    "Transfer operation started"
                );

                let result = self.run_operation(device_id, &token.jwt, &operation_id).await?;
                Ok::<_, MpcError>(result.into_value())
            })
            .await
    }

    /// Poll an operation to completion, co-signing when the server asks.
    async fn run_operation(
        &self,
        device_id: &str,
        token: &str,
        operation_id: &str,
    ) -> Result<OperationResult, MpcError> {
        let policy = self.operation_poll;
        let mut signed: Option<String> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.api.operation_status(token, operation_id).await? {
                OperationStatus::Completed { result } => return Ok(result),
                OperationStatus::Failed { reason } => {
                    return Err(MpcError::OperationFailed {
                        operation_id: operation_id.to_string(),
                        reason,
                    });
                }
                OperationStatus::SignatureRequired { transaction_id }
                    if signed.as_deref() != Some(transaction_id.as_str()) =>
                {
                    tracing::debug!(device_id, operation_id, transaction_id = %transaction_id, "Operation requires device signature");
                    let connector = self.connectors.connect(device_id, token)?;
                    connector.sign_transaction_with(&transaction_id).await?;
                    signed = Some(transaction_id);
                    attempt = 0;
                    continue;
                }
                OperationStatus::Queued
                | OperationStatus::Processing
                | OperationStatus::SignatureRequired { .. } => {}
            }

            if attempt >= policy.attempts {
                return Err(MpcError::OperationTimeout {
                    operation_id: operation_id.to_string(),
                    attempts: policy.attempts,
                });
            }
            tokio::time::sleep(policy.interval).await;
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// All accounts with their assets. One task per account; an account whose
    /// assets cannot be fetched contributes an empty list.
    async fn accounts_with_assets(
        &self,
        access_token: &str,
    ) -> Result<Vec<WalletAccountWithAssets>, MpcError> {
        let accounts = self.api.accounts(access_token).await?;

        let mut tasks = JoinSet::new();
        for (index, account) in accounts.iter().enumerate() {
            let api = Arc::clone(&self.api);
            let token = access_token.to_string();
            let account_id = account.id.clone();
            tasks.spawn(async move { (index, api.account_assets(&token, &account_id).await) });
        }

        let mut assets = vec![Vec::new(); accounts.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(list))) => assets[index] = list,
                Ok((index, Err(e))) => {
                    tracing::warn!(account_id = %accounts[index].id, error = %e, "Failed to fetch account assets");
                }
                Err(e) => tracing::warn!(error = %e, "Asset fetch task failed"),
            }
        }

        Ok(accounts
            .into_iter()
            .zip(assets)
            .map(|(account, assets)| WalletAccountWithAssets {
                id: account.id,
                assets,
            })
            .collect())
    }

    /// Re-fetch accounts and balances and replace the cached details.
    pub async fn refresh_wallet_details(
        &self,
        device_id: &str,
    ) -> Result<ConnectedWalletDetails, MpcError> {
        let access = self.get_auth_tokens(device_id).await?;
        let accounts = self.accounts_with_assets(&access.jwt).await?;
        let tokens = self.stored_tokens(device_id)?;

        let details = connected_details(device_id, tokens, accounts)?;
        self.store.store_wallet_details(&details)?;
        tracing::debug!(device_id, accounts = details.accounts.len(), "Wallet details refreshed");
        Ok(details)
    }

    /// Cached details of a connected wallet.
    pub fn connected_wallet_details(
        &self,
        device_id: &str,
    ) -> Result<ConnectedWalletDetails, MpcError> {
        self.wallet_details(device_id)
    }

    /// Wallet registered for `device_id`.
    pub fn wallet(&self, device_id: &str) -> Result<Wallet, MpcError> {
        let record = self
            .store
            .wallet_record(device_id)?
            .ok_or_else(|| MpcError::WalletNotFound(device_id.to_string()))?;
        let address = Address::from_str(&record.address)
            .map_err(|e| MpcError::InvalidAddress(e.to_string()))?;
        Ok(Wallet::mpc(address, record.metadata))
    }

    /// Every wallet registered on this device.
    pub fn wallets(&self) -> Result<Vec<WalletRecord>, MpcError> {
        Ok(self.store.wallet_records()?)
    }

    /// Forget the wallet of `device_id`: tokens, details, key shares, record.
    pub fn remove_wallet(&self, device_id: &str) -> Result<(), MpcError> {
        self.tokens.invalidate(device_id);
        self.store.clear_device(device_id)?;
        tracing::info!(device_id, "MPC wallet removed");
        Ok(())
    }
}

/// Record the current step and report it.
async fn enter(
    run: &mut BootstrapRun,
    progress: &mpsc::Sender<ProgressEvent>,
    step: SetupProgress,
) -> Result<(), MpcError> {
    run.step = step.name();
    tracing::debug!(step = run.step, "Bootstrap step");
    progress.send(Ok(step)).await.map_err(|_| MpcError::Cancelled)
}

fn connected_details(
    device_id: &str,
    tokens: AuthTokens,
    accounts: Vec<WalletAccountWithAssets>,
) -> Result<ConnectedWalletDetails, MpcError> {
    let first_account = accounts.first().cloned().ok_or(MpcError::NoEvmAccount)?;
    Ok(ConnectedWalletDetails {
        device_id: device_id.to_string(),
        tokens,
        first_account,
        accounts,
    })
}

fn evm_address(account: &WalletAccountWithAssets) -> Result<Address, MpcError> {
    let raw = account.evm_address().ok_or(MpcError::NoEvmAccount)?;
    Address::from_str(raw).map_err(|e| MpcError::InvalidAddress(e.to_string()))
}
