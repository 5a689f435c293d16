// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service wiring. The host builds one [`ServiceContext`] at startup and
//! hands clones of its services to whatever needs them.

use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{AlloyRpc, JrpcClient};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::mpc::{ConnectorFactory, HttpWalletsApi, MpcConnectionService};
use crate::sending::{CryptoSender, ExternalSignerBridge, ExternalWalletTransport};
use crate::storage::{KeyShareVault, StoragePaths, TokenCache, WalletStore};

const TOKEN_CACHE_CAPACITY: usize = 64;
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(300);

/// Host-provided pieces the core cannot build itself.
pub struct HostBindings {
    /// Relay to externally linked wallets.
    pub external_transport: Arc<dyn ExternalWalletTransport>,
    /// Builds device connectors over the vendor MPC SDK; receives the vault
    /// so connectors can persist key shares through it.
    pub connectors: Box<dyn FnOnce(Arc<KeyShareVault>) -> Arc<dyn ConnectorFactory> + Send>,
    /// Secret the key-share vault derives its keys from.
    pub app_password: Vec<u8>,
}

#[derive(Clone)]
pub struct ServiceContext {
    pub config: ServiceConfig,
    pub store: Arc<WalletStore>,
    pub vault: Arc<KeyShareVault>,
    pub external_signer: Arc<ExternalSignerBridge>,
    pub sender: Arc<CryptoSender>,
    pub mpc: MpcConnectionService,
}

impl ServiceContext {
    pub fn new(config: ServiceConfig, host: HostBindings) -> Result<Self> {
        let paths = StoragePaths::new(&config.data_dir);
        let store = Arc::new(WalletStore::open(&paths.database())?);
        let vault = Arc::new(KeyShareVault::new(Arc::clone(&store), host.app_password)?);

        let rpc = AlloyRpc::new(config.rpc_endpoints())?;
        let jrpc = JrpcClient::new(Arc::new(rpc));
        let external_signer = Arc::new(ExternalSignerBridge::new(host.external_transport));
        let sender = Arc::new(CryptoSender::new(jrpc, Arc::clone(&external_signer)));

        let api = HttpWalletsApi::new(&config.wallets_api_url, config.http_timeout)?;
        let connectors = (host.connectors)(Arc::clone(&vault));
        let tokens = Arc::new(TokenCache::new(TOKEN_CACHE_CAPACITY, TOKEN_CACHE_TTL));
        let mpc = MpcConnectionService::new(Arc::new(api), connectors, Arc::clone(&store), tokens);

        tracing::info!(
            environment = ?config.environment,
            data_dir = %paths.root().display(),
            "Wallet core initialised"
        );

        Ok(Self {
            config,
            store,
            vault,
            external_signer,
            sender,
            mpc,
        })
    }
}
