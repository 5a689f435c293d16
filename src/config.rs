// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once, when the host builds a
//! [`ServiceContext`](crate::state::ServiceContext).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WALLETS_API_URL` | Base URL of the MPC wallets API | Required |
//! | `NETWORK_ENV` | `mainnet` or `testnet` | `mainnet` |
//! | `ETHEREUM_RPC_URL` | Ethereum JSON-RPC endpoint | Public endpoint for `NETWORK_ENV` |
//! | `POLYGON_RPC_URL` | Polygon JSON-RPC endpoint | Public endpoint for `NETWORK_ENV` |
//! | `DATA_DIR` | Directory holding the wallet database | `./data` |
//! | `HTTP_TIMEOUT_SECS` | Timeout of wallets API requests | `30` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use crate::blockchain::{ChainSpec, Environment};
use crate::storage::paths::DATA_ROOT;

pub const WALLETS_API_URL_ENV: &str = "WALLETS_API_URL";
pub const NETWORK_ENV_ENV: &str = "NETWORK_ENV";
pub const ETHEREUM_RPC_URL_ENV: &str = "ETHEREUM_RPC_URL";
pub const POLYGON_RPC_URL_ENV: &str = "POLYGON_RPC_URL";

/// Directory holding `mpc_wallet.redb`.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Timeout, in seconds, of every wallets API request.
pub const HTTP_TIMEOUT_SECS_ENV: &str = "HTTP_TIMEOUT_SECS";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// `json` for machine-readable logs, anything else for human-readable ones.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub wallets_api_url: String,
    pub environment: Environment,
    pub ethereum_rpc_url: String,
    pub polygon_rpc_url: String,
    pub data_dir: PathBuf,
    pub http_timeout: Duration,
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which returns the value of a
    /// variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let wallets_api_url =
            var(WALLETS_API_URL_ENV).ok_or(ConfigError::Missing(WALLETS_API_URL_ENV))?;

        let environment = match var(NETWORK_ENV_ENV) {
            Some(raw) => Environment::parse(&raw).ok_or(ConfigError::Invalid {
                name: NETWORK_ENV_ENV,
                value: raw,
            })?,
            None => Environment::default(),
        };

        let ethereum_rpc_url = var(ETHEREUM_RPC_URL_ENV)
            .unwrap_or_else(|| ChainSpec::ethereum(environment).network().rpc_url.to_string());
        let polygon_rpc_url = var(POLYGON_RPC_URL_ENV)
            .unwrap_or_else(|| ChainSpec::polygon(environment).network().rpc_url.to_string());

        let http_timeout = match var(HTTP_TIMEOUT_SECS_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid {
                    name: HTTP_TIMEOUT_SECS_ENV,
                    value: raw,
                })?,
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Self {
            wallets_api_url,
            environment,
            ethereum_rpc_url,
            polygon_rpc_url,
            data_dir: var(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DATA_ROOT)),
            http_timeout,
            log_format: var(LOG_FORMAT_ENV)
                .map(|raw| LogFormat::parse(&raw))
                .unwrap_or_default(),
        })
    }

    /// `(chain_id, rpc_url)` of every chain this configuration serves.
    pub fn rpc_endpoints(&self) -> [(u64, &str); 2] {
        [
            (
                ChainSpec::ethereum(self.environment).chain_id(),
                self.ethereum_rpc_url.as_str(),
            ),
            (
                ChainSpec::polygon(self.environment).chain_id(),
                self.polygon_rpc_url.as_str(),
            ),
        ]
    }
}
