// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::blockchain::{AmountError, JrpcError};
use crate::config::ConfigError;
use crate::mpc::{MpcError, WalletsApiError};
use crate::sending::SendError;
use crate::storage::{StoreError, VaultError};

/// Any error the wallet core reports to its host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Jrpc(#[from] JrpcError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    WalletsApi(#[from] WalletsApiError),

    #[error(transparent)]
    Mpc(#[from] MpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether the user must bootstrap the device again to recover.
    pub fn requires_rebootstrap(&self) -> bool {
        matches!(
            self,
            Self::Mpc(MpcError::TokensExpired) | Self::Mpc(MpcError::WalletNotFound(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_errors_convert_and_keep_their_message() {
        let err: Error = ConfigError::Missing("WALLETS_API_URL").into();
        assert_eq!(
            err.to_string(),
            "Missing required environment variable WALLETS_API_URL"
        );

        let err: Error = MpcError::TokensExpired.into();
        assert!(err.requires_rebootstrap());

        let err: Error = JrpcError::NoPrivateKey.into();
        assert!(!err.requires_rebootstrap());
    }
}
