// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # MPC Module
//!
//! Custodial MPC wallets: device bootstrap, auth token lifecycle and
//! server-coordinated signing.
//!
//! - `network` - wallets API client
//! - `connector` - device-side MPC SDK seam
//! - `queue` - per-device serialization
//! - `service` - [`MpcConnectionService`], the entry point

pub mod connector;
pub mod error;
pub mod network;
pub mod queue;
pub mod service;
pub mod types;

pub use connector::{
    ConnectorError, ConnectorFactory, DeviceSigner, KeyStatus, KeyStorageDelegate, MpcConnector,
    MpcSdk, PollPolicy, SignatureStatus,
};
pub use error::MpcError;
pub use network::{BootstrapSession, HttpWalletsApi, WalletsApi, WalletsApiError};
pub use queue::ActionsQueue;
pub use service::{BootstrapHandle, MpcConnectionService, ProgressEvent};
pub use types::{
    AuthTokens, ConnectedWalletDetails, JwtToken, OperationResult, OperationStatus,
    SetupProgress, TokenError, WalletAccountAsset, WalletAccountWithAssets,
};
