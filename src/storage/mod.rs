// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state owned by the wallet core, all keyed by MPC device id:
//!
//! - auth tokens (access / refresh / bootstrap)
//! - connected wallet details (accounts and assets)
//! - wallet records registered after bootstrap
//! - MPC key shares, sealed by [`KeyShareVault`]
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   mpc_wallet.redb   # all tables, see `database`
//! ```
//!
//! Writes that belong together (tokens + details + record) share one redb
//! write transaction.

pub mod database;
pub mod key_vault;
pub mod paths;
pub mod token_cache;

pub use database::{StoreError, StoreResult, WalletRecord, WalletStore};
pub use key_vault::{DeviceKeyStore, KeyShareVault, VaultError};
pub use paths::StoragePaths;
pub use token_cache::TokenCache;
