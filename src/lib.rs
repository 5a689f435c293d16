// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! MPC Wallet Core - EVM sending and custodial MPC wallet connection
//!
//! This crate provides the wallet core of a mobile crypto wallet: sending
//! native coins and ERC-20 tokens on Ethereum and Polygon, and attaching the
//! device to a custodial MPC wallet that signs through the wallets API.
//!
//! ## Modules
//!
//! - `blockchain` - chains, amounts, transaction building and JSON-RPC (alloy)
//! - `sending` - sender strategies and the external-wallet signing bridge
//! - `mpc` - device bootstrap, auth tokens and MPC operations
//! - `storage` - redb persistence and sealed key shares
//! - `state` - service wiring for the host

pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod mpc;
pub mod sending;
pub mod state;
pub mod storage;
pub mod wallet;

pub use error::{Error, Result};
pub use state::{HostBindings, ServiceContext};
pub use wallet::Wallet;
