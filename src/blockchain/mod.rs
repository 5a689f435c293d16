// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain integration.
//!
//! This module provides functionality for:
//! - Chain, network and ERC-20 token metadata
//! - Exact token amounts
//! - Transaction building and local signing
//! - JSON-RPC access (nonce, gas, broadcast)

pub mod amount;
pub mod erc20;
pub mod jrpc;
pub mod signing;
pub mod transaction;
pub mod types;

pub use amount::{AmountError, EvmTokenAmount};
pub use jrpc::{AlloyRpc, EstimatedGasPrices, EvmRpc, JrpcClient, JrpcError, RpcFailure};
pub use signing::{SignedTransaction, SigningError};
pub use transaction::EvmTransaction;
pub use types::*;
