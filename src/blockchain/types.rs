// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported EVM blockchains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockchainType {
    /// Ethereum (native coin ETH)
    #[serde(alias = "ETH")]
    Ethereum,
    /// Polygon PoS (native coin MATIC)
    #[serde(alias = "POLYGON")]
    Matic,
}

impl BlockchainType {
    /// Ticker of the chain's native coin.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            BlockchainType::Ethereum => "ETH",
            BlockchainType::Matic => "MATIC",
        }
    }

    /// Parse the blockchain identifier used by the Wallets API.
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ETHEREUM" | "ETH" => Some(BlockchainType::Ethereum),
            "MATIC" | "POLYGON" => Some(BlockchainType::Matic),
            _ => None,
        }
    }
}

impl fmt::Display for BlockchainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainType::Ethereum => f.write_str("Ethereum"),
            BlockchainType::Matic => f.write_str("Polygon"),
        }
    }
}

/// Deployment environment of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Mainnet,
    Testnet,
}

impl Environment {
    /// Parse `mainnet` / `testnet` (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Some(Environment::Mainnet),
            "testnet" => Some(Environment::Testnet),
            _ => None,
        }
    }
}

/// A blockchain in a given environment; resolves to a numeric chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainSpec {
    pub blockchain: BlockchainType,
    pub env: Environment,
}

impl ChainSpec {
    pub const fn new(blockchain: BlockchainType, env: Environment) -> Self {
        Self { blockchain, env }
    }

    pub const fn ethereum(env: Environment) -> Self {
        Self::new(BlockchainType::Ethereum, env)
    }

    pub const fn polygon(env: Environment) -> Self {
        Self::new(BlockchainType::Matic, env)
    }

    /// EIP-155 chain id.
    pub fn chain_id(&self) -> u64 {
        match (self.blockchain, self.env) {
            (BlockchainType::Ethereum, Environment::Mainnet) => 1,
            (BlockchainType::Ethereum, Environment::Testnet) => 11_155_111,
            (BlockchainType::Matic, Environment::Mainnet) => 137,
            (BlockchainType::Matic, Environment::Testnet) => 80_002,
        }
    }

    /// Reverse lookup from a chain id.
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        [
            ChainSpec::ethereum(Environment::Mainnet),
            ChainSpec::ethereum(Environment::Testnet),
            ChainSpec::polygon(Environment::Mainnet),
            ChainSpec::polygon(Environment::Testnet),
        ]
        .into_iter()
        .find(|spec| spec.chain_id() == chain_id)
    }

    /// Network configuration for this chain.
    pub fn network(&self) -> NetworkConfig {
        match (self.blockchain, self.env) {
            (BlockchainType::Ethereum, Environment::Mainnet) => ETHEREUM_MAINNET,
            (BlockchainType::Ethereum, Environment::Testnet) => ETHEREUM_SEPOLIA,
            (BlockchainType::Matic, Environment::Mainnet) => POLYGON_MAINNET,
            (BlockchainType::Matic, Environment::Testnet) => POLYGON_AMOY,
        }
    }
}

/// EVM network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Default public RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

/// Ethereum mainnet configuration.
pub const ETHEREUM_MAINNET: NetworkConfig = NetworkConfig {
    name: "Ethereum Mainnet",
    chain_id: 1,
    rpc_url: "https://ethereum-rpc.publicnode.com",
    explorer_url: "https://etherscan.io",
};

/// Ethereum Sepolia testnet configuration.
pub const ETHEREUM_SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Ethereum Sepolia",
    chain_id: 11_155_111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    explorer_url: "https://sepolia.etherscan.io",
};

/// Polygon PoS mainnet configuration.
pub const POLYGON_MAINNET: NetworkConfig = NetworkConfig {
    name: "Polygon Mainnet",
    chain_id: 137,
    rpc_url: "https://polygon-rpc.com",
    explorer_url: "https://polygonscan.com",
};

/// Polygon Amoy testnet configuration.
pub const POLYGON_AMOY: NetworkConfig = NetworkConfig {
    name: "Polygon Amoy",
    chain_id: 80_002,
    rpc_url: "https://rpc-amoy.polygon.technology",
    explorer_url: "https://amoy.polygonscan.com",
};

/// Known ERC-20 token deployment.
#[derive(Debug, Clone)]
pub struct Erc20Token {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    pub blockchain: BlockchainType,
    /// Mainnet contract address
    pub mainnet_address: Option<&'static str>,
    /// Testnet contract address
    pub testnet_address: Option<&'static str>,
}

impl Erc20Token {
    /// Contract address for the given environment, if deployed there.
    pub fn address_for(&self, env: Environment) -> Option<&'static str> {
        match env {
            Environment::Mainnet => self.mainnet_address,
            Environment::Testnet => self.testnet_address,
        }
    }
}

/// Tether USD on Ethereum.
pub const USDT_ETHEREUM: Erc20Token = Erc20Token {
    symbol: "USDT",
    name: "Tether USD",
    decimals: 6,
    blockchain: BlockchainType::Ethereum,
    mainnet_address: Some("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
    testnet_address: Some("0x7169D38820dfd117C3FA1f22a697dBA58d90BA06"),
};

/// USD Coin on Ethereum.
pub const USDC_ETHEREUM: Erc20Token = Erc20Token {
    symbol: "USDC",
    name: "USD Coin",
    decimals: 6,
    blockchain: BlockchainType::Ethereum,
    mainnet_address: Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    testnet_address: Some("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
};

/// Tether USD on Polygon.
pub const USDT_POLYGON: Erc20Token = Erc20Token {
    symbol: "USDT",
    name: "Tether USD",
    decimals: 6,
    blockchain: BlockchainType::Matic,
    mainnet_address: Some("0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
    testnet_address: None,
};

/// USD Coin on Polygon.
pub const USDC_POLYGON: Erc20Token = Erc20Token {
    symbol: "USDC",
    name: "USD Coin",
    decimals: 6,
    blockchain: BlockchainType::Matic,
    mainnet_address: Some("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
    testnet_address: Some("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582"),
};

/// All ERC-20 tokens the crypto sender can transfer.
pub const KNOWN_TOKENS: &[Erc20Token] = &[USDT_ETHEREUM, USDC_ETHEREUM, USDT_POLYGON, USDC_POLYGON];

/// Find a known ERC-20 token by symbol on a blockchain.
pub fn find_token(symbol: &str, blockchain: BlockchainType) -> Option<&'static Erc20Token> {
    KNOWN_TOKENS
        .iter()
        .find(|t| t.blockchain == blockchain && t.symbol.eq_ignore_ascii_case(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_resolve_both_ways() {
        let specs = [
            (ChainSpec::ethereum(Environment::Mainnet), 1),
            (ChainSpec::ethereum(Environment::Testnet), 11_155_111),
            (ChainSpec::polygon(Environment::Mainnet), 137),
            (ChainSpec::polygon(Environment::Testnet), 80_002),
        ];
        for (spec, id) in specs {
            assert_eq!(spec.chain_id(), id);
            assert_eq!(spec.network().chain_id, id);
            assert_eq!(ChainSpec::from_chain_id(id), Some(spec));
        }
        assert_eq!(ChainSpec::from_chain_id(43114), None);
    }

    #[test]
    fn token_lookup_is_chain_scoped() {
        assert!(find_token("usdt", BlockchainType::Ethereum).is_some());
        assert!(find_token("USDC", BlockchainType::Matic).is_some());
        assert!(find_token("ETH", BlockchainType::Ethereum).is_none());
        assert!(USDT_POLYGON.address_for(Environment::Testnet).is_none());
    }

    #[test]
    fn api_blockchain_names() {
        assert_eq!(BlockchainType::from_api_name("ETHEREUM"), Some(BlockchainType::Ethereum));
        assert_eq!(BlockchainType::from_api_name("Matic"), Some(BlockchainType::Matic));
        assert_eq!(BlockchainType::from_api_name("SOL"), None);
        assert_eq!(Environment::parse(" Testnet "), Some(Environment::Testnet));
    }
}
