// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! MPC session and account types.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::blockchain::BlockchainType;
use crate::wallet::Wallet;

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// A JWT together with its expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtToken {
    pub jwt: String,
    pub expires_at: DateTime<Utc>,
}

impl JwtToken {
    /// Read the expiry from the token's `exp` claim.
    ///
    /// The signature is not checked; the Wallets API verifies its own tokens.
    pub fn from_jwt(jwt: impl Into<String>) -> Result<Self, TokenError> {
        let jwt = jwt.into();
        let data = jsonwebtoken::dangerous::insecure_decode::<ExpiryClaims>(&jwt)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or(TokenError::InvalidExpiry(data.claims.exp))?;
        Ok(Self { jwt, expires_at })
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// Tokens never appear in logs.
impl fmt::Debug for JwtToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtToken")
            .field("jwt", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed JWT: {0}")]
    Malformed(String),

    #[error("JWT expiry out of range: {0}")]
    InvalidExpiry(i64),
}

/// Access, refresh and bootstrap tokens of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access: JwtToken,
    pub refresh: JwtToken,
    pub bootstrap: JwtToken,
}

// =============================================================================
// Accounts
// =============================================================================

/// Asset class on a chain, as the Wallets API names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainAsset {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub blockchain: ApiBlockchain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBlockchain {
    pub id: String,
    pub name: String,
}

impl ApiBlockchain {
    pub fn blockchain_type(&self) -> Option<BlockchainType> {
        BlockchainType::from_api_name(&self.id).or_else(|| BlockchainType::from_api_name(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub total: String,
    pub decimals: u8,
}

/// One asset held by an account, with its on-chain address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccountAsset {
    pub id: String,
    pub address: String,
    pub blockchain_asset: BlockchainAsset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<AssetBalance>,
}

impl WalletAccountAsset {
    pub fn blockchain_type(&self) -> Option<BlockchainType> {
        self.blockchain_asset.blockchain.blockchain_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    pub id: String,
}

/// An account together with its assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccountWithAssets {
    pub id: String,
    pub assets: Vec<WalletAccountAsset>,
}

impl WalletAccountWithAssets {
    /// EVM address of the account: its Ethereum asset, else its Polygon one.
    pub fn evm_address(&self) -> Option<&str> {
        [BlockchainType::Ethereum, BlockchainType::Matic]
            .into_iter()
            .find_map(|chain| {
                self.assets
                    .iter()
                    .find(|a| a.blockchain_type() == Some(chain))
            })
            .map(|a| a.address.as_str())
    }

    /// Asset matching `symbol` on `blockchain`.
    pub fn asset(&self, symbol: &str, blockchain: BlockchainType) -> Option<&WalletAccountAsset> {
        self.assets.iter().find(|a| {
            a.blockchain_asset.symbol.eq_ignore_ascii_case(symbol)
                && a.blockchain_type() == Some(blockchain)
        })
    }
}

/// Everything the core keeps about a connected MPC wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedWalletDetails {
    pub device_id: String,
    pub tokens: AuthTokens,
    pub first_account: WalletAccountWithAssets,
    pub accounts: Vec<WalletAccountWithAssets>,
}

// =============================================================================
// Operations
// =============================================================================

/// Result carried by a completed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Signature(String),
    TransactionHash(String),
}

impl OperationResult {
    pub fn into_value(self) -> String {
        match self {
            Self::Signature(s) | Self::TransactionHash(s) => s,
        }
    }
}

/// Server-side state of a signing or transfer operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Queued,
    Processing,
    /// Needs the device co-signature of `transaction_id`
    SignatureRequired { transaction_id: String },
    Completed { result: OperationResult },
    Failed { reason: String },
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Server-side state of a key-material transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupTransactionStatus {
    Submitted,
    PendingSignature,
    Completed,
    Failed,
}

impl SetupTransactionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "PENDING_SIGNATURE" => Self::PendingSignature,
            "COMPLETED" | "SIGNED" => Self::Completed,
            "FAILED" | "REJECTED" | "CANCELLED" | "BLOCKED" => Self::Failed,
            _ => Self::Submitted,
        }
    }
}

// =============================================================================
// Bootstrap progress
// =============================================================================

/// Bootstrap step reported to the caller, in emission order.
#[derive(Debug, Clone)]
pub enum SetupProgress {
    SubmittingCode,
    InitialiseFireblocks,
    RequestingToJoinExistingWallet,
    AuthorisingNewDevice,
    WaitingForKeysIsReady,
    InitialiseTransaction,
    WaitingForTransactionIsReady,
    SigningTransaction,
    ConfirmingTransaction,
    VerifyingAccessToken,
    GetWalletAccountDetails,
    StoreWallet,
    Finished(Wallet),
}

impl SetupProgress {
    /// Step name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmittingCode => "submitting_code",
            Self::InitialiseFireblocks => "initialise_fireblocks",
            Self::RequestingToJoinExistingWallet => "requesting_to_join_existing_wallet",
            Self::AuthorisingNewDevice => "authorising_new_device",
            Self::WaitingForKeysIsReady => "waiting_for_keys_is_ready",
            Self::InitialiseTransaction => "initialise_transaction",
            Self::WaitingForTransactionIsReady => "waiting_for_transaction_is_ready",
            Self::SigningTransaction => "signing_transaction",
            Self::ConfirmingTransaction => "confirming_transaction",
            Self::VerifyingAccessToken => "verifying_access_token",
            Self::GetWalletAccountDetails => "get_wallet_account_details",
            Self::StoreWallet => "store_wallet",
            Self::Finished(_) => "finished",
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use base64ct::{Base64UrlUnpadded, Encoding};

    /// Unsigned JWT with the given `exp`; enough for expiry parsing.
    pub(crate) fn jwt_expiring_at(exp: i64) -> String {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = serde_json::json!({ "sub": "device", "exp": exp }).to_string();
        let claims = Base64UrlUnpadded::encode_string(claims.as_bytes());
        format!("{header}.{claims}.c2lnbmF0dXJl")
    }

    pub(crate) fn token_valid_for(seconds: i64) -> JwtToken {
        JwtToken::from_jwt(jwt_expiring_at(Utc::now().timestamp() + seconds)).unwrap()
    }

    pub(crate) fn asset(id: &str, symbol: &str, chain: &str, address: &str) -> WalletAccountAsset {
        WalletAccountAsset {
            id: id.to_string(),
            address: address.to_string(),
            blockchain_asset: BlockchainAsset {
                id: format!("{symbol}-{chain}"),
                name: symbol.to_string(),
                symbol: symbol.to_string(),
                blockchain: ApiBlockchain {
                    id: chain.to_string(),
                    name: chain.to_string(),
                },
            },
            balance: None,
        }
    }

    #[test]
    fn expiry_comes_from_exp_claim() {
        let token = JwtToken::from_jwt(jwt_expiring_at(1_900_000_000)).unwrap();
        assert_eq!(token.expires_at.timestamp(), 1_900_000_000);
        assert!(!token.is_expired_at(Utc.timestamp_opt(1_899_999_999, 0).unwrap()));
        assert!(token.is_expired_at(Utc.timestamp_opt(1_900_000_000, 0).unwrap()));
    }

    #[test]
    fn garbage_is_not_a_token() {
        assert!(matches!(
            JwtToken::from_jwt("not-a-jwt"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_jwt() {
        let jwt = jwt_expiring_at(1_900_000_000);
        let token = JwtToken::from_jwt(jwt.clone()).unwrap();
        assert!(!format!("{token:?}").contains(&jwt));
    }

    #[test]
    fn evm_address_prefers_ethereum_asset() {
        let account = WalletAccountWithAssets {
            id: "acc".into(),
            assets: vec![
                asset("1", "MATIC", "MATIC", "0xpolygon"),
                asset("2", "ETH", "ETHEREUM", "0xethereum"),
            ],
        };
        assert_eq!(account.evm_address(), Some("0xethereum"));

        let polygon_only = WalletAccountWithAssets {
            id: "acc".into(),
            assets: vec![asset("1", "MATIC", "MATIC", "0xpolygon")],
        };
        assert_eq!(polygon_only.evm_address(), Some("0xpolygon"));
        assert_eq!(
            polygon_only.asset("matic", BlockchainType::Matic).map(|a| a.id.as_str()),
            Some("1")
        );
    }

    #[test]
    fn setup_status_parsing() {
        assert_eq!(
            SetupTransactionStatus::parse("PENDING_SIGNATURE"),
            SetupTransactionStatus::PendingSignature
        );
        assert_eq!(SetupTransactionStatus::parse("QUEUED"), SetupTransactionStatus::Submitted);
        assert_eq!(SetupTransactionStatus::parse("rejected"), SetupTransactionStatus::Failed);
    }
}
