// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallets and their signing capability.

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

/// Provider tag for wallets custodied through the MPC service.
pub const MPC_PROVIDER_FIREBLOCKS: &str = "fireblocks";

/// Identifies the MPC device/account backing a wallet.
///
/// Created once at bootstrap and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpcWalletMetadata {
    /// Custody provider tag
    pub provider: String,
    /// Base64 JSON blob carrying the device id
    pub metadata: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceMetadata {
    device_id: String,
}

impl MpcWalletMetadata {
    /// Metadata for a wallet bootstrapped on `device_id`.
    pub fn for_device(device_id: &str) -> Self {
        let blob = serde_json::json!({ "deviceId": device_id }).to_string();
        Self {
            provider: MPC_PROVIDER_FIREBLOCKS.to_string(),
            metadata: Base64::encode_string(blob.as_bytes()),
        }
    }

    /// Device id stored in the metadata blob.
    pub fn device_id(&self) -> Option<String> {
        let bytes = Base64::decode_vec(&self.metadata).ok()?;
        let parsed: DeviceMetadata = serde_json::from_slice(&bytes).ok()?;
        Some(parsed.device_id)
    }
}

/// Session of an externally linked wallet (WalletConnect-style).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSession {
    /// Session topic used to route signing requests
    pub topic: String,
}

/// How a wallet produces signatures.
#[derive(Debug, Clone)]
pub enum WalletSigner {
    /// Private key held by this process
    Local(PrivateKeySigner),
    /// Signing delegated to an externally linked wallet app
    External(ExternalSession),
    /// Threshold signing through the MPC custody service
    Mpc(MpcWalletMetadata),
}

/// A wallet: an address and the means to sign for it.
#[derive(Debug, Clone)]
pub struct Wallet {
    address: Address,
    signer: WalletSigner,
}

impl Wallet {
    pub fn local(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer: WalletSigner::Local(signer),
        }
    }

    pub fn external(address: Address, topic: impl Into<String>) -> Self {
        Self {
            address,
            signer: WalletSigner::External(ExternalSession {
                topic: topic.into(),
            }),
        }
    }

    pub fn mpc(address: Address, metadata: MpcWalletMetadata) -> Self {
        Self {
            address,
            signer: WalletSigner::Mpc(metadata),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 checksummed address string.
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    pub fn signer(&self) -> &WalletSigner {
        &self.signer
    }

    /// Local key, if this wallet holds one.
    pub fn private_key(&self) -> Option<&PrivateKeySigner> {
        match &self.signer {
            WalletSigner::Local(signer) => Some(signer),
            _ => None,
        }
    }

    /// External session, if this wallet is externally linked.
    pub fn external_session(&self) -> Option<&ExternalSession> {
        match &self.signer {
            WalletSigner::External(session) => Some(session),
            _ => None,
        }
    }

    /// MPC metadata, if this wallet is MPC-custodied.
    pub fn mpc_metadata(&self) -> Option<&MpcWalletMetadata> {
        match &self.signer {
            WalletSigner::Mpc(metadata) => Some(metadata),
            _ => None,
        }
    }
}
