// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local transaction signing.
//!
//! Converts imported private keys (hex or PEM) into alloy signers and
//! produces EIP-2718 encoded raw transactions for `eth_sendRawTransaction`.

use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Bytes, B256},
    signers::local::PrivateKeySigner,
};
use k256::SecretKey;

use super::transaction::EvmTransaction;

/// Errors from key import and local signing.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// A signed, encoded transaction.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// EIP-2718 encoding (plain RLP for legacy transactions)
    pub raw: Bytes,
    /// Transaction hash
    pub hash: B256,
}

/// Create a signer from a hex private key (with or without `0x` prefix).
pub fn signer_from_hex(private_key_hex: &str) -> Result<PrivateKeySigner, SigningError> {
    let key_bytes = alloy::hex::decode(private_key_hex.trim())
        .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))
}

/// Parse a private key from PEM (SEC1 or PKCS#8) into a hex string.
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, SigningError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid PEM: {}", e)))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid key format: {}", e)))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}

/// Create a signer from a PEM-encoded private key.
pub fn signer_from_pem(pem_bytes: &[u8]) -> Result<PrivateKeySigner, SigningError> {
    let hex_key = pem_to_hex(pem_bytes)?;
    signer_from_hex(&hex_key)
}

/// Sign a transaction with a local key and return its raw encoding.
pub async fn sign_transaction(
    tx: &EvmTransaction,
    signer: &PrivateKeySigner,
) -> Result<SignedTransaction, SigningError> {
    let wallet = EthereumWallet::from(signer.clone());
    let envelope = tx
        .to_request()
        .build(&wallet)
        .await
        .map_err(|e| SigningError::SigningFailed(e.to_string()))?;

    Ok(SignedTransaction {
        raw: envelope.encoded_2718().into(),
        hash: *envelope.tx_hash(),
    })
}
