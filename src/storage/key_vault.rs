// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sealed storage for MPC key shares.
//!
//! Each share is encrypted with AES-256-GCM before it reaches the database.
//! The key is HMAC-SHA256 over the device-bound application password, the
//! device id and the key id, so a share cannot be opened under another key
//! id or device. Sealed layout: `nonce (12) || ciphertext || tag (16)`.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;

use super::database::{StoreError, WalletStore};
use crate::mpc::connector::KeyStorageDelegate;

type HmacSha256 = Hmac<Sha256>;

const KEY_DERIVATION_LABEL: &[u8] = b"mpc-key-share/v1";

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Key share encryption failed")]
    Seal,

    #[error("Key share could not be opened (wrong password or corrupted data)")]
    Open,

    #[error("Application password must not be empty")]
    EmptyPassword,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Encrypts key shares and keeps them in the wallet store.
pub struct KeyShareVault {
    store: Arc<WalletStore>,
    password: Vec<u8>,
    rng: SystemRandom,
}

impl std::fmt::Debug for KeyShareVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShareVault").finish_non_exhaustive()
    }
}

impl KeyShareVault {
    /// `app_password` is supplied by the host, typically released from the
    /// platform keychain after biometric confirmation.
    pub fn new(store: Arc<WalletStore>, app_password: impl Into<Vec<u8>>) -> Result<Self, VaultError> {
        let password = app_password.into();
        if password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }
        Ok(Self {
            store,
            password,
            rng: SystemRandom::new(),
        })
    }

    fn cipher(&self, device_id: &str, key_id: &str) -> Result<LessSafeKey, VaultError> {
        let mut mac = HmacSha256::new_from_slice(&self.password).map_err(|_| VaultError::Seal)?;
        mac.update(KEY_DERIVATION_LABEL);
        mac.update(device_id.as_bytes());
        mac.update(b"|");
        mac.update(key_id.as_bytes());
        let key = mac.finalize().into_bytes();

        let unbound = UnboundKey::new(&AES_256_GCM, &key).map_err(|_| VaultError::Seal)?;
        Ok(LessSafeKey::new(unbound))
    }

    pub fn seal(&self, device_id: &str, key_id: &str, share: &[u8]) -> Result<Vec<u8>, VaultError> {
        let cipher = self.cipher(device_id, key_id)?;

        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| VaultError::Seal)?;

        let mut in_out = share.to_vec();
        cipher
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(key_id.as_bytes()),
                &mut in_out,
            )
            .map_err(|_| VaultError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    pub fn open(&self, device_id: &str, key_id: &str, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
        if sealed.len() < NONCE_LEN {
            return Err(VaultError::Open);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| VaultError::Open)?;

        let cipher = self.cipher(device_id, key_id)?;
        let mut in_out = ciphertext.to_vec();
        let plain = cipher
            .open_in_place(nonce, Aad::from(key_id.as_bytes()), &mut in_out)
            .map_err(|_| VaultError::Open)?;
        Ok(plain.to_vec())
    }

    pub fn store_share(&self, device_id: &str, key_id: &str, share: &[u8]) -> Result<(), VaultError> {
        let sealed = self.seal(device_id, key_id, share)?;
        self.store.put_key_share(device_id, key_id, &sealed)?;
        Ok(())
    }

    pub fn load_share(&self, device_id: &str, key_id: &str) -> Result<Option<Vec<u8>>, VaultError> {
        match self.store.key_share(device_id, key_id)? {
            Some(sealed) => self.open(device_id, key_id, &sealed).map(Some),
            None => Ok(None),
        }
    }

    pub fn remove_share(&self, device_id: &str, key_id: &str) -> Result<(), VaultError> {
        self.store.remove_key_share(device_id, key_id)?;
        Ok(())
    }

    /// Storage delegate for the SDK instance of `device_id`.
    pub fn for_device(self: &Arc<Self>, device_id: impl Into<String>) -> DeviceKeyStore {
        DeviceKeyStore {
            vault: Arc::clone(self),
            device_id: device_id.into(),
        }
    }
}

/// [`KeyStorageDelegate`] scoped to one device.
#[derive(Debug, Clone)]
pub struct DeviceKeyStore {
    vault: Arc<KeyShareVault>,
    device_id: String,
}

impl KeyStorageDelegate for DeviceKeyStore {
    fn store(&self, key_id: &str, share: &[u8]) -> Result<(), String> {
        self.vault
            .store_share(&self.device_id, key_id, share)
            .map_err(|e| e.to_string())
    }

    fn load(&self, key_id: &str) -> Result<Option<Vec<u8>>, String> {
        self.vault
            .load_share(&self.device_id, key_id)
            .map_err(|e| e.to_string())
    }

    fn remove(&self, key_id: &str) -> Result<(), String> {
        self.vault
            .remove_share(&self.device_id, key_id)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_store;

    fn vault(password: &str) -> (Arc<KeyShareVault>, tempfile::TempDir) {
        let (store, dir) = temp_store();
        (Arc::new(KeyShareVault::new(Arc::new(store), password).unwrap()), dir)
    }

    #[test]
    fn shares_are_sealed_at_rest() {
        let (vault, _dir) = vault("correct horse");
        let share = b"threshold key share bytes";

        vault.store_share("device-1", "ecdsa", share).unwrap();

        let at_rest = vault.store.key_share("device-1", "ecdsa").unwrap().unwrap();
        assert_eq!(at_rest.len(), NONCE_LEN + share.len() + 16);
        assert!(!at_rest.windows(share.len()).any(|w| w == share));
        assert_eq!(vault.load_share("device-1", "ecdsa").unwrap().unwrap(), share);
    }

    #[test]
    fn shares_are_bound_to_key_id_and_device() {
        let (vault, _dir) = vault("correct horse");
        let sealed = vault.seal("device-1", "ecdsa", b"share").unwrap();

        assert!(matches!(vault.open("device-1", "eddsa", &sealed), Err(VaultError::Open)));
        assert!(matches!(vault.open("device-2", "ecdsa", &sealed), Err(VaultError::Open)));
        assert!(matches!(vault.open("device-1", "ecdsa", &sealed[..4]), Err(VaultError::Open)));
    }

    #[test]
    fn wrong_password_cannot_open() {
        let (vault, _dir) = vault("correct horse");
        let sealed = vault.seal("device-1", "ecdsa", b"share").unwrap();

        let other = KeyShareVault::new(Arc::clone(&vault.store), "battery staple").unwrap();
        assert!(matches!(other.open("device-1", "ecdsa", &sealed), Err(VaultError::Open)));
    }

    #[test]
    fn empty_password_is_rejected() {
        let (store, _dir) = temp_store();
        assert!(matches!(
            KeyShareVault::new(Arc::new(store), ""),
            Err(VaultError::EmptyPassword)
        ));
    }

    #[test]
    fn device_delegate_round_trips() {
        let (vault, _dir) = vault("correct horse");
        let delegate = vault.for_device("device-1");

        delegate.store("ecdsa", b"share").unwrap();
        assert_eq!(delegate.load("ecdsa").unwrap().as_deref(), Some(&b"share"[..]));
        delegate.remove("ecdsa").unwrap();
        assert_eq!(delegate.load("ecdsa").unwrap(), None);
    }
}
