// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded wallet database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `auth_tokens`: device_id → serialized AuthTokens
//! - `wallet_details`: device_id → serialized ConnectedWalletDetails
//! - `wallet_records`: device_id → serialized WalletRecord
//! - `key_shares`: `device_id|key_id` → sealed key share
//!
//! Everything is keyed by device id; [`WalletStore::clear_device`] drops all
//! of a device's rows in one write transaction.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::mpc::types::{AuthTokens, ConnectedWalletDetails};
use crate::wallet::MpcWalletMetadata;

// =============================================================================
// Table Definitions
// =============================================================================

const AUTH_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("auth_tokens");

const WALLET_DETAILS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallet_details");

const WALLET_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallet_records");

/// Key format: `device_id|key_id`.
const KEY_SHARES: TableDefinition<&str, &[u8]> = TableDefinition::new("key_shares");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Logical wallet registered after a successful bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub device_id: String,
    /// Checksummed EVM address
    pub address: String,
    pub metadata: MpcWalletMetadata,
    pub created_at: DateTime<Utc>,
}

fn key_share_key(device_id: &str, key_id: &str) -> String {
    format!("{device_id}|{key_id}")
}

/// Half-open key range covering every key share of a device.
fn key_share_range(device_id: &str) -> (String, String) {
    // '}' sorts right after '|'.
    (format!("{device_id}|"), format!("{device_id}}}"))
}

// =============================================================================
// WalletStore
// =============================================================================

pub struct WalletStore {
    db: Database,
}

impl WalletStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(AUTH_TOKENS)?;
            let _ = write_txn.open_table(WALLET_DETAILS)?;
            let _ = write_txn.open_table(WALLET_RECORDS)?;
            let _ = write_txn.open_table(KEY_SHARES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn read_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Connection state
    // =========================================================================

    /// Persist tokens, details and the wallet record of a freshly connected
    /// device in a single write transaction.
    pub fn store_connection(
        &self,
        details: &ConnectedWalletDetails,
        record: &WalletRecord,
    ) -> StoreResult<()> {
        let tokens = serde_json::to_vec(&details.tokens)?;
        let details_json = serde_json::to_vec(details)?;
        let record_json = serde_json::to_vec(record)?;
        let device_id = details.device_id.as_str();

        let write_txn = self.db.begin_write()?;
        {
            write_txn
                .open_table(AUTH_TOKENS)?
                .insert(device_id, tokens.as_slice())?;
            write_txn
                .open_table(WALLET_DETAILS)?
                .insert(device_id, details_json.as_slice())?;
            write_txn
                .open_table(WALLET_RECORDS)?
                .insert(device_id, record_json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn auth_tokens(&self, device_id: &str) -> StoreResult<Option<AuthTokens>> {
        self.read_json(AUTH_TOKENS, device_id)
    }

    /// Replace a device's tokens, keeping the cached details in step.
    pub fn store_auth_tokens(&self, device_id: &str, tokens: &AuthTokens) -> StoreResult<()> {
        let tokens_json = serde_json::to_vec(tokens)?;

        let write_txn = self.db.begin_write()?;
        {
            write_txn
                .open_table(AUTH_TOKENS)?
                .insert(device_id, tokens_json.as_slice())?;

            let mut details_table = write_txn.open_table(WALLET_DETAILS)?;
            let existing: Option<ConnectedWalletDetails> = match details_table.get(device_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            if let Some(mut details) = existing {
                details.tokens = tokens.clone();
                let json = serde_json::to_vec(&details)?;
                details_table.insert(device_id, json.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn wallet_details(&self, device_id: &str) -> StoreResult<Option<ConnectedWalletDetails>> {
        self.read_json(WALLET_DETAILS, device_id)
    }

    /// Replace cached wallet details (tokens included) atomically.
    pub fn store_wallet_details(&self, details: &ConnectedWalletDetails) -> StoreResult<()> {
        let tokens = serde_json::to_vec(&details.tokens)?;
        let json = serde_json::to_vec(details)?;
        let device_id = details.device_id.as_str();

        let write_txn = self.db.begin_write()?;
        {
            write_txn
                .open_table(AUTH_TOKENS)?
                .insert(device_id, tokens.as_slice())?;
            write_txn
                .open_table(WALLET_DETAILS)?
                .insert(device_id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn wallet_record(&self, device_id: &str) -> StoreResult<Option<WalletRecord>> {
        self.read_json(WALLET_RECORDS, device_id)
    }

    pub fn wallet_records(&self) -> StoreResult<Vec<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLET_RECORDS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    // =========================================================================
    // Key shares
    // =========================================================================

    pub fn put_key_share(&self, device_id: &str, key_id: &str, sealed: &[u8]) -> StoreResult<()> {
        let key = key_share_key(device_id, key_id);
        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(KEY_SHARES)?.insert(key.as_str(), sealed)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn key_share(&self, device_id: &str, key_id: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key_share_key(device_id, key_id);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEY_SHARES)?;
        Ok(table.get(key.as_str())?.map(|value| value.value().to_vec()))
    }

    pub fn remove_key_share(&self, device_id: &str, key_id: &str) -> StoreResult<()> {
        let key = key_share_key(device_id, key_id);
        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(KEY_SHARES)?.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Drop every row belonging to `device_id`.
    pub fn clear_device(&self, device_id: &str) -> StoreResult<()> {
        let (start, end) = key_share_range(device_id);

        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(AUTH_TOKENS)?.remove(device_id)?;
            write_txn.open_table(WALLET_DETAILS)?.remove(device_id)?;
            write_txn.open_table(WALLET_RECORDS)?.remove(device_id)?;

            let mut shares = write_txn.open_table(KEY_SHARES)?;
            let mut keys = Vec::new();
            for entry in shares.range(start.as_str()..end.as_str())? {
                let (key, _) = entry?;
                keys.push(key.value().to_string());
            }
            for key in keys {
                shares.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;

        tracing::debug!(device_id, "Cleared device storage");
        Ok(())
    }
}
