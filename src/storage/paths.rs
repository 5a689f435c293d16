// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-disk layout of the wallet core's data directory.

use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory.
pub const DATA_ROOT: &str = "./data";

/// Paths under the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// redb file holding tokens, wallet details, records and sealed key shares.
    pub fn database(&self) -> PathBuf {
        self.root.join("mpc_wallet.redb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_lives_under_root() {
        let paths = StoragePaths::new("/tmp/wallet");
        assert_eq!(paths.database(), PathBuf::from("/tmp/wallet/mpc_wallet.redb"));
        assert_eq!(StoragePaths::default().root(), Path::new(DATA_ROOT));
    }
}
