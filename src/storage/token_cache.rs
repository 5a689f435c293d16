// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of auth tokens per device.
//!
//! Saves a redb read on every signing call. Entries expire after the TTL;
//! expired access tokens are still returned so the refresh chain can use
//! the refresh and bootstrap tokens they carry.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::mpc::types::AuthTokens;

struct CacheEntry {
    tokens: AuthTokens,
    inserted_at: Instant,
}

pub struct TokenCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl TokenCache {
    /// - `capacity`: max number of devices cached
    /// - `ttl`: time-to-live of each entry
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Cached tokens for `device_id`, or `None` if absent or stale.
    pub fn get(&self, device_id: &str) -> Option<AuthTokens> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(device_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.tokens.clone());
            }
            cache.pop(device_id);
        }
        None
    }

    pub fn put(&self, device_id: &str, tokens: AuthTokens) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                device_id.to_string(),
                CacheEntry {
                    tokens,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn invalidate(&self, device_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(device_id);
        }
    }
}
