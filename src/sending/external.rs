// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hand-off of unsigned transactions to externally linked wallets.
//!
//! Each request gets its own id and pending slot, so overlapping requests
//! to one or many sessions are resolved independently. The response arrives
//! later through [`ExternalSignerBridge::resolve`], typically from the
//! WalletConnect session handler of the host application.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::blockchain::EvmTransaction;
use crate::wallet::ExternalSession;

/// Default time an external wallet gets to answer.
pub const DEFAULT_EXTERNAL_SIGN_TIMEOUT: Duration = Duration::from_secs(120);

/// JSON-RPC method requested from the external wallet.
pub const ETH_SEND_TRANSACTION: &str = "eth_sendTransaction";

/// A signing request sent to an external wallet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSignRequest {
    pub id: Uuid,
    pub session: ExternalSession,
    pub method: &'static str,
    pub transaction: EvmTransaction,
}

/// Delivers requests to the external wallet (e.g. a WalletConnect relay).
#[async_trait]
pub trait ExternalWalletTransport: Send + Sync {
    async fn dispatch(&self, request: ExternalSignRequest) -> Result<(), ExternalSignError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalSignError {
    #[error("Failed to reach external wallet: {0}")]
    Dispatch(String),

    #[error("External wallet rejected the request: {0}")]
    Rejected(String),

    #[error("External wallet did not answer within {0:?}")]
    Timeout(Duration),

    #[error("External signing request was dropped")]
    Cancelled,
}

type PendingSlot = oneshot::Sender<Result<String, ExternalSignError>>;

/// Removes a request's slot when its caller stops waiting, however it stops.
struct PendingGuard<'a> {
    bridge: &'a ExternalSignerBridge,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.bridge.lock_pending().remove(&self.id);
    }
}

/// Request/response correlation table for external signers.
pub struct ExternalSignerBridge {
    transport: Arc<dyn ExternalWalletTransport>,
    pending: Mutex<HashMap<Uuid, PendingSlot>>,
    timeout: Duration,
}

impl ExternalSignerBridge {
    pub fn new(transport: Arc<dyn ExternalWalletTransport>) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            timeout: DEFAULT_EXTERNAL_SIGN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the external wallet to sign and send `transaction`; resolves to
    /// the transaction hash it reports.
    pub async fn send_transaction(
        &self,
        session: &ExternalSession,
        transaction: EvmTransaction,
    ) -> Result<String, ExternalSignError> {
        let id = Uuid::new_v4();
        let (slot, response) = oneshot::channel();
        self.lock_pending().insert(id, slot);
        let _pending = PendingGuard { bridge: self, id };

        let request = ExternalSignRequest {
            id,
            session: session.clone(),
            method: ETH_SEND_TRANSACTION,
            transaction,
        };

        self.transport.dispatch(request).await?;

        tracing::debug!(request_id = %id, topic = %session.topic, "Awaiting external wallet response");

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ExternalSignError::Cancelled),
            Err(_) => {
                tracing::warn!(request_id = %id, "External wallet request timed out");
                Err(ExternalSignError::Timeout(self.timeout))
            }
        }
    }

    /// Deliver the external wallet's answer for `request_id`.
    ///
    /// Returns `false` when no request with that id is pending (already
    /// resolved, timed out, or unknown).
    pub fn resolve(&self, request_id: Uuid, result: Result<String, String>) -> bool {
        let Some(slot) = self.lock_pending().remove(&request_id) else {
            tracing::warn!(request_id = %request_id, "Response for unknown external request");
            return false;
        };
        slot.send(result.map_err(ExternalSignError::Rejected)).is_ok()
    }

    /// Number of requests awaiting an answer.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingSlot>> {
        // A poisoned table still holds valid slots.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, U256};

    /// Transport that records requests and optionally answers them.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub requests: Mutex<Vec<ExternalSignRequest>>,
        pub fail: bool,
    }

    #[async_trait]
    impl ExternalWalletTransport for RecordingTransport {
        async fn dispatch(&self, request: ExternalSignRequest) -> Result<(), ExternalSignError> {
            if self.fail {
                return Err(ExternalSignError::Dispatch("relay offline".into()));
            }
            self.requests.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn tx() -> EvmTransaction {
        EvmTransaction {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            value: U256::from(1u64),
            data: Bytes::new(),
            nonce: 0,
            gas_price: U256::from(1u64),
            gas_limit: U256::from(21_000u64),
            chain_id: 1,
        }
    }

    fn session(topic: &str) -> ExternalSession {
        ExternalSession {
            topic: topic.to_string(),
        }
    }

    async fn wait_for_requests(transport: &RecordingTransport, count: usize) -> Vec<Uuid> {
        loop {
            let ids: Vec<Uuid> = transport.requests.lock().unwrap().iter().map(|r| r.id).collect();
            if ids.len() >= count {
                return ids;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn overlapping_requests_resolve_independently() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = Arc::new(ExternalSignerBridge::new(transport.clone()));

        let first = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.send_transaction(&session("a"), tx()).await }
        });
        let second = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.send_transaction(&session("b"), tx()).await }
        });

        let ids = wait_for_requests(&transport, 2).await;
        let topics: Vec<String> = transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.session.topic.clone())
            .collect();

        // Answer in reverse order.
        for (id, topic) in ids.iter().zip(topics.iter()).rev() {
            assert!(bridge.resolve(*id, Ok(format!("0x{topic}"))));
        }

        assert_eq!(first.await.unwrap().unwrap(), "0xa");
        assert_eq!(second.await.unwrap().unwrap(), "0xb");
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_and_is_forgotten() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = ExternalSignerBridge::new(transport.clone()).with_timeout(Duration::from_secs(5));

        let err = bridge.send_transaction(&session("a"), tx()).await.unwrap_err();
        assert_eq!(err, ExternalSignError::Timeout(Duration::from_secs(5)));
        assert_eq!(bridge.pending_count(), 0);

        let id = transport.requests.lock().unwrap()[0].id;
        assert!(!bridge.resolve(id, Ok("0xlate".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_callers_leave_no_pending_slots() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = ExternalSignerBridge::new(transport.clone());

        for topic in ["a", "b", "c"] {
            let abandoned = tokio::time::timeout(
                Duration::from_millis(5),
                bridge.send_transaction(&session(topic), tx()),
            )
            .await;
            assert!(abandoned.is_err());
        }

        assert_eq!(transport.requests.lock().unwrap().len(), 3);
        assert_eq!(bridge.pending_count(), 0);
        let id = transport.requests.lock().unwrap()[0].id;
        assert!(!bridge.resolve(id, Ok("0xlate".into())));
    }

    #[tokio::test]
    async fn rejection_and_dispatch_failures_surface() {
        let failing = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let bridge = ExternalSignerBridge::new(failing);
        let err = bridge.send_transaction(&session("a"), tx()).await.unwrap_err();
        assert!(matches!(err, ExternalSignError::Dispatch(_)));
        assert_eq!(bridge.pending_count(), 0);

        let transport = Arc::new(RecordingTransport::default());
        let bridge = Arc::new(ExternalSignerBridge::new(transport.clone()));
        let pending = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.send_transaction(&session("a"), tx()).await }
        });
        let ids = wait_for_requests(&transport, 1).await;
        bridge.resolve(ids[0], Err("user rejected".into()));
        assert_eq!(
            pending.await.unwrap().unwrap_err(),
            ExternalSignError::Rejected("user rejected".into())
        );
    }
}
