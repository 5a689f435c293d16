// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device-side MPC signing.
//!
//! [`MpcSdk`] is the custody vendor's SDK as the host binds it; [`MpcConnector`]
//! turns its callback and status APIs into awaited calls with bounded polling.
//! The service layer only sees [`DeviceSigner`], built per device by a
//! [`ConnectorFactory`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

/// Key readiness polling: attempts and spacing.
pub const KEY_READY_POLL: PollPolicy = PollPolicy::new(50, Duration::from_millis(500));
/// Signature completion polling: attempts and spacing.
pub const SIGN_POLL: PollPolicy = PollPolicy::new(5, Duration::from_millis(500));

/// Bounded fixed-interval polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

/// State of the device's threshold key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    NotReady,
    Ready,
    Error(String),
}

/// Device-side signature state of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Pending,
    Completed,
    Failed(String),
}

/// Receives the join-request id (or SDK error) exactly once.
pub type JoinRequestHandler = Box<dyn FnOnce(Result<String, String>) + Send>;

/// Custody SDK bound to one device.
#[async_trait]
pub trait MpcSdk: Send + Sync {
    /// Start the join-wallet ceremony; `handler` gets the request id.
    fn request_join_existing_wallet(&self, handler: JoinRequestHandler);

    async fn key_status(&self) -> Result<KeyStatus, String>;

    /// Co-sign `transaction_id` and report the resulting status.
    async fn sign_transaction(&self, transaction_id: &str) -> Result<SignatureStatus, String>;

    fn stop_join_wallet(&self);
}

/// Key-share persistence the SDK delegates to.
pub trait KeyStorageDelegate: Send + Sync {
    fn store(&self, key_id: &str, share: &[u8]) -> Result<(), String>;
    fn load(&self, key_id: &str) -> Result<Option<Vec<u8>>, String>;
    fn remove(&self, key_id: &str) -> Result<(), String>;
}

/// What the connection service needs from a device.
#[async_trait]
pub trait DeviceSigner: Send + Sync {
    async fn request_join_existing_wallet(&self) -> Result<String, ConnectorError>;
    async fn wait_for_key_is_ready(&self) -> Result<(), ConnectorError>;
    async fn sign_transaction_with(&self, transaction_id: &str) -> Result<(), ConnectorError>;
    fn stop_join_wallet(&self);
}

/// Builds a device signer for `(device_id, access_token)`.
pub trait ConnectorFactory: Send + Sync {
    fn connect(&self, device_id: &str, access_token: &str)
        -> Result<Arc<dyn DeviceSigner>, ConnectorError>;
}

impl<F> ConnectorFactory for F
where
    F: Fn(&str, &str) -> Result<Arc<dyn DeviceSigner>, ConnectorError> + Send + Sync,
{
    fn connect(
        &self,
        device_id: &str,
        access_token: &str,
    ) -> Result<Arc<dyn DeviceSigner>, ConnectorError> {
        self(device_id, access_token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    #[error("MPC SDK initialisation failed: {0}")]
    Init(String),

    #[error("Join wallet request failed: {0}")]
    JoinFailed(String),

    #[error("MPC key was not ready after {0} attempts")]
    KeyTimeout(u32),

    #[error("MPC key failed: {0}")]
    KeyFailed(String),

    #[error("Transaction {transaction_id} was not signed after {attempts} attempts")]
    SignTimeout { transaction_id: String, attempts: u32 },

    #[error("Signing failed: {0}")]
    SignFailed(String),
}

/// [`DeviceSigner`] over an [`MpcSdk`].
pub struct MpcConnector<S> {
    device_id: String,
    sdk: S,
    key_poll: PollPolicy,
    sign_poll: PollPolicy,
}

impl<S: MpcSdk> MpcConnector<S> {
    pub fn new(device_id: impl Into<String>, sdk: S) -> Self {
        Self {
            device_id: device_id.into(),
            sdk,
            key_poll: KEY_READY_POLL,
            sign_poll: SIGN_POLL,
        }
    }

    pub fn with_polling(mut self, key_poll: PollPolicy, sign_poll: PollPolicy) -> Self {
        self.key_poll = key_poll;
        self.sign_poll = sign_poll;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[async_trait]
impl<S: MpcSdk> DeviceSigner for MpcConnector<S> {
    async fn request_join_existing_wallet(&self) -> Result<String, ConnectorError> {
        let (tx, rx) = oneshot::channel();
        self.sdk.request_join_existing_wallet(Box::new(move |result| {
            let _ = tx.send(result);
        }));

        let request_id = rx
            .await
            .map_err(|_| ConnectorError::JoinFailed("SDK dropped the join handler".into()))?
            .map_err(ConnectorError::JoinFailed)?;

        tracing::info!(device_id = %self.device_id, "Join wallet request created");
        Ok(request_id)
    }

    async fn wait_for_key_is_ready(&self) -> Result<(), ConnectorError> {
        for attempt in 1..=self.key_poll.attempts {
            match self.sdk.key_status().await {
                Ok(KeyStatus::Ready) => {
                    tracing::info!(device_id = %self.device_id, attempt, "MPC key ready");
                    return Ok(());
                }
                Ok(KeyStatus::Error(reason)) => return Err(ConnectorError::KeyFailed(reason)),
                Ok(KeyStatus::NotReady) => {}
                Err(e) => {
                    tracing::debug!(device_id = %self.device_id, attempt, error = %e, "Key status query failed");
                }
            }
            if attempt < self.key_poll.attempts {
                tokio::time::sleep(self.key_poll.interval).await;
            }
        }
        Err(ConnectorError::KeyTimeout(self.key_poll.attempts))
    }

    async fn sign_transaction_with(&self, transaction_id: &str) -> Result<(), ConnectorError> {
        // A join flow left running keeps SDK listeners alive.
        self.sdk.stop_join_wallet();

        for attempt in 1..=self.sign_poll.attempts {
            match self.sdk.sign_transaction(transaction_id).await {
                Ok(SignatureStatus::Completed) => {
                    tracing::info!(device_id = %self.device_id, transaction_id, attempt, "Transaction co-signed");
                    return Ok(());
                }
                Ok(SignatureStatus::Failed(reason)) => {
                    return Err(ConnectorError::SignFailed(reason));
                }
                Ok(SignatureStatus::Pending) => {}
                Err(e) => {
                    tracing::debug!(device_id = %self.device_id, transaction_id, attempt, error = %e, "Sign attempt failed");
                }
            }
            if attempt < self.sign_poll.attempts {
                tokio::time::sleep(self.sign_poll.interval).await;
            }
        }
        Err(ConnectorError::SignTimeout {
            transaction_id: transaction_id.to_string(),
            attempts: self.sign_poll.attempts,
        })
    }

    fn stop_join_wallet(&self) {
        self.sdk.stop_join_wallet();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedSdk {
        join: Mutex<Option<Result<String, String>>>,
        key_statuses: Mutex<VecDeque<KeyStatus>>,
        sign_statuses: Mutex<VecDeque<SignatureStatus>>,
        key_calls: AtomicUsize,
        sign_calls: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl MpcSdk for ScriptedSdk {
        fn request_join_existing_wallet(&self, handler: JoinRequestHandler) {
            let result = self.join.lock().unwrap().take();
            if let Some(result) = result {
                // Deliver from another task, like the SDK's event thread.
                tokio::spawn(async move { handler(result) });
            }
        }

        async fn key_status(&self) -> Result<KeyStatus, String> {
            self.key_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .key_statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(KeyStatus::NotReady))
        }

        async fn sign_transaction(&self, _: &str) -> Result<SignatureStatus, String> {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .sign_statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SignatureStatus::Pending))
        }

        fn stop_join_wallet(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn join_callback_becomes_awaited_value() {
        let sdk = ScriptedSdk::default();
        *sdk.join.lock().unwrap() = Some(Ok("join-1".into()));
        let connector = MpcConnector::new("device-1", sdk);

        assert_eq!(connector.request_join_existing_wallet().await.unwrap(), "join-1");
    }

    #[tokio::test]
    async fn dropped_join_handler_is_an_error() {
        let connector = MpcConnector::new("device-1", ScriptedSdk::default());
        assert!(matches!(
            connector.request_join_existing_wallet().await,
            Err(ConnectorError::JoinFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn key_readiness_is_polled() {
        let sdk = ScriptedSdk::default();
        sdk.key_statuses
            .lock()
            .unwrap()
            .extend([KeyStatus::NotReady, KeyStatus::NotReady, KeyStatus::Ready]);
        let connector = MpcConnector::new("device-1", sdk);

        connector.wait_for_key_is_ready().await.unwrap();
        assert_eq!(connector.sdk.key_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn key_never_ready_times_out_after_fifty_attempts() {
        let connector = MpcConnector::new("device-1", ScriptedSdk::default());
        let started = tokio::time::Instant::now();
        let err = connector.wait_for_key_is_ready().await.unwrap_err();
        assert_eq!(err, ConnectorError::KeyTimeout(50));
        assert_eq!(connector.sdk.key_calls.load(Ordering::SeqCst), 50);
        // No sleep after the last attempt.
        assert_eq!(started.elapsed(), Duration::from_millis(49 * 500));
    }

    #[tokio::test(start_paused = true)]
    async fn signing_stops_join_flow_then_polls() {
        let sdk = ScriptedSdk::default();
        sdk.sign_statuses
            .lock()
            .unwrap()
            .extend([SignatureStatus::Pending, SignatureStatus::Completed]);
        let connector = MpcConnector::new("device-1", sdk);

        connector.sign_transaction_with("tx-1").await.unwrap();
        assert_eq!(connector.sdk.stops.load(Ordering::SeqCst), 1);
        assert_eq!(connector.sdk.sign_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn signing_times_out_after_five_attempts() {
        let connector = MpcConnector::new("device-1", ScriptedSdk::default());
        let started = tokio::time::Instant::now();
        let err = connector.sign_transaction_with("tx-1").await.unwrap_err();
        assert!(matches!(err, ConnectorError::SignTimeout { attempts: 5, .. }));
        assert_eq!(connector.sdk.sign_calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_millis(4 * 500));
    }

    #[test]
    fn closures_are_factories() {
        let factory = |_: &str, _: &str| -> Result<Arc<dyn DeviceSigner>, ConnectorError> {
            Err(ConnectorError::Init("no sdk in tests".into()))
        };
        assert!(factory.connect("device", "token").is_err());
    }
}
