// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-device serialization of MPC operations.
//!
//! The custody SDK is not reentrant per device, so at most one signing or
//! transfer ceremony runs for a device id at a time. Later callers wait on
//! an async mutex for that device; callers for other devices are unaffected.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type DeviceLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
pub struct ActionsQueue {
    locks: Mutex<HashMap<String, DeviceLock>>,
    active: Mutex<HashSet<String>>,
}

/// Clears the active flag even if the action is cancelled mid-way.
struct ActiveGuard<'a> {
    queue: &'a ActionsQueue,
    device_id: &'a str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        lock(&self.queue.active).remove(self.device_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ActionsQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an action for `device_id` is running right now.
    pub fn is_active(&self, device_id: &str) -> bool {
        lock(&self.active).contains(device_id)
    }

    /// Run `action` once no other action for `device_id` is running.
    pub async fn run<F, T>(&self, device_id: &str, action: F) -> T
    where
        F: Future<Output = T>,
    {
        let device_lock = {
            let mut locks = lock(&self.locks);
            Arc::clone(locks.entry(device_id.to_string()).or_default())
        };

        let output = {
            let _permit = device_lock.lock().await;
            lock(&self.active).insert(device_id.to_string());
            let _active = ActiveGuard {
                queue: self,
                device_id,
            };
            tracing::debug!(device_id, "Device action started");
            action.await
        };

        // Forget the lock once nobody else holds or waits on it.
        let mut locks = lock(&self.locks);
        if Arc::strong_count(&device_lock) == 2 {
            locks.remove(device_id);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn same_device_actions_never_overlap() {
        let queue = Arc::new(ActionsQueue::new());
        let timeline = Arc::new(Mutex::new(Vec::new()));

        let spawn = |name: &'static str| {
            let queue = queue.clone();
            let timeline = timeline.clone();
            tokio::spawn(async move {
                queue
                    .run("device-1", async {
                        timeline.lock().unwrap().push(format!("{name}:start"));
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        timeline.lock().unwrap().push(format!("{name}:end"));
                    })
                    .await
            })
        };

        let first = spawn("a");
        tokio::task::yield_now().await;
        assert!(queue.is_active("device-1"));
        let second = spawn("b");

        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            *timeline.lock().unwrap(),
            vec!["a:start", "a:end", "b:start", "b:end"]
        );
        assert!(!queue.is_active("device-1"));
        assert!(lock(&queue.locks).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn different_devices_run_concurrently() {
        let queue = Arc::new(ActionsQueue::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let blocked = tokio::spawn({
            let queue = queue.clone();
            async move { queue.run("device-1", async { rx.await.ok() }).await }
        });
        tokio::task::yield_now().await;

        let other = queue.run("device-2", async { 7 }).await;
        assert_eq!(other, 7);
        assert!(queue.is_active("device-1"));

        tx.send(()).unwrap();
        blocked.await.unwrap();
        assert!(!queue.is_active("device-1"));
    }

    #[tokio::test]
    async fn cancelled_action_releases_the_device() {
        let queue = ActionsQueue::new();
        let action = queue.run("device-1", std::future::pending::<()>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), action).await;

        assert!(timed_out.is_err());
        assert!(!queue.is_active("device-1"));
        assert_eq!(queue.run("device-1", async { 1 }).await, 1);
    }
}
