// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::app::types::JobStatus;

const QUEUE_CAPACITY: usize = 16;

/// In-process status queue for one waiter on one scheduler job.
#[derive(Debug)]
pub struct JobSubscription {
    id: u64,
    external_job_id: i64,
    receiver: mpsc::Receiver<JobStatus>,
}

impl JobSubscription {
    pub fn external_job_id(&self) -> i64 {
        self.external_job_id
    }

    pub async fn recv(&mut self) -> Option<JobStatus> {
        self.receiver.recv().await
    }
}

/// Waiters keyed by external job id. Entries leave only through `unsubscribe`.
#[derive(Default)]
pub struct WaiterRegistry {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<i64, HashMap<u64, mpsc::Sender<JobStatus>>>>,
}

impl WaiterRegistry {
    pub async fn subscribe(&self, external_job_id: i64) -> JobSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        self.waiters
            .lock()
            .await
            .entry(external_job_id)
            .or_default()
            .insert(id, tx);
        JobSubscription {
            id,
            external_job_id,
            receiver: rx,
        }
    }

    pub async fn unsubscribe(&self, subscription: &JobSubscription) {
        let mut waiters = self.waiters.lock().await;
        if let Some(queues) = waiters.get_mut(&subscription.external_job_id) {
            queues.remove(&subscription.id);
            if queues.is_empty() {
                waiters.remove(&subscription.external_job_id);
            }
        }
    }

    /// Best effort: a full queue drops the update, waiters re-read the database on timeout.
    pub async fn notify(&self, external_job_id: i64, status: JobStatus) -> usize {
        let waiters = self.waiters.lock().await;
        let Some(queues) = waiters.get(&external_job_id) else {
            return 0;
        };
        let mut delivered = 0;
        for tx in queues.values() {
            match tx.try_send(status) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::debug!(external_job_id, %status, "waiter queue rejected update: {err}");
                }
            }
        }
        delivered
    }

    /// Number of live subscriptions.
    pub async fn len(&self) -> usize {
        self.waiters.lock().await.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_reaches_every_waiter_of_the_job() {
        let registry = WaiterRegistry::default();
        let mut a = registry.subscribe(10).await;
        let mut b = registry.subscribe(10).await;
        let mut other = registry.subscribe(11).await;

        assert_eq!(registry.notify(10, JobStatus::Running).await, 2);
        assert_eq!(a.recv().await, Some(JobStatus::Running));
        assert_eq!(b.recv().await, Some(JobStatus::Running));
        assert!(other.receiver.try_recv().is_err());
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_queue() {
        let registry = WaiterRegistry::default();
        let a = registry.subscribe(10).await;
        let b = registry.subscribe(10).await;

        registry.unsubscribe(&a).await;
        assert_eq!(registry.len().await, 1);
        registry.unsubscribe(&b).await;
        assert_eq!(registry.len().await, 0);
        assert!(registry.waiters.lock().await.is_empty());
        assert_eq!(registry.notify(10, JobStatus::Completed).await, 0);
    }

    #[tokio::test]
    async fn full_queue_drops_updates_without_blocking() {
        let registry = WaiterRegistry::default();
        let _sub = registry.subscribe(1).await;
        for _ in 0..QUEUE_CAPACITY {
            assert_eq!(registry.notify(1, JobStatus::Running).await, 1);
        }
        assert_eq!(registry.notify(1, JobStatus::Completed).await, 0);
    }
}
