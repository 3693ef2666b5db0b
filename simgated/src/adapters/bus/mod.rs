// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! In-process event bus plus the TCP bridge workers publish through.

pub mod ingest;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use crate::app::errors::AppResult;
use crate::app::ports::{BusSubscription, EventBusPort};

pub use ingest::EventIngest;

const DEFAULT_CAPACITY: usize = 512;

/// One broadcast channel per subject. Delivery is at-most-once: payloads
/// published while nobody listens are dropped.
pub struct LocalEventBus {
    capacity: usize,
    subjects: Mutex<HashMap<String, broadcast::Sender<Arc<[u8]>>>>,
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LocalEventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subjects: Mutex::new(HashMap::new()),
        }
    }

    async fn sender(&self, subject: &str) -> broadcast::Sender<Arc<[u8]>> {
        let mut subjects = self.subjects.lock().await;
        subjects
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl EventBusPort for LocalEventBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> AppResult<()> {
        let sender = self.sender(subject).await;
        let bytes = payload.len();
        match sender.send(Arc::from(payload)) {
            Ok(receivers) => {
                tracing::trace!(subject, bytes, receivers, "published bus message");
            }
            Err(_) => {
                tracing::debug!(subject, bytes, "no subscribers; bus message dropped");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> AppResult<BusSubscription> {
        let receiver = self.sender(subject).await.subscribe();
        Ok(BusSubscription::new(subject, receiver))
    }
}
