// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::app::errors::AppResult;

/// Publish/subscribe on named subjects with opaque (JSON) payloads.
#[async_trait]
pub trait EventBusPort: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> AppResult<()>;
    async fn subscribe(&self, subject: &str) -> AppResult<BusSubscription>;
}

/// Receiving end of one subscription.
pub struct BusSubscription {
    subject: String,
    receiver: broadcast::Receiver<Arc<[u8]>>,
}

impl BusSubscription {
    pub fn new(subject: impl Into<String>, receiver: broadcast::Receiver<Arc<[u8]>>) -> Self {
        Self {
            subject: subject.into(),
            receiver,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next payload, or `None` once the bus is gone. Lagged messages are skipped.
    pub async fn next(&mut self) -> Option<Arc<[u8]>> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        subject = %self.subject,
                        skipped,
                        "bus subscriber lagged; messages dropped"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
