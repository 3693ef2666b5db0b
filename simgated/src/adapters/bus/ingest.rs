// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::app::errors::{AppResult, local_error};
use crate::app::ports::EventBusPort;

/// Longest worker event line accepted before the connection is dropped.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Accepts newline-delimited JSON from workers and republishes each line on one subject.
pub struct EventIngest {
    bus: Arc<dyn EventBusPort>,
    subject: String,
    max_line_bytes: usize,
}

impl EventIngest {
    pub fn new(bus: Arc<dyn EventBusPort>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            subject: subject.into(),
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub async fn bind(addr: SocketAddr) -> AppResult<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|err| local_error(format!("failed to bind event ingest on {addr}: {err}")))
    }

    /// Runs until `stop` flips to true; open connections are aborted on the way out.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, mut stop: watch::Receiver<bool>) {
        let local = listener.local_addr().ok();
        tracing::info!(addr = ?local, subject = %self.subject, "event ingest listening");
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(Arc::clone(&self).handle_connection(stream, peer));
                    }
                    Err(err) => tracing::warn!(error = %err, "event ingest accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
        connections.abort_all();
        while connections.join_next().await.is_some() {}
        tracing::info!(addr = ?local, "event ingest stopped");
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        tracing::debug!(%peer, "worker connected");
        let mut lines =
            FramedRead::new(stream, LinesCodec::new_with_max_length(self.max_line_bytes));
        let mut published = 0usize;
        while let Some(next) = lines.next().await {
            let line = match next {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    tracing::warn!(
                        %peer,
                        max_line_bytes = self.max_line_bytes,
                        "worker event line too long, dropping connection"
                    );
                    break;
                }
                Err(LinesCodecError::Io(err)) => {
                    tracing::warn!(%peer, error = %err, "worker connection read failed");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(err) = self.bus.publish(&self.subject, line.as_bytes().to_vec()).await {
                tracing::warn!(%peer, error = %err, "failed to publish worker event");
                continue;
            }
            published += 1;
        }
        tracing::debug!(%peer, published, "worker disconnected");
    }
}
