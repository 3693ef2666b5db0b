// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error as ThisError;
use tokio::net::lookup_host;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};

#[derive(ThisError, Debug)]
pub enum NetError {
    #[error("DNS name not found for {0}")]
    DnsNotFound(String),

    #[error("couldn't resolve host {host}: {source}")]
    Resolve { host: String, source: io::Error },

    #[error("no addresses resolved from {0}")]
    NoAddrs(String),
}

async fn lookup_first_addr(host: &str, port: u16) -> Result<SocketAddr, NetError> {
    let mut addrs = lookup_host((host, port)).await.map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => NetError::DnsNotFound(host.to_owned()),
        _ => NetError::Resolve {
            host: host.to_owned(),
            source,
        },
    })?;
    addrs.next().ok_or_else(|| NetError::NoAddrs(host.to_owned()))
}

fn map_net_error(err: NetError) -> AppError {
    let kind = match err {
        NetError::DnsNotFound(_) | NetError::NoAddrs(_) => AppErrorKind::InvalidArgument,
        NetError::Resolve { .. } => AppErrorKind::Unavailable,
    };
    let code = match kind {
        AppErrorKind::InvalidArgument => codes::INVALID_ARGUMENT,
        _ => codes::CONNECTION_FAILURE,
    };
    AppError::with_message(kind, code, err.to_string())
}

/// IP literals short-circuit; hostnames resolve to their first address.
pub async fn resolve_host_addr(host: &str, port: u16) -> AppResult<SocketAddr> {
    let host = host.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    lookup_first_addr(host, port).await.map_err(map_net_error)
}
