// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result, anyhow};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{OpenFlags, StatusCode};
use std::path::Path;
use tokio::fs as tokiofs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::SessionManager;

const BLOCK_SIZE: usize = 64 * 1024;

impl SessionManager {
    async fn sftp(&self) -> Result<SftpSession> {
        let guard = self.handle.lock().await;
        let handle = guard
            .as_ref()
            .ok_or_else(|| anyhow!("SSH handle lost before opening SFTP"))?;
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(sftp)
    }

    /// Copies a local file to `remote_path`, truncating whatever was there.
    pub async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<u64> {
        let sftp = self.sftp().await?;
        let written = upload_single_file(&sftp, local_path, remote_path).await;
        let _ = sftp.close().await;
        written.map_err(|err| annotate_permission(err, remote_path))
    }

    pub async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let sftp = self.sftp().await?;
        let read = download_file(&sftp, remote_path, local_path).await;
        let _ = sftp.close().await;
        read
    }
}

async fn upload_single_file(sftp: &SftpSession, local_path: &Path, remote_path: &str) -> Result<u64> {
    log::debug!(
        "uploading file over sftp: {} -> {}",
        local_path.display(),
        remote_path
    );
    let mut lf = tokiofs::File::open(local_path)
        .await
        .with_context(|| format!("failed to open {}", local_path.display()))?;
    let flags = OpenFlags::WRITE
        .union(OpenFlags::CREATE)
        .union(OpenFlags::TRUNCATE);
    let mut rfile = sftp.open_with_flags(remote_path, flags).await?;
    let mut written = 0u64;
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = lf.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        rfile.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    rfile.flush().await?;
    rfile.shutdown().await?;
    Ok(written)
}

async fn download_file(sftp: &SftpSession, remote_path: &str, local_path: &Path) -> Result<u64> {
    let mut rfile = sftp.open(remote_path).await?;
    write_into_place(&mut rfile, local_path).await
}

/// Streams `reader` into a temporary file next to `local_path` and renames it
/// into place once complete. A failed copy leaves nothing at `local_path`.
async fn write_into_place<R>(reader: &mut R, local_path: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let parent = match local_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokiofs::create_dir_all(parent).await?;
    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?
        .into_parts();
    let mut lfile = tokiofs::File::from_std(file);
    let copied = tokio::io::copy(reader, &mut lfile)
        .await
        .with_context(|| format!("download into {} interrupted", local_path.display()))?;
    lfile.flush().await?;
    drop(lfile);
    temp_path
        .persist(local_path)
        .with_context(|| format!("failed to move download into {}", local_path.display()))?;
    Ok(copied)
}

fn annotate_permission(err: anyhow::Error, remote_path: &str) -> anyhow::Error {
    let denied = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<russh_sftp::client::error::Error>())
        .any(is_permission_denied);
    if denied {
        err.context(format!("permission denied writing {remote_path}"))
    } else {
        err
    }
}

fn is_permission_denied(err: &russh_sftp::client::error::Error) -> bool {
    match err {
        russh_sftp::client::error::Error::Status(status) => {
            status.status_code == StatusCode::PermissionDenied
        }
        russh_sftp::client::error::Error::IO(msg) => {
            msg.to_lowercase().contains("permission denied")
        }
        _ => false,
    }
}
