// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ExecCapture, RemoteExecPort};
use crate::app::types::SshConfig;

mod error;
mod session;

pub mod session_cache;

use session_cache::{DefaultSessionFactory, SessionCache};

pub use error::AuthenticationFailure;
pub use session::{SessionManager, SshParams};

#[derive(Clone)]
pub struct SshAdapter {
    sessions: Arc<SessionCache>,
}

impl SshAdapter {
    pub fn new(sessions: Arc<SessionCache>) -> Self {
        Self { sessions }
    }

    pub fn with_defaults() -> Self {
        let factory = Arc::new(DefaultSessionFactory);
        let sessions = Arc::new(SessionCache::new(factory));
        Self::new(sessions)
    }

    pub async fn shutdown(&self) {
        self.sessions.shutdown_all().await;
    }

    async fn connected(&self, config: &SshConfig) -> AppResult<Arc<SessionManager>> {
        let session = self.sessions.get_or_create(config).await?;
        session
            .ensure_connected()
            .await
            .map_err(|err| map_connect_error(err, config))?;
        Ok(session)
    }

    /// Unnamed sessions live for a single operation.
    async fn release(&self, config: &SshConfig, session: &SessionManager) {
        if config.session_name.is_none() {
            session.shutdown().await;
        }
    }
}

fn ssh_error_code(err: &anyhow::Error) -> &'static str {
    if err.chain().any(|cause| cause.is::<AuthenticationFailure>()) {
        codes::AUTHENTICATION_FAILURE
    } else {
        codes::CONNECTION_FAILURE
    }
}

fn map_connect_error(err: anyhow::Error, config: &SshConfig) -> AppError {
    AppError::with_message(
        AppErrorKind::Unavailable,
        ssh_error_code(&err),
        format!("ssh connect failed: {err:#}"),
    )
    .with_context(format!("{}@{}", config.username, config.addr))
}

fn map_exec_error(err: anyhow::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Unavailable,
        codes::REMOTE_ERROR,
        format!("ssh exec failed: {err:#}"),
    )
}

fn map_transfer_error(op: &str, err: anyhow::Error) -> AppError {
    if is_sftp_missing_path(&err) {
        return AppError::with_message(
            AppErrorKind::NotFound,
            codes::NOT_FOUND,
            format!("{op} failed: {err:#}"),
        );
    }
    AppError::with_message(
        AppErrorKind::Unavailable,
        codes::REMOTE_ERROR,
        format!("{op} failed: {err:#}"),
    )
}

fn is_sftp_missing_path(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let Some(sftp_error) = cause.downcast_ref::<russh_sftp::client::error::Error>() else {
            return false;
        };
        matches!(
            sftp_error,
            russh_sftp::client::error::Error::Status(status)
                if status.status_code == russh_sftp::protocol::StatusCode::NoSuchFile
        )
    })
}

#[async_trait]
impl RemoteExecPort for SshAdapter {
    #[tracing::instrument(skip(self, config), fields(op = "exec", host = %config.host))]
    async fn exec_capture(&self, config: &SshConfig, command: &str) -> AppResult<ExecCapture> {
        let session = self.connected(config).await?;
        let result = session.exec_capture(command).await;
        self.release(config, &session).await;
        let captured = result.map_err(map_exec_error)?;
        let exit_code = captured.exit_code();
        tracing::debug!(exit_code, signal = ?captured.signal, "remote command finished");
        Ok(ExecCapture {
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit_code,
        })
    }

    #[tracing::instrument(skip(self, config, local), fields(op = "upload", host = %config.host))]
    async fn upload(&self, config: &SshConfig, local: &Path, remote: &str) -> AppResult<()> {
        let session = self.connected(config).await?;
        let result = session.upload_file(local, remote).await;
        self.release(config, &session).await;
        let bytes = result.map_err(|err| map_transfer_error("upload", err))?;
        tracing::debug!(bytes, local = %local.display(), "uploaded file");
        Ok(())
    }

    #[tracing::instrument(skip(self, config, local), fields(op = "download", host = %config.host))]
    async fn download(&self, config: &SshConfig, remote: &str, local: &Path) -> AppResult<()> {
        let session = self.connected(config).await?;
        let result = session.download_file(remote, local).await;
        self.release(config, &session).await;
        let bytes = result.map_err(|err| map_transfer_error("download", err))?;
        tracing::debug!(bytes, local = %local.display(), "downloaded file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn authentication_failure_is_classified() {
        let err = anyhow::Error::from(AuthenticationFailure).context("connect");
        assert_eq!(ssh_error_code(&err), codes::AUTHENTICATION_FAILURE);
        assert_eq!(ssh_error_code(&anyhow!("refused")), codes::CONNECTION_FAILURE);
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = map_exec_error(anyhow!("channel closed"));
        assert_eq!(err.code(), codes::REMOTE_ERROR);
        assert!(err.is_retryable());

        let err = map_transfer_error("upload", anyhow!("broken pipe"));
        assert_eq!(err.kind(), AppErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_connecting() {
        let adapter = SshAdapter::with_defaults();
        let config = SshConfig {
            session_name: None,
            host: String::new(),
            addr: "127.0.0.1:22".parse().unwrap(),
            username: "sim".into(),
            identity_path: None,
            known_hosts_path: None,
            keepalive_secs: 30,
        };
        let err = adapter.exec_capture(&config, "true").await.unwrap_err();
        assert_eq!(err.code(), codes::INVALID_ARGUMENT);
    }
}
