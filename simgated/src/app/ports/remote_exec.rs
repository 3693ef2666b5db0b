// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::types::SshConfig;

#[derive(Debug, Clone)]
pub struct ExecCapture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ExecCapture {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[async_trait]
/// Remote command execution and file transfer boundary.
pub trait RemoteExecPort: Send + Sync {
    async fn exec_capture(&self, config: &SshConfig, command: &str) -> AppResult<ExecCapture>;

    async fn upload(&self, config: &SshConfig, local: &Path, remote: &str) -> AppResult<()>;

    async fn download(&self, config: &SshConfig, remote: &str, local: &Path) -> AppResult<()>;
}

/// Runs `command` and turns a non-zero exit into a transport error carrying stderr.
pub async fn run_command(
    remote: &dyn RemoteExecPort,
    config: &SshConfig,
    command: &str,
) -> AppResult<ExecCapture> {
    let capture = remote.exec_capture(config, command).await?;
    if capture.exit_code != 0 {
        return Err(AppError::with_message(
            AppErrorKind::Unavailable,
            codes::REMOTE_ERROR,
            format!(
                "remote command exited with {}: {}",
                capture.exit_code,
                capture.stderr_lossy().trim()
            ),
        )
        .with_context(command.to_string()));
    }
    Ok(capture)
}
