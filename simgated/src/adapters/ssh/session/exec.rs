// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result, anyhow};
use russh::ChannelMsg;

use super::SessionManager;

/// Reported for commands that ended without an exit status.
pub const NO_EXIT_STATUS: i32 = -1;

/// Output of one remote command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` until the server sends an exit status.
    pub exit_status: Option<u32>,
    pub signal: Option<String>,
}

impl Captured {
    /// Exit status as seen by callers. A signal or a missing status is a failure.
    pub fn exit_code(&self) -> i32 {
        match (self.signal.as_ref(), self.exit_status) {
            (None, Some(status)) => i32::try_from(status).unwrap_or(NO_EXIT_STATUS),
            _ => NO_EXIT_STATUS,
        }
    }
}

/// Folds one channel message into `captured`; true once the channel closed.
fn handle_capture_message(msg: &ChannelMsg, captured: &mut Captured) -> bool {
    match msg {
        ChannelMsg::Data { data } => {
            captured.stdout.extend_from_slice(data);
            false
        }
        ChannelMsg::ExtendedData { data, ext: 1 } => {
            captured.stderr.extend_from_slice(data);
            false
        }
        ChannelMsg::ExitStatus { exit_status } => {
            captured.exit_status = Some(*exit_status);
            false
        }
        ChannelMsg::ExitSignal {
            signal_name,
            error_message,
            ..
        } => {
            let signal = format!("{signal_name:?}");
            let note = if error_message.is_empty() {
                format!("killed by signal {signal}")
            } else {
                format!("killed by signal {signal}: {error_message}")
            };
            if !captured.stderr.is_empty() && !captured.stderr.ends_with(b"\n") {
                captured.stderr.push(b'\n');
            }
            captured.stderr.extend_from_slice(note.as_bytes());
            captured.signal = Some(signal);
            false
        }
        ChannelMsg::Close => true,
        _ => false,
    }
}

impl SessionManager {
    /// Execute command over SSH, retrieving stdout, stderr and exit code.
    pub async fn exec_capture(&self, cmd: &str) -> Result<Captured> {
        let guard = self.handle.lock().await;
        let handle = guard.as_ref().ok_or_else(|| anyhow!("SSH handle lost"))?;
        let mut chan = handle
            .channel_open_session()
            .await
            .context("open session")?;
        log::debug!("executing '{}'", cmd);
        chan.exec(true, cmd).await.context("exec request")?;

        let mut captured = Captured::default();
        while let Some(msg) = chan.wait().await {
            if handle_capture_message(&msg, &mut captured) {
                break;
            }
        }
        let _ = chan.eof().await;
        let _ = chan.close().await;
        if captured.exit_status.is_none() && captured.signal.is_none() {
            log::warn!("'{}' ended without an exit status", cmd);
        }
        Ok(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::{Captured, NO_EXIT_STATUS, handle_capture_message};
    use russh::{ChannelMsg, CryptoVec, Sig};

    #[test]
    fn capture_accumulates_output() {
        let mut captured = Captured::default();

        let msg = ChannelMsg::Data {
            data: CryptoVec::from_slice(b"Submitted batch "),
        };
        assert!(!handle_capture_message(&msg, &mut captured));
        let msg = ChannelMsg::Data {
            data: CryptoVec::from_slice(b"job 12"),
        };
        assert!(!handle_capture_message(&msg, &mut captured));
        assert_eq!(captured.stdout, b"Submitted batch job 12");

        let msg = ChannelMsg::ExtendedData {
            data: CryptoVec::from_slice(b"warn"),
            ext: 1,
        };
        assert!(!handle_capture_message(&msg, &mut captured));
        assert_eq!(captured.stderr, b"warn");

        let msg = ChannelMsg::ExitStatus { exit_status: 42 };
        assert!(!handle_capture_message(&msg, &mut captured));
        assert_eq!(captured.exit_code(), 42);

        assert!(handle_capture_message(&ChannelMsg::Close, &mut captured));
    }

    #[test]
    fn killed_command_is_a_failure() {
        let mut captured = Captured::default();
        let msg = ChannelMsg::ExitSignal {
            signal_name: Sig::KILL,
            core_dumped: false,
            error_message: String::new(),
            lang_tag: String::new(),
        };
        assert!(!handle_capture_message(&msg, &mut captured));
        assert!(handle_capture_message(&ChannelMsg::Close, &mut captured));

        assert_ne!(captured.exit_code(), 0);
        assert_eq!(captured.exit_code(), NO_EXIT_STATUS);
        let stderr = String::from_utf8(captured.stderr).unwrap();
        assert!(stderr.contains("KILL"), "stderr: {stderr}");
    }

    #[test]
    fn close_without_exit_status_is_a_failure() {
        let mut captured = Captured::default();
        let msg = ChannelMsg::Data {
            data: CryptoVec::from_slice(b"partial"),
        };
        handle_capture_message(&msg, &mut captured);
        assert!(handle_capture_message(&ChannelMsg::Close, &mut captured));
        assert_eq!(captured.exit_code(), NO_EXIT_STATUS);
    }

    #[test]
    fn zero_exit_status_is_success() {
        let mut captured = Captured::default();
        handle_capture_message(&ChannelMsg::ExitStatus { exit_status: 0 }, &mut captured);
        assert_eq!(captured.exit_code(), 0);
    }

    #[test]
    fn unknown_extended_data_is_ignored() {
        let mut captured = Captured::default();
        let msg = ChannelMsg::ExtendedData {
            data: CryptoVec::from_slice(b"skip"),
            ext: 2,
        };
        assert!(!handle_capture_message(&msg, &mut captured));
        assert!(captured.stderr.is_empty());
    }
}
