// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use russh::client::AuthResult;
use russh::keys::PrivateKeyWithHashAlg;
use std::sync::Arc;

use crate::adapters::ssh::AuthenticationFailure;

use super::{ClientHandler, SessionManager};

#[derive(Debug, PartialEq, Eq)]
enum AuthDecision {
    Success,
    Failure,
}

fn auth_decision(result: AuthResult) -> AuthDecision {
    match result {
        AuthResult::Success => AuthDecision::Success,
        AuthResult::Failure { .. } => AuthDecision::Failure,
    }
}

impl SessionManager {
    /// Ensure we have a connected & authenticated handle (public key only).
    pub async fn ensure_connected(&self) -> Result<()> {
        let mut handle_field = self.handle.lock().await;

        // If handle exists but is closed, drop it so we reconnect.
        let needs_connect = match handle_field.as_ref() {
            None => true,
            Some(h) if h.is_closed() => true,
            Some(_) => false,
        };
        if !needs_connect {
            return Ok(());
        }

        log::info!(
            "establishing connection with {}@{}",
            &self.params.username,
            &self.params.addr
        );
        let handler = ClientHandler::new(
            self.params.host.clone(),
            self.params.addr,
            self.params.known_hosts_path.clone(),
        );
        let mut handle = russh::client::connect(self.config.clone(), self.params.addr, handler)
            .await
            .context("SSH connect failed")?;

        let Some(path) = &self.params.identity_path else {
            log::warn!(
                "no identity configured for {}@{}",
                &self.params.username,
                &self.params.addr
            );
            return Err(AuthenticationFailure.into());
        };
        let key = russh::keys::load_secret_key(path, None)
            .with_context(|| format!("failed to load secret key at {}", path))?;
        // Prefer SHA-256 for RSA if applicable (ignored for non-RSA keys)
        let pk = PrivateKeyWithHashAlg::new(
            Arc::new(key),
            handle.best_supported_rsa_hash().await?.flatten(),
        );
        let result = handle
            .authenticate_publickey(self.params.username.clone(), pk)
            .await?;
        if auth_decision(result) == AuthDecision::Failure {
            return Err(AuthenticationFailure.into());
        }
        log::info!(
            "authenticated {}@{}",
            &self.params.username,
            &self.params.addr
        );

        *handle_field = Some(handle);
        if let Some(interval) = self.config.keepalive_interval {
            let handle_clone = self.handle.clone();
            let jh = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval / 2);
                loop {
                    ticker.tick().await;
                    let guard = handle_clone.lock().await;
                    let Some(handle) = guard.as_ref() else {
                        break;
                    };
                    if handle.is_closed() {
                        log::debug!("keepalive handle is closed");
                        break;
                    }
                    if let Err(e) = handle.send_keepalive(true).await {
                        log::debug!("error when sending a keepalive: {}", e);
                    }
                }
            });
            if let Some(previous) = self.keepalive_task_handle.lock().await.replace(jh) {
                previous.abort();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthDecision, auth_decision};
    use russh::client::AuthResult;
    use russh::{MethodKind, MethodSet};

    #[test]
    fn auth_decision_success() {
        assert_eq!(auth_decision(AuthResult::Success), AuthDecision::Success);
    }

    #[test]
    fn partial_success_is_still_a_failure() {
        let methods = [MethodKind::KeyboardInteractive];
        let decision = auth_decision(AuthResult::Failure {
            remaining_methods: MethodSet::from(methods.as_slice()),
            partial_success: true,
        });
        assert_eq!(decision, AuthDecision::Failure);
    }
}
