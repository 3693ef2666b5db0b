// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const AUTHENTICATION_FAILURE: &str = "authentication_failure";
    pub const CONNECTION_FAILURE: &str = "connection_failure";
    pub const REMOTE_ERROR: &str = "remote_error";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const DEPENDENCY_NOT_ALLOWED: &str = "dependency_not_allowed";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const SUBMISSION_FAILED: &str = "submission_failed";
    pub const SCHEDULER_STATE: &str = "scheduler_state";
    pub const BUILD_FAILED: &str = "build_failed";
    pub const JOB_FAILED: &str = "job_failed";
    pub const WAIT_BOUND_EXCEEDED: &str = "wait_bound_exceeded";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const CANCELED: &str = "canceled";
    pub const LOCAL_ERROR: &str = "local_error";
}

/// Error taxonomy shared by every layer above the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Rejected input; nothing was persisted.
    InvalidArgument,
    NotFound,
    /// SSH or network failure talking to the remote host.
    Unavailable,
    /// Scheduler inconsistencies, failed submissions and exhausted waits.
    Internal,
    Conflict,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, code: &'static str) -> Self {
        Self {
            kind,
            code,
            message: code.to_string(),
            context: None,
        }
    }

    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Transport failures are the only errors the poll loop retries on its next tick.
    pub fn is_retryable(&self) -> bool {
        self.kind == AppErrorKind::Unavailable
    }

    pub fn http_status(&self) -> u16 {
        match self.kind {
            AppErrorKind::InvalidArgument => 400,
            AppErrorKind::NotFound => 404,
            AppErrorKind::Conflict => 409,
            AppErrorKind::Cancelled => 499,
            AppErrorKind::Unavailable => 503,
            AppErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

pub fn invalid_argument(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::InvalidArgument,
        codes::INVALID_ARGUMENT,
        message,
    )
}

pub fn not_found(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::NotFound, codes::NOT_FOUND, message)
}

pub fn scheduler_state(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Internal, codes::SCHEDULER_STATE, message)
}

pub fn local_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Internal, codes::LOCAL_ERROR, message)
}
