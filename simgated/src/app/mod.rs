// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod build_gate;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod monitor;
pub mod ports;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod types;
pub mod usecases;

#[cfg(test)]
pub(crate) mod test_support;
