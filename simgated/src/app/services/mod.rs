// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod identity;
pub mod layout;
pub mod scripts;
pub mod shell;
pub mod slurm;
