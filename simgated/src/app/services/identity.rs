// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::app::types::JobType;

const NONCE_LEN: usize = 12;
const SUFFIX_LEN: usize = 7;
const NONCE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const HEX_ALPHABET: &[u8] = b"0123456789abcdef";

/// Cache key of a container definition.
pub fn container_hash(definition: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(definition.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn correlation_id(job_type: JobType) -> String {
    correlation_id_with_nonce(job_type, &random_string(NONCE_ALPHABET, NONCE_LEN))
}

pub fn correlation_id_with_nonce(job_type: JobType, nonce: &str) -> String {
    format!("{}-{}", job_type.as_str(), nonce)
}

/// Splits `{job_type}-{nonce}`. Anything else is rejected.
pub fn parse_correlation_id(value: &str) -> Option<(JobType, &str)> {
    for job_type in [JobType::BuildContainer, JobType::Simulation] {
        let Some(rest) = value.strip_prefix(job_type.as_str()) else {
            continue;
        };
        let Some(nonce) = rest.strip_prefix('-') else {
            continue;
        };
        if nonce.is_empty() || !nonce.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        return Some((job_type, nonce));
    }
    None
}

pub fn random_suffix() -> String {
    random_string(HEX_ALPHABET, SUFFIX_LEN)
}

pub fn experiment_id(container_hash: &str, suffix: &str) -> String {
    format!("{container_hash}_{suffix}")
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}
