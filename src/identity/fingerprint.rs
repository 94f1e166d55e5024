// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Host fingerprinting.
//!
//! A fingerprint is a SHA-256 over a fixed, ordered tuple of host
//! characteristics. It is not secret. Tokens carry the fingerprint they were
//! issued under and are rejected when the validating host computes a
//! different one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The environment characteristics a fingerprint is computed from.
///
/// Field order is part of the fingerprint format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCharacteristics {
    pub os: String,
    pub arch: String,
    pub hostname: String,
    pub home_dir: String,
}

impl HostCharacteristics {
    /// Read the characteristics of the running host. No network access.
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: system_hostname().unwrap_or_default(),
            home_dir: directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    fn ordered_fields(&self) -> [&str; 4] {
        [
            self.os.as_str(),
            self.arch.as_str(),
            self.hostname.as_str(),
            self.home_dir.as_str(),
        ]
    }
}

/// Hex-encoded SHA-256 host fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Pure function of `host`: same input, same fingerprint.
    pub fn compute(host: &HostCharacteristics) -> Self {
        let mut hasher = Sha256::new();
        for field in host.ordered_fields() {
            // Length prefix keeps ("a|", "b") and ("a", "|b") distinct.
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything that can report the fingerprint of the current environment.
///
/// The token authority holds one of these and asks it at validation time, so
/// tests can inject a fixed fingerprint instead of reading the real host.
pub trait FingerprintProvider: Send + Sync {
    fn current(&self) -> Fingerprint;
}

impl FingerprintProvider for Fingerprint {
    fn current(&self) -> Fingerprint {
        self.clone()
    }
}

impl FingerprintProvider for HostCharacteristics {
    fn current(&self) -> Fingerprint {
        Fingerprint::compute(self)
    }
}

fn system_hostname() -> Option<String> {
    gethostname::gethostname().into_string().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host() -> HostCharacteristics {
        HostCharacteristics {
            os: "linux".to_string(),
            arch: "aarch64".to_string(),
            hostname: "pixel-8".to_string(),
            home_dir: "/data/data/com.termux/files/home".to_string(),
        }
    }

    #[test]
    fn fingerprint_is_stable_for_same_input() {
        let host = sample_host();
        assert_eq!(Fingerprint::compute(&host), Fingerprint::compute(&host));
    }

    #[test]
    fn fingerprint_changes_when_any_field_changes() {
        let base = Fingerprint::compute(&sample_host());

        let mut h = sample_host();
        h.os = "android".to_string();
        assert_ne!(Fingerprint::compute(&h), base);

        let mut h = sample_host();
        h.arch = "x86_64".to_string();
        assert_ne!(Fingerprint::compute(&h), base);

        let mut h = sample_host();
        h.hostname = "laptop".to_string();
        assert_ne!(Fingerprint::compute(&h), base);

        let mut h = sample_host();
        h.home_dir = "/home/other".to_string();
        assert_ne!(Fingerprint::compute(&h), base);
    }

    #[test]
    fn field_boundaries_matter() {
        let a = HostCharacteristics {
            os: "ab".to_string(),
            arch: "c".to_string(),
            hostname: String::new(),
            home_dir: String::new(),
        };
        let b = HostCharacteristics {
            os: "a".to_string(),
            arch: "bc".to_string(),
            hostname: String::new(),
            home_dir: String::new(),
        };
        assert_ne!(Fingerprint::compute(&a), Fingerprint::compute(&b));
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = Fingerprint::compute(&sample_host());
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn detected_host_is_stable_within_process() {
        assert_eq!(
            HostCharacteristics::detect().current(),
            HostCharacteristics::detect().current()
        );
    }
}
