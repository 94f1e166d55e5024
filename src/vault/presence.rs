// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Optional user-presence gate in front of the vault.
//!
//! ## Fail-open
//!
//! When the configured check mechanism is *unavailable* (not installed, not
//! supported on this device, unparseable output) the gate lets the operation
//! through and logs a degraded-security warning. Only an explicit denial
//! blocks access. This trades security for availability: a missing
//! biometric helper must not lock the operator out of their own credentials.

use std::io;
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, warn};

/// Result of asking the user to prove presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceOutcome {
    Verified,
    Denied,
    /// The mechanism could not run; the string says why.
    Unavailable(String),
}

/// A local presence / secondary-factor check (biometric prompt, PIN, ...).
pub trait PresenceCheck: Send + Sync {
    fn verify(&self) -> PresenceOutcome;
}

/// Whether and how the vault asks for presence.
#[derive(Default)]
pub enum PresenceGate {
    #[default]
    Disabled,
    Required(Box<dyn PresenceCheck>),
}

impl PresenceGate {
    /// `true` if the guarded operation may proceed.
    pub fn check(&self) -> bool {
        match self {
            PresenceGate::Disabled => true,
            PresenceGate::Required(check) => match check.verify() {
                PresenceOutcome::Verified => true,
                PresenceOutcome::Denied => {
                    warn!("Presence check denied vault access");
                    false
                }
                PresenceOutcome::Unavailable(reason) => {
                    warn!(
                        reason = %reason,
                        security_event = "degraded_security",
                        "Presence check unavailable; proceeding without it"
                    );
                    true
                }
            },
        }
    }
}

impl std::fmt::Debug for PresenceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceGate::Disabled => write!(f, "PresenceGate::Disabled"),
            PresenceGate::Required(_) => write!(f, "PresenceGate::Required(..)"),
        }
    }
}

/// Fingerprint prompt through the Termux:API `termux-fingerprint` helper.
///
/// Executed as an argument vector; no shell is involved.
#[derive(Debug, Clone)]
pub struct TermuxFingerprint {
    program: String,
}

/// JSON printed by `termux-fingerprint`.
#[derive(Debug, Deserialize)]
struct FingerprintReply {
    auth_result: String,
}

const AUTH_RESULT_SUCCESS: &str = "AUTH_RESULT_SUCCESS";

impl TermuxFingerprint {
    pub fn new() -> Self {
        Self::with_program("termux-fingerprint")
    }

    /// Use a different helper binary path.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for TermuxFingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceCheck for TermuxFingerprint {
    fn verify(&self) -> PresenceOutcome {
        let output = match Command::new(&self.program).output() {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return PresenceOutcome::Unavailable(format!("{} is not installed", self.program))
            }
            Err(e) => return PresenceOutcome::Unavailable(e.to_string()),
        };

        if !output.status.success() {
            debug!(status = ?output.status, "Fingerprint helper exited unsuccessfully");
            return PresenceOutcome::Denied;
        }

        parse_reply(&output.stdout)
    }
}

fn parse_reply(stdout: &[u8]) -> PresenceOutcome {
    match serde_json::from_slice::<FingerprintReply>(stdout) {
        Ok(reply) if reply.auth_result == AUTH_RESULT_SUCCESS => PresenceOutcome::Verified,
        Ok(_) => PresenceOutcome::Denied,
        Err(e) => PresenceOutcome::Unavailable(format!("unreadable helper output: {e}")),
    }
}
