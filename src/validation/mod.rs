// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Safety Validation
//!
//! - `url` - scheme/domain allow-list, suspicious patterns, blocked IP ranges, DNS rebinding
//! - `content` - text sanitization and structured block validation
//! - `shell` - shell-argument and local-path filtering
//!
//! Checks return a [`ValidationResult`] instead of failing the process, so a
//! rejected input can be logged with its reason while other requests keep
//! being served.

pub mod content;
pub mod shell;
pub mod url;

use std::net::IpAddr;

pub use self::content::{
    sanitize_export_content, sanitize_text, sanitize_title, validate_content_blocks, ExportContent,
    Source, MAX_BLOCKS, MAX_NESTING_DEPTH, MAX_TEXT_LENGTH, MAX_TITLE_LENGTH,
};
pub use self::shell::{
    check_shell_argument, is_safe_shell_argument, sanitize_shell_argument, validate_local_path,
};
pub use self::url::{check_ip, HostResolver, SystemResolver, UrlValidator, MAX_URL_LENGTH};

/// Why an input was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("URL scheme must be https, got {0:?}")]
    BadScheme(String),

    #[error("domain {0:?} is not in the allow-list")]
    DomainNotAllowed(String),

    #[error("direct IP address hosts are not allowed ({0})")]
    DirectIpNotAllowed(IpAddr),

    #[error("input contains suspicious pattern {0:?}")]
    SuspiciousPattern(&'static str),

    #[error("{host} resolved to {ip}, which is in blocked range {range}")]
    DnsRebindingDetected {
        host: String,
        ip: IpAddr,
        range: &'static str,
    },

    #[error("too many blocks ({count}, max {max})")]
    TooManyBlocks { count: usize, max: usize },

    #[error("block nesting exceeds maximum depth {max}")]
    NestingTooDeep { max: usize },

    #[error("argument contains unsafe shell content: {0}")]
    UnsafeArgument(String),

    #[error("input exceeds maximum length ({len}, max {max})")]
    TooLong { len: usize, max: usize },

    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("could not resolve host: {0}")]
    ResolutionFailed(String),

    #[error("block {index} is invalid: {reason}")]
    InvalidBlock { index: usize, reason: String },
}

impl ValidationError {
    /// Stable code for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::BadScheme(_) => "bad_scheme",
            ValidationError::DomainNotAllowed(_) => "domain_not_allowed",
            ValidationError::DirectIpNotAllowed(_) => "direct_ip_not_allowed",
            ValidationError::SuspiciousPattern(_) => "suspicious_pattern",
            ValidationError::DnsRebindingDetected { .. } => "dns_rebinding_detected",
            ValidationError::TooManyBlocks { .. } => "too_many_blocks",
            ValidationError::NestingTooDeep { .. } => "nesting_too_deep",
            ValidationError::UnsafeArgument(_) => "unsafe_argument",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::MalformedUrl(_) => "malformed_url",
            ValidationError::ResolutionFailed(_) => "resolution_failed",
            ValidationError::InvalidBlock { .. } => "invalid_block",
        }
    }
}

/// Outcome of a validation check. `reason` is empty when `ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub reason: String,
    pub error: Option<ValidationError>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            ok: true,
            reason: String::new(),
            error: None,
        }
    }

    pub fn reject(error: ValidationError) -> Self {
        Self {
            ok: false,
            reason: error.to_string(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl From<Result<(), ValidationError>> for ValidationResult {
    fn from(result: Result<(), ValidationError>) -> Self {
        match result {
            Ok(()) => ValidationResult::valid(),
            Err(error) => ValidationResult::reject(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_carries_reason_and_kind() {
        let result = ValidationResult::reject(ValidationError::BadScheme("http".to_string()));
        assert!(!result.is_ok());
        assert!(result.reason.contains("https"));
        assert_eq!(result.error.as_ref().map(|e| e.kind()), Some("bad_scheme"));
        assert!(result.into_result().is_err());
    }

    #[test]
    fn valid_has_empty_reason() {
        let result = ValidationResult::from(Ok(()));
        assert!(result.ok);
        assert!(result.reason.is_empty());
        assert!(result.into_result().is_ok());
    }
}
