// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shell-argument and local-path filters.
//!
//! External commands are always spawned with an argument vector. These
//! filters run on top of that, never instead of it.

use std::path::{Component, Path, PathBuf};

use super::{ValidationError, ValidationResult};

const DANGEROUS_CHARS: [char; 11] = [';', '&', '|', '$', '`', '\n', '\r', '(', ')', '<', '>'];

const DANGEROUS_PATTERNS: [&str; 6] = ["..", "/etc/", "/proc/", "~/", "${", "$("];

/// True if `arg` contains no metacharacters and no traversal or system paths.
pub fn is_safe_shell_argument(arg: &str) -> bool {
    first_violation(arg).is_none()
}

fn first_violation(arg: &str) -> Option<String> {
    if let Some(c) = arg.chars().find(|c| DANGEROUS_CHARS.contains(c)) {
        return Some(format!("character {c:?}"));
    }
    DANGEROUS_PATTERNS
        .iter()
        .find(|p| arg.contains(**p))
        .map(|p| format!("pattern {p:?}"))
}

/// Strip dangerous characters and patterns from `arg`.
///
/// Patterns are removed repeatedly, since removing one can join two halves
/// of another (`....//` becomes `../`). The output always passes
/// [`is_safe_shell_argument`].
pub fn sanitize_shell_argument(arg: &str) -> String {
    let mut out: String = arg.chars().filter(|c| !DANGEROUS_CHARS.contains(c)).collect();

    loop {
        let before = out.len();
        for pattern in DANGEROUS_PATTERNS {
            out = out.replace(pattern, "");
        }
        if out.len() == before {
            break;
        }
    }

    out.trim().to_string()
}

/// Same check as [`is_safe_shell_argument`], with a reason.
pub fn check_shell_argument(arg: &str) -> ValidationResult {
    match first_violation(arg) {
        Some(reason) => ValidationResult::reject(ValidationError::UnsafeArgument(reason)),
        None => ValidationResult::valid(),
    }
}

/// Accept `path` only if it is absolute, has no `..` component and lies
/// under `root`.
///
/// Existing paths are canonicalized first so symlinks cannot escape `root`.
pub fn validate_local_path(path: &Path, root: &Path) -> ValidationResult {
    if path.components().any(|c| c == Component::ParentDir) {
        return reject("path contains '..'");
    }
    if !path.is_absolute() {
        return reject("path must be absolute");
    }

    let resolved = canonical_or_self(path);
    let root = canonical_or_self(root);
    if !resolved.starts_with(&root) {
        return reject("path is outside the allowed directory");
    }

    ValidationResult::valid()
}

/// Canonical form of `path`, or of its parent when `path` does not exist yet.
fn canonical_or_self(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

fn reject(reason: &str) -> ValidationResult {
    ValidationResult::reject(ValidationError::UnsafeArgument(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arguments_are_safe() {
        for arg in ["hello", "file-name_01.txt", "some/relative/path", "a b c", "key=value"] {
            assert!(is_safe_shell_argument(arg), "{arg}");
        }
    }

    #[test]
    fn metacharacters_and_patterns_are_unsafe() {
        for arg in [
            "a; rm -rf /",
            "a && b",
            "a | b",
            "$HOME",
            "`id`",
            "line\nbreak",
            "(sub)",
            "<in",
            "out>",
            "../secret",
            "/etc/passwd",
            "/proc/self/environ",
            "~/.ssh",
        ] {
            assert!(!is_safe_shell_argument(arg), "{arg}");
        }
    }

    #[test]
    fn sanitized_output_is_always_safe() {
        for arg in [
            "a; rm -rf /",
            "....//etc/passwd",
            ".$(.)",
            "/e/etc/tc/passwd",
            "~~//",
            "$${{",
            "  padded  ",
            "clean",
        ] {
            let sanitized = sanitize_shell_argument(arg);
            assert!(is_safe_shell_argument(&sanitized), "{arg:?} -> {sanitized:?}");
        }
        assert_eq!(sanitize_shell_argument("  padded  "), "padded");
        assert_eq!(sanitize_shell_argument("echo hi; id"), "echo hi id");
        assert_eq!(sanitize_shell_argument("clean"), "clean");
    }

    #[test]
    fn check_reports_reason() {
        let result = check_shell_argument("a|b");
        assert!(!result.ok);
        assert!(result.reason.contains("'|'"));
        assert!(check_shell_argument("fine").ok);
    }

    #[test]
    fn local_paths_must_stay_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let inside = root.join("notes.md");
        std::fs::write(&inside, "x").unwrap();

        assert!(validate_local_path(&inside, root).ok);
        assert!(validate_local_path(&root.join("not-yet-created.md"), root).ok);
        assert!(!validate_local_path(&root.join("../escape"), root).ok);
        assert!(!validate_local_path(Path::new("relative/file"), root).ok);
        assert!(!validate_local_path(Path::new("/etc/passwd"), root).ok);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_out_of_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();

        assert!(!validate_local_path(&link, dir.path()).ok);
    }
}
