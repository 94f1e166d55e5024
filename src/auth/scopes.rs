// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token scopes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Capabilities an access token can carry.
///
/// ## Scopes
///
/// - `ExportCreate` - submit content through the export webhook
/// - `ExportRead` - read export status and history
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "export:create")]
    ExportCreate,
    #[serde(rename = "export:read")]
    ExportRead,
}

/// Ordered set of scopes as carried in token claims.
pub type ScopeSet = BTreeSet<Scope>;

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::ExportCreate, Scope::ExportRead];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::ExportCreate => "export:create",
            Scope::ExportRead => "export:read",
        }
    }

    /// Parse a scope from its wire name. Unknown names are rejected.
    pub fn from_str(s: &str) -> Option<Scope> {
        Scope::ALL.into_iter().find(|scope| scope.as_str() == s.trim())
    }

    /// Parse a comma-separated list, failing on the first unknown name.
    pub fn parse_list(list: &str) -> Result<ScopeSet, String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Scope::from_str(s).ok_or_else(|| format!("unknown scope: {s}")))
            .collect()
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
