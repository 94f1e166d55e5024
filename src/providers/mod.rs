// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External identity providers.

pub mod oauth;

pub use oauth::{OAuthClient, OAuthError, TokenResponse};
