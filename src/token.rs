//! Token Provider contract (spec §4.4) — consumed as an interface, not
//! implemented here. A general OAuth token provider is explicitly out of
//! scope (spec §1); the connector only needs something that hands back a
//! bearer token once per `connect`.

use async_trait::async_trait;
use std::time::SystemTime;

use crate::error::ConnectResult;

/// A short-lived OAuth bearer token, as handed back by a [`TokenProvider`].
#[derive(Clone)]
pub struct Token {
    pub token: String,
    pub not_before: Option<SystemTime>,
    pub not_after: Option<SystemTime>,
}

impl std::fmt::Debug for Token {
    // never print token contents, even in Debug output (spec §4.4, §7).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"<redacted>")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish()
    }
}

/// Asynchronous provider of a short-lived OAuth bearer token.
///
/// Implementations are expected to cache and refresh internally; the
/// connector calls [`TokenProvider::fetch`] exactly once per `connect` and
/// treats the provider as a read-only capability that may be shared across
/// many concurrent connects.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch(&self) -> ConnectResult<Token>;
}

/// A fixed token, useful for tests and for callers who manage refresh
/// themselves outside this crate.
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch(&self) -> ConnectResult<Token> {
        Ok(Token {
            token: self.0.clone(),
            not_before: None,
            not_after: None,
        })
    }
}
