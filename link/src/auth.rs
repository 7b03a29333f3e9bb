//! Authentication token provider for the realtime client.
//!
//! The client never stores credentials itself. It asks an external
//! collaborator for a token right before every connect (and reconnect) and
//! appends it to the WebSocket URL as `?token=...`. The token is not re-read
//! while a connection stays open.
//!
//! ```rust
//! use realtime_link::{AuthTokenProvider, ResolvedAuth, StaticToken};
//! use std::sync::Arc;
//!
//! // Fixed token
//! let auth = ResolvedAuth::from(StaticToken::new("eyJhbGc..."));
//! assert_eq!(auth.resolve().as_deref(), Some("eyJhbGc..."));
//!
//! // Any closure returning Option<String> works as a provider
//! let provider: Arc<dyn AuthTokenProvider> = Arc::new(|| Some("fresh".to_string()));
//! let auth = ResolvedAuth::from(provider);
//! assert_eq!(auth.resolve().as_deref(), Some("fresh"));
//! ```

use std::fmt;
use std::sync::Arc;

/// Synchronous accessor for the current auth token.
///
/// Return `None` when the user is signed out; the client then connects
/// without a `token` query parameter.
pub trait AuthTokenProvider: Send + Sync + 'static {
    /// Return the current token, if any.
    fn auth_token(&self) -> Option<String>;
}

impl<F> AuthTokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn auth_token(&self) -> Option<String> {
        self()
    }
}

/// A reference-counted [`AuthTokenProvider`].
pub type ArcAuthTokenProvider = Arc<dyn AuthTokenProvider>;

/// A token fixed at construction time.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl AuthTokenProvider for StaticToken {
    fn auth_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

/// Resolves the token to use for a connection attempt.
#[derive(Clone, Default)]
pub enum ResolvedAuth {
    /// Connect anonymously.
    #[default]
    None,
    /// Token set at construction time.
    Static(StaticToken),
    /// Provider consulted on every connect.
    Dynamic(ArcAuthTokenProvider),
}

impl ResolvedAuth {
    /// Obtain the token for the next connect. Empty tokens count as absent.
    pub fn resolve(&self) -> Option<String> {
        let token = match self {
            Self::None => None,
            Self::Static(token) => token.auth_token(),
            Self::Dynamic(provider) => provider.auth_token(),
        };
        token.filter(|t| !t.trim().is_empty())
    }
}

impl fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "ResolvedAuth::None"),
            Self::Static(_) => write!(f, "ResolvedAuth::Static(<redacted>)"),
            Self::Dynamic(_) => write!(f, "ResolvedAuth::Dynamic(<fn>)"),
        }
    }
}

impl From<StaticToken> for ResolvedAuth {
    fn from(token: StaticToken) -> Self {
        Self::Static(token)
    }
}

impl From<ArcAuthTokenProvider> for ResolvedAuth {
    fn from(provider: ArcAuthTokenProvider) -> Self {
        Self::Dynamic(provider)
    }
}
