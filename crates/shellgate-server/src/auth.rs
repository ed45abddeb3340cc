//! Upgrade-time authentication: bearer token validation and the origin
//! allow-list.
//!
//! Both checks run before `on_upgrade`; a rejected client never gets an
//! application channel, so no error frame is ever sent for auth
//! failures.

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Authentication failures at the upgrade boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token was supplied.
    #[error("missing bearer token")]
    MissingToken,
    /// The token did not validate.
    #[error("invalid bearer token")]
    InvalidToken,
    /// The Origin header is not on the allow-list.
    #[error("origin not allowed")]
    OriginDenied,
}

/// An authenticated client identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Stable subject identifier for the user.
    pub subject: String,
}

/// Validates bearer tokens into identities.
///
/// The broker only consumes this interface; deployments plug in their
/// identity provider of choice.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a token, returning the identity it belongs to.
    async fn validate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Identity provider backed by a single shared token.
///
/// Comparison is constant-time so the token cannot be guessed byte by
/// byte from timing.
pub struct SharedTokenProvider {
    token: String,
    subject: String,
}

impl SharedTokenProvider {
    /// Create a provider accepting exactly `token`, mapping it to
    /// `subject`.
    #[must_use]
    pub fn new(token: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SharedTokenProvider {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let expected = self.token.as_bytes();
        let received = token.as_bytes();
        if received.len() == expected.len() && bool::from(received.ct_eq(expected)) {
            Ok(Identity {
                subject: self.subject.clone(),
            })
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Origin allow-list enforced at upgrade time.
///
/// An empty list allows any origin (development default); a non-empty
/// list is exact-match.
#[derive(Clone, Debug, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Build a policy from the configured origin list.
    #[must_use]
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Whether a request with this `Origin` header may upgrade.
    #[must_use]
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match origin {
            Some(o) => self.allowed.iter().any(|a| a == o),
            None => false,
        }
    }
}
