//! The seam between the engine and a cloud SDK.
//!
//! The engine never talks HTTP. It asks a [`CloudProvider`] for sessions,
//! region lists and per-(service, region) [`ApiClient`]s, and drives
//! operations by name with JSON parameters. Transport, signing and retry
//! internals belong to the provider implementation.

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
mod region;
mod session;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::CloudError;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryCloud;
pub use region::{GLOBAL_REGION, GLOBAL_SERVICES, RegionResolver};
pub use session::{AccountSession, SESSION_NAME, SessionProvider};

/// Shared handle to a cloud provider.
pub type CloudProviderRef = Arc<dyn CloudProvider>;

/// Temporary credentials returned by role assumption.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An account-scoped credential handle. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    profile: String,
    role: Option<String>,
    credentials: Option<Credentials>,
}

impl Session {
    /// A session resolved from a named profile.
    pub fn base(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            role: None,
            credentials: None,
        }
    }

    /// A session holding the temporary credentials of an assumed role.
    pub fn derived(base: &Session, role: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            profile: base.profile.clone(),
            role: Some(role.into()),
            credentials: Some(credentials),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// The assumed role, for derived sessions.
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_derived(&self) -> bool {
        self.role.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    Standard,
    /// Standard retries plus client-side rate limiting on throttling.
    #[default]
    Adaptive,
}

/// Retry configuration handed to every client.
///
/// Throttling and transport failures are retried with exponential backoff
/// until `max_attempts` calls have been made. Any other error is returned at
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub mode: RetryMode,
    /// Delay before the second attempt. Doubles per attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);
    const MAX_BACKOFF: Duration = Duration::from_secs(20);

    pub fn adaptive(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            mode: RetryMode::Adaptive,
            backoff: Self::DEFAULT_BACKOFF,
        }
    }

    pub fn with_backoff(self, backoff: Duration) -> Self {
        Self { backoff, ..self }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(Self::MAX_BACKOFF)
    }

    /// Run `call` until it succeeds, fails for good, or runs out of attempts.
    pub async fn retry<T, F, Fut>(&self, mut call: F) -> Result<T, CloudError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CloudError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %e,
                        "Retrying call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::adaptive(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

/// One response page and the token for the next one, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub response: Value,
    pub next: Option<Value>,
}

/// A client bound to one service in one region.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Whether the operation has a paginator.
    fn can_paginate(&self, operation: &str) -> bool;

    /// Fetch one page. `token` is `None` for the first page.
    async fn fetch_page(
        &self,
        operation: &str,
        params: &Value,
        token: Option<Value>,
    ) -> Result<Page, CloudError>;

    /// Invoke a non-paginated operation.
    async fn invoke(&self, operation: &str, params: &Value) -> Result<Value, CloudError>;
}

/// Session, identity and client factory of a cloud SDK.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Resolve base credentials for a named profile.
    async fn base_session(&self, profile: &str) -> Result<Session, CloudError>;

    /// Assume `role` using `base`, returning temporary credentials.
    async fn assume_role(
        &self,
        base: &Session,
        role: &str,
        session_name: &str,
    ) -> Result<Credentials, CloudError>;

    /// Account id of the principal behind the session.
    async fn caller_account_id(&self, session: &Session) -> Result<String, CloudError>;

    /// Regions a service is offered in, for a partition.
    async fn service_regions(
        &self,
        session: &Session,
        service: &str,
        partition: &str,
    ) -> Result<Vec<String>, CloudError>;

    /// Regions enabled for the account, restricted to the given opt-in statuses.
    async fn enabled_regions(
        &self,
        session: &Session,
        opt_in_statuses: &[&str],
    ) -> Result<Vec<String>, CloudError>;

    /// Open a client for `(service, region)`.
    fn client(
        &self,
        session: &Session,
        service: &str,
        region: &str,
        retry: RetryPolicy,
    ) -> Result<Box<dyn ApiClient>, CloudError>;
}
