//! Per-account session acquisition.

use std::sync::Arc;

use snafu::prelude::*;
use tracing::debug;

use super::{CloudProviderRef, Session};
use crate::config::AccountConfig;
use crate::error::{
    AssumeRoleSnafu, AuthenticationError, BaseCredentialsSnafu, CallerIdentitySnafu,
};

/// Session name used for every role assumption.
pub const SESSION_NAME: &str = "cirrus";

/// A session together with the account it belongs to.
#[derive(Debug, Clone)]
pub struct AccountSession {
    pub account_id: String,
    pub session: Arc<Session>,
}

/// Acquires sessions for configured accounts.
///
/// No retries happen here; transient failures are the provider's concern.
#[derive(Clone)]
pub struct SessionProvider {
    provider: CloudProviderRef,
}

impl SessionProvider {
    pub fn new(provider: CloudProviderRef) -> Self {
        Self { provider }
    }

    /// Build the base session for the account's profile, then assume its role
    /// if one is configured.
    pub async fn acquire(&self, account: &AccountConfig) -> Result<Arc<Session>, AuthenticationError> {
        let base = self
            .provider
            .base_session(&account.profile)
            .await
            .context(BaseCredentialsSnafu {
                profile: &account.profile,
            })?;

        let Some(role) = &account.assume_role else {
            return Ok(Arc::new(base));
        };

        let credentials = self
            .provider
            .assume_role(&base, role, SESSION_NAME)
            .await
            .context(AssumeRoleSnafu {
                profile: &account.profile,
                role,
            })?;
        debug!(profile = %account.profile, role = %role, "Assumed role");

        Ok(Arc::new(Session::derived(&base, role, credentials)))
    }

    /// Acquire a session and resolve the account id behind it.
    pub async fn connect(&self, account: &AccountConfig) -> Result<AccountSession, AuthenticationError> {
        let session = self.acquire(account).await?;
        let account_id = self
            .provider
            .caller_account_id(&session)
            .await
            .context(CallerIdentitySnafu {
                profile: &account.profile,
            })?;
        Ok(AccountSession {
            account_id,
            session,
        })
    }
}
