//! Bearer credential supply

use crate::util::errors::{ExploreError, ExploreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token. Missing or expired credentials are `ExploreError::Auth`.
    async fn bearer_token(&self) -> ExploreResult<String>;
}

/// Token handed in at start-up (CLI flag, environment).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl StaticCredentialProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn bearer_token(&self) -> ExploreResult<String> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| ExploreError::Auth("no access token".to_string()))?;
        if let Some(expires_at) = self.expires_at {
            if Utc::now() >= expires_at {
                return Err(ExploreError::Auth(format!(
                    "access token expired at {}",
                    expires_at.to_rfc3339()
                )));
            }
        }
        Ok(token)
    }
}
