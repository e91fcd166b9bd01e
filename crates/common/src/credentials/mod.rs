//! Credential access contract
//!
//! The ingestion core only ever sees "a currently valid access token for
//! (user, source)". Token encryption and the OAuth refresh dance belong
//! to an external collaborator that keeps the `credentials` table fresh.

use crate::db::models::Source;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use async_trait::async_trait;

/// Provides valid access tokens for connectors
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// A currently valid access token for (user, source)
    async fn access_token(&self, user_id: &str, source: Source) -> Result<String>;
}

/// Credential store backed by the `credentials` table
pub struct DbCredentialStore {
    repository: Repository,
}

impl DbCredentialStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn access_token(&self, user_id: &str, source: Source) -> Result<String> {
        let credential = self
            .repository
            .find_credential(user_id, source)
            .await?
            .ok_or_else(|| AppError::Unauthorized {
                message: format!("No credential for user {} and source {}", user_id, source),
            })?;

        if !credential.is_valid() {
            return Err(AppError::CredentialExpired {
                source_name: source.as_str().to_string(),
            });
        }

        Ok(credential.access_token)
    }
}

/// Static credential store for tests
pub struct StaticCredentialStore {
    token: String,
}

impl StaticCredentialStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn access_token(&self, _user_id: &str, _source: Source) -> Result<String> {
        Ok(self.token.clone())
    }
}
