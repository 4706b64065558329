//! Profile rows over the table API.

#[cfg(test)]
#[path = "rest_test.rs"]
mod rest_test;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tracing::debug;
use uuid::Uuid;

use super::wire::parse_profile;
use super::{TokenSource, bearer, read_success};
use crate::config::AuthConfig;
use crate::error::ProviderError;
use crate::provider::ProfileStore;
use crate::types::{NewProfile, Profile};

const PROFILE_TABLE: &str = "users";
/// Ask for a single JSON object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct RestProfiles {
    http: reqwest::Client,
    table_url: String,
    anon_key: String,
    tokens: TokenSource,
}

impl RestProfiles {
    #[must_use]
    pub fn new(http: reqwest::Client, config: &AuthConfig, tokens: TokenSource) -> Self {
        Self {
            http,
            table_url: config.rest_endpoint(PROFILE_TABLE),
            anon_key: config.anon_key.clone(),
            tokens,
        }
    }

    /// URL selecting exactly one profile by id.
    #[must_use]
    pub fn profile_url(&self, id: Uuid) -> String {
        format!("{}?id=eq.{id}&select=*", self.table_url)
    }

    pub(crate) fn authorization(&self) -> String {
        bearer(&self.tokens, &self.anon_key)
    }

    /// Cheap read proving the table API answers and the table is visible.
    ///
    /// # Errors
    ///
    /// Returns the transport or API error from the request.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        let response = self
            .http
            .get(format!("{}?select=count&limit=1", self.table_url))
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await?;
        read_success(response).await.map(|_| ())
    }
}

#[async_trait]
impl ProfileStore for RestProfiles {
    async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>, ProviderError> {
        let response = self
            .http
            .get(self.profile_url(id))
            .header(ACCEPT, SINGLE_OBJECT)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await?;
        match read_success(response).await {
            Ok(text) => parse_profile(&text).map(Some),
            Err(err) if is_missing_row(&err) => {
                debug!(user_id = %id, "profile row not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(&self.table_url)
            .header(AUTHORIZATION, self.authorization())
            .header("Prefer", "return=minimal")
            .json(profile)
            .send()
            .await?;
        let status = response.status().as_u16();
        read_success(response).await?;
        debug!(user_id = %profile.id, status, "profile row inserted");
        Ok(())
    }
}

/// Whether a failed single-row read means the row does not exist.
#[must_use]
pub fn is_missing_row(err: &ProviderError) -> bool {
    err.is_not_found() || matches!(err, ProviderError::Api { status: 406, code: None, .. })
}
