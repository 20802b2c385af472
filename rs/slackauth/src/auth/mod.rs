#[cfg(feature = "axum")]
pub mod axum;

pub mod client;
pub mod profile;
pub mod slack;

pub const SLACK_LOGIN_ENDPOINT: &str = "/auth/slack";
pub const SLACK_CALLBACK_ENDPOINT: &str = "/auth/slack/callback";
pub const STATE_COOKIE_NAME: &str = "slackauth_state";

use crate::error::SlackAuthError;
use profile::NormalizedProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Response {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub fields: serde_json::Value,
}

/// Authorization redirect target together with the CSRF state it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
}

/// Generic OAuth2 capability the Slack strategy is composed over.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OAuth2Client: Send + Sync {
    /// Builds the authorization redirect with the given extra query parameters.
    fn authorization_url(&self, extra_params: &BTreeMap<String, String>) -> AuthorizationRequest;
    async fn exchange_code(&self, code: String) -> Result<OAuth2Response, SlackAuthError>;
    /// Plain GET of `url`, returning the body text. Sends no Authorization header.
    async fn get(&self, url: &str) -> Result<String, SlackAuthError>;
}

/// Application hook deciding whether a resolved Slack identity may log in.
///
/// Returning `Ok(None)` rejects the credentials without it being an error.
#[async_trait::async_trait]
pub trait Verify: Send + Sync {
    type User: Send;

    async fn verify(
        &self,
        tokens: &OAuth2Response,
        profile: NormalizedProfile,
    ) -> Result<Option<Self::User>, SlackAuthError>;
}
