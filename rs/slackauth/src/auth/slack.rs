use std::collections::BTreeMap;
use std::sync::Arc;

use super::client::build_oauth2_client;
use super::profile::{IdentityCheckResult, NormalizedProfile};
use super::{AuthorizationRequest, OAuth2Client, Verify};
use crate::error::SlackAuthError;

pub const AUTHORIZATION_URL: &str = "https://slack.com/oauth/authorize";
pub const TOKEN_URL: &str = "https://slack.com/api/oauth.access";
pub const TEST_URL: &str = "https://slack.com/api/auth.test?token=";
pub const PROFILE_URL: &str = "https://slack.com/api/users.info";

/// Construction options of a [`SlackStrategy`].
///
/// `test_url` must end where the access token is to be appended
/// (`...?token=`); `profile_url` is the bare `users.info` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackOptions {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub authorization_url: String,
    pub token_url: String,
    pub test_url: String,
    pub profile_url: String,
    pub scopes: Vec<String>,
}

impl SlackOptions {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        SlackOptions {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url: callback_url.into(),
            authorization_url: AUTHORIZATION_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            test_url: TEST_URL.to_string(),
            profile_url: PROFILE_URL.to_string(),
            scopes: Vec::new(),
        }
    }

    pub fn with_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_test_url(mut self, url: impl Into<String>) -> Self {
        self.test_url = url.into();
        self
    }

    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = url.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Reads the options from environment variables
    ///
    /// - SLACK_CLIENT_ID (OAuth2 client ID)
    /// - SLACK_CLIENT_SECRET (OAuth2 client secret)
    /// - SLACK_CALLBACK_URL (URL Slack redirects back to after authorization)
    /// - SLACK_AUTHORIZATION_URL, SLACK_TOKEN_URL, SLACK_TEST_URL,
    ///   SLACK_PROFILE_URL (Optional endpoint overrides)
    /// - SLACK_SCOPES (Optional, comma separated)
    ///
    /// Every missing required variable is reported in a single
    /// [`SlackAuthError::MissingEnv`].
    pub fn from_env() -> Result<Self, SlackAuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SlackAuthError> {
        let mut missing_env_vars = Vec::new();

        let mut get_env_var = |name: &str| {
            lookup(name).unwrap_or_else(|| {
                missing_env_vars.push(name.to_string());
                String::new()
            })
        };

        let client_id = get_env_var("SLACK_CLIENT_ID");
        let client_secret = get_env_var("SLACK_CLIENT_SECRET");
        let callback_url = get_env_var("SLACK_CALLBACK_URL");

        if !missing_env_vars.is_empty() {
            return Err(SlackAuthError::MissingEnv(missing_env_vars));
        }

        let mut options = SlackOptions::new(client_id, client_secret, callback_url);
        if let Some(url) = lookup("SLACK_AUTHORIZATION_URL") {
            options.authorization_url = url;
        }
        if let Some(url) = lookup("SLACK_TOKEN_URL") {
            options.token_url = url;
        }
        if let Some(url) = lookup("SLACK_TEST_URL") {
            options.test_url = url;
        }
        if let Some(url) = lookup("SLACK_PROFILE_URL") {
            options.profile_url = url;
        }
        if let Some(scopes) = lookup("SLACK_SCOPES") {
            options.scopes = scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(options)
    }
}

/// Per-request options of the authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct AuthenticateOptions {
    /// Slack workspace to pre-select on the consent screen.
    pub team: Option<String>,
}

/// Slack login strategy: the generic OAuth2 flow plus Slack's profile lookup.
#[derive(Clone)]
pub struct SlackStrategy {
    client: Arc<dyn OAuth2Client>,
    test_url: String,
    profile_url: String,
}

impl SlackStrategy {
    pub fn new(options: SlackOptions) -> Result<Self, SlackAuthError> {
        let client = build_oauth2_client(
            &options.client_id,
            &options.client_secret,
            &options.authorization_url,
            &options.token_url,
            &options.callback_url,
            options.scopes.clone(),
        )?;
        Ok(Self::with_client(Arc::new(client), &options))
    }

    pub fn from_env() -> Result<Self, SlackAuthError> {
        Self::new(SlackOptions::from_env()?)
    }

    /// Builds a strategy over an existing OAuth2 client. Only the endpoint
    /// URLs of `options` are used; credentials belong to `client`.
    pub fn with_client(client: Arc<dyn OAuth2Client>, options: &SlackOptions) -> Self {
        SlackStrategy {
            client,
            test_url: options.test_url.clone(),
            profile_url: options.profile_url.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        "slack"
    }

    pub fn authorization_params(&self, options: &AuthenticateOptions) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let Some(team) = options.team.as_deref().filter(|team| !team.is_empty()) {
            params.insert("team".to_string(), team.to_string());
        }
        params
    }

    pub fn authorization_url(&self, options: &AuthenticateOptions) -> AuthorizationRequest {
        self.client
            .authorization_url(&self.authorization_params(options))
    }

    /// GETs `url` with the access token appended verbatim.
    ///
    /// Slack treats a token sent both as header and query parameter as a
    /// protocol violation, so the token only ever travels in the query string.
    /// `url` must already end with the parameter name and `=`.
    pub async fn get(&self, url: &str, access_token: &str) -> Result<String, SlackAuthError> {
        self.client.get(&format!("{url}{access_token}")).await
    }

    /// Resolves the owner of `access_token` into a [`NormalizedProfile`].
    ///
    /// Calls `auth.test` to learn the user id, then `users.info` for that id.
    /// The first failure ends the resolution.
    pub async fn user_profile(&self, access_token: &str) -> Result<NormalizedProfile, SlackAuthError> {
        let body = self.get(&self.test_url, access_token).await?;
        let check: serde_json::Value = serde_json::from_str(&body)?;
        let user_id = IdentityCheckResult::from_json(&check).into_user_id()?;
        tracing::debug!("Access token belongs to Slack user {}", user_id);

        let user: String = url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect();
        let lookup_url = format!("{}?user={}&token=", self.profile_url, user);
        let body = self.get(&lookup_url, access_token).await?;

        NormalizedProfile::from_users_info(body).map_err(|e| {
            if let SlackAuthError::Provider(msg) = &e {
                tracing::warn!("Slack refused profile of {}: {}", user_id, msg);
            }
            e
        })
    }

    /// Completes a login: exchanges `code`, resolves the profile and hands
    /// both to `verify`. `Ok(None)` means the verifier rejected the user.
    pub async fn authenticate<V: Verify>(
        &self,
        code: String,
        verify: &V,
    ) -> Result<Option<V::User>, SlackAuthError> {
        let tokens = match self.client.exchange_code(code).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!("Failed to exchange code: {:?}", e);
                return Err(e);
            }
        };

        let profile = self.user_profile(&tokens.access_token).await?;
        let profile_id = profile.id.clone();
        let user = verify.verify(&tokens, profile).await?;
        if user.is_none() {
            tracing::warn!("Verifier rejected Slack user {}", profile_id);
        }
        Ok(user)
    }
}
