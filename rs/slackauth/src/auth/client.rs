use std::collections::BTreeMap;
use std::time::Duration;

use oauth2::{
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
    AccessToken, AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, StandardRevocableToken, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};

use super::profile::ProviderStatus;
use super::{AuthorizationRequest, OAuth2Client, OAuth2Response};
use crate::error::SlackAuthError;

/// Token endpoint answer. Slack omits `token_type` and returns extra fields
/// (`ok`, `scope`, `team_id`, ...) which are kept in `extra`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SlackTokenResponse {
    access_token: AccessToken,
    #[serde(default = "bearer")]
    token_type: BasicTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn bearer() -> BasicTokenType {
    BasicTokenType::Bearer
}

impl TokenResponse for SlackTokenResponse {
    type TokenType = BasicTokenType;

    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }
    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }
    fn expires_in(&self) -> Option<Duration> {
        None
    }
    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }
    fn scopes(&self) -> Option<&Vec<Scope>> {
        None
    }
}

type SlackClientFull = Client<
    BasicErrorResponse,
    SlackTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

/// [`OAuth2Client`] backed by the `oauth2` crate and a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct BasicOAuth2Client {
    reqwest_client: reqwest::Client,
    api_client: reqwest::Client,
    client: SlackClientFull,
    scopes: Vec<String>,
}

pub fn build_oauth2_client(
    client_id: &str,
    client_secret: &str,
    authorization_url: &str,
    token_url: &str,
    callback_url: &str,
    scopes: Vec<String>,
) -> Result<BasicOAuth2Client, SlackAuthError> {
    let client = Client::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_auth_uri(AuthUrl::new(authorization_url.to_string())?)
        .set_token_uri(TokenUrl::new(token_url.to_string())?)
        .set_redirect_uri(RedirectUrl::new(callback_url.to_string())?)
        .set_auth_type(AuthType::RequestBody);

    // Token requests must not follow redirects.
    let reqwest_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    // Web API reads follow redirects like any browser-facing GET.
    let api_client = reqwest::Client::new();

    Ok(BasicOAuth2Client {
        reqwest_client,
        api_client,
        client,
        scopes,
    })
}

fn token_exchange_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> SlackAuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            SlackAuthError::TokenExchange(response.to_string())
        }
        // Slack reports failures as HTTP 200 with `{"ok":false,"error":...}`.
        RequestTokenError::Parse(_, body) => match serde_json::from_slice::<ProviderStatus>(&body)
        {
            Ok(ProviderStatus {
                error: Some(error),
                ..
            }) => SlackAuthError::TokenExchange(error),
            _ => SlackAuthError::TokenExchange(String::from_utf8_lossy(&body).into_owned()),
        },
        other => SlackAuthError::TokenExchange(other.to_string()),
    }
}

#[async_trait::async_trait]
impl OAuth2Client for BasicOAuth2Client {
    fn authorization_url(&self, extra_params: &BTreeMap<String, String>) -> AuthorizationRequest {
        let mut request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new));
        for (name, value) in extra_params {
            request = request.add_extra_param(name.as_str(), value.as_str());
        }
        let (url, csrf_state) = request.url();
        AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
        }
    }

    async fn exchange_code(&self, code: String) -> Result<OAuth2Response, SlackAuthError> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&self.reqwest_client)
            .await
            .map_err(token_exchange_error)?;

        Ok(OAuth2Response {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result
                .refresh_token()
                .map(|rt| rt.secret().clone()),
            fields: serde_json::Value::Object(token_result.extra),
        })
    }

    async fn get(&self, url: &str) -> Result<String, SlackAuthError> {
        // The URL carries the access token; keep it out of errors.
        let body = self
            .api_client
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .error_for_status()
            .map_err(reqwest::Error::without_url)?
            .text()
            .await
            .map_err(reqwest::Error::without_url)?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn client_for(server: &Server) -> BasicOAuth2Client {
        build_oauth2_client(
            "123-456",
            "shhh",
            &server.url_str("/oauth/authorize"),
            &server.url_str("/api/oauth.access"),
            "https://www.example.net/auth/slack/callback",
            vec!["identify".to_string(), "read".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn invalid_authorization_url_is_rejected() {
        let result = build_oauth2_client(
            "id",
            "secret",
            "not a url",
            "https://slack.com/api/oauth.access",
            "https://www.example.net/callback",
            Vec::new(),
        );
        assert!(matches!(result, Err(SlackAuthError::InvalidUrl(_))));
    }

    #[test]
    fn authorization_url_carries_extra_params_and_state() {
        let server = Server::run();
        let client = client_for(&server);

        let mut params = BTreeMap::new();
        params.insert("team".to_string(), "T1".to_string());
        let request = client.authorization_url(&params);

        let url = url::Url::parse(&request.url).unwrap();
        let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/oauth/authorize");
        assert_eq!(query.get("team").map(String::as_str), Some("T1"));
        assert_eq!(query.get("client_id").map(String::as_str), Some("123-456"));
        assert_eq!(query.get("scope").map(String::as_str), Some("identify read"));
        assert_eq!(query.get("state"), Some(&request.csrf_state));
    }

    #[tokio::test]
    async fn exchange_code_accepts_response_without_token_type() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/oauth.access"),
                request::body(url_decoded(contains(("code", "the-code")))),
                request::body(url_decoded(contains(("client_secret", "shhh")))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "ok": true,
                "access_token": "xoxp-1",
                "scope": "identify,read",
                "team_id": "T1"
            }))),
        );

        let response = client_for(&server)
            .exchange_code("the-code".to_string())
            .await
            .unwrap();
        assert_eq!(response.access_token, "xoxp-1");
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.fields["team_id"], "T1");
    }

    #[tokio::test]
    async fn exchange_code_surfaces_slack_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/oauth.access"))
                .respond_with(json_encoded(serde_json::json!({
                    "ok": false,
                    "error": "invalid_code"
                }))),
        );

        let result = client_for(&server)
            .exchange_code("stale".to_string())
            .await;
        match result {
            Err(SlackAuthError::TokenExchange(msg)) => assert_eq!(msg, "invalid_code"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_sends_no_authorization_header() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/auth.test"),
                request::query(url_decoded(contains(("token", "tok1")))),
                not(request::headers(contains(key("authorization")))),
            ])
            .respond_with(status_code(200).body(r#"{"ok":true}"#)),
        );

        let body = client_for(&server)
            .get(&server.url_str("/api/auth.test?token=tok1"))
            .await
            .unwrap();
        assert_eq!(body, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn get_treats_error_status_as_transport_failure() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/auth.test"))
                .respond_with(status_code(500)),
        );

        let result = client_for(&server)
            .get(&server.url_str("/api/auth.test"))
            .await;
        assert!(matches!(result, Err(SlackAuthError::Transport(_))));
    }

    #[tokio::test]
    async fn get_errors_do_not_reveal_the_url() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/auth.test"))
                .respond_with(status_code(503)),
        );

        let err = client_for(&server)
            .get(&server.url_str("/api/auth.test?token=xoxp-SECRET"))
            .await
            .unwrap_err();
        assert!(matches!(err, SlackAuthError::Transport(_)));
        assert!(!err.to_string().contains("xoxp-SECRET"));
        assert!(!format!("{err:?}").contains("xoxp-SECRET"));
    }

    #[tokio::test]
    async fn get_follows_redirects() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/auth.test"))
                .respond_with(
                    status_code(302).insert_header("Location", "/api/v2/auth.test?token=tok1"),
                ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v2/auth.test"))
                .respond_with(status_code(200).body(r#"{"ok":true,"user_id":"U1"}"#)),
        );

        let body = client_for(&server)
            .get(&server.url_str("/api/auth.test?token=tok1"))
            .await
            .unwrap();
        assert_eq!(body, r#"{"ok":true,"user_id":"U1"}"#);
    }
}
