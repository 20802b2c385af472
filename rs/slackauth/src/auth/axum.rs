use super::slack::{AuthenticateOptions, SlackStrategy};
use super::{Verify, SLACK_CALLBACK_ENDPOINT, SLACK_LOGIN_ENDPOINT, STATE_COOKIE_NAME};
use crate::error::SlackAuthError;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by Slack when the user denies the authorization.
    pub error: Option<String>,
}

/// Shared state of the login routes.
pub struct SlackAuthState<V> {
    pub strategy: SlackStrategy,
    pub verify: Arc<V>,
}

impl<V> Clone for SlackAuthState<V> {
    fn clone(&self) -> Self {
        SlackAuthState {
            strategy: self.strategy.clone(),
            verify: Arc::clone(&self.verify),
        }
    }
}

fn create_state_cookie(value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(STATE_COOKIE_NAME, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

fn remove_state_cookie() -> Cookie<'static> {
    Cookie::build(STATE_COOKIE_NAME).removal().path("/").build()
}

/// Starts a login: remembers a fresh CSRF state and redirects to Slack.
pub async fn login_handler<V>(
    State(state): State<SlackAuthState<V>>,
    jar: CookieJar,
    Query(options): Query<AuthenticateOptions>,
) -> Response
where
    V: Verify + 'static,
{
    let request = state.strategy.authorization_url(&options);
    tracing::debug!("Redirecting to Slack authorization.");
    (
        jar.add(create_state_cookie(request.csrf_state)),
        Redirect::to(&request.url),
    )
        .into_response()
}

/// Finishes a login and renders whatever the verifier returned.
pub async fn callback_handler<V>(
    State(state): State<SlackAuthState<V>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response
where
    V: Verify + 'static,
    V::User: IntoResponse,
{
    let expected_state = jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_string());
    let jar = jar.remove(remove_state_cookie());

    if let Some(error) = query.error {
        tracing::warn!("Slack authorization denied: {}", error);
        return (
            jar,
            (
                StatusCode::UNAUTHORIZED,
                format!("Slack authorization denied: {error}"),
            ),
        )
            .into_response();
    }

    let Some(code) = query.code else {
        return (
            jar,
            (StatusCode::BAD_REQUEST, "Missing authorization code"),
        )
            .into_response();
    };

    if expected_state.is_none() || expected_state != query.state {
        tracing::warn!("Rejecting Slack callback with unexpected state.");
        return (
            jar,
            (
                StatusCode::BAD_REQUEST,
                SlackAuthError::StateMismatch.to_string(),
            ),
        )
            .into_response();
    }

    match state.strategy.authenticate(code, state.verify.as_ref()).await {
        Ok(Some(user)) => (jar, user).into_response(),
        Ok(None) => (jar, (StatusCode::UNAUTHORIZED, "Unauthorized")).into_response(),
        Err(e) => {
            tracing::error!("Slack login failed: {:?}", e);
            (
                jar,
                (StatusCode::BAD_GATEWAY, "Authentication failed"),
            )
                .into_response()
        }
    }
}

/// Extension trait for Axum routers to mount the Slack login routes.
pub trait SlackRouterExt<S> {
    /// Adds `GET /auth/slack` and `GET /auth/slack/callback`.
    fn slack_auth<V>(self, strategy: SlackStrategy, verify: V) -> Self
    where
        V: Verify + 'static,
        V::User: IntoResponse + 'static;
}

impl<S> SlackRouterExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn slack_auth<V>(self, strategy: SlackStrategy, verify: V) -> Self
    where
        V: Verify + 'static,
        V::User: IntoResponse + 'static,
    {
        let state = SlackAuthState {
            strategy,
            verify: Arc::new(verify),
        };
        let auth_routes: Router<S> = Router::<SlackAuthState<V>>::new()
            .route(SLACK_LOGIN_ENDPOINT, get(login_handler::<V>))
            .route(SLACK_CALLBACK_ENDPOINT, get(callback_handler::<V>))
            .with_state(state);
        self.merge(auth_routes)
    }
}
