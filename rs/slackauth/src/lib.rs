pub mod auth;
pub mod error;

pub use auth::{
    client::{build_oauth2_client, BasicOAuth2Client},
    profile::NormalizedProfile,
    slack::{AuthenticateOptions, SlackOptions, SlackStrategy},
    AuthorizationRequest, OAuth2Client, OAuth2Response, Verify, SLACK_CALLBACK_ENDPOINT,
    SLACK_LOGIN_ENDPOINT,
};
pub use error::SlackAuthError;
