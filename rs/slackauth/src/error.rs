use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlackAuthError {
    #[error("Request to Slack failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Slack returned a malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("Slack rejected the request: {0}")]
    Provider(String),
    #[error("Slack response is missing `{0}`")]
    MissingField(&'static str),
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),
    #[error("OAuth2 state does not match the one issued")]
    StateMismatch,
    #[error("{0}")]
    Other(String),
}

impl SlackAuthError {
    pub fn new(msg: impl Into<String>) -> Self {
        SlackAuthError::Other(msg.into())
    }
}
