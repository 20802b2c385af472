//! Slack API payloads and the provider-neutral profile built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SlackAuthError;

pub const PROVIDER: &str = "Slack";

/// Photo sizes Slack publishes, in the order they appear in a profile.
const PHOTO_SIZES: [u32; 5] = [24, 32, 48, 72, 192];

/// The `ok`/`error` envelope every Slack Web API answer carries.
#[derive(Debug, Default, Deserialize)]
pub struct ProviderStatus {
    #[serde(default)]
    pub ok: bool,
    pub error: Option<String>,
}

/// Slack's notion of a set flag: any JSON value that is not
/// `false`, `null`, `0` or `""`.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Reads a scalar as text. Numbers and booleans keep their JSON spelling;
/// objects, arrays and `null` count as absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn error_message(json: &Value) -> Option<String> {
    json.get("error")
        .and_then(Value::as_str)
        .filter(|error| !error.is_empty())
        .map(String::from)
}

/// Answer of the identity check endpoint (`auth.test`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCheckResult {
    pub ok: bool,
    pub error: Option<String>,
    pub user_id: Option<String>,
}

impl IdentityCheckResult {
    pub fn from_json(json: &Value) -> Self {
        IdentityCheckResult {
            ok: truthy(json.get("ok")),
            error: error_message(json),
            user_id: text(json.get("user_id")),
        }
    }

    /// Returns the token owner's id, failing when Slack did not supply one.
    pub fn into_user_id(self) -> Result<String, SlackAuthError> {
        match self.user_id {
            Some(user_id) if !user_id.is_empty() => Ok(user_id),
            _ => match self.error {
                Some(error) if !self.ok => Err(SlackAuthError::Provider(error)),
                _ => Err(SlackAuthError::MissingField("user_id")),
            },
        }
    }
}

/// Read-only view of `user.profile` in a `users.info` answer. A missing or
/// non-object profile behaves as one with every field absent.
struct SlackUserProfile<'a>(Option<&'a Value>);

impl SlackUserProfile<'_> {
    fn field(&self, name: &str) -> Option<String> {
        text(self.0.and_then(|profile| profile.get(name)))
    }

    fn non_empty(&self, name: &str) -> Option<String> {
        self.field(name).filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Photo {
    pub value: String,
    pub size: u32,
}

/// A Slack user mapped onto the common cross-provider profile shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProfile {
    pub provider: String,
    pub id: String,
    pub display_name: Option<String>,
    pub emails: Vec<Email>,
    pub name: Name,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub skype: Option<String>,
    pub photos: Vec<Photo>,
    /// Profile lookup body exactly as received.
    #[serde(rename = "_raw")]
    pub raw: String,
    #[serde(rename = "_json")]
    pub json: serde_json::Value,
}

impl NormalizedProfile {
    /// Maps a profile lookup body onto a [`NormalizedProfile`].
    ///
    /// Only a body that is not JSON is malformed. Any other answer without a
    /// set `ok` flag fails with [`SlackAuthError::Provider`], carrying Slack's
    /// `error` string or, lacking one, the raw body. Every `user.profile`
    /// field is optional; a missing profile yields empty fields.
    pub fn from_users_info(raw: String) -> Result<Self, SlackAuthError> {
        let json: Value = serde_json::from_str(&raw)?;

        if !truthy(json.get("ok")) {
            return Err(SlackAuthError::Provider(error_message(&json).unwrap_or(raw)));
        }

        let user = json.get("user").ok_or(SlackAuthError::MissingField("user"))?;
        let id = text(user.get("id"))
            .filter(|id| !id.is_empty())
            .ok_or(SlackAuthError::MissingField("user.id"))?;
        let profile = SlackUserProfile(user.get("profile"));

        let display_name = profile
            .non_empty("real_name")
            .or_else(|| profile.non_empty("email"));
        let photos = PHOTO_SIZES
            .iter()
            .filter_map(|&size| {
                profile
                    .non_empty(&format!("image_{size}"))
                    .map(|value| Photo { value, size })
            })
            .collect();

        Ok(NormalizedProfile {
            provider: PROVIDER.to_string(),
            id,
            display_name,
            emails: vec![Email {
                kind: "primary".to_string(),
                value: profile.field("email"),
            }],
            name: Name {
                given_name: profile.field("first_name"),
                family_name: profile.field("last_name"),
            },
            title: profile.field("title"),
            phone: profile.field("phone"),
            skype: profile.field("skype"),
            photos,
            raw,
            json,
        })
    }
}
