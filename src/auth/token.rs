use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};

/// OAuth2 token as persisted in the settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Token endpoint response. Every field is optional; the server decides.
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Fails when the response has no access token or an expiry that does
    /// not fit a timestamp.
    pub fn into_token(self, now: DateTime<Utc>) -> ConnectorResult<Token> {
        let access_token = self
            .access_token
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConnectorError::protocol("token endpoint", "response has no access_token"))?;
        let expires_at = match self.expires_in {
            Some(secs) => Some(expiry_after(now, secs).ok_or_else(|| {
                ConnectorError::protocol("token endpoint", format!("expires_in {secs} is out of range"))
            })?),
            None => None,
        };
        Ok(Token {
            access_token,
            refresh_token: self.refresh_token,
            expires_at,
            expires_in: self.expires_in,
        })
    }
}

fn expiry_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    now.checked_add_signed(Duration::try_seconds(secs)?)
}
