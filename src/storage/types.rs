use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const KEY_PREFIX: &str = "gmeconnector";

/// Every key the connector persists. Absence of a key always means "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ClientId,
    ClientSecret,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    Projects,
    DefaultProject,
    LastUsedProject,
    WmsVectorFormat,
    WmsRasterFormat,
}

impl SettingKey {
    pub const ALL: [SettingKey; 10] = [
        SettingKey::ClientId,
        SettingKey::ClientSecret,
        SettingKey::AccessToken,
        SettingKey::RefreshToken,
        SettingKey::ExpiresAt,
        SettingKey::Projects,
        SettingKey::DefaultProject,
        SettingKey::LastUsedProject,
        SettingKey::WmsVectorFormat,
        SettingKey::WmsRasterFormat,
    ];

    /// Keys dropped on sign-out. Client credentials and preferences survive.
    pub const SESSION: [SettingKey; 4] = [
        SettingKey::AccessToken,
        SettingKey::RefreshToken,
        SettingKey::ExpiresAt,
        SettingKey::Projects,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::ClientId => "CLIENT_ID",
            SettingKey::ClientSecret => "CLIENT_SECRET",
            SettingKey::AccessToken => "ACCESS_TOKEN",
            SettingKey::RefreshToken => "REFRESH_TOKEN",
            SettingKey::ExpiresAt => "EXPIRES_AT",
            SettingKey::Projects => "PROJECTS",
            SettingKey::DefaultProject => "DEFAULT_PROJECT",
            SettingKey::LastUsedProject => "LAST_USED_PROJECT",
            SettingKey::WmsVectorFormat => "WMS_VECTOR_FORMAT",
            SettingKey::WmsRasterFormat => "WMS_RASTER_FORMAT",
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}/{}", KEY_PREFIX, self.name())
    }

    /// Secret keys go to credentials.json (0600), the rest to config.toml.
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            SettingKey::ClientId
                | SettingKey::ClientSecret
                | SettingKey::AccessToken
                | SettingKey::RefreshToken
                | SettingKey::ExpiresAt
                | SettingKey::Projects
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Text(String),
    Map(BTreeMap<String, String>),
}

impl SettingValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s.as_str()),
            SettingValue::Map(_) => None,
        }
    }

    pub fn into_map(self) -> Option<BTreeMap<String, String>> {
        match self {
            SettingValue::Map(m) => Some(m),
            SettingValue::Text(_) => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

/// Preferences file (no secrets). Stored as config.toml.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
}

/// Credentials and session cache. Stored as credentials.json with 0600 perms.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
}
