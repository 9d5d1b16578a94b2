#![allow(dead_code)]

use chrono::{Duration, Utc};
use httptest::Server;

use gmeconn::storage::{MemorySettingsStore, SettingKey};
use gmeconn::ConnectorConfig;

pub const CLIENT_ID: &str = "client-123.apps.googleusercontent.com";
pub const CLIENT_SECRET: &str = "s3cret";

/// Every endpoint pointed at the local server, one attempt per request.
pub fn config_for(server: &Server) -> ConnectorConfig {
    let base = format!("http://{}", server.addr());
    ConnectorConfig {
        api_base: base.clone(),
        upload_base: format!("{base}/upload"),
        auth_url: format!("{base}/o/oauth2/auth"),
        token_url: format!("{base}/o/oauth2/token"),
        revoke_url: format!("{base}/o/oauth2/revoke"),
        tokeninfo_url: format!("{base}/oauth2/v1/tokeninfo"),
        userinfo_url: format!("{base}/oauth2/v1/userinfo"),
        web_root: base,
        http_attempts: 1,
        ..ConnectorConfig::default()
    }
}

pub fn store_with_client() -> MemorySettingsStore {
    MemorySettingsStore::new()
        .with(SettingKey::ClientId, CLIENT_ID)
        .with(SettingKey::ClientSecret, CLIENT_SECRET)
}

/// Client credentials plus a stored token expiring `expires_in_secs` from now.
pub fn store_with_token(access: &str, refresh: &str, expires_in_secs: i64) -> MemorySettingsStore {
    let expires_at = (Utc::now() + Duration::seconds(expires_in_secs)).to_rfc3339();
    store_with_client()
        .with(SettingKey::AccessToken, access)
        .with(SettingKey::RefreshToken, refresh)
        .with(SettingKey::ExpiresAt, expires_at.as_str())
}
