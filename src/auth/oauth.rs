use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::pkce::PkceChallenge;
use super::token::{Token, TokenResponse};
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::HttpClient;
use crate::storage::{SettingKey, SettingsStore};

pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
pub const FIXED_STATE: &str = "123456789";

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    audience: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    name: Option<String>,
}

/// Owns the OAuth2 token lifecycle: acquire, validate, refresh, revoke.
pub struct TokenManager<'a> {
    config: &'a ConnectorConfig,
    http: &'a HttpClient,
    store: &'a dyn SettingsStore,
}

impl<'a> TokenManager<'a> {
    pub fn new(config: &'a ConnectorConfig, http: &'a HttpClient, store: &'a dyn SettingsStore) -> Self {
        Self {
            config,
            http,
            store,
        }
    }

    /// Client id and secret from settings. Fails locally when either is unset.
    pub fn require_client_credentials(&self) -> ConnectorResult<(String, String)> {
        let client_id = self.store.read_text(SettingKey::ClientId)?;
        let client_secret = self.store.read_text(SettingKey::ClientSecret)?;
        match (client_id, client_secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(ConnectorError::Config(
                "a valid OAuth2 client id and client secret must be set first \
                 (gmeconn settings set-client)"
                    .into(),
            )),
        }
    }

    /// The stored token if it is still usable, refreshing it when needed.
    /// `Ok(None)` means nobody is signed in; no request is made in that case.
    pub fn get_token(&self) -> ConnectorResult<Option<Token>> {
        let token = match self.load_token()? {
            Some(token) => token,
            None => {
                debug!("no stored token");
                return Ok(None);
            }
        };

        if token.is_expired(Utc::now()) {
            debug!("stored token expired, refreshing");
        } else if self.is_token_valid(&token) {
            return Ok(Some(token));
        }

        self.refresh_token(&token).map(Some)
    }

    pub fn set_token(&self, token: &Token) -> ConnectorResult<()> {
        self.store
            .write_text(SettingKey::AccessToken, &token.access_token)?;
        match token.refresh_token.as_deref() {
            Some(refresh) => self.store.write_text(SettingKey::RefreshToken, refresh)?,
            None => self.store.remove(SettingKey::RefreshToken)?,
        }
        match token.expires_at {
            Some(expires_at) => self
                .store
                .write_text(SettingKey::ExpiresAt, &expires_at.to_rfc3339())?,
            None => self.store.remove(SettingKey::ExpiresAt)?,
        }
        Ok(())
    }

    fn load_token(&self) -> ConnectorResult<Option<Token>> {
        let access_token = self.store.read_text(SettingKey::AccessToken)?;
        let refresh_token = self.store.read_text(SettingKey::RefreshToken)?;
        let expires_at = self.store.read_text(SettingKey::ExpiresAt)?;

        let (access_token, refresh_token, expires_at) = match (access_token, refresh_token, expires_at) {
            (Some(a), Some(r), Some(e)) => (a, r, e),
            _ => return Ok(None),
        };

        // An unreadable expiry forces a refresh rather than trusting the token.
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Ok(Some(Token {
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
            expires_in: None,
        }))
    }

    /// True only if the introspection endpoint reports our client id as the
    /// audience. Every failure counts as invalid.
    pub fn is_token_valid(&self, token: &Token) -> bool {
        let client_id = match self.store.read_text(SettingKey::ClientId) {
            Ok(Some(id)) => id,
            _ => return false,
        };
        let mut url = match Url::parse(&self.config.tokeninfo_url) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "invalid tokeninfo endpoint");
                return false;
            }
        };
        url.query_pairs_mut()
            .append_pair("access_token", &token.access_token);

        match self
            .http
            .execute(self.http.get(url))
            .and_then(|response| response.json::<TokenInfo>())
        {
            Ok(info) => {
                let valid = info.audience.as_deref() == Some(client_id.as_str());
                debug!(valid, "token introspection finished");
                valid
            }
            Err(err) => {
                warn!(error = %err, "token introspection failed");
                false
            }
        }
    }

    /// Exchanges the refresh token for a new access token and persists it.
    pub fn refresh_token(&self, token: &Token) -> ConnectorResult<Token> {
        if !token.has_refresh_token() {
            return Err(ConnectorError::Auth(
                "token cannot be refreshed; sign in again".into(),
            ));
        }
        let refresh = token.refresh_token.as_deref().unwrap_or_default();
        let refreshed = self.trade_refresh_for_token(refresh)?;
        self.set_token(&refreshed)?;
        info!("access token refreshed");
        Ok(refreshed)
    }

    pub fn trade_code_for_token(&self, code: &str) -> ConnectorResult<Token> {
        self.exchange_code(code, OOB_REDIRECT_URI, None)
    }

    /// Authorization-code grant. The loopback flow passes its own redirect
    /// URI and PKCE verifier.
    pub fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> ConnectorResult<Token> {
        let (client_id, client_secret) = self.require_client_credentials()?;
        let mut params = vec![
            ("code", code),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }
        self.post_token_request(&params, "authorization code exchange")
    }

    /// Refresh-token grant. Refresh responses rarely carry a refresh token,
    /// so the one we sent is carried forward.
    pub fn trade_refresh_for_token(&self, refresh_token: &str) -> ConnectorResult<Token> {
        let (client_id, client_secret) = self.require_client_credentials()?;
        let params = [
            ("refresh_token", refresh_token),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let mut token = self.post_token_request(&params, "token refresh")?;
        token.refresh_token = Some(refresh_token.to_string());
        Ok(token)
    }

    fn post_token_request(&self, params: &[(&str, &str)], what: &str) -> ConnectorResult<Token> {
        let url = parse_endpoint(&self.config.token_url)?;
        let response = self
            .http
            .execute(self.http.post(url).form(params))
            .map_err(|err| ConnectorError::Auth(format!("{what} failed: {err}")))?;
        let body: TokenResponse = response.json()?;

        if let Some(error) = body.error.as_deref() {
            let desc = body.error_description.clone().unwrap_or_default();
            return Err(ConnectorError::Auth(format!("{what} failed: {error} {desc}")));
        }

        body.into_token(Utc::now())
    }

    /// Best effort; never fails the caller.
    pub fn revoke_token(&self) {
        let access_token = match self.store.read_text(SettingKey::AccessToken) {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "could not read token for revocation");
                return;
            }
        };
        let mut url = match parse_endpoint(&self.config.revoke_url) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "skipping token revocation");
                return;
            }
        };
        url.query_pairs_mut().append_pair("token", &access_token);

        match self.http.execute(self.http.get(url)) {
            Ok(_) => info!("token revoked"),
            Err(err) => warn!(error = %err, "token revocation failed"),
        }
    }

    /// Authorization URL for the out-of-band flow. Always the same for a
    /// given client id.
    pub fn build_authentication_uri(&self) -> ConnectorResult<String> {
        self.authorization_url(OOB_REDIRECT_URI, FIXED_STATE, None)
    }

    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        pkce: Option<&PkceChallenge>,
    ) -> ConnectorResult<String> {
        let client_id = self.store.read_text(SettingKey::ClientId)?.ok_or_else(|| {
            ConnectorError::Config("OAuth2 client id is not set".into())
        })?;
        let mut auth_url = parse_endpoint(&self.config.auth_url)?;
        {
            let mut query = auth_url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &client_id)
                .append_pair("scope", &self.config.scope_string())
                .append_pair("state", state)
                .append_pair("approval_prompt", "auto")
                .append_pair("redirect_uri", redirect_uri);
            if let Some(pkce) = pkce {
                query
                    .append_pair("code_challenge", &pkce.challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }
        Ok(auth_url.to_string())
    }

    /// Out-of-band result page titles look like `Success code=...`. Anything
    /// else is a denial and yields no token without touching the network.
    pub fn decode_title_response(&self, title: &str) -> ConnectorResult<Option<Token>> {
        match extract_code_from_title(title) {
            Some(code) => self.trade_code_for_token(code).map(Some),
            None => {
                debug!("authorization page did not report success");
                Ok(None)
            }
        }
    }

    /// Display name of the signed-in user, empty when unavailable.
    pub fn get_user_name(&self, token: &Token) -> String {
        let mut url = match parse_endpoint(&self.config.userinfo_url) {
            Ok(url) => url,
            Err(_) => return String::new(),
        };
        url.query_pairs_mut()
            .append_pair("access_token", &token.access_token);
        match self
            .http
            .execute(self.http.get(url))
            .and_then(|response| response.json::<UserInfo>())
        {
            Ok(info) => info.name.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "could not fetch user name");
                String::new()
            }
        }
    }
}

pub fn extract_code_from_title(title: &str) -> Option<&str> {
    if !title.starts_with("Success") {
        return None;
    }
    let start = title.find("code=")? + "code=".len();
    let code = title[start..]
        .split(|c: char| c == '&' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

pub(crate) fn parse_endpoint(raw: &str) -> ConnectorResult<Url> {
    Url::parse(raw).map_err(|err| ConnectorError::Config(format!("invalid endpoint {raw}: {err}")))
}
