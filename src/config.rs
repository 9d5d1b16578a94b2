use std::env;
use std::str::FromStr;

use tracing::debug;

pub const API_BASE: &str = "https://www.googleapis.com/mapsengine/v1";
pub const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/mapsengine/v1";
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
pub const REVOKE_URL: &str = "https://accounts.google.com/o/oauth2/revoke";
pub const TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";
pub const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
pub const WEB_ROOT: &str = "https://mapsengine.google.com";

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/mapsengine",
    "https://www.googleapis.com/auth/userinfo.profile",
];

const DEFAULT_HTTP_ATTEMPTS: u32 = 2;
const DEFAULT_MAX_PAGES: usize = 100;
const DEFAULT_MAX_FOLDER_DEPTH: usize = 32;
const DEFAULT_MAX_TREE_NODES: usize = 10_000;
const DEFAULT_LOOPBACK_PORT: u16 = 8484;
const DEFAULT_LOOPBACK_TIMEOUT_SECS: u64 = 180;

/// Endpoints and runtime limits. Client credentials are not part of this;
/// they are user settings and live in the settings store.
#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    pub api_base: String,
    pub upload_base: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub tokeninfo_url: String,
    pub userinfo_url: String,
    pub web_root: String,
    pub http_attempts: u32,
    pub request_timeout_secs: Option<u64>,
    pub max_pages: usize,
    pub max_folder_depth: usize,
    pub max_tree_nodes: usize,
    pub loopback_port: u16,
    pub loopback_timeout_secs: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            revoke_url: REVOKE_URL.to_string(),
            tokeninfo_url: TOKENINFO_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
            web_root: WEB_ROOT.to_string(),
            http_attempts: DEFAULT_HTTP_ATTEMPTS,
            request_timeout_secs: None,
            max_pages: DEFAULT_MAX_PAGES,
            max_folder_depth: DEFAULT_MAX_FOLDER_DEPTH,
            max_tree_nodes: DEFAULT_MAX_TREE_NODES,
            loopback_port: DEFAULT_LOOPBACK_PORT,
            loopback_timeout_secs: DEFAULT_LOOPBACK_TIMEOUT_SECS,
        }
    }
}

impl ConnectorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from `GMECONN_*` values supplied by `lookup`.
    /// Unparseable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let url = |key: &str, default: String| parse_url(lookup(key), default);
        let config = Self {
            api_base: url("GMECONN_API_BASE", defaults.api_base),
            upload_base: url("GMECONN_UPLOAD_BASE", defaults.upload_base),
            auth_url: url("GMECONN_AUTH_URL", defaults.auth_url),
            token_url: url("GMECONN_TOKEN_URL", defaults.token_url),
            revoke_url: url("GMECONN_REVOKE_URL", defaults.revoke_url),
            tokeninfo_url: url("GMECONN_TOKENINFO_URL", defaults.tokeninfo_url),
            userinfo_url: url("GMECONN_USERINFO_URL", defaults.userinfo_url),
            web_root: url("GMECONN_WEB_ROOT", defaults.web_root),
            http_attempts: parse_num(lookup("GMECONN_HTTP_ATTEMPTS"))
                .unwrap_or(defaults.http_attempts)
                .max(1),
            request_timeout_secs: parse_num(lookup("GMECONN_REQUEST_TIMEOUT_SECS")),
            max_pages: parse_num(lookup("GMECONN_MAX_PAGES"))
                .unwrap_or(defaults.max_pages)
                .max(1),
            max_folder_depth: parse_num(lookup("GMECONN_MAX_FOLDER_DEPTH"))
                .unwrap_or(defaults.max_folder_depth),
            max_tree_nodes: parse_num(lookup("GMECONN_MAX_TREE_NODES"))
                .unwrap_or(defaults.max_tree_nodes),
            loopback_port: parse_num(lookup("GMECONN_LOOPBACK_PORT"))
                .unwrap_or(defaults.loopback_port),
            loopback_timeout_secs: parse_num(lookup("GMECONN_LOOPBACK_TIMEOUT_SECS"))
                .unwrap_or(defaults.loopback_timeout_secs),
        };
        debug!(api_base = %config.api_base, "loaded connector config");
        config
    }

    pub fn scope_string(&self) -> String {
        SCOPES.join(" ")
    }
}

fn parse_url(raw: Option<String>, default: String) -> String {
    raw.map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn parse_num<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|v| v.trim().parse().ok())
}
