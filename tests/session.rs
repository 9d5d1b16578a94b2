mod common;

use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;

use common::{config_for, store_with_client, store_with_token, CLIENT_ID};
use gmeconn::auth::{AuthorizationPrompt, Token, TokenManager};
use gmeconn::storage::{MemorySettingsStore, SettingKey, SettingsStore};
use gmeconn::{ConnectorError, ConnectorResult, HttpClient, Session};

/// Stands in for the browser: pastes a fixed result page title.
struct TitlePrompt(&'static str);

impl AuthorizationPrompt for TitlePrompt {
    fn authorize(&mut self, tokens: &TokenManager<'_>) -> ConnectorResult<Option<Token>> {
        tokens.decode_title_response(self.0)
    }
}

/// Fails the test if sign-in ever asks the user.
struct NeverPrompt;

impl AuthorizationPrompt for NeverPrompt {
    fn authorize(&mut self, _tokens: &TokenManager<'_>) -> ConnectorResult<Option<Token>> {
        panic!("prompt should not run");
    }
}

fn expect_code_exchange(server: &Server) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/o/oauth2/token"),
            request::body(url_decoded(contains(("code", "XYZ")))),
        ])
        .respond_with(json_encoded(json!({
            "access_token": "ya29.session",
            "refresh_token": "1/session",
            "expires_in": 3600
        }))),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/oauth2/v1/userinfo"))
            .respond_with(json_encoded(json!({"name": "Ada Lovelace", "id": "42"}))),
    );
}

#[test]
fn sign_in_without_client_credentials_makes_no_request() {
    let server = Server::run();
    let config = config_for(&server);
    let http = HttpClient::new(&config).unwrap();
    let store = MemorySettingsStore::new();
    let session = Session::new(&config, &http, &store);

    let err = session.sign_in(&mut NeverPrompt).unwrap_err();
    assert!(matches!(err, ConnectorError::Config(_)));
}

#[test]
fn sign_in_stores_token_and_replaces_project_cache() {
    let server = Server::run();
    expect_code_exchange(&server);
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/projects"),
            request::headers(contains(("authorization", "Bearer ya29.session"))),
        ])
        .respond_with(json_encoded(json!({
            "projects": [{"id": "0123", "name": "Main"}, {"id": "0456", "name": "Other"}]
        }))),
    );
    let config = config_for(&server);
    let http = HttpClient::new(&config).unwrap();
    let store = store_with_client().with(
        SettingKey::Projects,
        gmeconn::storage::SettingValue::Map(
            [("stale".to_string(), "Old".to_string())].into_iter().collect(),
        ),
    );
    let session = Session::new(&config, &http, &store);

    let signed_in = session.sign_in(&mut TitlePrompt("Success code=XYZ")).unwrap();

    assert!(!signed_in.reused_token);
    assert_eq!(signed_in.user_name, "Ada Lovelace");
    let cached = store.read_projects().unwrap();
    assert_eq!(cached.keys().collect::<Vec<_>>(), vec!["0123", "0456"]);
    assert_eq!(
        store.read_text(SettingKey::AccessToken).unwrap().as_deref(),
        Some("ya29.session")
    );
    assert!(store.read_text(SettingKey::ExpiresAt).unwrap().is_some());
}

#[test]
fn sign_in_without_projects_is_an_auth_error() {
    let server = Server::run();
    expect_code_exchange(&server);
    server.expect(
        Expectation::matching(request::method_path("GET", "/projects"))
            .respond_with(json_encoded(json!({"projects": []}))),
    );
    let config = config_for(&server);
    let http = HttpClient::new(&config).unwrap();
    let store = store_with_client();
    let session = Session::new(&config, &http, &store);

    let err = session.sign_in(&mut TitlePrompt("Success code=XYZ")).unwrap_err();
    assert!(matches!(err, ConnectorError::Auth(_)));
    assert!(store.read_projects().unwrap().is_empty());
}

#[test]
fn declined_consent_is_an_auth_error() {
    let server = Server::run();
    let config = config_for(&server);
    let http = HttpClient::new(&config).unwrap();
    let store = store_with_client();
    let session = Session::new(&config, &http, &store);

    let err = session
        .sign_in(&mut TitlePrompt("Denied error=access_denied"))
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Auth(_)));
}

#[test]
fn valid_cached_token_skips_the_prompt() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/oauth2/v1/tokeninfo"))
            .respond_with(json_encoded(json!({"audience": CLIENT_ID}))),
    );
    let config = config_for(&server);
    let http = HttpClient::new(&config).unwrap();
    let store = store_with_token("ya29.cached", "1/r", 3600);
    let session = Session::new(&config, &http, &store);

    let signed_in = session.sign_in(&mut NeverPrompt).unwrap();
    assert!(signed_in.reused_token);
    assert_eq!(signed_in.token.access_token, "ya29.cached");
}

#[test]
fn sign_out_revokes_and_keeps_client_credentials() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/o/oauth2/revoke"),
            request::query(url_decoded(contains(("token", "ya29.bye")))),
        ])
        .respond_with(status_code(200)),
    );
    let config = config_for(&server);
    let http = HttpClient::new(&config).unwrap();
    let store = store_with_token("ya29.bye", "1/r", 3600)
        .with(SettingKey::DefaultProject, "0123");
    store
        .write_projects([("0123".to_string(), "Main".to_string())].into_iter().collect())
        .unwrap();
    let session = Session::new(&config, &http, &store);

    session.sign_out().unwrap();

    for key in SettingKey::SESSION {
        assert!(store.read(key).unwrap().is_none(), "{} survived", key.name());
    }
    assert!(store.read_text(SettingKey::ClientId).unwrap().is_some());
    assert!(store.read_text(SettingKey::ClientSecret).unwrap().is_some());
    assert_eq!(
        store.read_text(SettingKey::DefaultProject).unwrap().as_deref(),
        Some("0123")
    );
}
