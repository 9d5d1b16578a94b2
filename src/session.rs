use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::api::AssetRepository;
use crate::auth::{AuthorizationPrompt, Token, TokenManager};
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::HttpClient;
use crate::links::LinkBuilder;
use crate::storage::{SettingKey, SettingsStore};

/// Result of a successful sign-in.
#[derive(Debug)]
pub struct SignIn {
    pub token: Token,
    /// Empty when the cached token was reused or the profile was unavailable.
    pub user_name: String,
    pub projects: BTreeMap<String, String>,
    pub reused_token: bool,
}

/// Ties the token manager, repository and settings together for one user.
pub struct Session<'a> {
    config: &'a ConnectorConfig,
    http: &'a HttpClient,
    store: &'a dyn SettingsStore,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a ConnectorConfig, http: &'a HttpClient, store: &'a dyn SettingsStore) -> Self {
        Self { config, http, store }
    }

    pub fn tokens(&self) -> TokenManager<'a> {
        TokenManager::new(self.config, self.http, self.store)
    }

    pub fn repository(&self) -> AssetRepository<'a> {
        AssetRepository::new(self.config, self.http)
    }

    pub fn links(&self) -> LinkBuilder<'a> {
        LinkBuilder::new(self.config)
    }

    pub fn store(&self) -> &'a dyn SettingsStore {
        self.store
    }

    pub fn http(&self) -> &'a HttpClient {
        self.http
    }

    /// Reuses a stored token when one is still good, otherwise runs the
    /// prompt. Fails before any request when client credentials are unset.
    pub fn sign_in(&self, prompt: &mut dyn AuthorizationPrompt) -> ConnectorResult<SignIn> {
        let tokens = self.tokens();
        tokens.require_client_credentials()?;

        match tokens.get_token() {
            Ok(Some(token)) => {
                info!("reusing stored token");
                return Ok(SignIn {
                    token,
                    user_name: String::new(),
                    projects: self.store.read_projects()?,
                    reused_token: true,
                });
            }
            Ok(None) => {}
            Err(err) if err.needs_user_action() => {
                warn!(error = %err, "stored token unusable, signing in again");
            }
            Err(err) => return Err(err),
        }

        let token = prompt
            .authorize(&tokens)?
            .ok_or_else(|| ConnectorError::Auth("authorization was declined".into()))?;
        tokens.set_token(&token)?;

        let user_name = tokens.get_user_name(&token);
        let projects: BTreeMap<String, String> = self
            .repository()
            .get_projects(&token)?
            .into_iter()
            .map(|project| (project.id, project.name))
            .collect();
        if projects.is_empty() {
            return Err(ConnectorError::Auth(
                "you do not have access to any Maps Engine accounts".into(),
            ));
        }

        self.store.write_projects(projects.clone())?;
        info!(projects = projects.len(), "signed in");
        Ok(SignIn {
            token,
            user_name,
            projects,
            reused_token: false,
        })
    }

    /// Revokes remotely (best effort) and forgets the session locally.
    /// Client credentials and preferences are kept.
    pub fn sign_out(&self) -> ConnectorResult<()> {
        self.tokens().revoke_token();
        self.store.clear_session()?;
        info!("signed out");
        Ok(())
    }

    pub fn require_token(&self) -> ConnectorResult<Token> {
        self.tokens()
            .get_token()?
            .ok_or_else(|| ConnectorError::Auth("not signed in; run `gmeconn signin`".into()))
    }

    /// Picks the project to work in: the explicit id, then the default,
    /// then the last used one, then the first cached project.
    pub fn resolve_project(&self, explicit: Option<&str>) -> ConnectorResult<String> {
        let projects = self.store.read_projects()?;

        if let Some(id) = explicit {
            return if projects.contains_key(id) {
                Ok(id.to_string())
            } else {
                Err(ConnectorError::Config(format!(
                    "project {id} is not one of your accounts"
                )))
            };
        }

        for key in [SettingKey::DefaultProject, SettingKey::LastUsedProject] {
            if let Some(id) = self.store.read_text(key)? {
                if projects.contains_key(&id) {
                    return Ok(id);
                }
                warn!(key = key.name(), project_id = %id, "stored project is no longer available");
            }
        }

        projects
            .into_keys()
            .next()
            .ok_or_else(|| ConnectorError::Auth("no cached projects; run `gmeconn signin`".into()))
    }

    pub fn remember_project(&self, project_id: &str) -> ConnectorResult<()> {
        self.store.write_text(SettingKey::LastUsedProject, project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemorySettingsStore, SettingValue};

    fn cached(projects: &[(&str, &str)]) -> MemorySettingsStore {
        let map = projects
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        MemorySettingsStore::new().with(SettingKey::Projects, SettingValue::Map(map))
    }

    #[test]
    fn project_resolution_order() {
        let config = ConnectorConfig::default();
        let http = HttpClient::new(&config).unwrap();

        let store = cached(&[("111", "A"), ("222", "B"), ("333", "C")])
            .with(SettingKey::DefaultProject, "222")
            .with(SettingKey::LastUsedProject, "333");
        let session = Session::new(&config, &http, &store);
        assert_eq!(session.resolve_project(Some("111")).unwrap(), "111");
        assert_eq!(session.resolve_project(None).unwrap(), "222");

        let store = cached(&[("111", "A"), ("333", "C")])
            .with(SettingKey::DefaultProject, "999")
            .with(SettingKey::LastUsedProject, "333");
        let session = Session::new(&config, &http, &store);
        assert_eq!(session.resolve_project(None).unwrap(), "333");

        let store = cached(&[("111", "A"), ("333", "C")]);
        let session = Session::new(&config, &http, &store);
        assert_eq!(session.resolve_project(None).unwrap(), "111");
        assert!(matches!(
            session.resolve_project(Some("999")),
            Err(ConnectorError::Config(_))
        ));
    }

    #[test]
    fn no_cached_projects_means_not_signed_in() {
        let config = ConnectorConfig::default();
        let http = HttpClient::new(&config).unwrap();
        let store = MemorySettingsStore::new();
        let session = Session::new(&config, &http, &store);
        assert!(matches!(session.resolve_project(None), Err(ConnectorError::Auth(_))));
    }

    #[test]
    fn require_token_without_session_is_auth_error() {
        let config = ConnectorConfig::default();
        let http = HttpClient::new(&config).unwrap();
        let store = MemorySettingsStore::new();
        let session = Session::new(&config, &http, &store);
        assert!(matches!(session.require_token(), Err(ConnectorError::Auth(_))));
    }
}
