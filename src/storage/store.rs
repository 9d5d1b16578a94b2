use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::*;
use crate::error::{ConnectorError, ConnectorResult};

const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Durable key-value settings, injected into every component that needs them.
pub trait SettingsStore {
    fn read(&self, key: SettingKey) -> ConnectorResult<Option<SettingValue>>;
    fn write(&self, key: SettingKey, value: SettingValue) -> ConnectorResult<()>;
    fn remove(&self, key: SettingKey) -> ConnectorResult<()>;

    /// Text value with blank strings treated as unset.
    fn read_text(&self, key: SettingKey) -> ConnectorResult<Option<String>> {
        Ok(self
            .read(key)?
            .and_then(|v| v.as_text().map(str::trim).map(str::to_string))
            .filter(|v| !v.is_empty()))
    }

    fn write_text(&self, key: SettingKey, value: &str) -> ConnectorResult<()> {
        self.write(key, SettingValue::from(value))
    }

    /// Cached project id -> name mapping.
    fn read_projects(&self) -> ConnectorResult<BTreeMap<String, String>> {
        Ok(self
            .read(SettingKey::Projects)?
            .and_then(SettingValue::into_map)
            .unwrap_or_default())
    }

    /// Replaces the whole project cache; never merges.
    fn write_projects(&self, projects: BTreeMap<String, String>) -> ConnectorResult<()> {
        self.write(SettingKey::Projects, SettingValue::Map(projects))
    }

    fn clear_session(&self) -> ConnectorResult<()> {
        for key in SettingKey::SESSION {
            self.remove(key)?;
        }
        Ok(())
    }
}

pub struct FileSettingsStore {
    config_path: PathBuf,
    credentials_path: PathBuf,
}

impl FileSettingsStore {
    pub fn new() -> ConnectorResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConnectorError::Config("could not determine config directory".into()))?
            .join("gmeconn");
        Self::with_dir(&config_dir)
    }

    pub fn with_dir(config_dir: &Path) -> ConnectorResult<Self> {
        fs::create_dir_all(config_dir)?;
        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE),
            credentials_path: config_dir.join(CREDENTIALS_FILE),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    // -- Preferences (no secrets) ---------------------------------------------

    fn load_config(&self) -> ConnectorResult<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    fn save_config(&self, config: &Config) -> ConnectorResult<()> {
        let contents = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, contents)?;
        Ok(())
    }

    // -- Credentials (secrets, 0600) ------------------------------------------

    fn load_credentials(&self) -> ConnectorResult<CredentialsFile> {
        if !self.credentials_path.exists() {
            return Ok(CredentialsFile::default());
        }
        let contents = fs::read_to_string(&self.credentials_path)?;
        let creds: CredentialsFile = serde_json::from_str(&contents)?;
        Ok(creds)
    }

    fn save_credentials(&self, creds: &CredentialsFile) -> ConnectorResult<()> {
        let contents = serde_json::to_string_pretty(creds)?;
        fs::write(&self.credentials_path, &contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.credentials_path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn read(&self, key: SettingKey) -> ConnectorResult<Option<SettingValue>> {
        let name = key.qualified();
        if key.is_secret() {
            Ok(self.load_credentials()?.settings.get(&name).cloned())
        } else {
            Ok(self.load_config()?.settings.get(&name).cloned())
        }
    }

    fn write(&self, key: SettingKey, value: SettingValue) -> ConnectorResult<()> {
        debug!(key = key.name(), "writing setting");
        let name = key.qualified();
        if key.is_secret() {
            let mut creds = self.load_credentials()?;
            creds.settings.insert(name, value);
            self.save_credentials(&creds)
        } else {
            let mut config = self.load_config()?;
            config.settings.insert(name, value);
            self.save_config(&config)
        }
    }

    fn remove(&self, key: SettingKey) -> ConnectorResult<()> {
        let name = key.qualified();
        if key.is_secret() {
            let mut creds = self.load_credentials()?;
            if creds.settings.remove(&name).is_some() {
                self.save_credentials(&creds)?;
            }
        } else {
            let mut config = self.load_config()?;
            if config.settings.remove(&name).is_some() {
                self.save_config(&config)?;
            }
        }
        Ok(())
    }
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RefCell<BTreeMap<String, SettingValue>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: SettingKey, value: impl Into<SettingValue>) -> Self {
        self.values.borrow_mut().insert(key.qualified(), value.into());
        self
    }
}

impl SettingsStore for MemorySettingsStore {
    fn read(&self, key: SettingKey) -> ConnectorResult<Option<SettingValue>> {
        Ok(self.values.borrow().get(&key.qualified()).cloned())
    }

    fn write(&self, key: SettingKey, value: SettingValue) -> ConnectorResult<()> {
        self.values.borrow_mut().insert(key.qualified(), value);
        Ok(())
    }

    fn remove(&self, key: SettingKey) -> ConnectorResult<()> {
        self.values.borrow_mut().remove(&key.qualified());
        Ok(())
    }
}
