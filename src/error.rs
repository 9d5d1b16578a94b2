use std::io;

use thiserror::Error;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The request still failed after every retry attempt.
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("{0}")]
    Config(String),
    /// The server answered, but not with the shape we expected.
    #[error("unexpected response from {context}: {message}")]
    Protocol { context: String, message: String },
    #[error("traversal limit reached: {0}")]
    Limit(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to read or write settings: {0}")]
    Storage(String),
}

impl ConnectorError {
    pub fn protocol(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Protocol {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Authentication problems need user action; everything else is transient.
    pub fn needs_user_action(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for ConnectorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<toml::ser::Error> for ConnectorError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
