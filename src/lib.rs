//! Connector for Google Maps Engine: OAuth2 sign-in, asset browsing, uploads,
//! WMS access and web links.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod footprint;
pub mod http;
pub mod links;
pub mod session;
pub mod storage;
pub mod wms;

pub use config::ConnectorConfig;
pub use error::{ConnectorError, ConnectorResult};
pub use http::HttpClient;
pub use session::Session;

/// Installs the stderr log subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,gmeconn=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
