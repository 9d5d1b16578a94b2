use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};

/// Blocking HTTP client with a fixed retry bound and no backoff.
pub struct HttpClient {
    inner: Client,
    attempts: u32,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    url: String,
    status: StatusCode,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> ConnectorResult<T> {
        serde_json::from_slice(&self.body).map_err(|err| ConnectorError::protocol(&self.url, err))
    }
}

impl HttpClient {
    pub fn new(config: &ConnectorConfig) -> ConnectorResult<Self> {
        let inner = Client::builder()
            .user_agent(concat!("gmeconn/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|err| ConnectorError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            inner,
            attempts: config.http_attempts.max(1),
        })
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.inner.get(url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.inner.post(url)
    }

    /// Sends the request, retrying transport errors and error statuses.
    pub fn execute(&self, request: RequestBuilder) -> ConnectorResult<HttpResponse> {
        let request = request.build().map_err(|source| ConnectorError::Transport {
            url: "<invalid request>".into(),
            attempts: 0,
            source: source.without_url(),
        })?;
        let url = redact(request.url());
        debug!(method = %request.method(), url = %url, "sending request");

        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = request.try_clone().ok_or_else(|| {
                ConnectorError::Config(format!("request to {url} cannot be retried"))
            })?;

            let outcome = self
                .inner
                .execute(current)
                .and_then(|response| response.error_for_status())
                .and_then(|response| {
                    let status = response.status();
                    response.bytes().map(|body| (status, body))
                });

            match outcome {
                Ok((status, body)) => {
                    return Ok(HttpResponse {
                        url,
                        status,
                        body: body.to_vec(),
                    });
                }
                Err(err) => {
                    let err = err.without_url();
                    warn!(url = %url, attempt, error = %err, "request failed");
                    if attempt >= self.attempts {
                        return Err(ConnectorError::Transport {
                            url,
                            attempts: attempt,
                            source: err,
                        });
                    }
                }
            }
        }
    }
}

/// Strips query strings and WMS token segments so URLs are safe to log.
pub fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    let path = clean.path().to_string();
    if let Some(idx) = path.find("/wms/") {
        clean.set_path(&format!("{}/wms/redacted/", &path[..idx]));
    }
    clean.to_string()
}
