use std::collections::HashMap;
use std::io::BufRead;
use std::time::{Duration, Instant};

use tiny_http::{Header, Response, Server};
use tracing::{debug, info};
use url::Url;

use super::oauth::TokenManager;
use super::pkce::{random_string, PkceChallenge};
use super::token::Token;
use crate::error::{ConnectorError, ConnectorResult};

const CALLBACK_PATH: &str = "/callback";

/// Obtains a token through a consent page the user completes elsewhere.
pub trait AuthorizationPrompt {
    /// `Ok(None)` when the user declined.
    fn authorize(&mut self, tokens: &TokenManager<'_>) -> ConnectorResult<Option<Token>>;
}

/// Opens the system browser and catches the redirect on 127.0.0.1.
pub struct LoopbackPrompt {
    pub port: u16,
    pub timeout: Duration,
    pub open_browser: bool,
}

impl AuthorizationPrompt for LoopbackPrompt {
    fn authorize(&mut self, tokens: &TokenManager<'_>) -> ConnectorResult<Option<Token>> {
        let listener = LoopbackListener::bind(self.port)?;
        let pkce = PkceChallenge::generate();
        let state = random_string(32);
        let auth_url = tokens.authorization_url(listener.redirect_uri(), &state, Some(&pkce))?;

        eprintln!("Opening browser for sign-in...");
        eprintln!("If browser doesn't open, visit:\n{}", auth_url);
        if self.open_browser {
            if let Err(err) = open_browser(&auth_url) {
                debug!(error = %err, "could not launch browser");
            }
        }

        eprintln!("Waiting for authorization...");
        match listener.wait_for_code(&state, self.timeout)? {
            Some(code) => tokens
                .exchange_code(&code, listener.redirect_uri(), Some(&pkce.verifier))
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Out-of-band flow: the user pastes the result page title (or bare code).
pub struct ManualPrompt<R> {
    input: R,
}

impl<R: BufRead> ManualPrompt<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> AuthorizationPrompt for ManualPrompt<R> {
    fn authorize(&mut self, tokens: &TokenManager<'_>) -> ConnectorResult<Option<Token>> {
        let auth_url = tokens.build_authentication_uri()?;
        eprintln!("Visit this page and approve access:\n{}", auth_url);
        eprintln!("Then paste the result page title (\"Success code=...\") or the code:");

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let line = line.trim();

        if line.is_empty() {
            Ok(None)
        } else if line.starts_with("Success") || line.contains(' ') {
            tokens.decode_title_response(line)
        } else {
            tokens.trade_code_for_token(line).map(Some)
        }
    }
}

pub struct LoopbackListener {
    server: Server,
    redirect_uri: String,
}

impl LoopbackListener {
    /// Port 0 picks a free port.
    pub fn bind(port: u16) -> ConnectorResult<Self> {
        let server = Server::http(("127.0.0.1", port)).map_err(|e| {
            ConnectorError::Config(format!("failed to start local callback server: {e}"))
        })?;
        let bound = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(port);
        Ok(Self {
            server,
            redirect_uri: format!("http://127.0.0.1:{bound}{CALLBACK_PATH}"),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Serves requests until the callback arrives. `Ok(None)` means the
    /// user denied access.
    pub fn wait_for_code(&self, expected_state: &str, timeout: Duration) -> ConnectorResult<Option<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnectorError::Auth("timed out waiting for authorization".into()));
            }
            let request = match self.server.recv_timeout(remaining)? {
                Some(request) => request,
                None => continue,
            };

            let parsed = match Url::parse(&format!("http://localhost{}", request.url())) {
                Ok(parsed) => parsed,
                Err(err) => {
                    debug!(error = %err, "ignoring malformed request");
                    let _ = request.respond(Response::from_string("Bad request").with_status_code(400));
                    continue;
                }
            };
            if parsed.path() != CALLBACK_PATH {
                let _ = request.respond(Response::from_string("Not found").with_status_code(404));
                continue;
            }
            let params: HashMap<_, _> = parsed.query_pairs().collect();

            if let (Some(code), Some(recv_state)) = (params.get("code"), params.get("state")) {
                if recv_state.as_ref() != expected_state {
                    let _ = request.respond(Response::from_string("State mismatch! Please try again."));
                    return Err(ConnectorError::Auth("OAuth state mismatch".into()));
                }

                let mut response = Response::from_string(
                    "<html><body><h1>Sign-in complete</h1><p>You can close this window and return to your terminal.</p></body></html>",
                );
                if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
                    response.add_header(header);
                }
                let _ = request.respond(response);
                info!("authorization code received");
                return Ok(Some(code.to_string()));
            } else if let Some(error) = params.get("error") {
                let _ = request.respond(Response::from_string(format!("Authorization failed: {}", error)));
                debug!(%error, "authorization denied");
                return Ok(None);
            }

            let _ = request.respond(Response::from_string("Missing authorization code.").with_status_code(400));
        }
    }
}

pub fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    std::process::Command::new("open").arg(url).spawn()?;

    #[cfg(target_os = "linux")]
    std::process::Command::new("xdg-open").arg(url).spawn()?;

    #[cfg(target_os = "windows")]
    std::process::Command::new("cmd")
        .args(["/C", "start", url])
        .spawn()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;

    fn hit(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write!(stream, "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path).unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).unwrap();
        body
    }

    fn port_of(listener: &LoopbackListener) -> u16 {
        listener
            .redirect_uri()
            .rsplit(':')
            .next()
            .and_then(|rest| rest.trim_end_matches(CALLBACK_PATH).parse().ok())
            .unwrap()
    }

    #[test]
    fn captures_code_and_ignores_other_paths() {
        let listener = LoopbackListener::bind(0).unwrap();
        let port = port_of(&listener);

        let client = thread::spawn(move || {
            let favicon = hit(port, "/favicon.ico");
            let callback = hit(port, "/callback?code=4%2Fabc&state=xyz");
            (favicon, callback)
        });

        let code = listener.wait_for_code("xyz", Duration::from_secs(10)).unwrap();
        let (favicon, callback) = client.join().unwrap();

        assert_eq!(code.as_deref(), Some("4/abc"));
        assert!(favicon.starts_with("HTTP/1.1 404"));
        assert!(callback.contains("Sign-in complete"));
    }

    #[test]
    fn malformed_request_target_does_not_end_the_wait() {
        let listener = LoopbackListener::bind(0).unwrap();
        let port = port_of(&listener);

        let client = thread::spawn(move || {
            let garbage = hit(port, ":99999");
            let callback = hit(port, "/callback?code=ok&state=s1");
            (garbage, callback)
        });

        let code = listener.wait_for_code("s1", Duration::from_secs(10)).unwrap();
        let (garbage, callback) = client.join().unwrap();

        assert_eq!(code.as_deref(), Some("ok"));
        assert!(garbage.starts_with("HTTP/1.1 400"));
        assert!(callback.contains("Sign-in complete"));
    }

    #[test]
    fn state_mismatch_is_an_auth_error() {
        let listener = LoopbackListener::bind(0).unwrap();
        let port = port_of(&listener);
        let client = thread::spawn(move || hit(port, "/callback?code=c&state=other"));

        let err = listener.wait_for_code("expected", Duration::from_secs(10)).unwrap_err();
        client.join().unwrap();
        assert!(matches!(err, ConnectorError::Auth(_)));
    }

    #[test]
    fn denial_yields_no_code() {
        let listener = LoopbackListener::bind(0).unwrap();
        let port = port_of(&listener);
        let client = thread::spawn(move || hit(port, "/callback?error=access_denied"));

        let code = listener.wait_for_code("s", Duration::from_secs(10)).unwrap();
        client.join().unwrap();
        assert!(code.is_none());
    }
}
