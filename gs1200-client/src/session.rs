//! Session client for the switch's web interface.
//!
//! The switch allows a single logged-in web session at a time and keeps it in
//! a cookie, so one cookie-enabled client is shared for the life of the process.
//! Every failure path logs out before returning so a broken scrape never leaves
//! the admin slot occupied.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use url::Url;

use crate::auth;
use crate::error::{AuthFailure, CollectError, Result};

pub const LOGIN_PATH: &str = "login.cgi";
pub const LOGOUT_PATH: &str = "logout.html";

/// Marker the switch embeds in a 200 response when the admin slot is taken.
const ALREADY_LOGGED_IN_MARKER: &str = "another user is already logged in";

/// Marker of the alert script the switch returns for a rejected password.
const WRONG_PASSWORD_MARKER: &str = "incorrect password";

/// Cookie-based session against one switch.
pub struct SessionClient {
    http: reqwest::Client,
    base_url: Url,
    password: SecretString,
}

impl SessionClient {
    /// Create a client for `address`, which is a host, `host:port` or a full URL.
    pub fn new(address: &str, password: SecretString, request_timeout: Duration) -> Result<Self> {
        let base_url = base_url(address)?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            // The switch's web server does not cope well with kept-alive connections.
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            http,
            base_url,
            password,
        })
    }

    /// Log in, obfuscating the password when `firmware` requires it.
    ///
    /// The switch answers rejected logins with HTTP 200, so the body is
    /// inspected for its error markers.
    pub async fn login(&self, firmware: &str) -> Result<()> {
        let obfuscate = auth::requires_obfuscation(firmware);
        let password = if obfuscate {
            auth::obfuscate(self.password.expose_secret())
        } else {
            self.password.expose_secret().to_string()
        };

        let url = self.url(LOGIN_PATH)?;
        debug!(url = %url, firmware, obfuscate, "logging in");

        let result = self.submit_login(url, &password).await;
        if let Err(e) = &result {
            debug!(error = %e, "login failed, clearing session");
            self.logout().await;
        }
        result
    }

    async fn submit_login(&self, url: Url, password: &str) -> Result<()> {
        let resp = self
            .http
            .post(url)
            .form(&[("password", password)])
            .send()
            .await?
            .error_for_status()?;

        let body = resp.text().await?;
        match login_rejection(&body) {
            Some(failure) => Err(CollectError::Auth(failure)),
            None => {
                debug!("login successful");
                Ok(())
            }
        }
    }

    /// Fetch a page relative to the switch's base URL.
    ///
    /// Logs out before returning any error.
    pub async fn fetch(&self, path: &str) -> Result<String> {
        let url = self.url(path)?;
        debug!(url = %url, "fetching page");

        let result = self.get_page(path, url).await;
        if let Err(e) = &result {
            debug!(path, error = %e, "fetch failed, clearing session");
            self.logout().await;
        }
        result
    }

    async fn get_page(&self, path: &str, url: Url) -> Result<String> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CollectError::Fetch {
                path: path.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = resp.text().await?;
        // Without a valid session the switch serves its login page instead of data.
        if path.ends_with(".js") && body.contains("</html>") {
            return Err(CollectError::Fetch {
                path: path.to_string(),
                reason: "received an HTML page instead of data, is another user logged in?"
                    .to_string(),
            });
        }

        Ok(body)
    }

    /// End the session. Failures are logged and otherwise ignored.
    pub async fn logout(&self) {
        let url = match self.url(LOGOUT_PATH) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build logout URL");
                return;
            }
        };
        debug!(url = %url, "logging out");

        match self.http.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success() {
                    warn!(%status, "logout returned an error status");
                }
                if let Err(e) = resp.bytes().await {
                    warn!(error = %e, "failed to read logout response");
                }
            }
            Err(e) => warn!(error = %e, "logout failed"),
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CollectError::InvalidAddress(format!("{}{path}: {e}", self.base_url)))
    }
}

/// Build the base URL for a switch address.
pub fn base_url(address: &str) -> Result<Url> {
    let address = address.trim();
    if address.is_empty() {
        return Err(CollectError::InvalidAddress("address is empty".to_string()));
    }

    let raw = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };

    let mut url =
        Url::parse(&raw).map_err(|e| CollectError::InvalidAddress(format!("{address}: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Detect the error markers the switch embeds in a successful login response.
fn login_rejection(body: &str) -> Option<AuthFailure> {
    let body = body.to_lowercase();
    if body.contains(ALREADY_LOGGED_IN_MARKER) {
        Some(AuthFailure::AlreadyLoggedIn)
    } else if body.contains(WRONG_PASSWORD_MARKER) {
        Some(AuthFailure::WrongPassword)
    } else {
        None
    }
}
