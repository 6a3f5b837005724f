use std::fmt;
use std::time::Duration;

use url::Url;

use crate::query::Endpoint;

pub const DEFAULT_CGI_PATH: &str = "cgi-bin";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("NAGIOS_URL must be set to the Nagios web root (e.g. http://nagios.example.com/nagios)")]
    MissingBaseUrl,
    #[error("NAGIOS_URL '{url}' is not a usable http(s) URL: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("NAGIOS_USER and NAGIOS_PASS must be set together (got only {present})")]
    PartialCredentials { present: &'static str },
    #[error("request timeout must be greater than zero seconds")]
    InvalidTimeout,
}

/// Raw, unvalidated connection settings as they come from flags/env.
/// Empty strings count as unset.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cgi_path: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable connection configuration, built once at startup and shared by
/// reference with everything that talks to Nagios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    base_url: String,
    cgi_path: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl ConnectionConfig {
    /// Config with no credentials and default CGI path/timeout.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::from_settings(ConnectionSettings {
            base_url: Some(base_url.to_string()),
            ..Default::default()
        })
    }

    pub fn from_settings(settings: ConnectionSettings) -> Result<Self, ConfigError> {
        let base_url = non_empty(settings.base_url).ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = validate_base_url(&base_url)?;

        let credentials = match (non_empty(settings.username), non_empty(settings.password)) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::PartialCredentials {
                    present: "NAGIOS_USER",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::PartialCredentials {
                    present: "NAGIOS_PASS",
                });
            }
        };

        let cgi_path = non_empty(settings.cgi_path)
            .unwrap_or_else(|| DEFAULT_CGI_PATH.to_string())
            .trim_matches('/')
            .to_string();

        let timeout_secs = settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(Self {
            base_url,
            cgi_path,
            credentials,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Web root without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cgi_path(&self) -> &str {
        &self.cgi_path
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full URL of a CGI endpoint, without query string.
    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        if self.cgi_path.is_empty() {
            format!("{}/{}", self.base_url, endpoint.script())
        } else {
            format!("{}/{}/{}", self.base_url, self.cgi_path, endpoint.script())
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim_end_matches('/');
    let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let parsed = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("must not contain a query string or fragment"));
    }
    Ok(trimmed.to_string())
}
