use std::future::Future;
use std::sync::Arc;

use nagios_core::{ConnectionConfig, NagiosError, UpstreamQuery};
use reqwest::StatusCode;
use serde_json::Value;

/// Performs one upstream GET and returns the decoded JSON document.
///
/// The registry is generic over this so the whole tool pipeline can run
/// against canned documents in tests.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        query: &UpstreamQuery,
    ) -> impl Future<Output = Result<Value, NagiosError>> + Send;
}

impl<T: Fetcher> Fetcher for Arc<T> {
    fn fetch(
        &self,
        query: &UpstreamQuery,
    ) -> impl Future<Output = Result<Value, NagiosError>> + Send {
        (**self).fetch(query)
    }
}

/// reqwest-backed fetcher talking to the Nagios CGIs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    config: Arc<ConnectionConfig>,
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: Arc<ConnectionConfig>) -> Result<Self, NagiosError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("nagios-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NagiosError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, query: &UpstreamQuery) -> Result<Value, NagiosError> {
        let mut url = reqwest::Url::parse(&self.config.endpoint_url(query.endpoint()))
            .map_err(|e| NagiosError::Transport(format!("invalid Nagios URL: {e}")))?;
        {
            let mut qp = url.query_pairs_mut();
            for (k, v) in query.params() {
                qp.append_pair(k, v);
            }
        }
        // Credentials never end up in the URL, so it is safe to log.
        tracing::debug!(url = %url, "requesting Nagios CGI");

        let mut request = self.http.get(url);
        if let Some(credentials) = self.config.credentials() {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await.map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(
                status = status.as_u16(),
                query = query.payload_key(),
                "Nagios CGI returned non-200"
            );
            return Err(NagiosError::UpstreamHttp {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| NagiosError::Decode(e.to_string()))
    }
}

impl HttpFetcher {
    fn transport_error(&self, err: &reqwest::Error) -> NagiosError {
        let message = if err.is_timeout() {
            format!(
                "request to {} timed out after {}s",
                self.config.base_url(),
                self.config.timeout().as_secs()
            )
        } else {
            format!("request to {} failed: {err}", self.config.base_url())
        };
        tracing::warn!(error = %message, "Nagios transport failure");
        NagiosError::Transport(message)
    }
}
