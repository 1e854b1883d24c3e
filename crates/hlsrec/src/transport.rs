// Authenticated HTTP GET with a per-call deadline.

use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Response};
use tracing::{debug, trace};
use url::Url;

use crate::{HlsRecorderError, RecorderConfig};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a reqwest Client with the provided configuration.
///
/// Deadlines are applied per request by [`HttpTransport`], so the client only
/// carries connection-level settings. Each call yields its own connection pool.
pub fn create_client(config: &RecorderConfig) -> Result<Client, HlsRecorderError> {
    install_rustls_provider();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(2)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(reqwest::redirect::Policy::limited(10));

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(HlsRecorderError::from)
}

/// Response body of a successful (2xx/3xx) fetch.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// URL after redirects
    pub final_url: Url,
    pub bytes: Bytes,
}

/// A client bound to one bearer token and one deadline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    authorization: HeaderValue,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: Client, token: &str, timeout: Duration) -> Result<Self, HlsRecorderError> {
        let mut authorization = HeaderValue::from_str(&format!("bearer {token}"))
            .map_err(|e| HlsRecorderError::configuration(format!("invalid token: {e}")))?;
        authorization.set_sensitive(true);
        Ok(Self {
            client,
            authorization,
            timeout,
        })
    }

    /// Issues the GET and returns the response whatever its status.
    /// Deadline expiry maps to [`HlsRecorderError::Timeout`], every other
    /// transport failure to [`HlsRecorderError::Network`].
    pub async fn get(&self, url: &Url) -> Result<Response, HlsRecorderError> {
        trace!(url = %url, timeout_ms = self.timeout.as_millis() as u64, "GET");
        self.client
            .get(url.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, url))
    }

    /// Fetches a playlist document. Anything outside 2xx/3xx is an error.
    pub async fn fetch_bytes(
        &self,
        url: &Url,
        operation: &'static str,
    ) -> Result<FetchedBody, HlsRecorderError> {
        let response = self.get(url).await?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(HlsRecorderError::http_status(status, url.as_str(), operation));
        }
        let final_url = response.url().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(e, url))?;
        debug!(url = %url, size = bytes.len(), operation, "Fetched");
        Ok(FetchedBody { final_url, bytes })
    }
}

pub(crate) fn classify_reqwest_error(e: reqwest::Error, url: &Url) -> HlsRecorderError {
    if e.is_timeout() {
        HlsRecorderError::Timeout {
            url: url.to_string(),
        }
    } else {
        HlsRecorderError::from(e)
    }
}
