use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tracing::warn;
use url::Url;

use crate::HlsRecorderError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Capacity of both the dispatch and the completion queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Consecutive non-successful segment downloads tolerated before the worker
/// stops consuming.
pub const DEFAULT_ERROR_BUDGET: u32 = 5;

/// Configurable options for a recording session
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Entry URL. Its body names the live media playlist to poll.
    pub entry_url: String,

    /// Bearer token sent with every request
    pub token: String,

    /// Directory receiving playlist snapshots, segments and the timing log.
    /// Must already exist.
    pub output_dir: PathBuf,

    /// Deadline for a single segment request, body included
    pub segment_timeout: Duration,

    /// Deadline for a single playlist request, body included
    pub playlist_timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Bound of the dispatch and completion queues
    pub queue_capacity: usize,

    /// Consecutive segment failures tolerated by the worker
    pub error_budget: u32,

    /// Stop polling once a snapshot carrying `#EXT-X-ENDLIST` was dispatched.
    /// Off by default: live sources keep being polled.
    pub stop_on_endlist: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            entry_url: String::new(),
            token: String::new(),
            output_dir: PathBuf::from("out"),
            segment_timeout: Duration::from_millis(2000),
            playlist_timeout: Duration::from_millis(6000),
            connect_timeout: Duration::from_secs(10),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            error_budget: DEFAULT_ERROR_BUDGET,
            stop_on_endlist: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: RecorderConfig::get_default_headers(),
        }
    }
}

impl RecorderConfig {
    pub fn builder() -> RecorderConfigBuilder {
        RecorderConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers
    }

    /// Parses the entry URL and checks the numeric limits.
    pub fn validate(&self) -> Result<Url, HlsRecorderError> {
        if self.entry_url.trim().is_empty() {
            return Err(HlsRecorderError::configuration("entry URL is empty"));
        }
        let entry = Url::parse(self.entry_url.trim())
            .map_err(|e| HlsRecorderError::invalid_url(&self.entry_url, e))?;
        if !matches!(entry.scheme(), "http" | "https") {
            return Err(HlsRecorderError::configuration(format!(
                "unsupported scheme `{}` in entry URL",
                entry.scheme()
            )));
        }
        if self.queue_capacity == 0 {
            return Err(HlsRecorderError::configuration(
                "queue capacity must be at least 1",
            ));
        }
        if self.segment_timeout.is_zero() || self.playlist_timeout.is_zero() {
            return Err(HlsRecorderError::configuration(
                "request deadlines must be non-zero",
            ));
        }
        Ok(entry)
    }
}

/// Builder for [`RecorderConfig`]
#[derive(Debug, Clone, Default)]
pub struct RecorderConfigBuilder {
    config: RecorderConfig,
}

impl RecorderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry_url(mut self, url: impl Into<String>) -> Self {
        self.config.entry_url = url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.config.token = token.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn with_segment_timeout(mut self, timeout: Duration) -> Self {
        self.config.segment_timeout = timeout;
        self
    }

    pub fn with_playlist_timeout(mut self, timeout: Duration) -> Self {
        self.config.playlist_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn with_error_budget(mut self, budget: u32) -> Self {
        self.config.error_budget = budget;
        self
    }

    pub fn with_stop_on_endlist(mut self, stop: bool) -> Self {
        self.config.stop_on_endlist = stop;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.config.headers.insert(name, value);
            }
            Err(e) => warn!(header = name, error = %e, "Ignoring invalid header value"),
        }
        self
    }

    pub fn build(self) -> RecorderConfig {
        self.config
    }
}
