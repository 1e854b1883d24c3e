use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum HlsRecorderError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("authorization rejected with HTTP {status} for {url}")]
    Authorization { status: StatusCode, url: String },

    #[error("client error HTTP {status} for {url}")]
    ClientStatus { status: StatusCode, url: String },

    #[error("server error HTTP {status} for {url}: {body}")]
    ServerStatus {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("cannot derive output file name from `{input}`: {reason}")]
    Naming { input: String, reason: String },

    #[error("segment {sequence} failed: {source}")]
    SegmentFetch {
        sequence: u64,
        #[source]
        source: Box<HlsRecorderError>,
    },

    #[error("segment worker stopped accepting work")]
    WorkerStopped,

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl HlsRecorderError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn naming(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Naming {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether a segment download failing with this error may be retried with
    /// the next segment. Timeouts, 4xx other than 401/403 and local write
    /// failures qualify. Manifest-level failures are always fatal regardless.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::ClientStatus { .. }
            | Self::Io { .. }
            | Self::Naming { .. } => true,
            Self::Configuration { .. }
            | Self::InvalidUrl { .. }
            | Self::Playlist { .. }
            | Self::Authorization { .. }
            | Self::ServerStatus { .. }
            | Self::HttpStatus { .. }
            | Self::Network { .. }
            | Self::SegmentFetch { .. }
            | Self::WorkerStopped
            | Self::Internal { .. } => false,
        }
    }

    pub fn is_authorization(&self) -> bool {
        match self {
            Self::Authorization { .. } => true,
            Self::SegmentFetch { source, .. } => source.is_authorization(),
            _ => false,
        }
    }
}
