use reqwest::StatusCode;

use crate::HlsRecorderError;

/// Classified result of one segment download.
#[derive(Debug)]
pub enum DownloadOutcome {
    Success,
    /// The request or body read exceeded the segment deadline
    RetryableTimeout,
    /// 4xx other than 401/403
    RetryableClientError(StatusCode),
    /// The body arrived but could not be written to the output directory
    RetryableLocalIo(String),
    /// Stops the worker and ends the recording
    Fatal(HlsRecorderError),
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_success() && !self.is_fatal()
    }
}

impl From<HlsRecorderError> for DownloadOutcome {
    fn from(err: HlsRecorderError) -> Self {
        if !err.is_retryable() {
            return Self::Fatal(err);
        }
        match err {
            HlsRecorderError::Timeout { .. } => Self::RetryableTimeout,
            HlsRecorderError::ClientStatus { status, .. } => Self::RetryableClientError(status),
            local => Self::RetryableLocalIo(local.to_string()),
        }
    }
}

/// Sent by the worker on the completion queue after every download attempt.
#[derive(Debug)]
pub struct DownloadReport {
    pub sequence: u64,
    pub outcome: DownloadOutcome,
}

impl DownloadReport {
    pub fn new(sequence: u64, outcome: DownloadOutcome) -> Self {
        Self { sequence, outcome }
    }

    /// Turns a fatal report into the error that ends the recording.
    pub fn into_fatal_error(self) -> Option<HlsRecorderError> {
        match self.outcome {
            DownloadOutcome::Fatal(source) => Some(HlsRecorderError::SegmentFetch {
                sequence: self.sequence,
                source: Box::new(source),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        assert!(DownloadOutcome::Success.is_success());
        assert!(DownloadOutcome::RetryableTimeout.is_retryable());
        assert!(DownloadOutcome::RetryableClientError(StatusCode::NOT_FOUND).is_retryable());
        assert!(DownloadOutcome::RetryableLocalIo("disk full".into()).is_retryable());

        let fatal = DownloadOutcome::Fatal(HlsRecorderError::WorkerStopped);
        assert!(fatal.is_fatal());
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn errors_map_onto_outcome_classes() {
        let timeout = DownloadOutcome::from(HlsRecorderError::Timeout {
            url: "http://h/a.ts".into(),
        });
        assert!(matches!(timeout, DownloadOutcome::RetryableTimeout));

        let gone = DownloadOutcome::from(HlsRecorderError::ClientStatus {
            status: StatusCode::GONE,
            url: "http://h/a.ts".into(),
        });
        assert!(matches!(gone, DownloadOutcome::RetryableClientError(s) if s == StatusCode::GONE));

        let disk = DownloadOutcome::from(HlsRecorderError::from(std::io::Error::other("disk full")));
        assert!(matches!(disk, DownloadOutcome::RetryableLocalIo(ref detail) if detail.contains("disk full")));

        let server = DownloadOutcome::from(HlsRecorderError::ServerStatus {
            status: StatusCode::BAD_GATEWAY,
            url: "http://h/a.ts".into(),
            body: String::new(),
        });
        assert!(server.is_fatal());
    }

    #[test]
    fn only_fatal_reports_become_errors() {
        assert!(
            DownloadReport::new(1, DownloadOutcome::RetryableTimeout)
                .into_fatal_error()
                .is_none()
        );

        let err = DownloadReport::new(
            9,
            DownloadOutcome::Fatal(HlsRecorderError::Authorization {
                status: StatusCode::FORBIDDEN,
                url: "http://h/seg9.ts".into(),
            }),
        )
        .into_fatal_error()
        .unwrap();
        assert!(matches!(err, HlsRecorderError::SegmentFetch { sequence: 9, .. }));
        assert!(err.is_authorization());
    }
}
