// Session wiring: two transports, the two bounded queues, the worker task and
// the controller.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::PollingController;
use crate::transport::{HttpTransport, create_client};
use crate::worker::SegmentWorker;
use crate::{HlsRecorderError, RecorderConfig};

/// One recording session over a live HLS playlist.
#[derive(Debug, Clone)]
pub struct HlsRecorder {
    config: RecorderConfig,
}

impl HlsRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    /// Records until `token` is cancelled or a fatal error occurs.
    ///
    /// Returns only after the segment worker has exited.
    pub async fn run(&self, token: CancellationToken) -> Result<(), HlsRecorderError> {
        let config = &self.config;
        let entry_url = config.validate()?;

        // Playlist and segment requests never share a connection pool.
        let playlist_transport =
            HttpTransport::new(create_client(config)?, &config.token, config.playlist_timeout)?;
        let segment_transport =
            HttpTransport::new(create_client(config)?, &config.token, config.segment_timeout)?;

        let (segment_tx, segment_rx) = mpsc::channel(config.queue_capacity);
        let (report_tx, report_rx) = mpsc::channel(config.queue_capacity);

        let worker = SegmentWorker::new(
            segment_transport,
            config.output_dir.clone(),
            segment_rx,
            report_tx,
            config.error_budget,
        );
        let worker_handle = tokio::spawn(worker.run());

        info!(
            entry = %entry_url,
            output_dir = %config.output_dir.display(),
            segment_timeout_ms = config.segment_timeout.as_millis() as u64,
            playlist_timeout_ms = config.playlist_timeout.as_millis() as u64,
            "Recording started"
        );

        let controller = PollingController::new(
            playlist_transport,
            entry_url,
            config.output_dir.clone(),
            segment_tx,
            report_rx,
            config.stop_on_endlist,
        );
        let result = controller.run(token).await;

        // The controller has dropped the dispatch sender; the worker finishes
        // its in-flight segment and exits.
        if let Err(e) = worker_handle.await {
            warn!(error = %e, "Segment worker task failed");
        } else {
            debug!("Segment worker joined");
        }

        match &result {
            Ok(()) => info!("Recording stopped"),
            Err(e) => error!(error = %e, "Recording failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn invalid_configuration_fails_before_any_request() {
        let dir = TempDir::new().unwrap();
        let recorder = HlsRecorder::new(
            RecorderConfig::builder()
                .with_entry_url("::not-a-url::")
                .with_output_dir(dir.path())
                .build(),
        );
        let err = recorder.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, HlsRecorderError::InvalidUrl { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unreachable_entry_is_fatal() {
        let dir = TempDir::new().unwrap();
        let recorder = HlsRecorder::new(
            RecorderConfig::builder()
                .with_entry_url("http://127.0.0.1:1/entry.m3u8")
                .with_output_dir(dir.path())
                .build(),
        );
        let err = recorder.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            HlsRecorderError::Network { .. } | HlsRecorderError::Timeout { .. }
        ));
    }
}
