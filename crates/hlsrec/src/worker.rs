// Segment download worker: drains the dispatch queue, persists each segment
// and reports a classified outcome back to the controller.

use std::path::PathBuf;

use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::HlsRecorderError;
use crate::events::{DownloadOutcome, DownloadReport};
use crate::output::segment_path;
use crate::playlist::Segment;
use crate::transport::{HttpTransport, classify_reqwest_error};

pub struct SegmentWorker {
    transport: HttpTransport,
    output_dir: PathBuf,
    segment_rx: mpsc::Receiver<Segment>,
    report_tx: mpsc::Sender<DownloadReport>,
    error_budget: u32,
}

impl SegmentWorker {
    pub fn new(
        transport: HttpTransport,
        output_dir: PathBuf,
        segment_rx: mpsc::Receiver<Segment>,
        report_tx: mpsc::Sender<DownloadReport>,
        error_budget: u32,
    ) -> Self {
        Self {
            transport,
            output_dir,
            segment_rx,
            report_tx,
            error_budget,
        }
    }

    /// Runs until the dispatch queue is closed and drained, the controller
    /// stops listening, a fatal outcome was reported, or more than
    /// `error_budget` consecutive downloads failed.
    ///
    /// Exhausting the budget ends the worker without a report; the controller
    /// notices through the closed dispatch queue.
    pub async fn run(mut self) {
        let mut consecutive_errors = 0u32;
        debug!(budget = self.error_budget, "Segment worker started");

        loop {
            if consecutive_errors > self.error_budget {
                warn!(
                    consecutive_errors,
                    "Segment error budget exhausted, worker stopping"
                );
                return;
            }

            let Some(segment) = self.segment_rx.recv().await else {
                debug!("Dispatch queue closed, worker stopping");
                return;
            };

            let sequence = segment.sequence;
            let outcome = self.download(&segment).await;

            if outcome.is_success() {
                consecutive_errors = 0;
            } else {
                consecutive_errors += 1;
                debug!(sequence, consecutive_errors, outcome = ?outcome, "Segment download failed");
            }

            let fatal = outcome.is_fatal();
            if self
                .report_tx
                .send(DownloadReport::new(sequence, outcome))
                .await
                .is_err()
            {
                debug!("Controller is gone, worker stopping");
                return;
            }
            if fatal {
                return;
            }
        }
    }

    #[instrument(skip(self, segment), fields(sequence = segment.sequence))]
    async fn download(&self, segment: &Segment) -> DownloadOutcome {
        match self.fetch_segment(segment).await {
            Ok(()) => DownloadOutcome::Success,
            Err(e) => DownloadOutcome::from(e),
        }
    }

    async fn fetch_segment(&self, segment: &Segment) -> Result<(), HlsRecorderError> {
        let url = Url::parse(&segment.uri)
            .map_err(|e| HlsRecorderError::invalid_url(&segment.uri, e))?;

        let response = self.transport.get(&url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(e, &url))?;

        let path = segment_path(&url, &self.output_dir)?;
        tokio::fs::write(&path, &body).await.map_err(|e| {
            std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        })?;

        trace!(path = %path.display(), size = body.len(), duration = segment.duration, "Segment saved");
        Ok(())
    }
}

async fn status_error(status: StatusCode, url: &Url, response: reqwest::Response) -> HlsRecorderError {
    match status.as_u16() {
        401 | 403 => HlsRecorderError::Authorization {
            status,
            url: url.to_string(),
        },
        400..=499 => HlsRecorderError::ClientStatus {
            status,
            url: url.to_string(),
        },
        500..=599 => HlsRecorderError::ServerStatus {
            status,
            url: url.to_string(),
            body: response.text().await.unwrap_or_default(),
        },
        _ => HlsRecorderError::http_status(status, url.as_str(), "segment download"),
    }
}
