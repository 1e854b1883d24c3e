// Polling controller: bootstraps from the entry document, then refreshes the
// media playlist, diffs snapshots and feeds the segment worker.
//
// Bootstrap -> Poll -> Wait -> Poll -> ... -> Stopped (cancelled or failed)

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use url::Url;

use crate::HlsRecorderError;
use crate::events::DownloadReport;
use crate::output::{StagedPlaylist, TimingLog, playlist_snapshot_path};
use crate::playlist::{PlaylistSnapshot, Segment, parse_initial, parse_media, resolve_uris};
use crate::transport::{FetchedBody, HttpTransport};

/// Lower bound for the refresh interval, so a playlist advertising a zero
/// target duration is not polled in a tight loop.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// What to do with a freshly parsed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPlan {
    /// Persist the snapshot and enqueue all of its segments
    pub dispatch: bool,
    /// Delay before the next refresh
    pub wait: Duration,
}

/// Reload heuristic (RFC 8216 6.3.4): the first snapshot is dispatched and
/// followed by a full target duration; an unchanged one is skipped with a full
/// target duration; a changed one is dispatched in full and followed by half
/// the target duration.
pub fn plan_refresh(previous: Option<&PlaylistSnapshot>, current: &PlaylistSnapshot) -> RefreshPlan {
    let target = Duration::from_secs(current.target_duration);
    let (dispatch, wait) = match previous {
        None => (true, target),
        Some(previous) if previous == current => (false, target),
        Some(_) => (true, target / 2),
    };
    RefreshPlan {
        dispatch,
        wait: wait.max(MIN_REFRESH_INTERVAL),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

pub struct PollingController {
    transport: HttpTransport,
    entry_url: Url,
    output_dir: PathBuf,
    segment_tx: mpsc::Sender<Segment>,
    report_rx: mpsc::Receiver<DownloadReport>,
    reports_open: bool,
    stop_on_endlist: bool,
}

impl PollingController {
    pub fn new(
        transport: HttpTransport,
        entry_url: Url,
        output_dir: PathBuf,
        segment_tx: mpsc::Sender<Segment>,
        report_rx: mpsc::Receiver<DownloadReport>,
        stop_on_endlist: bool,
    ) -> Self {
        Self {
            transport,
            entry_url,
            output_dir,
            segment_tx,
            report_rx,
            reports_open: true,
            stop_on_endlist,
        }
    }

    /// Drives the state machine until `token` is cancelled (`Ok`) or a fatal
    /// condition occurs (`Err`). Consumes the controller so the dispatch
    /// queue is closed on every exit path.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), HlsRecorderError> {
        let start = Instant::now();
        let mut timing = TimingLog::create(&self.output_dir, start).await?;

        let Some(playlist_url) = self.bootstrap(&mut timing, &token).await? else {
            info!("Cancelled during bootstrap");
            return Ok(());
        };

        let mut previous: Option<PlaylistSnapshot> = None;
        let mut cycle = 1u64;
        let mut end_list_seen = false;

        loop {
            let Some(body) = self
                .fetch(&playlist_url, "playlist refresh", &token)
                .await?
            else {
                info!("Cancelled during playlist refresh");
                return Ok(());
            };

            let staged = StagedPlaylist::stage(&self.output_dir, body.bytes.clone()).await?;
            let mut snapshot = parse_media(decode(&body)?)?;
            resolve_uris(&mut snapshot, &playlist_url);
            let elapsed_ms = timing.record().await?;

            let plan = plan_refresh(previous.as_ref(), &snapshot);
            let end_list = snapshot.end_list;
            debug!(
                elapsed_ms,
                media_sequence = snapshot.media_sequence,
                segments = snapshot.segments.len(),
                dispatch = plan.dispatch,
                wait_ms = plan.wait.as_millis() as u64,
                "Playlist refreshed"
            );

            if plan.dispatch {
                let path = playlist_snapshot_path(&playlist_url, &self.output_dir, cycle)?;
                staged.persist(path).await?;
                cycle += 1;

                for segment in &snapshot.segments {
                    if self.dispatch(segment.clone(), &token).await? == Flow::Cancelled {
                        info!("Cancelled while dispatching segments");
                        return Ok(());
                    }
                }
                previous = Some(snapshot);
            } else {
                trace!("Playlist unchanged");
                drop(staged);
            }

            if end_list {
                if self.stop_on_endlist {
                    info!(url = %playlist_url, "Playlist ended, waiting for pending segments");
                    return self.drain(&token).await;
                }
                if !end_list_seen {
                    info!(url = %playlist_url, "Playlist carries ENDLIST, polling continues");
                    end_list_seen = true;
                }
            }

            if self.wait(plan.wait, &token).await? == Flow::Cancelled {
                info!("Cancelled while waiting for the next refresh");
                return Ok(());
            }
        }
    }

    /// Fetches the entry document, keeps its bytes as snapshot 0 and returns
    /// the media playlist URL it names.
    async fn bootstrap(
        &self,
        timing: &mut TimingLog,
        token: &CancellationToken,
    ) -> Result<Option<Url>, HlsRecorderError> {
        let Some(body) = self
            .fetch(&self.entry_url, "entry playlist fetch", token)
            .await?
        else {
            return Ok(None);
        };

        let staged = StagedPlaylist::stage(&self.output_dir, body.bytes.clone()).await?;
        let playlist_url = parse_initial(decode(&body)?, &body.final_url)?;
        let elapsed_ms = timing.record().await?;

        let path = playlist_snapshot_path(&playlist_url, &self.output_dir, 0)?;
        staged.persist(path).await?;
        info!(elapsed_ms, playlist = %playlist_url, "Bootstrap complete");
        Ok(Some(playlist_url))
    }

    async fn fetch(
        &self,
        url: &Url,
        operation: &'static str,
        token: &CancellationToken,
    ) -> Result<Option<FetchedBody>, HlsRecorderError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Ok(None),
            body = self.transport.fetch_bytes(url, operation) => body.map(Some),
        }
    }

    /// Enqueues one segment. Blocks while the dispatch queue is full, draining
    /// completion reports meanwhile so the worker can make progress.
    async fn dispatch(
        &mut self,
        segment: Segment,
        token: &CancellationToken,
    ) -> Result<Flow, HlsRecorderError> {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Flow::Cancelled),
                report = self.report_rx.recv(), if self.reports_open => {
                    on_report(&mut self.reports_open, report)?;
                }
                permit = self.segment_tx.reserve() => {
                    let permit = permit.map_err(|_| HlsRecorderError::WorkerStopped)?;
                    trace!(sequence = segment.sequence, "Segment dispatched");
                    permit.send(segment);
                    return Ok(Flow::Continue);
                }
            }
        }
    }

    /// Waits for `interval`, handling completion reports as they arrive
    /// without restarting the timer.
    async fn wait(
        &mut self,
        interval: Duration,
        token: &CancellationToken,
    ) -> Result<Flow, HlsRecorderError> {
        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Flow::Cancelled),
                report = self.report_rx.recv(), if self.reports_open => {
                    on_report(&mut self.reports_open, report)?;
                }
                _ = &mut sleep => return Ok(Flow::Continue),
            }
        }
    }

    /// Closes the dispatch queue and consumes reports until the worker exits.
    async fn drain(self, token: &CancellationToken) -> Result<(), HlsRecorderError> {
        let Self {
            segment_tx,
            mut report_rx,
            ..
        } = self;
        drop(segment_tx);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                report = report_rx.recv() => match report {
                    Some(report) => handle_outcome(report)?,
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Handles one receive from the completion queue; `None` marks it closed.
fn on_report(
    reports_open: &mut bool,
    report: Option<DownloadReport>,
) -> Result<(), HlsRecorderError> {
    match report {
        Some(report) => handle_outcome(report),
        None => {
            debug!("Completion queue closed");
            *reports_open = false;
            Ok(())
        }
    }
}

fn handle_outcome(report: DownloadReport) -> Result<(), HlsRecorderError> {
    if report.outcome.is_success() {
        trace!(sequence = report.sequence, "Segment downloaded");
        return Ok(());
    }
    if report.outcome.is_retryable() {
        info!(sequence = report.sequence, outcome = ?report.outcome, "download failed");
        return Ok(());
    }
    let err = report
        .into_fatal_error()
        .unwrap_or(HlsRecorderError::WorkerStopped);
    error!(error = %err, "Fatal segment failure");
    Err(err)
}

fn decode(body: &FetchedBody) -> Result<&str, HlsRecorderError> {
    std::str::from_utf8(&body.bytes)
        .map_err(|e| HlsRecorderError::playlist(format!("{} is not valid UTF-8: {e}", body.final_url)))
}
