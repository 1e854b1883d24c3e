//! Live HLS recorder engine.
//!
//! Polls a media playlist, persists every changed snapshot verbatim and
//! downloads the referenced segments through a single background worker.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod output;
pub mod playlist;
pub mod recorder;
pub mod transport;
pub mod worker;

// Re-exports for easier access
pub use config::{RecorderConfig, RecorderConfigBuilder};
pub use controller::{PollingController, RefreshPlan, plan_refresh};
pub use error::HlsRecorderError;
pub use events::{DownloadOutcome, DownloadReport};
pub use playlist::{PlaylistSnapshot, Segment};
pub use recorder::HlsRecorder;
pub use transport::{HttpTransport, create_client};
pub use worker::SegmentWorker;

pub use tokio_util::sync::CancellationToken;
