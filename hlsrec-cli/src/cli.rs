use std::path::PathBuf;

use clap::Parser;

/// Record a live HLS stream: playlist snapshots, segments and refresh timings.
#[derive(Parser, Debug)]
#[command(name = "hlsrec", author, version, about, long_about = None)]
pub struct Args {
    /// HLS server URI (entry playlist)
    #[arg(long, env = "URI")]
    pub uri: String,

    /// Access token sent as `authorization: bearer <token>`
    #[arg(long, env = "TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Segment download timeout in milliseconds
    #[arg(long, env = "TIMEOUT_SEGMENT", default_value_t = 2000)]
    pub timeout_segment: u64,

    /// Playlist download timeout in milliseconds
    #[arg(long, env = "TIMEOUT_PLAYLIST", default_value_t = 6000)]
    pub timeout_playlist: u64,

    /// Output directory
    #[arg(long, env = "OUT", default_value = "out")]
    pub out: PathBuf,

    /// Stop once the playlist carries #EXT-X-ENDLIST and pending segments are saved
    #[arg(long)]
    pub stop_on_endlist: bool,

    /// Consecutive segment failures tolerated before downloads stop
    #[arg(long, default_value_t = hlsrec_engine::config::DEFAULT_ERROR_BUDGET)]
    pub error_budget: u32,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}
