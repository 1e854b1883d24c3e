// Output layout: file naming, staged playlist snapshots and the timing log.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};
use url::Url;

use crate::HlsRecorderError;

pub const TIMING_LOG_FILE: &str = "timing_info.txt";

const STAGING_PREFIX: &str = "playlist";

/// Final path component of `url`.
pub fn url_basename(url: &Url) -> Result<&str, HlsRecorderError> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| HlsRecorderError::naming(url.as_str(), "URL path has no file name"))
}

/// `<dir>/<stem>_<count>.<ext>` for the playlist at `url`, e.g.
/// `live/v1/playlist.m3u8`, `out`, 2 -> `out/playlist_2.m3u8`.
///
/// The file name must contain exactly one `.`.
pub fn playlist_snapshot_path(
    url: &Url,
    output_dir: &Path,
    count: u64,
) -> Result<PathBuf, HlsRecorderError> {
    let basename = url_basename(url)?;
    let parts: Vec<&str> = basename.split('.').collect();
    let [stem, extension] = parts.as_slice() else {
        return Err(HlsRecorderError::naming(
            basename,
            format!("expected exactly one `.`, found {}", parts.len() - 1),
        ));
    };
    Ok(output_dir.join(format!("{stem}_{count}.{extension}")))
}

/// `<dir>/<basename>` for the segment at `url`.
pub fn segment_path(url: &Url, output_dir: &Path) -> Result<PathBuf, HlsRecorderError> {
    Ok(output_dir.join(url_basename(url)?))
}

/// Playlist bytes written to a temporary file next to their final location.
///
/// Dropping a `StagedPlaylist` deletes the temporary file.
#[derive(Debug)]
pub struct StagedPlaylist {
    file: NamedTempFile,
}

impl StagedPlaylist {
    /// Writes `bytes` verbatim into a fresh temporary file inside `output_dir`.
    pub async fn stage(output_dir: &Path, bytes: Bytes) -> Result<Self, HlsRecorderError> {
        let output_dir = output_dir.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Self, HlsRecorderError> {
            let mut file = tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(&output_dir)?;
            file.write_all(&bytes)?;
            file.as_file().sync_all()?;
            trace!(path = %file.path().display(), size = bytes.len(), "Staged playlist");
            Ok(Self { file })
        })
        .await
        .map_err(|e| HlsRecorderError::internal(format!("staging task failed: {e}")))?
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Renames the staged file to `destination`, replacing any existing file.
    pub async fn persist(self, destination: PathBuf) -> Result<PathBuf, HlsRecorderError> {
        tokio::task::spawn_blocking(move || -> Result<PathBuf, HlsRecorderError> {
            self.file
                .persist(&destination)
                .map_err(|e| HlsRecorderError::from(e.error))?;
            debug!(path = %destination.display(), "Saved playlist snapshot");
            Ok(destination)
        })
        .await
        .map_err(|e| HlsRecorderError::internal(format!("persist task failed: {e}")))?
    }
}

/// Appends one line of elapsed milliseconds per playlist fetch.
#[derive(Debug)]
pub struct TimingLog {
    file: File,
    start: Instant,
}

impl TimingLog {
    /// Creates (truncating) `timing_info.txt` in `output_dir`.
    pub async fn create(output_dir: &Path, start: Instant) -> Result<Self, HlsRecorderError> {
        let file = File::create(output_dir.join(TIMING_LOG_FILE)).await?;
        Ok(Self { file, start })
    }

    /// Records the time elapsed since `start` and returns it in milliseconds.
    pub async fn record(&mut self) -> Result<u128, HlsRecorderError> {
        let elapsed_ms = self.start.elapsed().as_millis();
        self.file
            .write_all(format!("{elapsed_ms}\n").as_bytes())
            .await?;
        self.file.flush().await?;
        Ok(elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn snapshot_path_inserts_counter_before_extension() {
        let path = playlist_snapshot_path(
            &url("http://h/live/v1/playlist.m3u8"),
            Path::new("out"),
            2,
        )
        .unwrap();
        assert_eq!(path, Path::new("out").join("playlist_2.m3u8"));
    }

    #[test]
    fn snapshot_path_requires_exactly_one_dot() {
        for name in ["http://h/live/playlist", "http://h/live/a.b.c"] {
            let err = playlist_snapshot_path(&url(name), Path::new("out"), 0).unwrap_err();
            assert!(matches!(err, HlsRecorderError::Naming { .. }), "{name}");
        }
    }

    #[test]
    fn basename_of_bare_host_fails() {
        assert!(url_basename(&url("http://localhost:8080")).is_err());
        assert_eq!(
            url_basename(&url("http://localhost/aaa/playlist.m3u8?x=1")).unwrap(),
            "playlist.m3u8"
        );
    }

    #[test]
    fn segment_path_uses_final_component() {
        let path = segment_path(&url("http://h/aaa/bbb/stream_1.ts"), Path::new("rec")).unwrap();
        assert_eq!(path, Path::new("rec").join("stream_1.ts"));
    }

    #[tokio::test]
    async fn staged_playlist_persists_verbatim() {
        let dir = TempDir::new().unwrap();
        let staged = StagedPlaylist::stage(dir.path(), Bytes::from_static(b"#EXTM3U\nseg.ts\n"))
            .await
            .unwrap();
        let temp_path = staged.path().to_path_buf();
        assert!(temp_path.exists());

        let final_path = staged
            .persist(dir.path().join("playlist_0.m3u8"))
            .await
            .unwrap();
        assert!(!temp_path.exists());
        assert_eq!(std::fs::read(final_path).unwrap(), b"#EXTM3U\nseg.ts\n");
    }

    #[tokio::test]
    async fn dropped_staged_playlist_is_discarded() {
        let dir = TempDir::new().unwrap();
        let staged = StagedPlaylist::stage(dir.path(), Bytes::from_static(b"x"))
            .await
            .unwrap();
        let temp_path = staged.path().to_path_buf();
        drop(staged);
        assert!(!temp_path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn timing_log_appends_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let mut log = TimingLog::create(dir.path(), Instant::now()).await.unwrap();
        let first = log.record().await.unwrap();
        let second = log.record().await.unwrap();
        assert!(second >= first);

        let content = std::fs::read_to_string(dir.path().join(TIMING_LOG_FILE)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(content.ends_with('\n'));
        assert!(lines.iter().all(|l| l.parse::<u128>().is_ok()));
    }
}
