// HLS playlist parsing: entry document, media playlist snapshot and segment URI resolution.
//
// Only the tags the recorder acts on are interpreted; every other `#` line is skipped.

use tracing::{debug, trace};
use url::Url;

use crate::HlsRecorderError;

const TAG_MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE";
const TAG_TARGET_DURATION: &str = "#EXT-X-TARGETDURATION";
const TAG_INF: &str = "#EXTINF";
const TAG_ENDLIST: &str = "#EXT-X-ENDLIST";

/// One downloadable media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    /// Seconds, from the preceding `#EXTINF`
    pub duration: f64,
    /// Absolute after [`resolve_uris`]; as written in the playlist before.
    pub uri: String,
}

/// One parsed instance of the media playlist. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSnapshot {
    pub media_sequence: u64,
    /// Seconds, from `#EXT-X-TARGETDURATION`
    pub target_duration: u64,
    pub end_list: bool,
    pub segments: Vec<Segment>,
}

fn tag_value(line: &str) -> Result<&str, HlsRecorderError> {
    line.split_once(':')
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| HlsRecorderError::playlist(format!("invalid playlist, {line}: missing value")))
}

fn parse_integer(line: &str) -> Result<u64, HlsRecorderError> {
    let value = tag_value(line)?;
    value
        .parse::<u64>()
        .map_err(|e| HlsRecorderError::playlist(format!("invalid playlist, {line}: {e}")))
}

fn parse_inf_duration(line: &str) -> Result<f64, HlsRecorderError> {
    let value = tag_value(line)?;
    // The title after the comma is accepted but not kept.
    let (duration, _title) = value.split_once(',').ok_or_else(|| {
        HlsRecorderError::playlist(format!("invalid playlist, {line}: missing title separator"))
    })?;
    let duration = duration
        .trim()
        .parse::<f64>()
        .map_err(|e| HlsRecorderError::playlist(format!("invalid playlist, {line}: {e}")))?;
    if !duration.is_finite() || duration < 0.0 {
        return Err(HlsRecorderError::playlist(format!(
            "invalid playlist, {line}: duration out of range"
        )));
    }
    Ok(duration)
}

/// Name of the tag on a `#` line, without its value.
fn tag_name(line: &str) -> &str {
    line.split_once(':').map_or(line, |(name, _)| name)
}

/// Reads the entry document and returns the media playlist URL it points to:
/// the last line that is neither blank nor a `#` line, resolved against
/// `entry_url` when relative.
pub fn parse_initial(content: &str, entry_url: &Url) -> Result<Url, HlsRecorderError> {
    let target = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .last()
        .ok_or_else(|| HlsRecorderError::configuration("playlist uri is not found"))?;

    let url = entry_url
        .join(target)
        .map_err(|e| HlsRecorderError::invalid_url(target, e))?;
    debug!(entry = %entry_url, playlist = %url, "Resolved media playlist URL");
    Ok(url)
}

/// Parses a media playlist in a single forward scan.
pub fn parse_media(content: &str) -> Result<PlaylistSnapshot, HlsRecorderError> {
    let mut media_sequence = 0u64;
    let mut target_duration = 0u64;
    // `None` once the sequence space is used up.
    let mut next_sequence = Some(0u64);
    let mut segment_duration = 0.0f64;
    let mut end_list = false;
    let mut segments = Vec::with_capacity(10);

    for line in content.lines().map(str::trim) {
        trace!(line, "playlist line");
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('#') {
            let sequence = next_sequence.ok_or_else(|| {
                HlsRecorderError::playlist(format!(
                    "invalid playlist, {line}: media sequence number overflows"
                ))
            })?;
            segments.push(Segment {
                sequence,
                duration: segment_duration,
                uri: line.to_string(),
            });
            next_sequence = sequence.checked_add(1);
            continue;
        }
        match tag_name(line) {
            TAG_MEDIA_SEQUENCE => {
                media_sequence = parse_integer(line)?;
                next_sequence = Some(media_sequence);
            }
            TAG_TARGET_DURATION => {
                target_duration = parse_integer(line)?;
            }
            TAG_INF => {
                segment_duration = parse_inf_duration(line)?;
            }
            TAG_ENDLIST => {
                end_list = true;
                break;
            }
            _ => {}
        }
    }

    if segments.is_empty() {
        return Err(HlsRecorderError::playlist("no segment"));
    }

    Ok(PlaylistSnapshot {
        media_sequence,
        target_duration,
        end_list,
        segments,
    })
}

/// Resolves `reference` as a sibling of `base`: the last path component of
/// `base` is replaced by the reference path. A reference query replaces the
/// base query; otherwise the base query is kept.
pub fn resolve_sibling(base: &Url, reference: &str) -> Url {
    let reference = reference.split('#').next().unwrap_or_default();
    let (path, query) = match reference.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (reference, None),
    };

    let mut resolved = base.clone();
    if path.starts_with('/') {
        resolved.set_path(path);
    } else {
        let base_path = base.path();
        let directory = base_path
            .rfind('/')
            .map_or("/", |idx| &base_path[..=idx]);
        resolved.set_path(&format!("{directory}{path}"));
    }
    if query.is_some() {
        resolved.set_query(query);
    }
    resolved.set_fragment(None);
    resolved
}

/// Rewrites every relative segment URI of `snapshot` against the playlist URL.
/// Absolute URIs are left untouched.
pub fn resolve_uris(snapshot: &mut PlaylistSnapshot, playlist_url: &Url) {
    for segment in &mut snapshot.segments {
        match Url::parse(&segment.uri) {
            Ok(_) => {}
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let resolved = resolve_sibling(playlist_url, &segment.uri);
                trace!("Resolved URI: {} + {} -> {}", playlist_url, segment.uri, resolved);
                segment.uri = resolved.into();
            }
            Err(e) => {
                // Left as-is; the worker reports it when it fails to fetch.
                debug!(uri = %segment.uri, error = %e, "Segment URI is not resolvable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-MEDIA-SEQUENCE:5
#EXT-X-TARGETDURATION:6
#EXTINF:5.005,
seg5.ts
#EXTINF:4.5,live
seg6.ts
";

    #[test]
    fn parses_sequence_target_and_segments() {
        let snapshot = parse_media(LIVE_PLAYLIST).unwrap();
        assert_eq!(snapshot.media_sequence, 5);
        assert_eq!(snapshot.target_duration, 6);
        assert!(!snapshot.end_list);
        assert_eq!(snapshot.segments.len(), 2);
        assert_eq!(snapshot.segments[0].sequence, 5);
        assert_eq!(snapshot.segments[0].duration, 5.005);
        assert_eq!(snapshot.segments[0].uri, "seg5.ts");
        assert_eq!(snapshot.segments[1].sequence, 6);
        assert_eq!(snapshot.segments[1].duration, 4.5);
    }

    #[test]
    fn zero_segments_is_a_parse_failure() {
        let content = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:1\n#EXT-X-TARGETDURATION:2\n";
        let err = parse_media(content).unwrap_err();
        assert!(matches!(err, HlsRecorderError::Playlist { .. }));
    }

    #[test]
    fn malformed_directives_fail() {
        for content in [
            "#EXT-X-MEDIA-SEQUENCE:abc\nseg.ts\n",
            "#EXT-X-MEDIA-SEQUENCE\nseg.ts\n",
            "#EXT-X-MEDIA-SEQUENCE:-1\nseg.ts\n",
            "#EXT-X-TARGETDURATION:6.5\nseg.ts\n",
            "#EXTINF:abc,\nseg.ts\n",
            "#EXTINF:4.0\nseg.ts\n",
        ] {
            assert!(parse_media(content).is_err(), "accepted: {content:?}");
        }
    }

    #[test]
    fn last_representable_sequence_is_accepted() {
        let content = "#EXT-X-MEDIA-SEQUENCE:18446744073709551615\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\nlast.ts\n";
        let snapshot = parse_media(content).unwrap();
        assert_eq!(snapshot.media_sequence, u64::MAX);
        assert_eq!(snapshot.segments.len(), 1);
        assert_eq!(snapshot.segments[0].sequence, u64::MAX);
    }

    #[test]
    fn sequence_past_u64_max_fails() {
        let content = "#EXT-X-MEDIA-SEQUENCE:18446744073709551615\n#EXTINF:2.0,\nlast.ts\n#EXTINF:2.0,\nnext.ts\n";
        let err = parse_media(content).unwrap_err();
        assert!(matches!(err, HlsRecorderError::Playlist { .. }), "{err:?}");
    }

    #[test]
    fn endlist_stops_the_scan() {
        let content = "#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\na.ts\n#EXT-X-ENDLIST\n#EXTINF:2.0,\nb.ts\n";
        let snapshot = parse_media(content).unwrap();
        assert!(snapshot.end_list);
        assert_eq!(snapshot.segments.len(), 1);
        assert_eq!(snapshot.segments[0].uri, "a.ts");
    }

    #[test]
    fn unknown_tags_and_blank_lines_are_ignored() {
        let content = "#EXTM3U\r\n#EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00Z\r\n\r\n#EXTINF:1.0,\r\nx.ts\r\n";
        let snapshot = parse_media(content).unwrap();
        assert_eq!(snapshot.media_sequence, 0);
        assert_eq!(snapshot.segments.len(), 1);
        assert_eq!(snapshot.segments[0].sequence, 0);
        assert_eq!(snapshot.segments[0].uri, "x.ts");
    }

    #[test]
    fn initial_takes_last_uri_line() {
        let entry = Url::parse("http://h/entry.m3u8").unwrap();
        let content = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nhttp://h/first.m3u8\n# comment\nhttp://h/live/v1/playlist.m3u8\n";
        let url = parse_initial(content, &entry).unwrap();
        assert_eq!(url.as_str(), "http://h/live/v1/playlist.m3u8");
    }

    #[test]
    fn initial_resolves_relative_target() {
        let entry = Url::parse("http://h/live/entry.m3u8").unwrap();
        let url = parse_initial("#EXTM3U\nv1/playlist.m3u8\n", &entry).unwrap();
        assert_eq!(url.as_str(), "http://h/live/v1/playlist.m3u8");
    }

    #[test]
    fn initial_without_uri_line_fails() {
        let entry = Url::parse("http://h/entry.m3u8").unwrap();
        let err = parse_initial("#EXTM3U\n#EXT-X-VERSION:3\n", &entry).unwrap_err();
        assert!(matches!(err, HlsRecorderError::Configuration { .. }));
    }

    #[test]
    fn relative_segment_becomes_sibling_of_playlist() {
        let base = Url::parse("http://h/live/v1/playlist.m3u8").unwrap();
        assert_eq!(
            resolve_sibling(&base, "seg1.ts").as_str(),
            "http://h/live/v1/seg1.ts"
        );
    }

    #[test]
    fn resolve_uris_keeps_absolute_and_carries_query() {
        let base = Url::parse("http://h/live/v1/playlist.m3u8?auth=abc").unwrap();
        let mut snapshot = parse_media(
            "#EXTINF:1.0,\nseg1.ts\n#EXTINF:1.0,\nhttps://cdn/x/seg2.ts\n#EXTINF:1.0,\nseg3.ts?part=1\n",
        )
        .unwrap();

        resolve_uris(&mut snapshot, &base);

        assert_eq!(snapshot.segments[0].uri, "http://h/live/v1/seg1.ts?auth=abc");
        assert_eq!(snapshot.segments[1].uri, "https://cdn/x/seg2.ts");
        assert_eq!(snapshot.segments[2].uri, "http://h/live/v1/seg3.ts?part=1");
    }

    #[test]
    fn snapshots_compare_structurally() {
        let a = parse_media(LIVE_PLAYLIST).unwrap();
        let b = parse_media(LIVE_PLAYLIST).unwrap();
        assert_eq!(a, b);

        let c = parse_media(&LIVE_PLAYLIST.replace("seg6.ts", "seg6b.ts")).unwrap();
        assert_ne!(a, c);
    }
}
