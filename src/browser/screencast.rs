//! ffconcat manifests for screencast frame dumps.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Shortest display time given to a frame
const MIN_FRAME_SECS: f64 = 0.001;

/// Build an ffconcat manifest where each frame is shown until the next one
/// arrived. The last frame lasts until `stopped` and is listed twice, since
/// the concat demuxer ignores the duration of the final entry.
pub fn concat_manifest(frames: &[(PathBuf, Instant)], stopped: Instant) -> String {
    let mut out = String::from("ffconcat version 1.0\n");

    for (i, (path, arrived)) in frames.iter().enumerate() {
        let until = frames.get(i + 1).map(|(_, next)| *next).unwrap_or(stopped);
        let secs = until
            .saturating_duration_since(*arrived)
            .as_secs_f64()
            .max(MIN_FRAME_SECS);
        let _ = writeln!(out, "file '{}'", file_name(path));
        let _ = writeln!(out, "duration {:.3}", secs);
    }

    if let Some((last, _)) = frames.last() {
        let _ = writeln!(out, "file '{}'", file_name(last));
    }
    out
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().replace('\'', "'\\''"))
        .unwrap_or_default()
}
