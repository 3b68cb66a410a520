use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::config::Config;
use crate::mp4::probe_data_streams;
use crate::nmea::find_sentence_start;
use crate::parser::StreamSelector;
use crate::Error;

/// Copies one embedded stream out of a container, byte for byte.
///
/// The production implementation shells out to ffmpeg; tests substitute canned bytes.
pub trait Demuxer: Send + Sync {
    fn demux(&self, path: &Path, stream_index: usize) -> Result<Vec<u8>, Error>;
}

/// Runs `ffmpeg -i <path> -map 0:<index> -c copy -f data -` and captures stdout.
///
/// Blocks until the process exits. There is no timeout, so callers that fan out over many files
/// should bound their own concurrency.
#[derive(Debug, Clone)]
pub struct FfmpegDemuxer {
    program: String,
}

impl FfmpegDemuxer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegDemuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Demuxer for FfmpegDemuxer {
    fn demux(&self, path: &Path, stream_index: usize) -> Result<Vec<u8>, Error> {
        let failed = |reason: String| Error::MetadataExtraction {
            path: path.to_path_buf(),
            reason,
        };

        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-nostdin", "-i"])
            .arg(path)
            .arg("-map")
            .arg(format!("0:{stream_index}"))
            .args(["-c", "copy", "-f", "data", "-"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| failed(format!("failed to launch {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(failed(format!("{} exited with {}", self.program, output.status)));
        }
        if output.stdout.is_empty() {
            return Err(failed(format!("stream {stream_index} is empty")));
        }
        Ok(output.stdout)
    }
}

/// Pulls the embedded data stream out of a recording and splits it into clean text records.
#[derive(Clone)]
pub struct MetadataStreamExtractor {
    demuxer: Arc<dyn Demuxer>,
}

impl std::fmt::Debug for MetadataStreamExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStreamExtractor").finish_non_exhaustive()
    }
}

impl MetadataStreamExtractor {
    pub fn new(demuxer: Arc<dyn Demuxer>) -> Self {
        Self { demuxer }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(FfmpegDemuxer::new(config.demuxer.clone())))
    }

    /// Resolve a selector to a concrete stream index.
    pub fn resolve_stream(&self, path: &Path, selector: StreamSelector) -> Result<usize, Error> {
        match selector {
            StreamSelector::Index(index) => Ok(index),
            StreamSelector::FirstData => probe_data_streams(path)?.first().copied().ok_or_else(|| {
                Error::MetadataExtraction {
                    path: path.to_path_buf(),
                    reason: "no data stream in container".to_string(),
                }
            }),
        }
    }

    /// Raw bytes of the selected stream, with the failure reason.
    pub fn try_extract_raw(&self, path: &Path, selector: StreamSelector) -> Result<Vec<u8>, Error> {
        let index = self.resolve_stream(path, selector)?;
        self.demuxer.demux(path, index)
    }

    /// Raw bytes of the selected stream, or `None` when nothing could be extracted.
    pub fn extract_raw(&self, path: &Path, selector: StreamSelector) -> Option<Vec<u8>> {
        match self.try_extract_raw(path, selector) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!("no metadata for {}: {err}", path.display());
                None
            }
        }
    }

    /// Cleaned text records of the selected stream. Empty when extraction fails.
    pub fn extract_records(&self, path: &Path, selector: StreamSelector) -> Vec<String> {
        self.extract_raw(path, selector)
            .map(|bytes| split_records(&bytes))
            .unwrap_or_default()
    }
}

/// Split a demuxed buffer into records.
///
/// Carriage return is the separator when it produces more than one non-blank piece, line
/// feed otherwise. Each record keeps only printable ASCII, is trimmed, and survives only if it holds a
/// position sentence or at least three comma-separated fields.
pub fn split_records(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);

    let by_cr: Vec<&str> = text.split('\r').collect();
    let non_blank = by_cr.iter().filter(|s| !s.trim().is_empty()).count();
    let candidates = if non_blank > 1 {
        by_cr
    } else {
        text.split('\n').collect()
    };

    candidates
        .into_iter()
        .filter_map(clean_record)
        .collect()
}

fn clean_record(raw: &str) -> Option<String> {
    let printable: String = raw.chars().filter(|c| matches!(c, ' '..='~')).collect();
    let record = printable.trim();
    if record.is_empty() {
        return None;
    }
    if find_sentence_start(record).is_some() || record.split(',').count() >= 3 {
        Some(record.to_string())
    } else {
        None
    }
}
