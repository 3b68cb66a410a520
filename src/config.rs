//! Runtime configuration.
//!
//! Defaults cover every field, so a TOML file only needs the keys it wants to change.

use std::env;
use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Tunables shared by the detector, the stream extractor and the decoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Demultiplexer program (looked up on `PATH` unless absolute).
    pub demuxer: String,
    /// Accelerometer sample rate used to synthesize timestamps.
    pub sample_rate_hz: f64,
    /// Maximum number of video files sampled per directory detection.
    pub sample_cap: usize,
    /// Minimum fraction of sampled files a parser must match.
    pub confidence_threshold: f64,
    /// Offset from UTC applied to timestamps read from filenames.
    pub utc_offset_secs: i32,
    /// Upper bound on plausible g-force when guessing float vs int16 accelerometer data.
    pub max_g_force: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demuxer: "ffmpeg".to_string(),
            sample_rate_hz: 10.0,
            sample_cap: 10,
            confidence_threshold: 0.5,
            utc_offset_secs: 0,
            max_g_force: 20.0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `DASHCAM_META_DEMUXER` and `DASHCAM_META_SAMPLE_RATE` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(demuxer) = env::var("DASHCAM_META_DEMUXER") {
            if !demuxer.trim().is_empty() {
                self.demuxer = demuxer;
            }
        }
        if let Ok(rate) = env::var("DASHCAM_META_SAMPLE_RATE") {
            match rate.trim().parse::<f64>() {
                Ok(r) if r > 0.0 => self.sample_rate_hz = r,
                _ => tracing::warn!("ignoring invalid DASHCAM_META_SAMPLE_RATE={rate:?}"),
            }
        }
        self
    }

    /// The fixed time zone filename timestamps are interpreted in.
    ///
    /// Out-of-range offsets fall back to UTC.
    pub fn time_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or(Utc.fix())
    }
}
