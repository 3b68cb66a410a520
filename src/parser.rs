//! The capability every vendor parser provides, plus the pieces vendors share.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::config::Config;
use crate::decode::{AccelEncoding, SensorStreamDecoder};
use crate::extract::MetadataStreamExtractor;
use crate::model::{AccelerationSample, Category, Channel, Feature, GpsFix, ParsedFileInfo, ParserDescriptor};
use crate::nmea::{NmeaParser, SentenceParser};
use crate::Error;

/// Which embedded stream carries a piece of telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    /// A fixed container stream index.
    Index(usize),
    /// The first non-audio/video track found by probing the container.
    FirstData,
}

/// Where a vendor keeps its telemetry and how accelerometer data is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataLayout {
    pub gps_stream: StreamSelector,
    pub accel_stream: StreamSelector,
    pub accel_encoding: AccelEncoding,
}

/// Extraction + decoding shared by all parsers.
///
/// Every call spawns one demux process and blocks on it.
#[derive(Clone)]
pub struct Telemetry {
    extractor: MetadataStreamExtractor,
    decoder: SensorStreamDecoder,
    sentences: Arc<dyn SentenceParser>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("extractor", &self.extractor)
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn new(
        extractor: MetadataStreamExtractor,
        decoder: SensorStreamDecoder,
        sentences: Arc<dyn SentenceParser>,
    ) -> Self {
        Self {
            extractor,
            decoder,
            sentences,
        }
    }

    /// ffmpeg demuxer, configured decoder and the built-in NMEA parser.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MetadataStreamExtractor::from_config(config),
            SensorStreamDecoder::from_config(config),
            Arc::new(NmeaParser),
        )
    }

    pub fn gps(&self, path: &Path, base: DateTime<FixedOffset>, layout: &MetadataLayout) -> Vec<GpsFix> {
        let records = self.extractor.extract_records(path, layout.gps_stream);
        self.decoder.decode_gps(&records, base, self.sentences.as_ref())
    }

    pub fn acceleration(
        &self,
        path: &Path,
        base: DateTime<FixedOffset>,
        layout: &MetadataLayout,
    ) -> Vec<AccelerationSample> {
        match self.extractor.extract_raw(path, layout.accel_stream) {
            Some(buf) => self.decoder.decode_acceleration(&buf, layout.accel_encoding, base),
            None => Vec::new(),
        }
    }
}

/// One vendor's filename grammar and metadata layout.
///
/// `matches` runs for every sampled file during detection and must stay cheap and pure.
/// Everything else fails softly: `None` or an empty `Vec`, never a panic.
pub trait VendorParser: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &ParserDescriptor;

    fn matches(&self, filename: &str) -> bool;

    /// Parse identity from the filename, reporting why it failed.
    fn try_parse_file(&self, path: &Path) -> Result<ParsedFileInfo, Error>;

    fn layout(&self) -> &MetadataLayout;

    fn telemetry(&self) -> &Telemetry;

    fn vendor_id(&self) -> &'static str {
        self.descriptor().vendor_id
    }

    fn supported_features(&self) -> &BTreeSet<Feature> {
        &self.descriptor().features
    }

    fn parse_file(&self, path: &Path) -> Option<ParsedFileInfo> {
        match self.try_parse_file(path) {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::debug!("{}: {err}", self.vendor_id());
                None
            }
        }
    }

    /// Decode GPS fixes from the recording's data stream. Slow: spawns the demuxer.
    fn extract_gps(&self, path: &Path) -> Vec<GpsFix> {
        if !self.supported_features().contains(&Feature::Gps) {
            return Vec::new();
        }
        let Some(info) = self.parse_file(path) else {
            return Vec::new();
        };
        self.telemetry().gps(path, info.timestamp, self.layout())
    }

    /// Decode accelerometer samples from the recording's data stream. Slow: spawns the demuxer.
    fn extract_acceleration(&self, path: &Path) -> Vec<AccelerationSample> {
        if !self.supported_features().contains(&Feature::Accelerometer) {
            return Vec::new();
        }
        let Some(info) = self.parse_file(path) else {
            return Vec::new();
        };
        self.telemetry().acceleration(path, info.timestamp, self.layout())
    }
}

/// Final path component as UTF-8, if any.
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Interpret naive date/time text in `tz`.
pub fn local_timestamp(
    text: &str,
    format: &str,
    tz: FixedOffset,
) -> Result<DateTime<FixedOffset>, Error> {
    let invalid = || Error::InvalidTimestamp {
        value: text.to_string(),
    };
    let naive = NaiveDateTime::parse_from_str(text, format).map_err(|_| invalid())?;
    tz.from_local_datetime(&naive).single().ok_or_else(invalid)
}

/// Size of the file on disk.
pub fn file_size(path: &Path) -> Result<u64, Error> {
    Ok(std::fs::metadata(path)?.len())
}

/// Category from the directories a recording lives in, nearest first.
///
/// A directory whose whole name is one of the known folder keywords decides; case does not
/// matter.
pub fn category_from_path(path: &Path) -> Category {
    const FOLDERS: &[(&str, Category)] = &[
        ("normal", Category::Normal),
        ("event", Category::Impact),
        ("impact", Category::Impact),
        ("parking", Category::Parking),
        ("park", Category::Parking),
        ("manual", Category::Manual),
        ("emergency", Category::Emergency),
        ("sos", Category::Emergency),
    ];

    let Some(parent) = path.parent() else {
        return Category::Unknown;
    };
    parent
        .components()
        .rev()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .find_map(|segment| {
            FOLDERS
                .iter()
                .find(|(key, _)| segment.eq_ignore_ascii_case(key))
                .map(|&(_, category)| category)
        })
        .unwrap_or(Category::Unknown)
}

/// Substring heuristic for channel codes outside a vendor's own table.
///
/// Whole words are checked before single letters so `RIGHT` is not read as rear.
pub fn channel_from_code_fallback(code: &str) -> Channel {
    let code = code.to_ascii_uppercase();
    const WORDS: &[(&str, Channel)] = &[
        ("FRONT", Channel::Front),
        ("REAR", Channel::Rear),
        ("BACK", Channel::Rear),
        ("RIGHT", Channel::Right),
        ("LEFT", Channel::Left),
        ("INTERIOR", Channel::Interior),
        ("CABIN", Channel::Interior),
        ("INSIDE", Channel::Interior),
    ];
    if let Some(&(_, channel)) = WORDS.iter().find(|(w, _)| code.contains(w)) {
        return channel;
    }
    match code.chars().last() {
        Some('F') => Channel::Front,
        Some('R') => Channel::Rear,
        Some('L') => Channel::Left,
        Some('I') => Channel::Interior,
        _ => Channel::Unknown,
    }
}
