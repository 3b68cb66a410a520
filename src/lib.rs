//! `dashcam-meta` identifies which dashcam vendor produced a set of recordings and pulls
//! identity and telemetry out of them.
//!
//! This crate provides:
//! - Per-vendor filename parsers behind the [`VendorParser`] trait (timestamp, camera channel,
//!   recording category, and a base id shared by all channels of one event).
//! - A [`VendorDetector`] that samples a directory, scores every registered parser and caches
//!   the winner per directory.
//! - Telemetry extraction: the embedded data stream is copied out of the container by an
//!   external demuxer (ffmpeg by default) and decoded into [`GpsFix`] and
//!   [`AccelerationSample`] values.
//! - A Tokio-based async wrapper (enabled by default) that runs the blocking work on
//!   `spawn_blocking`.
//!
//! ## Quick start
//! - Build a detector with [`VendorDetector::with_default_parsers`], call
//!   [`VendorDetector::detect_directory`], then use the returned parser's
//!   [`VendorParser::parse_file`] / [`VendorParser::extract_gps`].
//!
//! ## Failure model
//! Grammar mismatches, missing files, absent demuxers and malformed records produce `None` or an
//! empty `Vec`, never a panic. The `try_*` methods return a labeled [`Error`] instead.
//!
//! ## Features
//! - `async` (default): enables Tokio stream helpers.

// Compiles a literal pattern once and hands out the cached `Regex`.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

pub mod config;
pub mod error;
pub mod model;

mod mp4;

pub mod decode;
pub mod detector;
pub mod extract;
pub mod nmea;
pub mod parser;
pub mod vendors;

#[cfg(feature = "async")]
pub mod async_extract;

pub use config::Config;
pub use decode::{AccelEncoding, BinaryFormat, SensorStreamDecoder};
pub use detector::{DetectionResult, VendorDetector};
pub use error::Error;
pub use extract::{Demuxer, FfmpegDemuxer, MetadataStreamExtractor};
pub use model::{
    group_by_event, AccelerationSample, Category, Channel, Feature, GpsFix, ParsedFileInfo,
    ParserDescriptor, RecordingEvent,
};
pub use mp4::probe_data_streams;
pub use nmea::{NmeaParser, SentenceParser};
pub use parser::{MetadataLayout, StreamSelector, Telemetry, VendorParser};

#[cfg(feature = "async")]
pub use async_extract::{acceleration_stream_from_path, detect_directory_async, gps_stream_from_path};
