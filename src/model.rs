//! Value types produced by the parsers and decoders.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Capabilities a vendor's recordings may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Gps,
    Accelerometer,
    Gyroscope,
    Speedometer,
    ParkingMode,
    Voice,
    Adas,
    CloudSync,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Gps => "gps",
            Feature::Accelerometer => "accelerometer",
            Feature::Gyroscope => "gyroscope",
            Feature::Speedometer => "speedometer",
            Feature::ParkingMode => "parking_mode",
            Feature::Voice => "voice",
            Feature::Adas => "adas",
            Feature::CloudSync => "cloud_sync",
        }
    }
}

/// Identity of a vendor parser. Built once per parser instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParserDescriptor {
    /// Stable identifier, e.g. `blackvue`.
    pub vendor_id: &'static str,
    pub display_name: &'static str,
    pub features: BTreeSet<Feature>,
}

impl ParserDescriptor {
    pub fn new(
        vendor_id: &'static str,
        display_name: &'static str,
        features: impl IntoIterator<Item = Feature>,
    ) -> Self {
        Self {
            vendor_id,
            display_name,
            features: features.into_iter().collect(),
        }
    }
}

/// Which physical camera produced a file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Front,
    Rear,
    Left,
    Right,
    Interior,
    #[default]
    Unknown,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Front => "front",
            Channel::Rear => "rear",
            Channel::Left => "left",
            Channel::Right => "right",
            Channel::Interior => "interior",
            Channel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a recording segment exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Normal,
    Impact,
    Parking,
    Manual,
    Emergency,
    #[default]
    Unknown,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Normal => "normal",
            Category::Impact => "impact",
            Category::Parking => "parking",
            Category::Manual => "manual",
            Category::Emergency => "emergency",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one recorded file, derived from its name (plus its size on disk).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedFileInfo {
    pub path: PathBuf,
    pub timestamp: DateTime<FixedOffset>,
    pub channel: Channel,
    pub category: Category,
    pub size_bytes: u64,
    /// Shared by every channel file recorded at the same instant.
    pub base_id: String,
}

/// One position fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub timestamp: DateTime<FixedOffset>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    pub satellites: Option<u32>,
}

/// One accelerometer reading, in g.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccelerationSample {
    pub timestamp: DateTime<FixedOffset>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// All channel files of one recording instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingEvent {
    pub base_id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub category: Category,
    pub files: BTreeMap<Channel, PathBuf>,
}

/// Group parsed files by base identifier, ordered by timestamp.
///
/// The first file seen for a base id fixes the event's timestamp and category; a later file for
/// an already-present channel replaces the earlier path.
pub fn group_by_event<'a>(infos: impl IntoIterator<Item = &'a ParsedFileInfo>) -> Vec<RecordingEvent> {
    let mut events: BTreeMap<String, RecordingEvent> = BTreeMap::new();
    for info in infos {
        events
            .entry(info.base_id.clone())
            .or_insert_with(|| RecordingEvent {
                base_id: info.base_id.clone(),
                timestamp: info.timestamp,
                category: info.category,
                files: BTreeMap::new(),
            })
            .files
            .insert(info.channel, info.path.clone());
    }

    let mut out: Vec<RecordingEvent> = events.into_values().collect();
    out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.base_id.cmp(&b.base_id)));
    out
}
