//! Decoding of extracted telemetry into GPS fixes and accelerometer samples.

use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::model::{AccelerationSample, GpsFix};
use crate::nmea::{find_sentence_start, SentenceParser};

/// Scale of the 16-bit encoding: 16384 units per g (±2g full range).
pub const INT16_UNITS_PER_G: f64 = 16384.0;

/// Fixed-width binary accelerometer layouts. Three little-endian axis values per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryFormat {
    Float32,
    Int16,
}

impl BinaryFormat {
    pub fn record_size(self) -> usize {
        match self {
            BinaryFormat::Float32 => 12,
            BinaryFormat::Int16 => 6,
        }
    }
}

/// How a vendor stores accelerometer data in its data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelEncoding {
    Float32,
    Int16,
    Csv,
    /// Text is decoded as CSV, anything else goes through [`SensorStreamDecoder::detect_binary_format`].
    Auto,
}

/// Stateless decoder; only carries the sample rate and the g-force plausibility bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorStreamDecoder {
    sample_rate_hz: f64,
    max_g_force: f32,
}

impl Default for SensorStreamDecoder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SensorStreamDecoder {
    pub fn new(sample_rate_hz: f64, max_g_force: f32) -> Self {
        Self {
            sample_rate_hz,
            max_g_force,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sample_rate_hz, config.max_g_force)
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Hand every record that carries a position sentence to `parser`.
    ///
    /// Consecutive fixes with the same timestamp (an RMC/GGA pair) are merged into one.
    pub fn decode_gps<S: AsRef<str>>(
        &self,
        records: &[S],
        base: DateTime<FixedOffset>,
        parser: &dyn SentenceParser,
    ) -> Vec<GpsFix> {
        let mut out: Vec<GpsFix> = Vec::new();
        for record in records {
            let record = record.as_ref();
            let Some(start) = find_sentence_start(record) else {
                continue;
            };
            for fix in parser.parse(record[start..].as_bytes(), base) {
                push_merged(&mut out, fix);
            }
        }
        out
    }

    /// Decode fixed-width records. A trailing partial record is ignored.
    pub fn decode_binary(
        &self,
        buf: &[u8],
        format: BinaryFormat,
        base: DateTime<FixedOffset>,
    ) -> Vec<AccelerationSample> {
        buf.chunks_exact(format.record_size())
            .enumerate()
            .map(|(i, rec)| {
                let [x, y, z] = match format {
                    BinaryFormat::Float32 => [0usize, 4, 8].map(|o| {
                        f32::from_le_bytes([rec[o], rec[o + 1], rec[o + 2], rec[o + 3]]) as f64
                    }),
                    BinaryFormat::Int16 => [0usize, 2, 4].map(|o| {
                        i16::from_le_bytes([rec[o], rec[o + 1]]) as f64 / INT16_UNITS_PER_G
                    }),
                };
                AccelerationSample {
                    timestamp: base + self.index_offset(i),
                    x,
                    y,
                    z,
                }
            })
            .collect()
    }

    /// Decode `time,x,y,z` or `x,y,z` lines.
    ///
    /// A line whose first field starts with `time` is a header. A numeric time field is an
    /// offset in seconds from `base`; otherwise the line's index over the sample rate is used.
    /// Lines that fail to parse are skipped individually.
    pub fn decode_csv<'a>(
        &self,
        lines: impl IntoIterator<Item = &'a str>,
        base: DateTime<FixedOffset>,
    ) -> Vec<AccelerationSample> {
        let mut out = Vec::new();
        for (index, line) in lines.into_iter().enumerate() {
            let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
            // Covers both `timestamp` and `time` headers.
            if fields[0].to_ascii_lowercase().starts_with("time") {
                continue;
            }

            let (time, axes) = match fields.len() {
                3 => (None, &fields[..]),
                n if n >= 4 => (Some(fields[0]), &fields[1..4]),
                _ => continue,
            };
            let Some([x, y, z]) = parse_axes(axes) else {
                tracing::debug!("skipping malformed accelerometer line {index}: {line:?}");
                continue;
            };

            let offset = match time.and_then(|t| t.parse::<f64>().ok()) {
                Some(secs) if secs.is_finite() => seconds(secs),
                _ => self.index_offset(index),
            };
            out.push(AccelerationSample {
                timestamp: base + offset,
                x,
                y,
                z,
            });
        }
        out
    }

    /// Guess the binary layout from the first record.
    ///
    /// Read as a float triplet, a plausible g-force on every axis means `Float32`; anything else
    /// means `Int16`. Buffers shorter than one float record cannot be classified.
    pub fn detect_binary_format(&self, buf: &[u8]) -> Option<BinaryFormat> {
        let rec = buf.get(..12)?;
        let plausible = [0usize, 4, 8].iter().all(|&o| {
            let v = f32::from_le_bytes([rec[o], rec[o + 1], rec[o + 2], rec[o + 3]]);
            v.is_finite() && v.abs() <= self.max_g_force
        });
        Some(if plausible {
            BinaryFormat::Float32
        } else {
            BinaryFormat::Int16
        })
    }

    /// Decode a raw data-stream buffer according to the vendor's encoding.
    pub fn decode_acceleration(
        &self,
        buf: &[u8],
        encoding: AccelEncoding,
        base: DateTime<FixedOffset>,
    ) -> Vec<AccelerationSample> {
        match encoding {
            AccelEncoding::Float32 => self.decode_binary(buf, BinaryFormat::Float32, base),
            AccelEncoding::Int16 => self.decode_binary(buf, BinaryFormat::Int16, base),
            AccelEncoding::Csv => self.decode_csv_bytes(buf, base),
            AccelEncoding::Auto if looks_like_text(buf) => self.decode_csv_bytes(buf, base),
            AccelEncoding::Auto => match self.detect_binary_format(buf) {
                Some(format) => {
                    tracing::debug!("accelerometer stream classified as {format:?}");
                    self.decode_binary(buf, format, base)
                }
                None => Vec::new(),
            },
        }
    }

    fn decode_csv_bytes(&self, buf: &[u8], base: DateTime<FixedOffset>) -> Vec<AccelerationSample> {
        let text = String::from_utf8_lossy(buf);
        let lines = text
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|l| !l.is_empty());
        self.decode_csv(lines, base)
    }

    fn index_offset(&self, index: usize) -> TimeDelta {
        if self.sample_rate_hz > 0.0 {
            seconds(index as f64 / self.sample_rate_hz)
        } else {
            TimeDelta::zero()
        }
    }
}

fn seconds(secs: f64) -> TimeDelta {
    TimeDelta::nanoseconds((secs * 1e9).round() as i64)
}

fn parse_axes(fields: &[&str]) -> Option<[f64; 3]> {
    let mut out = [0.0; 3];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field.parse().ok().filter(|v: &f64| v.is_finite())?;
    }
    Some(out)
}

// Printable ASCII plus line breaks, with at least one field separator.
fn looks_like_text(buf: &[u8]) -> bool {
    !buf.is_empty()
        && buf.contains(&b',')
        && buf
            .iter()
            .all(|&b| matches!(b, b' '..=b'~' | b'\r' | b'\n' | b'\t'))
}

fn push_merged(out: &mut Vec<GpsFix>, fix: GpsFix) {
    if let Some(last) = out.last_mut() {
        if last.timestamp == fix.timestamp {
            last.altitude_m = last.altitude_m.or(fix.altitude_m);
            last.speed_kmh = last.speed_kmh.or(fix.speed_kmh);
            last.heading_deg = last.heading_deg.or(fix.heading_deg);
            last.satellites = last.satellites.or(fix.satellites);
            return;
        }
    }
    out.push(fix);
}
