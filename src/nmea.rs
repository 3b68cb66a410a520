//! NMEA 0183 sentence parsing.
//!
//! Only the sentences that carry a position are understood: RMC and GGA, from either a GPS-only
//! (`$GP`) or multi-constellation (`$GN`) talker.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::model::GpsFix;

/// Prefixes that mark a position sentence inside an extracted record.
pub const GPS_SENTENCE_MARKERS: &[&str] = &["$GPRMC", "$GNRMC", "$GPGGA", "$GNGGA"];

/// Byte offset of the earliest position-sentence marker in `record`.
pub fn find_sentence_start(record: &str) -> Option<usize> {
    GPS_SENTENCE_MARKERS
        .iter()
        .filter_map(|m| record.find(m))
        .min()
}

/// Turns NMEA text into fixes.
///
/// `base` is the recording start; it supplies the date when a sentence has none, and its offset
/// is the one returned timestamps are expressed in.
pub trait SentenceParser: Send + Sync {
    fn parse(&self, ascii: &[u8], base: DateTime<FixedOffset>) -> Vec<GpsFix>;
}

/// RMC/GGA parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct NmeaParser;

impl SentenceParser for NmeaParser {
    fn parse(&self, ascii: &[u8], base: DateTime<FixedOffset>) -> Vec<GpsFix> {
        let text = String::from_utf8_lossy(ascii);
        text.split('$')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| parse_sentence(s, base))
            .collect()
    }
}

fn parse_sentence(sentence: &str, base: DateTime<FixedOffset>) -> Option<GpsFix> {
    let body = verified_body(sentence)?;
    let fields: Vec<&str> = body.split(',').collect();
    let kind = fields.first()?;

    if kind.ends_with("RMC") {
        parse_rmc(&fields, base)
    } else if kind.ends_with("GGA") {
        parse_gga(&fields, base)
    } else {
        None
    }
}

// Strip and check the `*hh` checksum when present.
fn verified_body(sentence: &str) -> Option<&str> {
    let Some((body, checksum)) = sentence.split_once('*') else {
        return Some(sentence);
    };
    let expected = u8::from_str_radix(checksum.get(..2)?, 16).ok()?;
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
    if actual != expected {
        tracing::debug!("nmea checksum mismatch: {sentence:?}");
        return None;
    }
    Some(body)
}

// $GPRMC,hhmmss.ss,A,llll.ll,a,yyyyy.yy,a,x.x,x.x,ddmmyy,...
fn parse_rmc(f: &[&str], base: DateTime<FixedOffset>) -> Option<GpsFix> {
    if f.get(2) != Some(&"A") {
        return None;
    }
    let latitude = coordinate(f.get(3)?, f.get(4)?)?;
    let longitude = coordinate(f.get(5)?, f.get(6)?)?;
    let date = f.get(9).and_then(|d| NaiveDate::parse_from_str(d, "%d%m%y").ok());

    Some(GpsFix {
        timestamp: fix_time(f.get(1).copied(), date, base),
        latitude,
        longitude,
        altitude_m: None,
        speed_kmh: number(f.get(7)).map(|knots| knots * 1.852),
        heading_deg: number(f.get(8)),
        satellites: None,
    })
}

// $GPGGA,hhmmss.ss,llll.ll,a,yyyyy.yy,a,q,nn,h.h,alt,M,...
fn parse_gga(f: &[&str], base: DateTime<FixedOffset>) -> Option<GpsFix> {
    let quality: u32 = f.get(6)?.parse().ok()?;
    if quality == 0 {
        return None;
    }
    let latitude = coordinate(f.get(2)?, f.get(3)?)?;
    let longitude = coordinate(f.get(4)?, f.get(5)?)?;

    Some(GpsFix {
        timestamp: fix_time(f.get(1).copied(), None, base),
        latitude,
        longitude,
        altitude_m: number(f.get(9)),
        speed_kmh: None,
        heading_deg: None,
        satellites: f.get(7).and_then(|s| s.parse().ok()),
    })
}

fn number(field: Option<&&str>) -> Option<f64> {
    field.and_then(|s| s.parse().ok())
}

// ddmm.mmmm / dddmm.mmmm plus hemisphere.
fn coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    let raw: f64 = value.parse().ok()?;
    let degrees = (raw / 100.0).trunc();
    let decimal = degrees + (raw - degrees * 100.0) / 60.0;
    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

// NMEA times are UTC; fall back to the recording start for whatever is missing.
fn fix_time(
    time: Option<&str>,
    date: Option<NaiveDate>,
    base: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    let base_utc = base.with_timezone(&Utc);
    let Some(time) = time.and_then(|t| NaiveTime::parse_from_str(t, "%H%M%S%.f").ok()) else {
        return base;
    };
    let date = date.unwrap_or_else(|| base_utc.date_naive());
    Utc.from_utc_datetime(&date.and_time(time))
        .with_timezone(base.offset())
}
