use std::path::Path;

use chrono::FixedOffset;

use crate::decode::AccelEncoding;
use crate::model::{Channel, Feature, ParsedFileInfo, ParserDescriptor};
use crate::parser::{
    category_from_path, channel_from_code_fallback, file_name, file_size, local_timestamp,
    MetadataLayout, StreamSelector, Telemetry, VendorParser,
};
use crate::Error;

/// `20240115_143025_F.mp4`: date, time, channel code letters.
///
/// The filename has no category token, so the category comes from the folder the file is in.
#[derive(Debug)]
pub struct BlackVueParser {
    descriptor: ParserDescriptor,
    layout: MetadataLayout,
    telemetry: Telemetry,
    tz: FixedOffset,
}

impl BlackVueParser {
    pub fn new(telemetry: Telemetry, tz: FixedOffset) -> Self {
        Self {
            descriptor: ParserDescriptor::new(
                "blackvue",
                "BlackVue",
                [
                    Feature::Gps,
                    Feature::Accelerometer,
                    Feature::ParkingMode,
                    Feature::Voice,
                    Feature::CloudSync,
                ],
            ),
            layout: MetadataLayout {
                gps_stream: StreamSelector::FirstData,
                accel_stream: StreamSelector::FirstData,
                accel_encoding: AccelEncoding::Auto,
            },
            telemetry,
            tz,
        }
    }
}

fn grammar() -> &'static regex::Regex {
    regex!(r"^(\d{8})_(\d{6})_([FRLIi]+)\.(\w+)$")
}

fn channel_for_code(code: &str) -> Channel {
    match code {
        "F" => Channel::Front,
        "R" => Channel::Rear,
        "L" => Channel::Left,
        "I" | "i" => Channel::Interior,
        other => channel_from_code_fallback(other),
    }
}

impl VendorParser for BlackVueParser {
    fn descriptor(&self) -> &ParserDescriptor {
        &self.descriptor
    }

    fn matches(&self, filename: &str) -> bool {
        grammar().is_match(filename)
    }

    fn try_parse_file(&self, path: &Path) -> Result<ParsedFileInfo, Error> {
        let unsupported = || Error::UnsupportedFormat {
            path: path.to_path_buf(),
        };
        let name = file_name(path).ok_or_else(unsupported)?;
        let caps = grammar().captures(name).ok_or_else(unsupported)?;
        if caps.len() != 5 {
            return Err(unsupported());
        }
        let (date, time, code) = (&caps[1], &caps[2], &caps[3]);

        let timestamp = local_timestamp(&format!("{date}{time}"), "%Y%m%d%H%M%S", self.tz)?;

        Ok(ParsedFileInfo {
            path: std::path::absolute(path)?,
            timestamp,
            channel: channel_for_code(code),
            category: category_from_path(path),
            size_bytes: file_size(path)?,
            base_id: format!("{date}_{time}"),
        })
    }

    fn layout(&self) -> &MetadataLayout {
        &self.layout
    }

    fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::Category;
    use chrono::{Datelike, TimeZone, Timelike};
    use std::fs;

    fn parser() -> BlackVueParser {
        let config = Config::default();
        BlackVueParser::new(Telemetry::from_config(&config), config.time_zone())
    }

    #[test]
    fn grammar_is_exact() {
        let p = parser();
        assert!(p.matches("20240115_143025_F.mp4"));
        assert!(p.matches("20240115_143025_i.avi"));
        assert!(p.matches("20240115_143025_FR.mp4"));
        assert!(!p.matches("20240115_143025_NF.mp4"));
        assert!(!p.matches("2024011_143025_F.mp4"));
        assert!(!p.matches("20240115-143025_F.mp4"));
        assert!(!p.matches("x20240115_143025_F.mp4"));
        assert!(!p.matches("2025-10-07-09h-11m-09s_F_normal.mp4"));
    }

    #[test]
    fn parses_front_channel_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20240115_143025_F.mp4");
        fs::write(&path, vec![0u8; 1234]).unwrap();

        let info = parser().parse_file(&path).unwrap();
        assert_eq!(info.timestamp.year(), 2024);
        assert_eq!(info.timestamp.month(), 1);
        assert_eq!(info.timestamp.day(), 15);
        assert_eq!(
            (info.timestamp.hour(), info.timestamp.minute(), info.timestamp.second()),
            (14, 30, 25)
        );
        assert_eq!(info.channel, Channel::Front);
        assert_eq!(info.base_id, "20240115_143025");
        assert_eq!(info.size_bytes, 1234);
        assert_eq!(info.path, path);
    }

    #[test]
    fn channels_share_base_id_and_folder_sets_category() {
        let dir = tempfile::tempdir().unwrap();
        let event_dir = dir.path().join("Event");
        fs::create_dir(&event_dir).unwrap();
        let p = parser();

        let mut infos = Vec::new();
        for code in ["F", "R", "L", "I"] {
            let path = event_dir.join(format!("20231231_235959_{code}.mp4"));
            fs::write(&path, b"x").unwrap();
            infos.push(p.parse_file(&path).unwrap());
        }

        let channels: Vec<Channel> = infos.iter().map(|i| i.channel).collect();
        assert_eq!(
            channels,
            vec![Channel::Front, Channel::Rear, Channel::Left, Channel::Interior]
        );
        assert!(infos.iter().all(|i| i.base_id == "20231231_235959"));
        assert!(infos.iter().all(|i| i.category == Category::Impact));
    }

    #[test]
    fn round_trips_synthesized_names() {
        let dir = tempfile::tempdir().unwrap();
        let tz = FixedOffset::east_opt(0).unwrap();
        let p = parser();

        for (y, mo, d, h, mi, s, code, channel) in [
            (2020, 2, 29, 0, 0, 0, "F", Channel::Front),
            (1999, 12, 31, 23, 59, 59, "R", Channel::Rear),
            (2024, 7, 4, 12, 5, 9, "i", Channel::Interior),
        ] {
            let expected = tz.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap();
            let base = expected.format("%Y%m%d_%H%M%S").to_string();
            let path = dir.path().join(format!("{base}_{code}.mov"));
            fs::write(&path, b"").unwrap();

            let info = p.parse_file(&path).unwrap();
            assert_eq!(info.timestamp, expected);
            assert_eq!(info.channel, channel);
            assert_eq!(info.base_id, base);
            assert_eq!(info.category, Category::Unknown);
        }
    }

    #[test]
    fn soft_failures() {
        let dir = tempfile::tempdir().unwrap();
        let p = parser();

        let bad_date = dir.path().join("20240230_143025_F.mp4");
        fs::write(&bad_date, b"").unwrap();
        assert!(p.matches("20240230_143025_F.mp4"));
        assert!(p.parse_file(&bad_date).is_none());
        assert!(matches!(
            p.try_parse_file(&bad_date),
            Err(Error::InvalidTimestamp { .. })
        ));

        let bad_time = dir.path().join("20240115_246000_F.mp4");
        fs::write(&bad_time, b"").unwrap();
        assert!(p.parse_file(&bad_time).is_none());

        assert!(p.parse_file(&dir.path().join("notes.txt")).is_none());
        assert!(matches!(
            p.try_parse_file(&dir.path().join("20240115_143025_F.mp4")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn time_zone_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20240115_143025_F.mp4");
        fs::write(&path, b"").unwrap();

        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let p = BlackVueParser::new(Telemetry::from_config(&Config::default()), tz);
        let info = p.parse_file(&path).unwrap();
        assert_eq!(info.timestamp, tz.with_ymd_and_hms(2024, 1, 15, 14, 30, 25).unwrap());
        assert_eq!(info.timestamp.offset().local_minus_utc(), 9 * 3600);
    }
}
