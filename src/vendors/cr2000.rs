use std::path::Path;

use chrono::FixedOffset;

use crate::decode::AccelEncoding;
use crate::model::{Category, Channel, Feature, ParsedFileInfo, ParserDescriptor};
use crate::parser::{
    file_name, file_size, local_timestamp, MetadataLayout, StreamSelector, Telemetry,
    VendorParser,
};
use crate::Error;

/// `2025-10-07-09h-11m-09s_F_normal.mp4`: spelled-out time, one channel letter and an explicit
/// category token.
#[derive(Debug)]
pub struct Cr2000OmegaParser {
    descriptor: ParserDescriptor,
    layout: MetadataLayout,
    telemetry: Telemetry,
    tz: FixedOffset,
}

impl Cr2000OmegaParser {
    pub fn new(telemetry: Telemetry, tz: FixedOffset) -> Self {
        Self {
            descriptor: ParserDescriptor::new(
                "cr2000omega",
                "CR-2000 OMEGA",
                [Feature::Gps, Feature::Accelerometer, Feature::ParkingMode],
            ),
            layout: MetadataLayout {
                gps_stream: StreamSelector::Index(2),
                accel_stream: StreamSelector::Index(2),
                accel_encoding: AccelEncoding::Auto,
            },
            telemetry,
            tz,
        }
    }
}

fn grammar() -> &'static regex::Regex {
    regex!(
        r"^(\d{4})-(\d{2})-(\d{2})-(\d{2})h-(\d{2})m-(\d{2})s_([FRLIi])_(normal|event|parking|motion)\.(\w+)$"
    )
}

// The grammar only admits these letters, so there is no fallback.
fn channel_for_code(code: &str) -> Channel {
    match code {
        "F" => Channel::Front,
        "R" => Channel::Rear,
        "L" => Channel::Left,
        "I" | "i" => Channel::Interior,
        _ => Channel::Unknown,
    }
}

fn category_for_token(token: &str) -> Category {
    match token {
        "normal" => Category::Normal,
        "event" | "motion" => Category::Impact,
        "parking" => Category::Parking,
        _ => Category::Unknown,
    }
}

impl VendorParser for Cr2000OmegaParser {
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
        if caps.len() != 10 {
            return Err(unsupported());
        }
        let (y, mo, d, h, mi, s) = (&caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]);

        let timestamp = local_timestamp(
            &format!("{y}-{mo}-{d} {h}:{mi}:{s}"),
            "%Y-%m-%d %H:%M:%S",
            self.tz,
        )?;

        Ok(ParsedFileInfo {
            path: std::path::absolute(path)?,
            timestamp,
            channel: channel_for_code(&caps[7]),
            category: category_for_token(&caps[8]),
            size_bytes: file_size(path)?,
            base_id: format!("{y}-{mo}-{d}-{h}h-{mi}m-{s}s"),
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
    use chrono::TimeZone;
    use std::fs;

    fn parser() -> Cr2000OmegaParser {
        let config = Config::default();
        Cr2000OmegaParser::new(Telemetry::from_config(&config), config.time_zone())
    }

    fn touch(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn grammar_is_exact() {
        let p = parser();
        assert!(p.matches("2025-10-07-09h-11m-09s_F_normal.mp4"));
        assert!(p.matches("2025-10-07-09h-11m-09s_i_parking.mkv"));
        assert!(!p.matches("2025-10-07-09h-11m-09s_FR_normal.mp4"));
        assert!(!p.matches("2025-10-07-09h-11m-09s_F_manual.mp4"));
        assert!(!p.matches("2025-10-07-09h-11m-09s_F_Normal.mp4"));
        assert!(!p.matches("2025-10-07-09-11-09_F_normal.mp4"));
        assert!(!p.matches("20240115_143025_F.mp4"));
    }

    #[test]
    fn motion_aliases_impact() {
        let dir = tempfile::tempdir().unwrap();
        let info = parser()
            .parse_file(&touch(dir.path(), "2025-10-07-09h-11m-09s_F_motion.mp4"))
            .unwrap();
        assert_eq!(info.category, Category::Impact);
        assert_eq!(info.channel, Channel::Front);
        assert_eq!(info.base_id, "2025-10-07-09h-11m-09s");
        assert_eq!(info.size_bytes, 4);
    }

    #[test]
    fn category_tokens() {
        assert_eq!(category_for_token("normal"), Category::Normal);
        assert_eq!(category_for_token("event"), Category::Impact);
        assert_eq!(category_for_token("parking"), Category::Parking);
        assert_eq!(category_for_token("sos"), Category::Unknown);
    }

    #[test]
    fn round_trips_synthesized_names() {
        let dir = tempfile::tempdir().unwrap();
        let tz = FixedOffset::east_opt(0).unwrap();
        let p = parser();

        for (code, channel, token, category) in [
            ("F", Channel::Front, "normal", Category::Normal),
            ("R", Channel::Rear, "event", Category::Impact),
            ("L", Channel::Left, "parking", Category::Parking),
            ("I", Channel::Interior, "motion", Category::Impact),
        ] {
            let expected = tz.with_ymd_and_hms(2025, 10, 7, 9, 11, 9).unwrap();
            let base = expected.format("%Y-%m-%d-%Hh-%Mm-%Ss").to_string();
            let path = touch(dir.path(), &format!("{base}_{code}_{token}.mp4"));

            let info = p.parse_file(&path).unwrap();
            assert_eq!(info.timestamp, expected);
            assert_eq!(info.channel, channel);
            assert_eq!(info.category, category);
            assert_eq!(info.base_id, base);
        }
    }

    #[test]
    fn impossible_time_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let p = parser();
        let path = touch(dir.path(), "2025-13-07-09h-11m-09s_F_normal.mp4");
        assert!(p.matches("2025-13-07-09h-11m-09s_F_normal.mp4"));
        assert!(p.parse_file(&path).is_none());
    }
}
