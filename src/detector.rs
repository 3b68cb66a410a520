//! Vendor detection by sampling filenames.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::model::ParsedFileInfo;
use crate::parser::{file_name, VendorParser};
use crate::vendors::default_parsers;
use crate::Error;

/// Extensions considered recordings when sampling a directory.
/// Floor for the configured confidence threshold.
pub const MIN_CONFIDENCE: f64 = 0.5;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// The parser chosen for a directory and the fraction of sampled files it matched.
#[derive(Clone)]
pub struct DetectionResult {
    pub parser: Arc<dyn VendorParser>,
    pub confidence: f64,
}

impl fmt::Debug for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionResult")
            .field("vendor", &self.parser.vendor_id())
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// Per-directory detection results, guarded by one lock.
#[derive(Debug, Default)]
struct DetectionCache {
    entries: Mutex<HashMap<PathBuf, DetectionResult>>,
}

impl DetectionCache {
    fn get(&self, dir: &Path) -> Option<DetectionResult> {
        self.entries.lock().get(dir).cloned()
    }

    fn insert(&self, dir: PathBuf, result: DetectionResult) {
        self.entries.lock().insert(dir, result);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Owns the registered parsers and picks one for a directory or filename.
///
/// Registration is append-only; the registration order is the tie-break order.
pub struct VendorDetector {
    parsers: Vec<Arc<dyn VendorParser>>,
    cache: DetectionCache,
    sample_cap: usize,
    confidence_threshold: f64,
}

impl fmt::Debug for VendorDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorDetector")
            .field("parsers", &self.parsers.iter().map(|p| p.vendor_id()).collect::<Vec<_>>())
            .field("cached", &self.cache.len())
            .field("sample_cap", &self.sample_cap)
            .field("confidence_threshold", &self.confidence_threshold)
            .finish()
    }
}

impl VendorDetector {
    /// A detector with no parsers registered.
    pub fn new(config: &Config) -> Self {
        Self {
            parsers: Vec::new(),
            cache: DetectionCache::default(),
            sample_cap: config.sample_cap.max(1),
            confidence_threshold: config.confidence_threshold.max(MIN_CONFIDENCE),
        }
    }

    /// A detector with the built-in vendors registered.
    pub fn with_default_parsers(config: &Config) -> Self {
        let mut detector = Self::new(config);
        for parser in default_parsers(config) {
            detector.register(parser);
        }
        detector
    }

    /// Append a parser. Invalidates every cached directory result.
    pub fn register(&mut self, parser: Arc<dyn VendorParser>) {
        tracing::debug!("registering vendor parser {}", parser.vendor_id());
        self.parsers.push(parser);
        self.cache.clear();
    }

    pub fn parsers(&self) -> &[Arc<dyn VendorParser>] {
        &self.parsers
    }

    pub fn parser_for_id(&self, vendor_id: &str) -> Option<Arc<dyn VendorParser>> {
        self.parsers.iter().find(|p| p.vendor_id() == vendor_id).cloned()
    }

    /// First registered parser whose grammar accepts `filename`. No scoring.
    pub fn detect_vendor(&self, filename: &str) -> Option<Arc<dyn VendorParser>> {
        self.parsers.iter().find(|p| p.matches(filename)).cloned()
    }

    /// Detect the vendor of a directory tree, memoized per absolute path.
    pub fn detect_directory(&self, dir: impl AsRef<Path>) -> Option<DetectionResult> {
        let dir = dir.as_ref();
        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());

        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }

        let names: Vec<String> = self
            .sample_files(&key)
            .iter()
            .filter_map(|p| file_name(p).map(str::to_owned))
            .collect();
        let result = self.score(&names);

        match &result {
            Some(r) => {
                tracing::info!(
                    "{}: detected {} (confidence {:.2})",
                    key.display(),
                    r.parser.vendor_id(),
                    r.confidence
                );
                self.cache.insert(key, r.clone());
            }
            None => tracing::info!("{}: no vendor identified", key.display()),
        }
        result
    }

    /// Score every parser over `filenames` and apply the confidence threshold.
    ///
    /// The parser matching the most names wins; ties go to the earliest registered.
    pub fn score<S: AsRef<str>>(&self, filenames: &[S]) -> Option<DetectionResult> {
        if filenames.is_empty() {
            return None;
        }

        let mut best: Option<(&Arc<dyn VendorParser>, usize)> = None;
        for parser in &self.parsers {
            let count = filenames.iter().filter(|n| parser.matches(n.as_ref())).count();
            tracing::debug!("{} matched {count}/{}", parser.vendor_id(), filenames.len());
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((parser, count));
            }
        }

        let (parser, count) = best?;
        let confidence = count as f64 / filenames.len() as f64;
        if count == 0 || confidence < self.confidence_threshold {
            return None;
        }
        Some(DetectionResult {
            parser: Arc::clone(parser),
            confidence,
        })
    }

    /// Up to `sample_cap` video files under `dir`, hidden entries skipped, in name order.
    pub fn sample_files(&self, dir: &Path) -> Vec<PathBuf> {
        video_files(dir).take(self.sample_cap).collect()
    }

    /// Detect the vendor, then parse every recording in the tree, oldest first.
    pub fn scan_directory(&self, dir: impl AsRef<Path>) -> Result<Vec<ParsedFileInfo>, Error> {
        let dir = dir.as_ref();
        let detection = self.detect_directory(dir).ok_or_else(|| Error::NoVendor {
            dir: dir.to_path_buf(),
        })?;

        let mut infos: Vec<ParsedFileInfo> = video_files(dir)
            .filter_map(|p| detection.parser.parse_file(&p))
            .collect();
        infos.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
        Ok(infos)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_directories(&self) -> usize {
        self.cache.len()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.'))
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(e)))
}

// Regular files only; the root itself may be hidden (temp dirs often are).
fn video_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::debug!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_video_extension(e.path()))
        .map(DirEntry::into_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParserDescriptor;
    use crate::parser::{MetadataLayout, StreamSelector, Telemetry};
    use crate::decode::AccelEncoding;
    use std::fs;

    /// Matches names starting with a fixed prefix.
    #[derive(Debug)]
    struct PrefixParser {
        prefix: &'static str,
        descriptor: ParserDescriptor,
        layout: MetadataLayout,
        telemetry: Telemetry,
    }

    impl PrefixParser {
        fn new(id: &'static str, prefix: &'static str) -> Arc<dyn VendorParser> {
            Arc::new(Self {
                prefix,
                descriptor: ParserDescriptor::new(id, id, []),
                layout: MetadataLayout {
                    gps_stream: StreamSelector::Index(0),
                    accel_stream: StreamSelector::Index(0),
                    accel_encoding: AccelEncoding::Auto,
                },
                telemetry: Telemetry::from_config(&Config::default()),
            })
        }
    }

    impl VendorParser for PrefixParser {
        fn descriptor(&self) -> &ParserDescriptor {
            &self.descriptor
        }
        fn matches(&self, filename: &str) -> bool {
            filename.starts_with(self.prefix)
        }
        fn try_parse_file(&self, path: &Path) -> Result<ParsedFileInfo, Error> {
            Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
        fn layout(&self) -> &MetadataLayout {
            &self.layout
        }
        fn telemetry(&self) -> &Telemetry {
            &self.telemetry
        }
    }

    fn vendor_a(i: usize) -> String {
        format!("20240115_1430{:02}_F.mp4", i)
    }

    fn vendor_b(i: usize) -> String {
        format!("2025-10-07-09h-11m-{:02}s_R_event.mp4", i)
    }

    #[test]
    fn six_of_ten_selects_vendor_a() {
        let detector = VendorDetector::with_default_parsers(&Config::default());
        let mut names: Vec<String> = (0..6).map(vendor_a).collect();
        names.extend((0..3).map(vendor_b));
        names.push("random_clip.mp4".to_string());

        let result = detector.score(&names).unwrap();
        assert_eq!(result.parser.vendor_id(), "blackvue");
        assert!((result.confidence - 0.6).abs() < 1e-12);
    }

    #[test]
    fn below_threshold_is_no_vendor_even_when_best() {
        let detector = VendorDetector::with_default_parsers(&Config::default());
        let mut names: Vec<String> = (0..4).map(vendor_a).collect();
        names.extend((0..3).map(vendor_b));
        names.extend((0..3).map(|i| format!("clip{i}.mp4")));

        assert!(detector.score(&names).is_none());
    }

    #[test]
    fn exactly_half_is_accepted() {
        let detector = VendorDetector::with_default_parsers(&Config::default());
        let names = vec![vendor_b(1), "other.mp4".to_string()];
        let result = detector.score(&names).unwrap();
        assert_eq!(result.parser.vendor_id(), "cr2000omega");
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn ties_go_to_earliest_registered() {
        let mut detector = VendorDetector::new(&Config::default());
        detector.register(PrefixParser::new("first", "cam"));
        detector.register(PrefixParser::new("second", "cam"));
        detector.register(PrefixParser::new("third", "x"));

        let result = detector.score(&["cam1.mp4", "cam2.mp4"]).unwrap();
        assert_eq!(result.parser.vendor_id(), "first");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn empty_sample_is_no_vendor() {
        let detector = VendorDetector::with_default_parsers(&Config::default());
        assert!(detector.score::<&str>(&[]).is_none());
    }

    #[test]
    fn per_filename_detection_is_first_match() {
        let mut detector = VendorDetector::new(&Config::default());
        detector.register(PrefixParser::new("short", "2024"));
        detector.register(PrefixParser::new("long", "20240115"));

        let hit = detector.detect_vendor("20240115_143025_F.mp4").unwrap();
        assert_eq!(hit.vendor_id(), "short");
        assert!(detector.detect_vendor("nothing.mp4").is_none());
    }

    #[test]
    fn sampling_skips_hidden_and_non_video_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Normal");
        fs::create_dir(&nested).unwrap();
        let hidden_dir = dir.path().join(".thumbs");
        fs::create_dir(&hidden_dir).unwrap();

        for i in 0..8 {
            fs::write(nested.join(vendor_a(i)), b"").unwrap();
            fs::write(dir.path().join(format!("20240115_1431{i:02}_R.MKV")), b"").unwrap();
        }
        fs::write(dir.path().join(".20240115_143000_F.mp4"), b"").unwrap();
        fs::write(hidden_dir.join(vendor_a(50)), b"").unwrap();
        fs::write(dir.path().join("20240115_143000_F.jpg"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let detector = VendorDetector::with_default_parsers(&Config::default());
        let sample = detector.sample_files(dir.path());
        assert_eq!(sample.len(), 10);
        assert!(sample.iter().all(|p| has_video_extension(p)));
        for path in &sample {
            let relative = path.strip_prefix(dir.path()).unwrap();
            assert!(relative
                .components()
                .all(|c| !c.as_os_str().to_string_lossy().starts_with('.')));
        }
    }

    #[test]
    fn detection_is_cached_and_invalidated_on_register() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            fs::write(dir.path().join(vendor_a(i)), b"").unwrap();
        }

        let mut detector = VendorDetector::with_default_parsers(&Config::default());
        let first = detector.detect_directory(dir.path()).unwrap();
        assert_eq!(first.parser.vendor_id(), "blackvue");
        assert_eq!(detector.cached_directories(), 1);

        // Cached result survives the files disappearing.
        for i in 0..3 {
            fs::remove_file(dir.path().join(vendor_a(i))).unwrap();
        }
        assert!(detector.detect_directory(dir.path()).is_some());

        detector.register(PrefixParser::new("late", "zzz"));
        assert_eq!(detector.cached_directories(), 0);
        assert!(detector.detect_directory(dir.path()).is_none());
        assert_eq!(detector.cached_directories(), 0);
    }

    #[test]
    fn configured_threshold_cannot_go_below_half() {
        let config = Config {
            confidence_threshold: 0.3,
            ..Config::default()
        };
        let detector = VendorDetector::with_default_parsers(&config);
        let mut names: Vec<String> = (0..4).map(vendor_a).collect();
        names.extend((0..6).map(|i| format!("clip{i}.mp4")));
        assert!(detector.score(&names).is_none());

        let strict = VendorDetector::with_default_parsers(&Config {
            confidence_threshold: 0.8,
            ..Config::default()
        });
        let mut names: Vec<String> = (0..7).map(vendor_a).collect();
        names.extend((0..3).map(|i| format!("clip{i}.mp4")));
        assert!(strict.score(&names).is_none());
    }

    #[test]
    fn concurrent_detection_shares_one_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(vendor_a(i)), b"").unwrap();
        }

        let detector = VendorDetector::with_default_parsers(&Config::default());
        let vendors: Vec<&'static str> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| detector.detect_directory(dir.path())))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap().parser.vendor_id())
                .collect()
        });

        assert_eq!(vendors.len(), 8);
        assert!(vendors.iter().all(|v| *v == "blackvue"));
        assert_eq!(detector.cached_directories(), 1);
    }

    #[test]
    fn clear_cache_forces_rescan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(vendor_b(1)), b"").unwrap();

        let detector = VendorDetector::with_default_parsers(&Config::default());
        assert_eq!(
            detector.detect_directory(dir.path()).unwrap().parser.vendor_id(),
            "cr2000omega"
        );
        detector.clear_cache();
        assert_eq!(detector.cached_directories(), 0);
    }

    #[test]
    fn scan_directory_requires_a_vendor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.mp4"), b"").unwrap();

        let detector = VendorDetector::with_default_parsers(&Config::default());
        assert!(matches!(
            detector.scan_directory(dir.path()),
            Err(Error::NoVendor { .. })
        ));
    }
}
