use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashcam_meta::{
    AccelerationSample, Config, Feature, GpsFix, ParsedFileInfo, VendorDetector, VendorParser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "dashcam-meta")]
#[command(about = "Identify dashcam vendors and extract recording metadata", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output file path (use '-' for stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE", global = true)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Json, global = true)]
    format: OutputFormat,

    /// Force a vendor instead of detecting it (e.g. blackvue)
    #[arg(long = "vendor", value_name = "ID", global = true)]
    vendor: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect the vendor of a directory of recordings
    Detect {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Parse identity (timestamp, channel, category) from filenames
    Parse {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Parse every recording in a directory tree
    Scan {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Decode GPS fixes from a recording
    Gps {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Decode accelerometer samples from a recording
    Accel {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List registered vendors
    Vendors,
}

#[derive(Debug, Serialize)]
struct DetectionRow {
    directory: PathBuf,
    vendor_id: &'static str,
    display_name: &'static str,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct VendorRow {
    vendor_id: &'static str,
    display_name: &'static str,
    features: Vec<Feature>,
}

fn fmt_f64(v: f64) -> String {
    format!("{:.7}", v)
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(fmt_f64).unwrap_or_default()
}

fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    writeln!(out, "{json}")
}

fn write_files(out: &mut dyn Write, format: OutputFormat, infos: &[ParsedFileInfo]) -> io::Result<()> {
    match format {
        OutputFormat::Json => write_json(out, &infos),
        OutputFormat::Csv => {
            writeln!(out, "path,timestamp,channel,category,size_bytes,base_id")?;
            for i in infos {
                writeln!(
                    out,
                    "{},{},{},{},{},{}",
                    i.path.display(),
                    i.timestamp.to_rfc3339(),
                    i.channel,
                    i.category,
                    i.size_bytes,
                    i.base_id
                )?;
            }
            Ok(())
        }
    }
}

fn write_gps(out: &mut dyn Write, format: OutputFormat, fixes: &[GpsFix]) -> io::Result<()> {
    match format {
        OutputFormat::Json => write_json(out, &fixes),
        OutputFormat::Csv => {
            writeln!(out, "timestamp,latitude,longitude,altitude_m,speed_kmh,heading_deg,satellites")?;
            for f in fixes {
                writeln!(
                    out,
                    "{},{},{},{},{},{},{}",
                    f.timestamp.to_rfc3339(),
                    fmt_f64(f.latitude),
                    fmt_f64(f.longitude),
                    fmt_opt(f.altitude_m),
                    fmt_opt(f.speed_kmh),
                    fmt_opt(f.heading_deg),
                    f.satellites.map(|s| s.to_string()).unwrap_or_default()
                )?;
            }
            Ok(())
        }
    }
}

fn write_accel(
    out: &mut dyn Write,
    format: OutputFormat,
    samples: &[AccelerationSample],
) -> io::Result<()> {
    match format {
        OutputFormat::Json => write_json(out, &samples),
        OutputFormat::Csv => {
            writeln!(out, "timestamp,x,y,z")?;
            for s in samples {
                writeln!(
                    out,
                    "{},{},{},{}",
                    s.timestamp.to_rfc3339(),
                    fmt_f64(s.x),
                    fmt_f64(s.y),
                    fmt_f64(s.z)
                )?;
            }
            Ok(())
        }
    }
}

// Forced vendor first, then per-filename detection.
fn parser_for_file(
    detector: &VendorDetector,
    vendor: Option<&str>,
    file: &Path,
) -> Option<std::sync::Arc<dyn VendorParser>> {
    match vendor {
        Some(id) => detector.parser_for_id(id),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| detector.detect_vendor(n)),
    }
}

fn run_with_writer(cli: &Cli, detector: &VendorDetector, out: &mut dyn Write) -> io::Result<ExitCode> {
    let vendor = cli.vendor.as_deref();

    match &cli.command {
        Command::Detect { dir } => {
            let Some(result) = detector.detect_directory(dir) else {
                eprintln!("no vendor identified for {}", dir.display());
                return Ok(ExitCode::from(2));
            };
            let row = DetectionRow {
                directory: dir.clone(),
                vendor_id: result.parser.vendor_id(),
                display_name: result.parser.descriptor().display_name,
                confidence: result.confidence,
            };
            match cli.format {
                OutputFormat::Json => write_json(out, &row)?,
                OutputFormat::Csv => {
                    writeln!(out, "directory,vendor_id,display_name,confidence")?;
                    writeln!(
                        out,
                        "{},{},{},{:.2}",
                        row.directory.display(),
                        row.vendor_id,
                        row.display_name,
                        row.confidence
                    )?;
                }
            }
        }
        Command::Parse { files } => {
            let infos: Vec<ParsedFileInfo> = files
                .iter()
                .filter_map(|f| parser_for_file(detector, vendor, f)?.parse_file(f))
                .collect();
            write_files(out, cli.format, &infos)?;
        }
        Command::Scan { dir } => match detector.scan_directory(dir) {
            Ok(infos) => write_files(out, cli.format, &infos)?,
            Err(err) => {
                eprintln!("{err}");
                return Ok(ExitCode::from(2));
            }
        },
        Command::Gps { file } => {
            let fixes = parser_for_file(detector, vendor, file)
                .map(|p| p.extract_gps(file))
                .unwrap_or_default();
            write_gps(out, cli.format, &fixes)?;
        }
        Command::Accel { file } => {
            let samples = parser_for_file(detector, vendor, file)
                .map(|p| p.extract_acceleration(file))
                .unwrap_or_default();
            write_accel(out, cli.format, &samples)?;
        }
        Command::Vendors => {
            let rows: Vec<VendorRow> = detector
                .parsers()
                .iter()
                .map(|p| VendorRow {
                    vendor_id: p.vendor_id(),
                    display_name: p.descriptor().display_name,
                    features: p.supported_features().iter().copied().collect(),
                })
                .collect();
            match cli.format {
                OutputFormat::Json => write_json(out, &rows)?,
                OutputFormat::Csv => {
                    writeln!(out, "vendor_id,display_name,features")?;
                    for r in rows {
                        let features: Vec<&str> = r.features.iter().map(|f| f.as_str()).collect();
                        writeln!(out, "{},{},{}", r.vendor_id, r.display_name, features.join(";"))?;
                    }
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Initialize logging with tracing. Logs go to stderr so stdout stays parseable.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashcam_meta=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config, dashcam_meta::Error> {
    let config = match path {
        Some(p) => Config::from_file(p)?,
        None => Config::default(),
    };
    Ok(config.with_env_overrides())
}

fn main() -> io::Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let detector = VendorDetector::with_default_parsers(&config);

    let code = match cli.output.as_ref().filter(|p| p.as_os_str() != "-") {
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let code = run_with_writer(&cli, &detector, &mut out)?;
            out.flush()?;
            code
        }
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            let code = run_with_writer(&cli, &detector, &mut out)?;
            out.flush()?;
            code
        }
    };

    Ok(code)
}
