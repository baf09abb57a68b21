//! Green Wave CLI Application
//!
//! Command-line front end for the green-wave-core library:
//! - Replays recorded tracks through the tracker and reports telemetry
//! - Lists traffic lights near a position
//! - Validates telemetry payloads the way the backend does
//! - Aggregates recorded passes into per-light color ranges

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use green_wave_core::{
    aggregate_ranges, lights_within, previous_utc_day, ranges_for_light, validate_click_distance,
    CachedRegistry, Coordinate, InferredPass, LightRange, LightRegistry, PassRecord, StartOutcome,
    TelemetryPayload, TelemetrySink, Tracker,
};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

mod config;
mod report;
mod sinks;
mod source;

use config::AppConfig;
use sinks::{HttpSink, JsonLinesSink};
use source::ReplaySource;

/// Green Wave - predict green and red traffic lights from position fixes
#[derive(Parser, Debug)]
#[command(name = "green-wave")]
#[command(about = "Green/red traffic light estimation from position tracks", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Traffic light registry (overrides the config file)
    #[arg(short, long, value_name = "FILE", global = true)]
    registry: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded track through the tracker
    Track {
        /// Recorded fixes (JSON array or JSON lines)
        #[arg(short, long, value_name = "FILE")]
        track: PathBuf,

        /// Where telemetry payloads go
        #[arg(long, value_enum, default_value_t = SinkKind::Stdout)]
        sink: SinkKind,

        /// Output file for the jsonl sink (overrides the config file)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Backend endpoint for the http sink (overrides the config file)
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,

        /// Record green/red passes to this file (JSON lines)
        #[arg(long, value_name = "FILE")]
        passes: Option<PathBuf>,

        /// Sleep the adaptive interval between polls
        #[arg(long)]
        realtime: bool,

        /// Maximum number of polls
        #[arg(long, value_name = "COUNT")]
        max_cycles: Option<usize>,
    },

    /// List traffic lights around a position
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Search radius in meters (default from config)
        #[arg(long, value_name = "METERS")]
        radius: Option<f64>,
    },

    /// Validate telemetry payloads against the backend rules
    Validate {
        /// Payload JSON files, checked in order
        #[arg(short, long, value_name = "FILE", num_args = 1.., required = true)]
        payload: Vec<PathBuf>,
    },

    /// Aggregate recorded passes into per-light color ranges
    Aggregate {
        /// Pass log (JSON lines, as written by `track --passes`)
        #[arg(short, long, value_name = "FILE")]
        passes: PathBuf,

        /// UTC day in YYYY-MM-DD format (defaults to the previous UTC day)
        #[arg(long, value_name = "DAY")]
        day: Option<String>,

        /// Only show ranges for this light
        #[arg(long, value_name = "ID")]
        light: Option<String>,

        /// Emit ranges as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// Print payloads as JSON lines to stdout
    Stdout,
    /// Write payloads as JSON lines to a file
    Jsonl,
    /// POST payloads to the backend
    Http,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Green Wave CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using core library v{}", green_wave_core::VERSION);

    let mut app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    if let Some(registry) = &args.registry {
        app_config.registry.file = registry.clone();
    }

    match &args.command {
        Command::Track {
            track,
            sink,
            output,
            endpoint,
            passes,
            realtime,
            max_cycles,
        } => {
            if let Some(output) = output {
                app_config.telemetry.output = Some(output.clone());
            }
            if let Some(endpoint) = endpoint {
                app_config.telemetry.endpoint = endpoint.clone();
            }
            let options = TrackOptions {
                track,
                sink: *sink,
                passes: passes.as_deref(),
                realtime: *realtime,
                max_cycles: *max_cycles,
            };
            track_mode(&app_config, &options)
        }
        Command::Nearby { lat, lon, radius } => nearby_mode(&app_config, *lat, *lon, *radius),
        Command::Validate { payload } => {
            let rejected = validate_mode(&app_config, payload)?;
            if rejected > 0 {
                bail!("{} of {} payloads rejected", rejected, payload.len());
            }
            Ok(())
        }
        Command::Aggregate {
            passes,
            day,
            light,
            json,
        } => {
            let (day, ranges) = aggregate_mode(passes, day.as_deref(), light.as_deref())?;
            print_aggregate(day, &ranges, light.as_deref(), *json)
        }
    }
}

struct TrackOptions<'a> {
    track: &'a Path,
    sink: SinkKind,
    passes: Option<&'a Path>,
    realtime: bool,
    max_cycles: Option<usize>,
}

fn load_registry(app_config: &AppConfig) -> Result<LightRegistry> {
    let path = &app_config.registry.file;
    LightRegistry::from_file(path)
        .with_context(|| format!("Failed to load traffic lights: {:?}", path))
}

fn build_sink(app_config: &AppConfig, kind: SinkKind) -> Result<Box<dyn TelemetrySink>> {
    let telemetry = &app_config.telemetry;
    Ok(match kind {
        SinkKind::Stdout => Box::new(JsonLinesSink::stdout()),
        SinkKind::Jsonl => {
            let Some(path) = &telemetry.output else {
                bail!("The jsonl sink needs --output or telemetry.output in the config");
            };
            Box::new(JsonLinesSink::create(path)?)
        }
        SinkKind::Http => {
            log::info!("Sending telemetry to {}", telemetry.endpoint);
            Box::new(HttpSink::new(telemetry.endpoint.clone(), telemetry.timeout_secs)?)
        }
    })
}

/// Track mode - replay fixes through the tracker
fn track_mode(app_config: &AppConfig, options: &TrackOptions<'_>) -> Result<()> {
    let registry = load_registry(app_config)?;
    let replay = ReplaySource::from_file(options.track)?;
    let sink = build_sink(app_config, options.sink)?;

    let mut pass_log = match options.passes {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create pass log: {:?}", path))?,
        )),
        None => None,
    };

    let mut tracker = Tracker::new(app_config.estimator.clone(), registry, replay, sink);
    if tracker.start()? == StartOutcome::AlreadyTracking {
        log::warn!("Tracker was already running");
    }

    // Payloads own stdout for the stdout sink; evaluations go to the log then
    let print_cycles = options.sink != SinkKind::Stdout;
    let mut pass_error: Option<std::io::Error> = None;

    let result = tracker.run(
        options.max_cycles,
        |cycle| {
            if print_cycles {
                println!("{}", report::cycle_line(cycle));
            } else {
                log::info!("{}", report::cycle_line(cycle));
            }

            if let (Some(writer), Some(pass)) =
                (pass_log.as_mut(), &cycle.evaluation.payload.inferred_state)
            {
                if pass_error.is_none() {
                    if let Err(e) = write_pass(writer, pass) {
                        pass_error = Some(e);
                    }
                }
            }
        },
        source::sleeper(options.realtime),
    );

    if let Some(mut writer) = pass_log {
        writer.flush().context("Failed to flush pass log")?;
    }
    if let Some(e) = pass_error {
        return Err(e).context("Failed to write pass log");
    }

    let summary = result.context("Tracking stopped")?;
    if print_cycles {
        report::print_summary(&summary);
    } else {
        log::info!(
            "Cycles: {} (tracking {}, green {}, red {})",
            summary.cycles,
            summary.tracking,
            summary.green,
            summary.red
        );
    }

    Ok(())
}

fn write_pass(writer: &mut impl Write, pass: &InferredPass) -> std::io::Result<()> {
    let line = serde_json::to_string(&pass.to_pass_record())?;
    writeln!(writer, "{}", line)
}

/// Nearby mode - lights around a position, nearest first
fn nearby_mode(app_config: &AppConfig, lat: f64, lon: f64, radius: Option<f64>) -> Result<()> {
    let position = Coordinate::new(lat, lon);
    if !position.is_valid() {
        bail!("Invalid coordinates: ({}, {})", lat, lon);
    }

    let registry = load_registry(app_config)?;
    if registry.is_empty() {
        println!("No traffic light data to measure against.");
        println!("Add entries to {:?}.", app_config.registry.file);
        return Ok(());
    }

    let radius_m = radius.unwrap_or(app_config.estimator.nearby_radius_m);
    let nearby = lights_within(position, registry.lights(), radius_m);
    report::print_nearby(&nearby, radius_m);

    Ok(())
}

/// Validate mode - payload format and distance enforcement
///
/// The registry is re-checked before every payload, so edits to it are
/// picked up between files. A missing or empty registry disables distance
/// enforcement, as on the backend. Returns the number of rejected payloads.
fn validate_mode(app_config: &AppConfig, payload_paths: &[PathBuf]) -> Result<usize> {
    let mut registry = CachedRegistry::new(&app_config.registry.file);
    let mut rejected = 0;

    for path in payload_paths {
        match validate_payload(&mut registry, path, app_config.estimator.max_click_distance_m)? {
            Ok(payload) => {
                println!("✓ {:?} accepted", path);
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            Err(e) => {
                println!("✗ {:?} rejected: {}", path, e);
                rejected += 1;
            }
        }
    }

    Ok(rejected)
}

/// Outer error: the file could not be read. Inner error: the backend would reject it
fn validate_payload(
    registry: &mut CachedRegistry,
    path: &Path,
    max_click_distance_m: f64,
) -> Result<green_wave_core::Result<TelemetryPayload>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload: {:?}", path))?;
    let raw: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Payload is not JSON: {:?}", path))?;

    let verdict = TelemetryPayload::parse(&raw).and_then(|payload| {
        validate_click_distance(&payload, registry.load().lights(), max_click_distance_m)?;
        Ok(payload)
    });
    Ok(verdict)
}

/// Aggregate mode - merge passes into ranges for one day, optionally for one light
fn aggregate_mode(
    passes_path: &Path,
    day: Option<&str>,
    light: Option<&str>,
) -> Result<(NaiveDate, Vec<LightRange>)> {
    let day = match day {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid day format; expected YYYY-MM-DD, got {:?}", raw))?,
        None => previous_utc_day(),
    };

    let file = File::open(passes_path)
        .with_context(|| format!("Failed to open pass log: {:?}", passes_path))?;

    let mut passes = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read pass log: {:?}", passes_path))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PassRecord>(&line) {
            Ok(record) => passes.push(record),
            Err(e) => log::warn!("Skipping malformed pass on line {}: {}", idx + 1, e),
        }
    }

    let ranges = aggregate_ranges(&passes, day);
    let ranges = match light {
        Some(light) => ranges_for_light(&ranges, light),
        None => ranges,
    };
    Ok((day, ranges))
}

fn print_aggregate(day: NaiveDate, ranges: &[LightRange], light: Option<&str>, json: bool) -> Result<()> {
    if json {
        let output = match light {
            Some(light) => serde_json::json!({
                "light_identifier": light.trim(),
                "ranges": ranges,
            }),
            None => serde_json::to_value(ranges)?,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let title = match light {
        Some(light) => format!("Ranges for light {} on {}", light.trim(), day),
        None => format!("Ranges for {}", day),
    };
    report::banner(&title);
    report::print_ranges(ranges);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
