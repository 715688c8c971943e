//! CLI for the rotalog segment store.
//!
//! Provides commands for inspecting, querying, appending to and
//! benchmarking rotalog segment directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rotalog::config::{Clock, ManualClock, StoreConfig};
use rotalog::record::{EventKind, LogRecord, RecordFormatter};
use rotalog::segment::SegmentNaming;
use rotalog::{Logger, Store, StoreEvent};
use tracing_subscriber::EnvFilter;

/// rotalog: embedded rotating-segment log store CLI.
#[derive(Parser)]
#[command(name = "rotalog", version, about)]
struct Cli {
    /// Enable debug output from the store.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options describing the segment directory.
#[derive(Args)]
struct StoreArgs {
    /// Path to the segment directory.
    directory: PathBuf,

    /// Segment file name prefix.
    #[arg(long, default_value = "main")]
    prefix: String,

    /// Offset of the file naming time zone from UTC, in seconds.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    zone_offset: i32,

    /// Total byte budget across all segments.
    #[arg(long, default_value = "10485760")]
    max_total_bytes: u64,

    /// Maximum number of segments.
    #[arg(long, default_value = "10")]
    max_segments: u64,
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        StoreConfig::new(&self.directory)
            .with_prefix(&self.prefix)
            .with_zone_offset(self.zone_offset)
            .with_limits(self.max_total_bytes, self.max_segments)
    }
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display the segments of a directory with their sizes and creation times.
    Info {
        #[command(flatten)]
        store: StoreArgs,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the records of a time window.
    Query {
        #[command(flatten)]
        store: StoreArgs,

        /// Window ending now (e.g., "1h", "30m", "7d"). Ignored when --start is given.
        #[arg(long, default_value = "1h")]
        range: String,

        /// Window start, RFC 3339.
        #[arg(long)]
        start: Option<String>,

        /// Window end, RFC 3339. Defaults to now.
        #[arg(long)]
        end: Option<String>,
    },

    /// Append one record.
    Append {
        #[command(flatten)]
        store: StoreArgs,

        /// Message text.
        message: String,

        /// Event kind.
        #[arg(long, default_value = "info")]
        kind: KindArg,

        /// Label for `--kind user`.
        #[arg(long, default_value = "")]
        label: String,

        /// Optional tag.
        #[arg(long)]
        tag: Option<String>,
    },

    /// Run a save-path microbenchmark in a scratch directory.
    Bench {
        /// Number of records to save.
        #[arg(long, default_value = "100000")]
        records: u64,

        /// Message length in bytes.
        #[arg(long, default_value = "100")]
        length: usize,

        /// Total byte budget across all segments.
        #[arg(long, default_value = "4194304")]
        max_total_bytes: u64,

        /// Maximum number of segments.
        #[arg(long, default_value = "8")]
        max_segments: u64,
    },
}

/// Output format for `info`.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable listing.
    Text,
    /// JSON object.
    Json,
}

/// Event kind accepted by `append`.
#[derive(Clone, ValueEnum)]
enum KindArg {
    Info,
    Debug,
    Warning,
    Error,
    Critical,
    RequestOut,
    RequestIn,
    User,
}

impl KindArg {
    fn into_kind(self, label: &str) -> EventKind {
        match self {
            Self::Info => EventKind::Info,
            Self::Debug => EventKind::Debug,
            Self::Warning => EventKind::Warning,
            Self::Error => EventKind::Error,
            Self::Critical => EventKind::Critical,
            Self::RequestOut => EventKind::RequestOut,
            Self::RequestIn => EventKind::RequestIn,
            Self::User => EventKind::User(label.to_string()),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Info { store, format } => cmd_info(&store, &format),
        Commands::Query {
            store,
            range,
            start,
            end,
        } => cmd_query(&store, &range, start.as_deref(), end.as_deref()),
        Commands::Append {
            store,
            message,
            kind,
            label,
            tag,
        } => cmd_append(&store, message, kind.into_kind(&label), tag.as_deref()),
        Commands::Bench {
            records,
            length,
            max_total_bytes,
            max_segments,
        } => cmd_bench(records, length, max_total_bytes, max_segments),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `rotalog info <directory>`.
///
/// Lists the directory without opening a store, so files that are not
/// segments are reported rather than removed.
fn cmd_info(args: &StoreArgs, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config();
    config.validate()?;
    if !args.directory.is_dir() {
        return Err(format!("No segment directory at '{}'", args.directory.display()).into());
    }

    let naming = SegmentNaming::from_config(&config);
    let mut segments = Vec::new();
    let mut foreign = Vec::new();
    for entry in std::fs::read_dir(&args.directory)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        match naming.parse(&entry.file_name()) {
            Ok(created) => segments.push((entry.path(), created, metadata.len())),
            Err(_) => foreign.push(entry.path()),
        }
    }
    segments.sort_by_key(|(_, created, _)| *created);
    foreign.sort();

    let total: u64 = segments.iter().map(|(_, _, size)| size).sum();

    match format {
        OutputFormat::Text => {
            println!("Directory: {}", args.directory.display());
            println!(
                "Limits: {} across at most {} segments ({} per segment)",
                format_bytes(config.max_total_bytes),
                config.max_segment_count,
                format_bytes(config.segment_capacity()),
            );
            println!();
            println!("Segments: {}", segments.len());
            for (path, created, size) in &segments {
                println!(
                    "  - {} created={} size={}",
                    file_name(path),
                    created.to_rfc3339(),
                    format_bytes(*size)
                );
            }
            if !foreign.is_empty() {
                println!();
                println!("Not segments (removed on next write): {}", foreign.len());
                for path in &foreign {
                    println!("  - {}", file_name(path));
                }
            }
            println!();
            println!("Total disk usage: {} ({total} bytes)", format_bytes(total));
        }
        OutputFormat::Json => {
            let segment_values: Vec<serde_json::Value> = segments
                .iter()
                .map(|(path, created, size)| {
                    serde_json::json!({
                        "name": file_name(path),
                        "created": created.to_rfc3339(),
                        "size": size,
                    })
                })
                .collect();
            let foreign_names: Vec<String> = foreign.iter().map(|path| file_name(path)).collect();

            let output = serde_json::json!({
                "directory": args.directory.display().to_string(),
                "max_total_bytes": config.max_total_bytes,
                "max_segment_count": config.max_segment_count,
                "segments": segment_values,
                "foreign": foreign_names,
                "total_bytes": total,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `rotalog query <directory>`.
fn cmd_query(
    args: &StoreArgs,
    range: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let end = match end {
        Some(text) => parse_instant(text)?,
        None => Utc::now(),
    };
    let start = match start {
        Some(text) => parse_instant(text)?,
        None => end - parse_duration(range)?,
    };
    if start > end {
        return Err("Window start is after its end".into());
    }

    let mut store = Store::open(args.config())?;
    let text = store.query(start, end);
    if !text.is_empty() {
        println!("{text}");
    }

    Ok(())
}

/// Implements `rotalog append <directory> <message>`.
fn cmd_append(
    args: &StoreArgs,
    message: String,
    kind: EventKind,
    tag: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let logger = Logger::new(args.config())?;
    let events = logger.subscribe();

    logger.log(kind, message, None, tag);
    logger.flush();

    for event in events.try_iter() {
        match event {
            StoreEvent::RecordSkipped { record_size } => {
                return Err(format!("Record of {record_size} bytes does not fit a segment").into());
            }
            StoreEvent::OperationFailed { operation, error } => {
                return Err(format!("{operation} failed: {error}").into());
            }
            _ => {}
        }
    }

    Ok(())
}

/// Implements `rotalog bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(
    records: u64,
    length: usize,
    max_total_bytes: u64,
    max_segments: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("rotalog save-path benchmark");
    println!("  Records: {records}");
    println!("  Message length: {length}");
    println!(
        "  Limits: {} across {max_segments} segments",
        format_bytes(max_total_bytes)
    );
    println!();

    let temp_dir = std::env::temp_dir().join("rotalog_bench");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let config = StoreConfig::new(&temp_dir).with_limits(max_total_bytes, max_segments);
    let formatter = RecordFormatter::from_config(&config);
    // One millisecond per record keeps segment names distinct.
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut store = Store::with_clock(config, clock.clone())?;
    let events = store.subscribe();

    let message = "x".repeat(length);
    let lines: Vec<String> = (0..records)
        .map(|_| {
            clock.advance(TimeDelta::milliseconds(1));
            formatter.format(&LogRecord::new(clock.now(), EventKind::Info, message.as_str()))
        })
        .collect();

    println!("Saving {records} records...");

    // Events are drained as they come; the feed buffers only so many.
    let mut rotations = 0;
    let start = Instant::now();
    for line in &lines {
        store.save(line);
        rotations += events
            .try_iter()
            .filter(|event| matches!(event, StoreEvent::SegmentRotated { .. }))
            .count();
    }
    let elapsed = start.elapsed();
    let ns_per_save = elapsed.as_nanos() as f64 / records.max(1) as f64;
    let saves_per_sec = records as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results:");
    println!("  Total saves: {records}");
    println!("  Rotations: {rotations}");
    println!("  Segments left: {}", store.segments().len());
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_save:.1} ns/save");
    println!("  Throughput: {saves_per_sec:.0} saves/sec");
    println!();

    let _ = std::fs::remove_dir_all(&temp_dir);

    Ok(())
}

/// Parses a human-readable duration string (e.g., "1h", "30m", "7d").
fn parse_duration(s: &str) -> Result<TimeDelta, Box<dyn std::error::Error>> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".into());
    }

    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: i64 = num_str.parse()?;

    let delta = match unit {
        "s" => TimeDelta::try_seconds(num),
        "m" => TimeDelta::try_minutes(num),
        "h" => TimeDelta::try_hours(num),
        "d" => TimeDelta::try_days(num),
        _ => return Err(format!("Unknown duration unit: '{unit}'. Use s, m, h, or d.").into()),
    };

    delta.ok_or_else(|| format!("Duration out of range: '{s}'").into())
}

/// Parses an RFC 3339 instant.
fn parse_instant(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(DateTime::parse_from_rfc3339(s.trim())?.with_timezone(&Utc))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
