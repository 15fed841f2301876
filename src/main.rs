//! unnest - Flatten a nested directory tree into a single directory.
//!
//! Usage:
//!   unnest SOURCE DEST                 Move nested files into DEST
//!   unnest SOURCE DEST -n              Show what would be moved
//!   unnest SOURCE DEST --mode skip     Leave files whose name is taken
//!   unnest --help                      Show help

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, TimeZone, Utc};
use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use unnest_core::{CollisionMode, FilterSpec, FlattenConfig, RunSummary};
use unnest_ops::Flattener;

#[derive(Parser, Debug)]
#[command(
    name = "unnest",
    version,
    about = "Flatten a nested directory tree into a single directory",
    long_about = "unnest moves every file found below SOURCE directly into DEST.\n\n\
                  Files at the top of SOURCE stay where they are unless --min-depth 0 \
                  is given. Name collisions are resolved by --mode: rename (file_1.txt), \
                  skip, or overwrite."
)]
struct Cli {
    /// Directory tree to flatten
    source: Option<PathBuf>,

    /// Directory receiving the files (created if missing)
    destination: Option<PathBuf>,

    /// Collision handling: rename, skip, overwrite
    #[arg(long, value_name = "MODE")]
    mode: Option<CollisionMode>,

    /// Show what would be moved without changing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Number of worker threads
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Report byte progress when copying across filesystems
    #[arg(long)]
    progress: bool,

    /// Do not carry timestamps over when copying across filesystems
    #[arg(long)]
    no_preserve_times: bool,

    /// Relocate symbolic links (recreated in DEST)
    #[arg(long)]
    include_symlinks: bool,

    /// Remove directories left empty in SOURCE afterwards
    #[arg(long)]
    prune_empty_dirs: bool,

    /// Remove a partially written file when a copy fails
    #[arg(long)]
    cleanup_partial: bool,

    /// Minimum depth of files to move (0 = top level of SOURCE)
    #[arg(long, value_name = "N")]
    min_depth: Option<usize>,

    /// Maximum depth to descend
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Only move files whose relative path matches one of these globs
    #[arg(long, value_name = "GLOBS")]
    include: Vec<String>,

    /// Never move files whose relative path matches one of these globs
    #[arg(long, value_name = "GLOBS")]
    exclude: Vec<String>,

    /// Only move files with these extensions (e.g. "jpg,png")
    #[arg(long, value_name = "LIST")]
    allow_ext: Vec<String>,

    /// Never move files with these extensions
    #[arg(long, value_name = "LIST")]
    deny_ext: Vec<String>,

    /// Minimum file size (e.g. "10K", "5M", "1G")
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    min_size: Option<u64>,

    /// Maximum file size
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    max_size: Option<u64>,

    /// Only files modified at or after this time ("2024-01-31" or "7d", "12h", "30m")
    #[arg(long, value_name = "SPEC", value_parser = parse_time_spec)]
    newer_than: Option<SystemTime>,

    /// Only files modified at or before this time
    #[arg(long, value_name = "SPEC", value_parser = parse_time_spec)]
    older_than: Option<SystemTime>,

    /// Summary format
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Read defaults from a TOML file; flags given here take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Settings accepted in a `--config` file. Every key is optional.
///
/// `--print-config` emits this same layout, so its output loads back.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<CollisionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preserve_timestamps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prune_empty_dirs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cleanup_partial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_depth: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    allow_ext: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    deny_ext: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    newer_than: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    older_than: Option<String>,
}

impl From<&FlattenConfig> for FileConfig {
    fn from(config: &FlattenConfig) -> Self {
        let filters = &config.filters;
        Self {
            source: Some(config.source.clone()),
            destination: Some(config.destination.clone()),
            mode: Some(config.mode),
            threads: Some(config.threads),
            dry_run: Some(config.dry_run),
            progress: Some(config.progress),
            preserve_timestamps: Some(config.preserve_timestamps),
            include_symlinks: Some(config.include_symlinks),
            prune_empty_dirs: Some(config.prune_empty_dirs),
            cleanup_partial: Some(config.cleanup_partial),
            min_depth: Some(config.min_depth),
            max_depth: config.max_depth,
            include: filters.include.clone(),
            exclude: filters.exclude.clone(),
            allow_ext: filters.allow_ext.clone(),
            deny_ext: filters.deny_ext.clone(),
            min_size: filters.min_size.map(|n| n.to_string()),
            max_size: filters.max_size.map(|n| n.to_string()),
            newer_than: filters.newer_than.map(format_time),
            older_than: filters.older_than.map(format_time),
        }
    }
}

fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("Error: {e}");
    }

    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let file = match &cli.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };
    let config = build_config(&cli, file)?;

    if cli.print_config {
        print!(
            "{}",
            toml::to_string_pretty(&FileConfig::from(&config))
                .context("Failed to render configuration")?
        );
        return Ok(ExitCode::SUCCESS);
    }

    tracing::debug!(?config, "Effective configuration");
    let flattener = Flattener::new(config).context("Invalid configuration")?;
    let summary = flattener.run().context("Flatten run aborted")?;

    match cli.format {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Merge command-line flags over file settings over defaults.
fn build_config(cli: &Cli, file: FileConfig) -> Result<FlattenConfig> {
    let source = cli
        .source
        .clone()
        .or(file.source)
        .ok_or_else(|| eyre!("missing SOURCE directory"))?;
    let destination = cli
        .destination
        .clone()
        .or(file.destination)
        .ok_or_else(|| eyre!("missing DEST directory"))?;

    let filters = FilterSpec {
        include: pick_list(&cli.include, file.include),
        exclude: pick_list(&cli.exclude, file.exclude),
        allow_ext: pick_list(&cli.allow_ext, file.allow_ext),
        deny_ext: pick_list(&cli.deny_ext, file.deny_ext),
        min_size: pick_parsed(cli.min_size, file.min_size, parse_size)?,
        max_size: pick_parsed(cli.max_size, file.max_size, parse_size)?,
        newer_than: pick_parsed(cli.newer_than, file.newer_than, parse_time_spec)?,
        older_than: pick_parsed(cli.older_than, file.older_than, parse_time_spec)?,
    };

    let mut builder = FlattenConfig::builder();
    builder
        .source(source)
        .destination(destination)
        .mode(cli.mode.or(file.mode).unwrap_or_default())
        .dry_run(cli.dry_run || file.dry_run.unwrap_or(false))
        .progress(cli.progress || file.progress.unwrap_or(false))
        .preserve_timestamps(!cli.no_preserve_times && file.preserve_timestamps.unwrap_or(true))
        .include_symlinks(cli.include_symlinks || file.include_symlinks.unwrap_or(false))
        .prune_empty_dirs(cli.prune_empty_dirs || file.prune_empty_dirs.unwrap_or(false))
        .cleanup_partial(cli.cleanup_partial || file.cleanup_partial.unwrap_or(false))
        .max_depth(cli.max_depth.or(file.max_depth))
        .filters(filters);
    if let Some(threads) = cli.threads.or(file.threads) {
        builder.threads(threads);
    }
    if let Some(min_depth) = cli.min_depth.or(file.min_depth) {
        builder.min_depth(min_depth);
    }

    builder.build().context("Invalid configuration")
}

/// Command-line lists replace file lists; items are comma separated.
fn pick_list(cli: &[String], file: Vec<String>) -> Vec<String> {
    if cli.is_empty() {
        split_list(&file)
    } else {
        split_list(cli)
    }
}

fn pick_parsed<T>(
    cli: Option<T>,
    file: Option<String>,
    parse: fn(&str) -> std::result::Result<T, String>,
) -> Result<Option<T>> {
    match (cli, file) {
        (Some(value), _) => Ok(Some(value)),
        (None, Some(text)) => parse(&text).map(Some).map_err(|e| eyre!(e)),
        (None, None) => Ok(None),
    }
}

fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} ({})",
        summary.summary(),
        format_size(summary.bytes_copied)
    );
    if summary.pruned_dirs > 0 {
        println!("Pruned {} empty directories", summary.pruned_dirs);
    }
    if summary.warnings > 0 {
        println!("Warnings: {}", summary.warnings);
    }
    if summary.dry_run {
        println!("Dry run: nothing was changed");
    }
    println!("Elapsed: {:.2?}", summary.elapsed);
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Parse a size string (e.g., "512", "10K", "5MB", "1.5G", "2T"), base 1024.
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let upper = s.trim().to_ascii_uppercase();
    let body = upper.strip_suffix('B').unwrap_or(&upper);

    let (num, multiplier) = match body.chars().last() {
        Some('K') => (&body[..body.len() - 1], 1u64 << 10),
        Some('M') => (&body[..body.len() - 1], 1u64 << 20),
        Some('G') => (&body[..body.len() - 1], 1u64 << 30),
        Some('T') => (&body[..body.len() - 1], 1u64 << 40),
        _ => (body, 1),
    };

    let value: f64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{s}'"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid size '{s}'"));
    }
    Ok((value * multiplier as f64) as u64)
}

/// Render a point in time the way [`parse_time_spec`] reads it back.
fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a point in time: an RFC 3339 timestamp, an ISO date at local
/// midnight ("2024-01-31"), or an age before now ("7d", "12h", "30m", "45s",
/// plain seconds).
fn parse_time_spec(s: &str) -> std::result::Result<SystemTime, String> {
    let s = s.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Ok(timestamp.into());
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("invalid date '{s}'"))?;
        let local = Local
            .from_local_datetime(&midnight)
            .earliest()
            .ok_or_else(|| format!("'{s}' does not exist in the local time zone"))?;
        return Ok(local.into());
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let count: u64 = digits
        .parse()
        .map_err(|_| format!("invalid time spec '{s}'"))?;
    let unit_secs = match unit.to_ascii_lowercase().as_str() {
        "d" => 24 * 60 * 60,
        "h" => 60 * 60,
        "m" => 60,
        "s" | "" => 1,
        _ => return Err(format!("invalid time spec '{s}'")),
    };
    let secs = count
        .checked_mul(unit_secs)
        .ok_or_else(|| format!("time spec '{s}' is too large"))?;

    SystemTime::now()
        .checked_sub(Duration::from_secs(secs))
        .ok_or_else(|| format!("time spec '{s}' is too far in the past"))
}
