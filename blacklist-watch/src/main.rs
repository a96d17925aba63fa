//! Blacklist Watch CLI Application
//!
//! Checks URLs against a threat blacklist, submits the ones that are not yet
//! flagged for review and watches a confirmation authority until the flag
//! shows up. This binary is a thin layer over blacklist-watch-lib.

mod ui;

use blacklist_watch_lib::{
    collect_urls, load_env_config, minutes_to_duration, validate_max_concurrent, Authorities,
    Authority, AuthorityEndpoint, BlacklistError, ConfigManager, EnvConfig, FileConfig,
    LookupResult, PipelineConfig, PipelineOrchestrator, SafeBrowsingClient, ThreatFilters,
    ThreatType, UrlEntry, DEFAULT_MAX_CONCURRENT, DEFAULT_POLL_INTERVAL_MINUTES,
    DEFAULT_POLL_TIMEOUT_MINUTES, MAX_CONCURRENT_LIMIT, MAX_POLL_MINUTES,
};
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for blacklist-watch
#[derive(Parser, Debug)]
#[command(name = "blacklist-watch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Report malicious URLs and watch for the blacklist flag to propagate")]
#[command(
    long_about = "Check URLs against a threat-intelligence blacklist. URLs that are not flagged yet are submitted through the report form, then a confirmation authority is polled until the flag appears or the timeout passes.\n\nEndpoints come from a config file, the environment (GOOGLE_SAFE_BROWSING_API, GOOGLE_SAFE_BROWSING_KEY, LOCAL_ADDRESS, GOOGLE_REPORT_URL) or a .env file."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Single URL to process
    #[arg(short = 'u', long = "url", value_name = "URL", help_heading = "Input")]
    url: Option<String>,

    /// File with one URL per line (blank lines and # comments are skipped)
    #[arg(short = 'f', long = "file", value_name = "FILE", help_heading = "Input")]
    file: Option<String>,

    /// Minutes between confirmation lookups [default: 60]
    #[arg(long = "poll-interval", value_name = "MIN", help_heading = "Polling")]
    poll_interval: Option<f64>,

    /// Minutes before giving up on confirmation [default: 20160]
    #[arg(long = "poll-timeout", value_name = "MIN", help_heading = "Polling")]
    poll_timeout: Option<f64>,

    /// Maximum simultaneous lookups and submissions [default: 16]
    #[arg(short = 'c', long = "concurrency", value_name = "N", help_heading = "Polling")]
    concurrency: Option<usize>,

    /// Only look the URLs up, never submit or poll
    #[arg(long = "check-only", help_heading = "Mode")]
    check_only: bool,

    /// Authority queried by --check-only
    #[arg(
        long = "against",
        value_enum,
        default_value_t = AgainstArg::Primary,
        requires = "check_only",
        help_heading = "Mode"
    )]
    against: AgainstArg,

    /// Print the results as JSON
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    json: bool,

    /// Use a specific config file instead of discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    config: Option<String>,

    /// Directory for the timestamped run log
    #[arg(
        long = "log-dir",
        value_name = "DIR",
        default_value = "logs",
        help_heading = "Configuration"
    )]
    log_dir: String,

    /// Log to stderr instead of a file
    #[arg(long = "no-log-file", help_heading = "Configuration")]
    no_log_file: bool,

    /// Show debug-level logs
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AgainstArg {
    Primary,
    Confirmation,
}

impl From<AgainstArg> for Authority {
    fn from(arg: AgainstArg) -> Self {
        match arg {
            AgainstArg::Primary => Authority::Primary,
            AgainstArg::Confirmation => Authority::Confirmation,
        }
    }
}

/// Fully layered settings for one run.
#[derive(Debug, Clone)]
struct Settings {
    primary_url: Option<String>,
    api_key: Option<String>,
    confirmation_url: Option<String>,
    report_url: Option<String>,
    max_concurrent: usize,
    interval_minutes: f64,
    timeout_minutes: f64,
    filters: ThreatFilters,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary_url: None,
            api_key: None,
            confirmation_url: None,
            report_url: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            timeout_minutes: DEFAULT_POLL_TIMEOUT_MINUTES,
            filters: ThreatFilters::default(),
        }
    }
}

impl Settings {
    fn authorities(&self) -> Result<Authorities, BlacklistError> {
        let primary_url = require(
            &self.primary_url,
            "primary lookup URL",
            "GOOGLE_SAFE_BROWSING_API",
        )?;
        let confirmation_url =
            require(&self.confirmation_url, "confirmation lookup URL", "LOCAL_ADDRESS")?;

        let mut primary = AuthorityEndpoint::new(primary_url);
        if let Some(key) = &self.api_key {
            primary = primary.with_api_key(key.clone());
        }

        Ok(Authorities {
            primary,
            confirmation: AuthorityEndpoint::new(confirmation_url),
        })
    }

    fn report_url(&self) -> Result<String, BlacklistError> {
        require(&self.report_url, "report form URL", "GOOGLE_REPORT_URL")
    }

    fn pipeline_config(&self) -> Result<PipelineConfig, BlacklistError> {
        let interval = minutes_to_duration(self.interval_minutes)?;
        if interval.is_zero() {
            return Err(BlacklistError::config(
                "Poll interval must be greater than zero",
            ));
        }

        Ok(PipelineConfig::default()
            .with_max_concurrent(self.max_concurrent)
            .with_poll_interval(interval)
            .with_poll_timeout(minutes_to_duration(self.timeout_minutes)?)
            .with_filters(self.filters.clone()))
    }
}

fn require(value: &Option<String>, what: &str, variable: &str) -> Result<String, BlacklistError> {
    value.clone().ok_or_else(|| {
        BlacklistError::config(format!(
            "No {} configured. Set {} or add it to the config file",
            what, variable
        ))
    })
}

/// One row of `--check-only` output.
#[derive(Debug, Serialize)]
struct CheckRow {
    url: UrlEntry,
    authority: Authority,
    flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    threat_type: Option<ThreatType>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Usage problems exit before any logging or network setup
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(2);
    }

    let urls = match collect_urls(args.url.as_deref(), args.file.as_deref().map(Path::new)) {
        Ok(urls) => urls,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(if e.is_usage_error() { 2 } else { 1 });
        }
    };

    dotenvy::dotenv().ok();

    match init_logging(&args) {
        Ok(Some(path)) if !args.json => ui::print_log_location(&path),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = run(args, urls).await {
        eprintln!("Error: {}", e);
        process::exit(if e.is_usage_error() { 2 } else { 1 });
    }
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    let has_url = args.url.as_deref().is_some_and(|u| !u.trim().is_empty());
    if !has_url && args.file.is_none() {
        return Err("No URLs provided. Use --url or --file.".to_string());
    }

    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > MAX_CONCURRENT_LIMIT {
            return Err(format!(
                "Concurrency must be between 1 and {}",
                MAX_CONCURRENT_LIMIT
            ));
        }
    }

    if let Some(interval) = args.poll_interval {
        let interval = minutes_to_duration(interval)
            .map_err(|_| poll_minutes_message("Poll interval", "a positive"))?;
        if interval.is_zero() {
            return Err(poll_minutes_message("Poll interval", "a positive"));
        }
    }

    if let Some(timeout) = args.poll_timeout {
        minutes_to_duration(timeout)
            .map_err(|_| poll_minutes_message("Poll timeout", "a non-negative"))?;
    }

    Ok(())
}

fn poll_minutes_message(what: &str, kind: &str) -> String {
    format!(
        "{} must be {} number of minutes, at most {}",
        what, kind, MAX_POLL_MINUTES
    )
}

/// Install the tracing subscriber.
///
/// Logs go to `<log-dir>/run_YYYYMMDD_HHMMSS.log` unless `--no-log-file`
/// is given. `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_logging(args: &Args) -> Result<Option<PathBuf>, BlacklistError> {
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.no_log_file {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact();
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
        return Ok(None);
    }

    let dir = Path::new(&args.log_dir);
    fs::create_dir_all(dir).map_err(|e| {
        BlacklistError::file_error(
            dir.to_string_lossy(),
            format!("Failed to create log directory: {}", e),
        )
    })?;

    let path = dir.join(log_file_name(chrono::Local::now()));
    let file = fs::File::create(&path).map_err(|e| {
        BlacklistError::file_error(
            path.to_string_lossy(),
            format!("Failed to create log file: {}", e),
        )
    })?;

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    Ok(Some(path))
}

fn log_file_name<Tz>(now: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("run_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Main run function that handles both pipeline and lookup-only modes.
async fn run(args: Args, urls: Vec<UrlEntry>) -> Result<(), BlacklistError> {
    let settings = build_settings(&args)?;
    let config = settings.pipeline_config()?;
    let authorities = settings.authorities()?;

    info!(
        urls = urls.len(),
        max_concurrent = config.max_concurrent,
        poll_interval_secs = config.poll_interval.as_secs_f64(),
        poll_timeout_secs = config.poll_timeout.as_secs_f64(),
        "starting run"
    );

    if args.check_only {
        return run_check_only(&args, &config, authorities, urls).await;
    }

    let report_url = settings.report_url()?;
    if !args.json {
        ui::print_header(urls.len(), config.max_concurrent, false);
    }

    let started = Instant::now();
    let orchestrator =
        PipelineOrchestrator::with_http_collaborators(config, authorities, report_url)?;
    let report = orchestrator.run_batch(urls).await?;
    let summary = report.summary();

    info!(
        total = summary.total,
        already_flagged = summary.already_flagged,
        confirmed = summary.confirmed,
        timed_out = summary.timed_out,
        submission_failures = summary.submission_failures,
        "run finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for url_report in &report.results {
            ui::print_report_line(url_report);
        }
        println!();
        ui::print_summary(&summary, started.elapsed());
    }

    Ok(())
}

/// Look every URL up in one request and print what the authority says.
async fn run_check_only(
    args: &Args,
    config: &PipelineConfig,
    authorities: Authorities,
    urls: Vec<UrlEntry>,
) -> Result<(), BlacklistError> {
    let authority = Authority::from(args.against);
    if !args.json {
        ui::print_header(urls.len(), config.max_concurrent, true);
    }

    let client = SafeBrowsingClient::with_config(authorities, config)?;
    let result = client.lookup_batch(&urls, authority).await?;
    let rows = check_rows(&urls, authority, &result);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            ui::print_check_line(&row.url, row.threat_type);
        }
        let flagged = rows.iter().filter(|r| r.flagged).count();
        println!();
        ui::print_check_summary(rows.len(), flagged, authority);
    }

    Ok(())
}

/// Split a batched lookup result back into one row per input URL.
fn check_rows(urls: &[UrlEntry], authority: Authority, result: &LookupResult) -> Vec<CheckRow> {
    urls.iter()
        .map(|url| {
            let threat_type = result.threat_type_for(url.as_str());
            CheckRow {
                url: url.clone(),
                authority,
                flagged: threat_type.is_some(),
                threat_type,
            }
        })
        .collect()
}

/// Build settings with proper precedence: CLI > env > config files > defaults.
///
/// Config file resolution:
/// 1. `--config FILE`
/// 2. `BW_CONFIG`
/// 3. Discovery (XDG, then `~/.blacklist-watch.toml`, then the current
///    directory; later files win)
fn build_settings(args: &Args) -> Result<Settings, BlacklistError> {
    let env_config = load_env_config();
    let config_manager = ConfigManager::new();

    let file_config = if let Some(path) = &args.config {
        debug!(path = %path, "using explicit config file (--config)");
        config_manager.load_file(path).map_err(|e| {
            BlacklistError::config(format!("Failed to load config file '{}': {}", path, e))
        })?
    } else if let Some(path) = &env_config.config_path {
        debug!(path = %path, "using explicit config file (BW_CONFIG)");
        config_manager.load_file(path).map_err(|e| {
            BlacklistError::config(format!("Failed to load config file '{}': {}", path, e))
        })?
    } else {
        config_manager.discover_and_load()
    };

    let settings = merge_file_config_into_settings(Settings::default(), file_config);
    let settings = apply_environment_config(settings, &env_config);
    apply_cli_args_to_settings(settings, args)
}

/// Merge FileConfig into Settings
fn merge_file_config_into_settings(mut settings: Settings, file_config: FileConfig) -> Settings {
    if let Some(authorities) = file_config.authorities {
        settings.primary_url = authorities.primary_url.or(settings.primary_url);
        settings.api_key = authorities.api_key.or(settings.api_key);
        settings.confirmation_url = authorities.confirmation_url.or(settings.confirmation_url);
        settings.report_url = authorities.report_url.or(settings.report_url);
    }

    if let Some(polling) = file_config.polling {
        if let Some(interval) = polling.interval_minutes {
            settings.interval_minutes = interval;
        }
        if let Some(timeout) = polling.timeout_minutes {
            settings.timeout_minutes = timeout;
        }
        if let Some(max) = polling.max_concurrent {
            settings.max_concurrent = max;
        }
    }

    if let Some(filters) = file_config.filters {
        settings.filters = filters.apply_to(settings.filters);
    }

    settings
}

/// Apply environment variables on top of file settings.
fn apply_environment_config(mut settings: Settings, env_config: &EnvConfig) -> Settings {
    if let Some(url) = &env_config.primary_url {
        settings.primary_url = Some(url.clone());
    }
    if let Some(key) = &env_config.api_key {
        settings.api_key = Some(key.clone());
    }
    if let Some(url) = &env_config.confirmation_url {
        settings.confirmation_url = Some(url.clone());
    }
    if let Some(url) = &env_config.report_url {
        settings.report_url = Some(url.clone());
    }
    if let Some(max) = env_config.max_concurrent {
        settings.max_concurrent = max;
    }
    if let Some(interval) = env_config.interval_minutes {
        settings.interval_minutes = interval;
    }
    if let Some(timeout) = env_config.timeout_minutes {
        settings.timeout_minutes = timeout;
    }

    settings
}

/// Apply CLI arguments to settings (highest precedence).
fn apply_cli_args_to_settings(
    mut settings: Settings,
    args: &Args,
) -> Result<Settings, BlacklistError> {
    if let Some(concurrency) = args.concurrency {
        settings.max_concurrent = concurrency;
    }
    if let Some(interval) = args.poll_interval {
        settings.interval_minutes = interval;
    }
    if let Some(timeout) = args.poll_timeout {
        settings.timeout_minutes = timeout;
    }

    validate_max_concurrent(settings.max_concurrent)?;
    Ok(settings)
}
