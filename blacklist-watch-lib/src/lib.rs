//! # Blacklist Watch Library
//!
//! Detection and remediation of malicious URLs against a threat-intelligence
//! blacklist.
//!
//! For each URL the library asks a primary authority whether it is already
//! flagged. If it is not, the URL is submitted for review and a confirmation
//! authority is polled at a fixed interval until the flag shows up or a
//! deadline passes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blacklist_watch_lib::{Authorities, AuthorityEndpoint, PipelineConfig, PipelineOrchestrator, UrlEntry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let authorities = Authorities {
//!         primary: AuthorityEndpoint::new("https://safebrowsing.googleapis.com/v4/threatMatches:find")
//!             .with_api_key("KEY"),
//!         confirmation: AuthorityEndpoint::new("http://127.0.0.1:8080/v4/threatMatches:find"),
//!     };
//!     let orchestrator = PipelineOrchestrator::with_http_collaborators(
//!         PipelineConfig::default(),
//!         authorities,
//!         "https://report.example/submit",
//!     )?;
//!
//!     let report = orchestrator.run_batch(vec![UrlEntry::parse("https://bad.example")?]).await?;
//!     for result in &report.results {
//!         println!("{}: {:?}", result.url, result.disposition);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Lookup client**: `threatMatches:find` requests, single or batched
//! - **Pluggable remediation**: any `RemediationAgent`, with an HTTP form agent included
//! - **Confirmation polling**: fixed interval, hard timeout, lookup errors tolerated
//! - **Bounded concurrency**: one shared permit pool for every network operation
//! - **Structured events**: an injected `PipelineObserver`, `tracing` by default

// Re-export main public API types and functions
// This makes them available as blacklist_watch_lib::TypeName
pub use concurrent::ConcurrencyLimiter;
pub use config::{
    load_env_config, validate_max_concurrent, AuthoritiesConfig, ConfigManager, EnvConfig,
    FileConfig, FiltersConfig, PollingConfig, MAX_CONCURRENT_LIMIT,
};
pub use error::BlacklistError;
pub use observer::{NoopObserver, PipelineEvent, PipelineObserver, TracingObserver};
pub use orchestrator::PipelineOrchestrator;
pub use poller::ConfirmationPoller;
pub use protocols::{
    parse_find_response, FormSubmissionAgent, RemediationAgent, SafeBrowsingClient, ThreatLookup,
};
pub use types::{
    Authorities, Authority, AuthorityEndpoint, BatchReport, BatchSummary, Disposition,
    LookupQuery, LookupResult, PipelineConfig, PlatformType, PollReport, PollState,
    SubmissionOutcome, ThreatEntryType, ThreatFilters, ThreatMatch, ThreatType, UrlEntry,
    UrlReport, DEFAULT_MAX_CONCURRENT, DEFAULT_POLL_INTERVAL_MINUTES,
    DEFAULT_POLL_TIMEOUT_MINUTES,
};
pub use utils::{collect_urls, minutes_to_duration, parse_url_lines, MAX_POLL_MINUTES};

// Internal modules - these are not part of the public API
mod concurrent;
mod config;
mod error;
mod observer;
mod orchestrator;
mod poller;
mod protocols;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, BlacklistError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
