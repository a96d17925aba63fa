//! Core data types for blacklist lookups and the remediation pipeline.
//!
//! This module defines the main data structures used throughout the library,
//! including lookup queries and results, per-URL dispositions, and pipeline
//! configuration.

use crate::error::BlacklistError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// A single URL read from input.
///
/// Keeps the raw text as given alongside the trimmed form that is
/// actually sent to authorities. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlEntry {
    raw: String,
    normalized: String,
}

impl UrlEntry {
    /// Build an entry from raw user input.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::InvalidUrl` if the trimmed input is empty or
    /// contains whitespace.
    pub fn parse(raw: &str) -> Result<Self, BlacklistError> {
        let normalized = raw.trim();

        if normalized.is_empty() {
            return Err(BlacklistError::invalid_url(raw, "URL cannot be empty"));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(BlacklistError::invalid_url(
                raw,
                "URL cannot contain whitespace",
            ));
        }

        Ok(Self {
            raw: raw.to_string(),
            normalized: normalized.to_string(),
        })
    }

    /// The input exactly as it was read.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The trimmed form used for lookups and submissions.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

impl fmt::Display for UrlEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl Serialize for UrlEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized)
    }
}

/// Threat categories understood by the lookup API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatType {
    SocialEngineering,
    Malware,
    UnwantedSoftware,
    PotentiallyHarmfulApplication,
    ThreatTypeUnspecified,
    /// Any category this library does not know about yet
    #[serde(other)]
    Other,
}

/// Platforms a threat applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformType {
    AnyPlatform,
    AllPlatforms,
    Windows,
    Linux,
    Osx,
    Android,
    Ios,
    #[serde(other)]
    Other,
}

/// Kinds of entries a query can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatEntryType {
    Url,
    Executable,
    #[serde(other)]
    Other,
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreatType::SocialEngineering => "SOCIAL_ENGINEERING",
            ThreatType::Malware => "MALWARE",
            ThreatType::UnwantedSoftware => "UNWANTED_SOFTWARE",
            ThreatType::PotentiallyHarmfulApplication => "POTENTIALLY_HARMFUL_APPLICATION",
            ThreatType::ThreatTypeUnspecified => "THREAT_TYPE_UNSPECIFIED",
            ThreatType::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// The fixed filters sent with every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatFilters {
    pub threat_types: BTreeSet<ThreatType>,
    pub platform_types: BTreeSet<PlatformType>,
    pub entry_types: BTreeSet<ThreatEntryType>,
}

impl Default for ThreatFilters {
    fn default() -> Self {
        Self {
            threat_types: BTreeSet::from([ThreatType::SocialEngineering]),
            platform_types: BTreeSet::from([PlatformType::AnyPlatform]),
            entry_types: BTreeSet::from([ThreatEntryType::Url]),
        }
    }
}

/// A lookup request for one or more URLs.
///
/// Built fresh for every call.
#[derive(Debug, Clone)]
pub struct LookupQuery {
    pub urls: Vec<UrlEntry>,
    pub threat_types: BTreeSet<ThreatType>,
    pub platform_types: BTreeSet<PlatformType>,
    pub entry_types: BTreeSet<ThreatEntryType>,
}

impl LookupQuery {
    pub fn new(urls: Vec<UrlEntry>, filters: &ThreatFilters) -> Self {
        Self {
            urls,
            threat_types: filters.threat_types.clone(),
            platform_types: filters.platform_types.clone(),
            entry_types: filters.entry_types.clone(),
        }
    }

    /// The `threatInfo` request body.
    pub fn to_request_body(&self) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = self
            .urls
            .iter()
            .map(|url| serde_json::json!({ "url": url.as_str() }))
            .collect();

        serde_json::json!({
            "threatInfo": {
                "threatTypes": self.threat_types,
                "platformTypes": self.platform_types,
                "threatEntryTypes": self.entry_types,
                "threatEntries": entries,
            }
        })
    }
}

/// One blacklist hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatMatch {
    pub url: String,
    pub threat_type: ThreatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_type: Option<PlatformType>,
}

/// Point-in-time answer from an authority.
///
/// Authorities are eventually consistent, so two lookups of the same URL
/// may disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupResult {
    NoMatch,
    Matches(Vec<ThreatMatch>),
}

impl LookupResult {
    /// Collapse a possibly empty match list.
    pub fn from_matches(matches: Vec<ThreatMatch>) -> Self {
        if matches.is_empty() {
            LookupResult::NoMatch
        } else {
            LookupResult::Matches(matches)
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, LookupResult::Matches(_))
    }

    pub fn matches(&self) -> &[ThreatMatch] {
        match self {
            LookupResult::NoMatch => &[],
            LookupResult::Matches(matches) => matches,
        }
    }

    /// Threat type of the first match, if any.
    pub fn first_threat_type(&self) -> Option<ThreatType> {
        self.matches().first().map(|m| m.threat_type)
    }

    /// Threat type of the first hit for `url` in a batched result.
    pub fn threat_type_for(&self, url: &str) -> Option<ThreatType> {
        self.matches()
            .iter()
            .find(|m| m.url == url)
            .map(|m| m.threat_type)
    }
}

/// Which authority a lookup goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Checked before deciding to remediate
    Primary,
    /// Polled after remediation to detect propagation
    Confirmation,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authority::Primary => write!(f, "primary"),
            Authority::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// Network location of an authority. Opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityEndpoint {
    pub url: String,
    /// Sent as the `key` query parameter when present
    pub api_key: Option<String>,
}

impl AuthorityEndpoint {
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key<K: Into<String>>(mut self, key: K) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Both authorities; they may point at the same location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorities {
    pub primary: AuthorityEndpoint,
    pub confirmation: AuthorityEndpoint,
}

impl Authorities {
    pub fn endpoint(&self, authority: Authority) -> &AuthorityEndpoint {
        match authority {
            Authority::Primary => &self.primary,
            Authority::Confirmation => &self.confirmation,
        }
    }
}

/// Result of one remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Success,
    Failure { reason: String },
}

impl SubmissionOutcome {
    pub fn failure<R: Into<String>>(reason: R) -> Self {
        SubmissionOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Success)
    }
}

/// Lifecycle of a confirmation poll.
///
/// `Confirmed` and `TimedOut` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Pending,
    Confirmed(LookupResult),
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending)
    }
}

/// Final state of a confirmation poll plus how it got there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub state: PollState,
    /// Lookups performed, including failed ones
    pub attempts: u32,
    /// Lookups that failed outright rather than returning no match
    pub lookup_errors: u32,
    pub elapsed: Duration,
}

impl PollReport {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, PollState::Confirmed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self.state, PollState::TimedOut)
    }
}

/// Terminal outcome for one input URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// The first lookup already matched; nothing was submitted
    AlreadyFlagged { threat_type: ThreatType },
    /// Submitted (successfully or not) and then polled to a terminal state
    Polled {
        submission: SubmissionOutcome,
        poll: PollReport,
    },
}

/// Disposition of a single URL within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlReport {
    pub url: UrlEntry,
    #[serde(flatten)]
    pub disposition: Disposition,
}

/// Aggregate result of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub results: Vec<UrlReport>,
}

/// Counts over a `BatchReport`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub already_flagged: usize,
    pub confirmed: usize,
    pub timed_out: usize,
    pub submission_failures: usize,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.results.len(),
            ..BatchSummary::default()
        };

        for report in &self.results {
            match &report.disposition {
                Disposition::AlreadyFlagged { .. } => summary.already_flagged += 1,
                Disposition::Polled { submission, poll } => {
                    if !submission.is_success() {
                        summary.submission_failures += 1;
                    }
                    if poll.is_confirmed() {
                        summary.confirmed += 1;
                    } else if poll.is_timed_out() {
                        summary.timed_out += 1;
                    }
                }
            }
        }

        summary
    }

    /// Look up the report for a URL (first occurrence).
    pub fn get(&self, url: &str) -> Option<&UrlReport> {
        self.results.iter().find(|r| r.url.as_str() == url)
    }
}

/// Configuration options for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum simultaneous network/browser operations
    /// Default: 16
    pub max_concurrent: usize,

    /// Wait between confirmation lookups
    /// Default: 60 minutes
    pub poll_interval: Duration,

    /// Give up confirming after this long
    /// Default: 14 days
    pub poll_timeout: Duration,

    /// HTTP timeout for a single lookup
    /// Default: 10 seconds
    pub lookup_timeout: Duration,

    /// Pause after triggering a form submission
    /// Default: 1 second
    pub submit_settle: Duration,

    /// Threat/platform/entry filters sent with every lookup
    pub filters: ThreatFilters,
}

pub const DEFAULT_MAX_CONCURRENT: usize = 16;
pub const DEFAULT_POLL_INTERVAL_MINUTES: f64 = 60.0;
pub const DEFAULT_POLL_TIMEOUT_MINUTES: f64 = 14.0 * 24.0 * 60.0;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            poll_interval: Duration::from_secs(60 * 60),
            poll_timeout: Duration::from_secs(14 * 24 * 60 * 60),
            lookup_timeout: Duration::from_secs(10),
            submit_settle: Duration::from_secs(1),
            filters: ThreatFilters::default(),
        }
    }
}

impl PipelineConfig {
    /// Set the concurrency cap. A cap of zero would deadlock, so it is raised to 1.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_submit_settle(mut self, settle: Duration) -> Self {
        self.submit_settle = settle;
        self
    }

    pub fn with_filters(mut self, filters: ThreatFilters) -> Self {
        self.filters = filters;
        self
    }
}
