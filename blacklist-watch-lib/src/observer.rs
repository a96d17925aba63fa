//! Structured pipeline events.
//!
//! The pipeline never writes log lines itself. It reports what happened to a
//! `PipelineObserver`; `TracingObserver` turns those reports into `tracing`
//! records, and callers may plug in their own observer (progress UI,
//! metrics, tests).

use crate::types::{Authority, SubmissionOutcome, ThreatType, UrlEntry};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Something observable that happened while processing a URL.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A lookup is about to be sent
    LookupStarted { url: UrlEntry, authority: Authority },
    /// A lookup failed and is being treated as "no information"
    LookupFailed {
        url: UrlEntry,
        authority: Authority,
        error: String,
    },
    /// First lookup matched; no remediation needed
    AlreadyFlagged {
        url: UrlEntry,
        threat_type: ThreatType,
    },
    /// First lookup found nothing; remediation follows
    LookupMiss { url: UrlEntry },
    /// Remediation finished, successfully or not
    Submitted {
        url: UrlEntry,
        outcome: SubmissionOutcome,
    },
    /// A background confirmation poll was started
    PollStarted { url: UrlEntry },
    /// The confirmation authority now lists the URL
    PollConfirmed {
        url: UrlEntry,
        threat_type: Option<ThreatType>,
        attempts: u32,
        elapsed: Duration,
    },
    /// The poll deadline passed without a match
    PollTimedOut {
        url: UrlEntry,
        attempts: u32,
        lookup_errors: u32,
        elapsed: Duration,
    },
}

impl PipelineEvent {
    pub fn url(&self) -> &UrlEntry {
        match self {
            PipelineEvent::LookupStarted { url, .. }
            | PipelineEvent::LookupFailed { url, .. }
            | PipelineEvent::AlreadyFlagged { url, .. }
            | PipelineEvent::LookupMiss { url }
            | PipelineEvent::Submitted { url, .. }
            | PipelineEvent::PollStarted { url }
            | PipelineEvent::PollConfirmed { url, .. }
            | PipelineEvent::PollTimedOut { url, .. } => url,
        }
    }
}

/// Receives pipeline events. Called from whichever task produced the event.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::LookupStarted { url, authority } => {
                info!(url = %url, authority = %authority, "looking up URL");
            }
            PipelineEvent::LookupFailed {
                url,
                authority,
                error,
            } => {
                warn!(url = %url, authority = %authority, error = %error, "lookup failed");
            }
            PipelineEvent::AlreadyFlagged { url, threat_type } => {
                debug!(url = %url, threat_type = %threat_type, "lookup matched");
                info!(url = %url, "URL already flagged");
            }
            PipelineEvent::LookupMiss { url } => {
                info!(url = %url, "no match, submitting for review");
            }
            PipelineEvent::Submitted { url, outcome } => match outcome {
                SubmissionOutcome::Success => info!(url = %url, "submission succeeded"),
                SubmissionOutcome::Failure { reason } => {
                    error!(url = %url, reason = %reason, "submission failed");
                }
            },
            PipelineEvent::PollStarted { url } => {
                debug!(url = %url, "confirmation poll started");
            }
            PipelineEvent::PollConfirmed {
                url,
                threat_type,
                attempts,
                elapsed,
            } => {
                let threat_type = threat_type.map(|t| t.to_string()).unwrap_or_default();
                info!(
                    url = %url,
                    threat_type = %threat_type,
                    attempts,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "URL now present in blacklist"
                );
            }
            PipelineEvent::PollTimedOut {
                url,
                attempts,
                lookup_errors,
                elapsed,
            } => {
                info!(
                    url = %url,
                    attempts,
                    lookup_errors,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "poll timed out, URL not in blacklist"
                );
            }
        }
    }
}
