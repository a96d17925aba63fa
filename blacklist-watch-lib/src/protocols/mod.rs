//! Collaborator interfaces and their network implementations.
//!
//! The pipeline only talks to authorities through `ThreatLookup` and to the
//! reporting target through `RemediationAgent`. The submodules provide the
//! HTTP-backed implementations used by the CLI.

use crate::error::BlacklistError;
use crate::types::{Authority, LookupResult, SubmissionOutcome, UrlEntry};
use async_trait::async_trait;

/// Threat-intelligence lookup API client
pub mod safe_browsing;

/// Report-form submission over HTTP
pub mod report_form;

#[cfg(test)]
mod test_server;

pub use report_form::FormSubmissionAgent;
pub use safe_browsing::{parse_find_response, SafeBrowsingClient};

/// Answers "is this URL in the blacklist?" for a given authority.
///
/// Each call is independent; implementations must not cache.
#[async_trait]
pub trait ThreatLookup: Send + Sync {
    /// Look up a single URL.
    ///
    /// # Errors
    ///
    /// Returns a lookup failure (`BlacklistError::is_lookup_failure`) on a
    /// non-success status or transport error. Callers treat that as
    /// "no information", never as a match.
    async fn lookup(
        &self,
        url: &UrlEntry,
        authority: Authority,
    ) -> Result<LookupResult, BlacklistError>;
}

/// Reports a URL to an authority for inclusion in its blacklist.
///
/// Called only after the most recent lookup for `url` returned no match.
/// Implementations use an independent session per call and may take
/// several seconds.
#[async_trait]
pub trait RemediationAgent: Send + Sync {
    async fn submit(&self, url: &UrlEntry) -> SubmissionOutcome;
}
