//! Fixed-interval confirmation polling.
//!
//! After a URL has been submitted, the confirmation authority is asked again
//! every `interval` until it reports a match or `timeout` has elapsed. This
//! is the only unbounded-duration operation in the pipeline, so the
//! orchestrator always runs it as a spawned task.

use crate::concurrent::ConcurrencyLimiter;
use crate::observer::{PipelineEvent, PipelineObserver};
use crate::protocols::ThreatLookup;
use crate::types::{Authority, PollReport, PollState, UrlEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Repeatedly looks a URL up until it is confirmed or the deadline passes.
///
/// Cheap to clone; clones share the lookup client, permit pool and observer.
#[derive(Clone)]
pub struct ConfirmationPoller {
    lookup: Arc<dyn ThreatLookup>,
    limiter: ConcurrencyLimiter,
    observer: Arc<dyn PipelineObserver>,
}

impl ConfirmationPoller {
    pub fn new(
        lookup: Arc<dyn ThreatLookup>,
        limiter: ConcurrencyLimiter,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            lookup,
            limiter,
            observer,
        }
    }

    /// Poll `authority` for `url` until it matches or `timeout` elapses.
    ///
    /// The first lookup is made immediately. After a miss, the next lookup
    /// is scheduled only if it would start before the deadline; otherwise
    /// the poll waits out the remaining time and ends `TimedOut`. So a
    /// timeout of zero, or one shorter than the interval, makes exactly one
    /// attempt. A match ends the poll at once without further sleeping.
    ///
    /// Lookup failures count as "not yet confirmed" and never end the poll
    /// early. Each lookup holds a limiter permit; sleeps do not.
    pub async fn poll(
        &self,
        url: &UrlEntry,
        authority: Authority,
        interval: Duration,
        timeout: Duration,
    ) -> PollReport {
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut lookup_errors = 0u32;

        loop {
            attempts += 1;
            self.observer.on_event(&PipelineEvent::LookupStarted {
                url: url.clone(),
                authority,
            });

            match self
                .limiter
                .run(self.lookup.lookup(url, authority))
                .await
                .and_then(|result| result)
            {
                Ok(result) if result.is_match() => {
                    let elapsed = start.elapsed();
                    self.observer.on_event(&PipelineEvent::PollConfirmed {
                        url: url.clone(),
                        threat_type: result.first_threat_type(),
                        attempts,
                        elapsed,
                    });
                    return PollReport {
                        state: PollState::Confirmed(result),
                        attempts,
                        lookup_errors,
                        elapsed,
                    };
                }
                Ok(_) => {}
                Err(error) => {
                    lookup_errors += 1;
                    self.observer.on_event(&PipelineEvent::LookupFailed {
                        url: url.clone(),
                        authority,
                        error: error.to_string(),
                    });
                }
            }

            let elapsed = start.elapsed();
            if elapsed.saturating_add(interval) >= timeout {
                tokio::time::sleep(timeout.saturating_sub(elapsed)).await;
                let elapsed = start.elapsed();
                self.observer.on_event(&PipelineEvent::PollTimedOut {
                    url: url.clone(),
                    attempts,
                    lookup_errors,
                    elapsed,
                });
                return PollReport {
                    state: PollState::TimedOut,
                    attempts,
                    lookup_errors,
                    elapsed,
                };
            }

            tokio::time::sleep(interval).await;
        }
    }
}
