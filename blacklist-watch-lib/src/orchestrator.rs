//! Batch orchestration: lookup, remediation, background confirmation.
//!
//! For each URL, in input order, the primary authority is asked whether the
//! URL is already flagged. A hit ends processing for that URL. A miss (or a
//! failed lookup) triggers one submission through the `RemediationAgent`,
//! after which a confirmation poll is spawned in the background and the next
//! URL is processed. Once every URL has been through that first phase, the
//! orchestrator waits for all polls to reach a terminal state.

use crate::concurrent::ConcurrencyLimiter;
use crate::error::BlacklistError;
use crate::observer::{PipelineEvent, PipelineObserver, TracingObserver};
use crate::poller::ConfirmationPoller;
use crate::protocols::{FormSubmissionAgent, RemediationAgent, SafeBrowsingClient, ThreatLookup};
use crate::types::{
    Authorities, Authority, BatchReport, Disposition, LookupResult, PipelineConfig, PollReport,
    SubmissionOutcome, UrlEntry, UrlReport,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Drives a batch of URLs through lookup, submission and confirmation.
///
/// # Example
///
/// ```rust,no_run
/// use blacklist_watch_lib::{Authorities, AuthorityEndpoint, PipelineConfig, PipelineOrchestrator, UrlEntry};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let authorities = Authorities {
///         primary: AuthorityEndpoint::new("https://safebrowsing.googleapis.com/v4/threatMatches:find")
///             .with_api_key("KEY"),
///         confirmation: AuthorityEndpoint::new("http://127.0.0.1:8080/v4/threatMatches:find"),
///     };
///     let orchestrator = PipelineOrchestrator::with_http_collaborators(
///         PipelineConfig::default(),
///         authorities,
///         "https://report.example/submit",
///     )?;
///
///     let report = orchestrator
///         .run_batch(vec![UrlEntry::parse("https://bad.example")?])
///         .await?;
///     println!("{:?}", report.summary());
///     Ok(())
/// }
/// ```
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    lookup: Arc<dyn ThreatLookup>,
    agent: Arc<dyn RemediationAgent>,
    observer: Arc<dyn PipelineObserver>,
    limiter: ConcurrencyLimiter,
    poller: ConfirmationPoller,
}

/// One URL's background confirmation poll.
struct PipelineTask {
    url: UrlEntry,
    submission: SubmissionOutcome,
    handle: JoinHandle<PollReport>,
}

impl PipelineTask {
    async fn join(mut self) -> Result<UrlReport, BlacklistError> {
        let poll = (&mut self.handle).await.map_err(|e| {
            BlacklistError::internal(format!("confirmation poll for {} failed: {}", self.url, e))
        })?;
        self.into_report(poll)
    }

    /// A URL's disposition only counts once its poll is terminal.
    fn into_report(self, poll: PollReport) -> Result<UrlReport, BlacklistError> {
        if !poll.state.is_terminal() {
            return Err(BlacklistError::internal(format!(
                "confirmation poll for {} ended while still pending",
                self.url
            )));
        }

        Ok(UrlReport {
            url: self.url,
            disposition: Disposition::Polled {
                submission: self.submission,
                poll,
            },
        })
    }
}

/// Outcome of the first phase for one URL.
enum Slot {
    Done(UrlReport),
    Polling(PipelineTask),
}

impl PipelineOrchestrator {
    /// Create an orchestrator that logs through `TracingObserver`.
    ///
    /// The permit pool is sized from `config.max_concurrent` and shared by
    /// the first-lookup phase, submissions and every background poll.
    pub fn new(
        config: PipelineConfig,
        lookup: Arc<dyn ThreatLookup>,
        agent: Arc<dyn RemediationAgent>,
    ) -> Self {
        let limiter = ConcurrencyLimiter::new(config.max_concurrent);
        let observer: Arc<dyn PipelineObserver> = Arc::new(TracingObserver);
        let poller = ConfirmationPoller::new(lookup.clone(), limiter.clone(), observer.clone());

        Self {
            config,
            lookup,
            agent,
            observer,
            limiter,
            poller,
        }
    }

    /// Create an orchestrator backed by the HTTP lookup client and the
    /// report form agent.
    pub fn with_http_collaborators<R: Into<String>>(
        config: PipelineConfig,
        authorities: Authorities,
        report_url: R,
    ) -> Result<Self, BlacklistError> {
        let lookup = Arc::new(SafeBrowsingClient::with_config(authorities, &config)?);
        let agent = Arc::new(FormSubmissionAgent::with_config(report_url, &config));
        Ok(Self::new(config, lookup, agent))
    }

    /// Replace the event observer.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.poller =
            ConfirmationPoller::new(self.lookup.clone(), self.limiter.clone(), observer.clone());
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Process a batch and wait for every URL to reach a terminal disposition.
    ///
    /// Results come back in input order. Already-flagged URLs are reported to
    /// the observer as soon as their lookup completes, without waiting for
    /// other URLs' polls. The final join has no timeout of its own; it is
    /// bounded by the poll timeout.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::InvalidInput` for an empty batch, before any
    /// network activity, and `BlacklistError::Internal` if a poll task
    /// panicked.
    pub async fn run_batch(&self, urls: Vec<UrlEntry>) -> Result<BatchReport, BlacklistError> {
        if urls.is_empty() {
            return Err(BlacklistError::invalid_input(
                "No URLs provided. Use --url or --file.",
            ));
        }

        let mut slots = Vec::with_capacity(urls.len());
        for url in urls {
            slots.push(self.process_url(url).await);
        }

        let joined = join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Done(report) => Ok(report),
                Slot::Polling(task) => task.join().await,
            }
        }))
        .await;

        Ok(BatchReport {
            results: joined.into_iter().collect::<Result<Vec<_>, _>>()?,
        })
    }

    /// First phase for one URL: lookup, then either stop or submit and spawn
    /// the confirmation poll.
    async fn process_url(&self, url: UrlEntry) -> Slot {
        let first = self.first_lookup(&url).await;

        if let Some(threat_type) = first.first_threat_type() {
            self.observer.on_event(&PipelineEvent::AlreadyFlagged {
                url: url.clone(),
                threat_type,
            });
            return Slot::Done(UrlReport {
                url,
                disposition: Disposition::AlreadyFlagged { threat_type },
            });
        }

        self.observer
            .on_event(&PipelineEvent::LookupMiss { url: url.clone() });

        let submission = self.submit(&url).await;
        self.observer.on_event(&PipelineEvent::Submitted {
            url: url.clone(),
            outcome: submission.clone(),
        });

        Slot::Polling(self.spawn_poll(url, submission))
    }

    /// Lookup against the primary authority. Failures count as no match.
    async fn first_lookup(&self, url: &UrlEntry) -> LookupResult {
        self.observer.on_event(&PipelineEvent::LookupStarted {
            url: url.clone(),
            authority: Authority::Primary,
        });

        match self
            .limiter
            .run(self.lookup.lookup(url, Authority::Primary))
            .await
            .and_then(|result| result)
        {
            Ok(result) => result,
            Err(error) => {
                self.observer.on_event(&PipelineEvent::LookupFailed {
                    url: url.clone(),
                    authority: Authority::Primary,
                    error: error.to_string(),
                });
                LookupResult::NoMatch
            }
        }
    }

    async fn submit(&self, url: &UrlEntry) -> SubmissionOutcome {
        match self.limiter.run(self.agent.submit(url)).await {
            Ok(outcome) => outcome,
            Err(error) => SubmissionOutcome::failure(error.to_string()),
        }
    }

    fn spawn_poll(&self, url: UrlEntry, submission: SubmissionOutcome) -> PipelineTask {
        self.observer
            .on_event(&PipelineEvent::PollStarted { url: url.clone() });

        let poller = self.poller.clone();
        let poll_url = url.clone();
        let interval = self.config.poll_interval;
        let timeout = self.config.poll_timeout;
        let handle = tokio::spawn(async move {
            poller
                .poll(&poll_url, Authority::Confirmation, interval, timeout)
                .await
        });

        PipelineTask {
            url,
            submission,
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PollState, ThreatMatch, ThreatType};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Primary flags a fixed set; confirmation never matches.
    struct FixedLookup {
        flagged: HashSet<String>,
        primary_calls: AtomicU32,
        confirmation_calls: AtomicU32,
        fail_primary: bool,
    }

    impl FixedLookup {
        fn flagging(urls: &[&str]) -> Self {
            Self {
                flagged: urls.iter().map(|u| u.to_string()).collect(),
                primary_calls: AtomicU32::new(0),
                confirmation_calls: AtomicU32::new(0),
                fail_primary: false,
            }
        }
    }

    #[async_trait]
    impl ThreatLookup for FixedLookup {
        async fn lookup(
            &self,
            url: &UrlEntry,
            authority: Authority,
        ) -> Result<LookupResult, BlacklistError> {
            match authority {
                Authority::Primary => {
                    self.primary_calls.fetch_add(1, Ordering::SeqCst);
                    if self.fail_primary {
                        return Err(BlacklistError::lookup(authority, 500, "boom"));
                    }
                    if self.flagged.contains(url.as_str()) {
                        return Ok(LookupResult::Matches(vec![ThreatMatch {
                            url: url.as_str().to_string(),
                            threat_type: ThreatType::SocialEngineering,
                            platform_type: None,
                        }]));
                    }
                    Ok(LookupResult::NoMatch)
                }
                Authority::Confirmation => {
                    self.confirmation_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(LookupResult::NoMatch)
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingAgent {
        submitted: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl RemediationAgent for RecordingAgent {
        async fn submit(&self, url: &UrlEntry) -> SubmissionOutcome {
            self.submitted.lock().unwrap().push(url.as_str().to_string());
            if self.fail {
                SubmissionOutcome::failure("submit button not found")
            } else {
                SubmissionOutcome::Success
            }
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_poll_interval(Duration::from_secs(60))
            .with_poll_timeout(Duration::from_secs(120))
    }

    fn urls(list: &[&str]) -> Vec<UrlEntry> {
        list.iter().map(|u| UrlEntry::parse(u).unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_is_rejected_before_lookups() {
        let lookup = Arc::new(FixedLookup::flagging(&[]));
        let orchestrator = PipelineOrchestrator::new(
            config(),
            lookup.clone(),
            Arc::new(RecordingAgent::default()),
        );

        let err = orchestrator.run_batch(vec![]).await.unwrap_err();
        assert!(err.is_usage_error());
        assert_eq!(lookup.primary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flagged_url_is_not_submitted_or_polled() {
        let lookup = Arc::new(FixedLookup::flagging(&["https://safe.example"]));
        let agent = Arc::new(RecordingAgent::default());
        let orchestrator = PipelineOrchestrator::new(config(), lookup.clone(), agent.clone());

        let report = orchestrator
            .run_batch(urls(&["https://safe.example"]))
            .await
            .unwrap();

        assert_eq!(
            report.results[0].disposition,
            Disposition::AlreadyFlagged {
                threat_type: ThreatType::SocialEngineering
            }
        );
        assert!(agent.submitted.lock().unwrap().is_empty());
        assert_eq!(lookup.confirmation_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submission_still_polls() {
        let lookup = Arc::new(FixedLookup::flagging(&[]));
        let agent = Arc::new(RecordingAgent {
            fail: true,
            ..RecordingAgent::default()
        });
        let orchestrator = PipelineOrchestrator::new(config(), lookup.clone(), agent.clone());

        let report = orchestrator
            .run_batch(urls(&["https://bad.example"]))
            .await
            .unwrap();

        match &report.results[0].disposition {
            Disposition::Polled { submission, poll } => {
                assert!(!submission.is_success());
                assert_eq!(poll.state, PollState::TimedOut);
                assert_eq!(poll.attempts, 2);
            }
            other => panic!("unexpected disposition: {:?}", other),
        }
        assert_eq!(agent.submitted.lock().unwrap().len(), 1);
        assert_eq!(report.summary().submission_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_lookup_failure_is_treated_as_miss() {
        let lookup = Arc::new(FixedLookup {
            fail_primary: true,
            ..FixedLookup::flagging(&["https://bad.example"])
        });
        let agent = Arc::new(RecordingAgent::default());
        let orchestrator = PipelineOrchestrator::new(config(), lookup, agent.clone());

        let report = orchestrator
            .run_batch(urls(&["https://bad.example"]))
            .await
            .unwrap();

        assert!(matches!(
            report.results[0].disposition,
            Disposition::Polled { .. }
        ));
        assert_eq!(
            agent.submitted.lock().unwrap().as_slice(),
            ["https://bad.example"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let lookup = Arc::new(FixedLookup::flagging(&["https://b.example"]));
        let orchestrator = PipelineOrchestrator::new(
            config(),
            lookup,
            Arc::new(RecordingAgent::default()),
        );

        let input = ["https://a.example", "https://b.example", "https://c.example"];
        let report = orchestrator.run_batch(urls(&input)).await.unwrap();

        let order: Vec<&str> = report.results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(order, input);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_urls_each_get_a_disposition() {
        let lookup = Arc::new(FixedLookup::flagging(&[]));
        let agent = Arc::new(RecordingAgent::default());
        let orchestrator = PipelineOrchestrator::new(config(), lookup, agent.clone());

        let report = orchestrator
            .run_batch(urls(&["https://bad.example", "https://bad.example"]))
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(agent.submitted.lock().unwrap().len(), 2);
    }

    fn task_finishing_with(state: PollState) -> PipelineTask {
        PipelineTask {
            url: UrlEntry::parse("https://bad.example").unwrap(),
            submission: SubmissionOutcome::Success,
            handle: tokio::spawn(async move {
                PollReport {
                    state,
                    attempts: 1,
                    lookup_errors: 0,
                    elapsed: Duration::ZERO,
                }
            }),
        }
    }

    #[tokio::test]
    async fn test_task_join_requires_terminal_state() {
        let err = task_finishing_with(PollState::Pending)
            .join()
            .await
            .unwrap_err();
        assert!(matches!(err, BlacklistError::Internal { .. }));

        let report = task_finishing_with(PollState::TimedOut)
            .join()
            .await
            .unwrap();
        assert!(matches!(
            report.disposition,
            Disposition::Polled { ref poll, .. } if poll.is_timed_out()
        ));
    }
}
