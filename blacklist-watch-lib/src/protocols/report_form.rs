//! Report submission through a plain HTML form endpoint.
//!
//! Posts the threat category and the URL as an urlencoded form, the same
//! fields a person would fill in on the report page. Each submission builds
//! its own HTTP client so no cookies or connections are shared between URLs.

use crate::error::BlacklistError;
use crate::protocols::RemediationAgent;
use crate::types::{PipelineConfig, SubmissionOutcome, ThreatType, UrlEntry};
use async_trait::async_trait;
use std::time::Duration;

/// Submits URLs to a report form endpoint.
#[derive(Debug, Clone)]
pub struct FormSubmissionAgent {
    /// Form action URL
    target_url: String,
    /// Category selected on the form
    category: ThreatType,
    /// Per-request timeout
    timeout: Duration,
    /// Pause after the submit action before reporting success
    settle: Duration,
}

impl FormSubmissionAgent {
    pub fn new<T: Into<String>>(target_url: T) -> Self {
        Self {
            target_url: target_url.into(),
            category: ThreatType::SocialEngineering,
            timeout: Duration::from_secs(10),
            settle: Duration::from_secs(1),
        }
    }

    /// Take the category from the first configured threat type and the
    /// settle delay from configuration.
    pub fn with_config<T: Into<String>>(target_url: T, config: &PipelineConfig) -> Self {
        let category = config
            .filters
            .threat_types
            .iter()
            .next()
            .copied()
            .unwrap_or(ThreatType::SocialEngineering);

        Self {
            category,
            settle: config.submit_settle,
            timeout: config.lookup_timeout,
            ..Self::new(target_url)
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    fn form_fields(&self, url: &UrlEntry) -> [(&'static str, String); 2] {
        [
            ("category", self.category.to_string()),
            ("url", url.as_str().to_string()),
        ]
    }
}

impl FormSubmissionAgent {
    async fn post_form(&self, url: &UrlEntry) -> Result<(), BlacklistError> {
        let session = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| {
                BlacklistError::submission(url.as_str(), format!("could not open session: {}", e))
            })?;

        let response = session
            .post(&self.target_url)
            .form(&self.form_fields(url))
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    "report page timed out".to_string()
                } else {
                    format!("submit request failed: {}", e)
                };
                BlacklistError::submission(url.as_str(), message)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlacklistError::submission(
                url.as_str(),
                format!("report target returned HTTP {}", status.as_u16()),
            ));
        }

        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

#[async_trait]
impl RemediationAgent for FormSubmissionAgent {
    async fn submit(&self, url: &UrlEntry) -> SubmissionOutcome {
        match self.post_form(url).await {
            Ok(()) => SubmissionOutcome::Success,
            Err(e) => SubmissionOutcome::failure(e.to_string()),
        }
    }
}
