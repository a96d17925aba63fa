//! Threat-match lookups against a Safe Browsing style API.
//!
//! Both the primary authority and the confirmation authority speak the same
//! `threatMatches:find` protocol: a JSON `threatInfo` request answered by an
//! optional `matches` list. An empty object means no match.

use crate::error::BlacklistError;
use crate::protocols::ThreatLookup;
use crate::types::{
    Authorities, Authority, LookupQuery, LookupResult, PipelineConfig, PlatformType,
    ThreatFilters, ThreatMatch, ThreatType, UrlEntry,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// HTTP client for the threat-match API.
#[derive(Clone)]
pub struct SafeBrowsingClient {
    /// HTTP client for lookup requests
    http_client: reqwest::Client,
    /// Where each authority lives
    authorities: Authorities,
    /// Filters sent with every query
    filters: ThreatFilters,
}

impl SafeBrowsingClient {
    /// Create a client with the default filters and a 10 second timeout.
    pub fn new(authorities: Authorities) -> Result<Self, BlacklistError> {
        Self::with_settings(
            authorities,
            ThreatFilters::default(),
            Duration::from_secs(10),
        )
    }

    /// Create a client from pipeline configuration.
    pub fn with_config(
        authorities: Authorities,
        config: &PipelineConfig,
    ) -> Result<Self, BlacklistError> {
        Self::with_settings(authorities, config.filters.clone(), config.lookup_timeout)
    }

    fn with_settings(
        authorities: Authorities,
        filters: ThreatFilters,
        timeout: Duration,
    ) -> Result<Self, BlacklistError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                BlacklistError::network_with_source(
                    "Failed to create lookup HTTP client",
                    e.to_string(),
                )
            })?;

        Ok(Self {
            http_client,
            authorities,
            filters,
        })
    }

    pub fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    /// Look up many URLs in a single request.
    ///
    /// The result holds every match the authority returned; use
    /// `LookupResult::threat_type_for` to split it per URL.
    pub async fn lookup_batch(
        &self,
        urls: &[UrlEntry],
        authority: Authority,
    ) -> Result<LookupResult, BlacklistError> {
        if urls.is_empty() {
            return Ok(LookupResult::NoMatch);
        }

        let endpoint = self.authorities.endpoint(authority);
        let query = LookupQuery::new(urls.to_vec(), &self.filters);

        let mut request = self.http_client.post(&endpoint.url);
        if let Some(key) = &endpoint.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.json(&query.to_request_body()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BlacklistError::lookup(authority, status.as_u16(), body));
        }

        parse_find_response(&body)
    }
}

#[async_trait]
impl ThreatLookup for SafeBrowsingClient {
    async fn lookup(
        &self,
        url: &UrlEntry,
        authority: Authority,
    ) -> Result<LookupResult, BlacklistError> {
        self.lookup_batch(std::slice::from_ref(url), authority).await
    }
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMatch {
    threat_type: ThreatType,
    #[serde(default)]
    platform_type: Option<PlatformType>,
    threat: WireEntry,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    url: String,
}

/// Parse a `threatMatches:find` response body.
///
/// A missing or empty `matches` list means no match. An empty body is
/// treated the same way, since some servers answer a miss with no content.
pub fn parse_find_response(body: &str) -> Result<LookupResult, BlacklistError> {
    if body.trim().is_empty() {
        return Ok(LookupResult::NoMatch);
    }

    let response: FindResponse =
        serde_json::from_str(body).map_err(|e| BlacklistError::ParseError {
            message: format!("Invalid threat match response: {}", e),
            content: Some(body.chars().take(200).collect()),
        })?;

    let matches = response
        .matches
        .into_iter()
        .map(|m| ThreatMatch {
            url: m.threat.url,
            threat_type: m.threat_type,
            platform_type: m.platform_type,
        })
        .collect();

    Ok(LookupResult::from_matches(matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::test_server::serve_once;
    use crate::types::AuthorityEndpoint;

    fn authorities() -> Authorities {
        Authorities {
            primary: AuthorityEndpoint::new("https://lookup.invalid/v4/threatMatches:find")
                .with_api_key("test-key"),
            confirmation: AuthorityEndpoint::new("http://127.0.0.1:8080/v4/threatMatches:find"),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = SafeBrowsingClient::new(authorities());
        assert!(client.is_ok());
    }

    #[test]
    fn test_parse_empty_object_is_no_match() {
        assert_eq!(parse_find_response("{}").unwrap(), LookupResult::NoMatch);
        assert_eq!(parse_find_response("").unwrap(), LookupResult::NoMatch);
        assert_eq!(
            parse_find_response(r#"{"matches": []}"#).unwrap(),
            LookupResult::NoMatch
        );
    }

    #[test]
    fn test_parse_matches() {
        let body = r#"{
            "matches": [
                {
                    "threatType": "SOCIAL_ENGINEERING",
                    "platformType": "ANY_PLATFORM",
                    "threat": {"url": "https://bad.example/"},
                    "cacheDuration": "300s",
                    "threatEntryType": "URL"
                }
            ]
        }"#;

        let result = parse_find_response(body).unwrap();
        assert!(result.is_match());
        assert_eq!(
            result.first_threat_type(),
            Some(ThreatType::SocialEngineering)
        );
        assert_eq!(
            result.threat_type_for("https://bad.example/"),
            Some(ThreatType::SocialEngineering)
        );
        assert_eq!(result.threat_type_for("https://bad.example"), None);
        assert_eq!(
            result.matches()[0].platform_type,
            Some(PlatformType::AnyPlatform)
        );
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let err = parse_find_response("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, BlacklistError::ParseError { .. }));
        assert!(err.is_lookup_failure());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        let client = SafeBrowsingClient::new(authorities()).unwrap();
        let result = client.lookup_batch(&[], Authority::Primary).await.unwrap();
        assert_eq!(result, LookupResult::NoMatch);
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_lookup_failure() {
        let unreachable = Authorities {
            primary: AuthorityEndpoint::new("http://127.0.0.1:9/v4/threatMatches:find"),
            confirmation: AuthorityEndpoint::new("http://127.0.0.1:9/v4/threatMatches:find"),
        };
        let client = SafeBrowsingClient::new(unreachable).unwrap();
        let url = UrlEntry::parse("https://bad.example").unwrap();

        let err = client.lookup(&url, Authority::Confirmation).await.unwrap_err();
        assert!(err.is_lookup_failure());
    }

    const MATCH_BODY: &str = concat!(
        r#"{"matches":[{"threatType":"SOCIAL_ENGINEERING","platformType":"ANY_PLATFORM","#,
        r#""threat":{"url":"https://bad.example"}}]}"#
    );

    fn local_authorities(base: &str) -> Authorities {
        Authorities {
            primary: AuthorityEndpoint::new(format!("{}/v4/threatMatches:find", base))
                .with_api_key("test-key"),
            confirmation: AuthorityEndpoint::new(format!("{}/v4/threatMatches:find", base)),
        }
    }

    #[tokio::test]
    async fn test_error_status_is_lookup_error_with_body() {
        let (base, server) = serve_once("503 Service Unavailable", "backend unavailable").await;
        let client = SafeBrowsingClient::new(local_authorities(&base)).unwrap();
        let url = UrlEntry::parse("https://bad.example").unwrap();

        let err = client.lookup(&url, Authority::Primary).await.unwrap_err();
        match &err {
            BlacklistError::LookupError {
                authority,
                status,
                body,
            } => {
                assert_eq!(*authority, Authority::Primary);
                assert_eq!(*status, 503);
                assert_eq!(body, "backend unavailable");
            }
            other => panic!("expected LookupError, got {:?}", other),
        }
        assert!(err.is_lookup_failure());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v4/threatMatches:find?key=test-key "));
    }

    #[tokio::test]
    async fn test_match_payload_over_the_wire() {
        let (base, server) = serve_once("200 OK", MATCH_BODY).await;
        let client = SafeBrowsingClient::new(local_authorities(&base)).unwrap();
        let urls = [
            UrlEntry::parse("https://bad.example").unwrap(),
            UrlEntry::parse("https://fine.example").unwrap(),
        ];

        let result = client.lookup_batch(&urls, Authority::Primary).await.unwrap();
        assert_eq!(
            result.threat_type_for("https://bad.example"),
            Some(ThreatType::SocialEngineering)
        );
        assert_eq!(result.threat_type_for("https://fine.example"), None);

        let request = server.await.unwrap();
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        let info = &body["threatInfo"];
        assert_eq!(info["threatTypes"], serde_json::json!(["SOCIAL_ENGINEERING"]));
        assert_eq!(info["platformTypes"], serde_json::json!(["ANY_PLATFORM"]));
        assert_eq!(info["threatEntryTypes"], serde_json::json!(["URL"]));
        assert_eq!(
            info["threatEntries"],
            serde_json::json!([{"url": "https://bad.example"}, {"url": "https://fine.example"}])
        );
    }

    #[tokio::test]
    async fn test_empty_object_over_the_wire_is_no_match() {
        let (base, server) = serve_once("200 OK", "{}").await;
        let client = SafeBrowsingClient::new(local_authorities(&base)).unwrap();
        let url = UrlEntry::parse("https://fine.example").unwrap();

        let result = client.lookup(&url, Authority::Confirmation).await.unwrap();
        assert_eq!(result, LookupResult::NoMatch);

        // The confirmation authority has no API key
        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(!request_line.contains("key="));
    }
}
