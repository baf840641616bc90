//! Severity enrichment against the NVD CVE database.
//!
//! Lookups fail soft: a missing API key, a rate limit, a network error or an
//! absent record all degrade to [`Enrichment::unknown`] instead of
//! propagating, so one dead lookup never blocks a scrape. The cache wrapper
//! guarantees at most one outbound call per identifier per run and spaces
//! calls out to stay polite against the shared rate limit.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::Mutex;
use tokio::time::Instant;

use vigil_model::Severity;

use crate::schema::{QueryResponse, Vulnerability};

pub mod schema;

const NVD_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// Default courtesy spacing between outbound NVD calls.
pub const DEFAULT_CALL_INTERVAL: Duration = Duration::from_millis(600);

/// What an identifier lookup produced. All fields degrade independently.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub score: Option<f64>,
    pub severity: Severity,
    pub mitigation: Option<String>,
}

impl Enrichment {
    pub fn unknown() -> Self {
        Self {
            score: None,
            severity: Severity::Unknown,
            mitigation: None,
        }
    }
}

impl From<&Vulnerability> for Enrichment {
    fn from(vuln: &Vulnerability) -> Self {
        let metric = vuln.cve.primary_metric();
        let score = metric.map(|m| m.cvss_data.base_score);
        let severity = metric
            .and_then(|m| m.cvss_data.base_severity.as_deref())
            .and_then(Severity::from_label)
            .or(score.map(Severity::from_score))
            .unwrap_or(Severity::Unknown);

        Self {
            score,
            severity,
            mitigation: vuln.cve.mitigation().map(|m| m.to_string()),
        }
    }
}

pub struct NvdClient {
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl NvdClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get_cve(&self, cve_id: &str) -> Result<Option<Vulnerability>, anyhow::Error> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => return Ok(None),
        };

        let response = self
            .client
            .get(Url::parse(NVD_URL)?)
            .header("apiKey", api_key)
            .query(&[("cveId", cve_id)])
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() != 200 {
            return Ok(None);
        }

        let mut response: QueryResponse = response.json().await?;

        Ok(response.vulnerabilities.pop())
    }

    /// Fail-soft lookup. Never errors.
    pub async fn enrich(&self, cve_id: &str) -> Enrichment {
        if self.api_key.is_none() {
            log::debug!("no NVD API key configured, skipping enrichment for {cve_id}");
            return Enrichment::unknown();
        }
        match self.get_cve(cve_id).await {
            Ok(Some(vuln)) => Enrichment::from(&vuln),
            Ok(None) => {
                log::info!("no NVD record for {cve_id}");
                Enrichment::unknown()
            }
            Err(e) => {
                log::warn!("NVD lookup failed for {cve_id}: {e}");
                Enrichment::unknown()
            }
        }
    }
}

struct CacheState {
    memo: HashMap<String, Enrichment>,
    last_call: Option<Instant>,
}

/// Per-run memoizing wrapper. Holding the lock across the outbound call
/// serializes lookups, which is what makes both the at-most-once and the
/// inter-call spacing guarantees hold.
pub struct EnrichmentCache {
    client: NvdClient,
    min_interval: Duration,
    state: Mutex<CacheState>,
}

impl EnrichmentCache {
    pub fn new(client: NvdClient) -> Self {
        Self::with_interval(client, DEFAULT_CALL_INTERVAL)
    }

    pub fn with_interval(client: NvdClient, min_interval: Duration) -> Self {
        Self {
            client,
            min_interval,
            state: Mutex::new(CacheState {
                memo: HashMap::new(),
                last_call: None,
            }),
        }
    }

    pub async fn lookup(&self, cve_id: &str) -> Enrichment {
        let mut state = self.state.lock().await;
        if let Some(hit) = state.memo.get(cve_id) {
            return hit.clone();
        }

        if self.client.has_key() {
            if let Some(last) = state.last_call {
                let elapsed = last.elapsed();
                if elapsed < self.min_interval {
                    tokio::time::sleep(self.min_interval - elapsed).await;
                }
            }
            state.last_call = Some(Instant::now());
        }

        let enrichment = self.client.enrich(cve_id).await;
        state.memo.insert(cve_id.to_string(), enrichment.clone());
        enrichment
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const STUB_RESPONSE: &str = r#"
    {
        "vulnerabilities": [
            {
                "cve": {
                    "id": "CVE-2025-23254",
                    "descriptions": [
                        { "lang": "en", "value": "A vulnerability. Mitigation: upgrade." }
                    ],
                    "metrics": {
                        "cvssMetricV31": [
                            {
                                "source": "nvd@nist.gov",
                                "cvssData": {
                                    "baseScore": 9.8,
                                    "baseSeverity": "CRITICAL",
                                    "vectorString": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
                                }
                            }
                        ]
                    }
                }
            }
        ]
    }
    "#;

    #[test]
    fn stubbed_response_maps_to_critical() {
        let response: QueryResponse = serde_json::from_str(STUB_RESPONSE).unwrap();
        let enrichment = Enrichment::from(&response.vulnerabilities[0]);

        assert_eq!(enrichment.severity, Severity::Critical);
        assert_eq!(enrichment.score, Some(9.8));
        assert!(enrichment.mitigation.unwrap().contains("upgrade"));
    }

    #[test]
    fn score_only_metric_maps_via_thresholds() {
        let json = r#"
        {
            "vulnerabilities": [
                {
                    "cve": {
                        "id": "CVE-2020-0001",
                        "metrics": {
                            "cvssMetricV2": [
                                { "cvssData": { "baseScore": 7.5 } }
                            ]
                        }
                    }
                }
            ]
        }
        "#;
        let response: QueryResponse = serde_json::from_str(json).unwrap();
        let enrichment = Enrichment::from(&response.vulnerabilities[0]);

        assert_eq!(enrichment.severity, Severity::High);
        assert_eq!(enrichment.score, Some(7.5));
    }

    #[tokio::test]
    async fn missing_key_degrades_to_unknown() {
        let client = NvdClient::new(None);
        let enrichment = client.enrich("CVE-2025-23254").await;
        assert_eq!(enrichment, Enrichment::unknown());
    }

    #[tokio::test]
    async fn cache_memoizes_within_a_run() {
        let cache = EnrichmentCache::with_interval(NvdClient::new(None), Duration::ZERO);
        let first = cache.lookup("CVE-2025-23254").await;
        let second = cache.lookup("CVE-2025-23254").await;
        assert_eq!(first, second);
        assert_eq!(cache.state.lock().await.memo.len(), 1);
    }

    // Live lookup, only when a key is configured in the environment.
    #[tokio::test]
    async fn get_valid() -> Result<(), anyhow::Error> {
        let api_key = match std::env::var("NVD_API_KEY") {
            Ok(key) => key,
            Err(_) => return Ok(()),
        };
        let vuln = NvdClient::new(Some(api_key)).get_cve("CVE-2019-1010218").await?;
        assert!(vuln.is_some());
        Ok(())
    }
}
