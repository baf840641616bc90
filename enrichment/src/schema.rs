//! The subset of the NVD CVE API v2.0 response we consume.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub cve: Cve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cve {
    pub id: String,
    #[serde(default)]
    pub descriptions: Vec<LangString>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LangString {
    pub lang: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default)]
    pub cvss_metric_v31: Vec<CvssMetric>,
    #[serde(default)]
    pub cvss_metric_v30: Vec<CvssMetric>,
    #[serde(default)]
    pub cvss_metric_v2: Vec<CvssMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssMetric {
    #[serde(default)]
    pub source: Option<String>,
    pub cvss_data: CvssData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssData {
    pub base_score: f64,
    #[serde(default)]
    pub base_severity: Option<String>,
    #[serde(default)]
    pub vector_string: Option<String>,
}

impl Cve {
    /// Preferred metric: v3.1, then v3.0, then v2.
    pub fn primary_metric(&self) -> Option<&CvssMetric> {
        let metrics = self.metrics.as_ref()?;
        metrics
            .cvss_metric_v31
            .first()
            .or_else(|| metrics.cvss_metric_v30.first())
            .or_else(|| metrics.cvss_metric_v2.first())
    }

    /// First English description mentioning a mitigation, if any.
    pub fn mitigation(&self) -> Option<&str> {
        self.descriptions
            .iter()
            .filter(|d| d.lang == "en")
            .map(|d| d.value.as_str())
            .find(|value| value.to_lowercase().contains("mitigation"))
    }
}
