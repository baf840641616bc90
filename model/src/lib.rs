use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod columns;

/// The vendors we know how to harvest advisories from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Cisco,
    Intel,
    Nvidia,
    Dell,
    Adobe,
    PaloAlto,
}

impl Vendor {
    pub const ALL: [Vendor; 6] = [
        Vendor::Cisco,
        Vendor::Intel,
        Vendor::Nvidia,
        Vendor::Dell,
        Vendor::Adobe,
        Vendor::PaloAlto,
    ];

    /// Short lowercase name, used for file names and log labels.
    pub fn slug(&self) -> &'static str {
        match self {
            Vendor::Cisco => "cisco",
            Vendor::Intel => "intel",
            Vendor::Nvidia => "nvidia",
            Vendor::Dell => "dell",
            Vendor::Adobe => "adobe",
            Vendor::PaloAlto => "paloalto",
        }
    }

    /// The name the vendor uses for itself, as shown in the `OEM Name` column.
    pub fn oem_name(&self) -> &'static str {
        match self {
            Vendor::Cisco => "Cisco",
            Vendor::Intel => "Intel",
            Vendor::Nvidia => "NVIDIA",
            Vendor::Dell => "Dell",
            Vendor::Adobe => "Adobe",
            Vendor::PaloAlto => "Palo Alto Networks",
        }
    }
}

impl Display for Vendor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.oem_name())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "cisco" => Ok(Vendor::Cisco),
            "intel" => Ok(Vendor::Intel),
            "nvidia" => Ok(Vendor::Nvidia),
            "dell" => Ok(Vendor::Dell),
            "adobe" => Ok(Vendor::Adobe),
            "paloalto" | "paloaltonetworks" => Ok(Vendor::PaloAlto),
            other => Err(format!("unknown vendor: {other}")),
        }
    }
}

/// Qualitative severity. Canonical records carry one of these, never raw
/// vendor text.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Informational,
    Unknown,
}

impl Severity {
    /// Exact (case-insensitive) match against the five real levels. Garbage
    /// never maps to `Unknown` here, it simply does not match.
    pub fn from_label(label: &str) -> Option<Severity> {
        match label.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" | "moderate" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "informational" => Some(Severity::Informational),
            _ => None,
        }
    }

    /// CVSS base score to qualitative level, fixed thresholds.
    pub fn from_score(score: f64) -> Severity {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Informational => "Informational",
            Severity::Unknown => "Unknown",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("unknown") {
            return Ok(Severity::Unknown);
        }
        Severity::from_label(s).ok_or_else(|| format!("unknown severity: {s}"))
    }
}

/// A calendar date as harvested from a vendor page. Vendors format dates
/// inconsistently and sometimes not at all, so an unparseable date keeps its
/// raw text instead of aborting the record, and is distinguishable from a
/// field the page simply did not have.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum DateField {
    Known(NaiveDate),
    Unknown(String),
    Missing,
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%b %d, %Y", "%d-%b-%Y", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"];

impl DateField {
    pub fn parse(raw: &str) -> DateField {
        let raw = raw.trim();
        if raw.is_empty() || raw == "N/A" {
            return DateField::Missing;
        }
        // Some pages append a timestamp, try the date-only prefix too.
        let candidates = [raw, raw.split_whitespace().next().unwrap_or(raw)];
        for candidate in candidates {
            for format in DATE_FORMATS {
                if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                    return DateField::Known(date);
                }
            }
        }
        // "29 Apr 2025" style needs the full string, not the prefix
        if let Ok(date) = NaiveDate::parse_from_str(&raw.replace(',', ""), "%d %b %Y") {
            return DateField::Known(date);
        }
        DateField::Unknown(raw.to_string())
    }

    pub fn known(&self) -> Option<NaiveDate> {
        match self {
            DateField::Known(date) => Some(*date),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, DateField::Known(_))
    }
}

impl Display for DateField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DateField::Known(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DateField::Unknown(raw) => f.write_str(raw),
            DateField::Missing => f.write_str("N/A"),
        }
    }
}

/// The canonical advisory record all vendor extractions converge to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Advisory {
    pub vendor: Vendor,
    pub title: String,
    pub description: Option<String>,
    pub identifier: Option<String>,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub published: DateField,
    pub last_updated: DateField,
    pub url: Option<String>,
    pub affected_versions: Option<String>,
    pub unaffected_versions: Option<String>,
    pub product_name: Option<String>,
    pub product_version: Option<String>,
}

impl Advisory {
    pub fn new(vendor: Vendor, title: impl Into<String>) -> Self {
        Self {
            vendor,
            title: title.into(),
            description: None,
            identifier: None,
            severity: Severity::Unknown,
            cvss_score: None,
            published: DateField::Missing,
            last_updated: DateField::Missing,
            url: None,
            affected_versions: None,
            unaffected_versions: None,
            product_name: None,
            product_version: None,
        }
    }

    /// Natural dedup key: (vendor, identifier) when an identifier is present,
    /// otherwise (vendor, title, url). Identifier-less rows never merge with
    /// each other unless title and url both agree.
    pub fn dedup_key(&self) -> String {
        match &self.identifier {
            Some(id) => format!("{}/{}", self.vendor.oem_name(), id),
            None => format!(
                "{}/{}/{}",
                self.vendor.oem_name(),
                self.title,
                self.url.as_deref().unwrap_or("")
            ),
        }
    }

    /// The date used for "latest N" style ordering: published, falling back
    /// to last updated when the page only carries the latter.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.published.known().or_else(|| self.last_updated.known())
    }
}

/// One harvested row in the vendor's own shape: an ordered list of
/// (vendor column name, raw text) pairs. Cells that failed to extract carry
/// the literal "N/A". The normalizer maps these onto [`Advisory`] fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub vendor: Vendor,
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(vendor: Vendor) -> Self {
        Self { vendor, fields: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// First CVE-style token in a free-text cell, if any. Vendor pages list
/// several per advisory, separated by commas, spaces or newlines.
pub fn first_cve(text: &str) -> Option<String> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .find(|token| token.starts_with("CVE-") && token.len() > "CVE-".len())
        .map(|token| token.trim_end_matches(|c: char| !c.is_ascii_alphanumeric()).to_string())
}
