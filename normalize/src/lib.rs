//! Raw vendor rows to canonical advisories.
//!
//! The extractors hand over rows keyed by the vendor page's own column
//! names. This crate renames them onto the canonical schema, coerces dates
//! through the unknown-safe parser, runs the severity safety net for rows
//! the extractor could not classify, and deduplicates.

use std::collections::HashSet;

use regex::Regex;

use vigil_model::{columns, Advisory, DateField, RawRecord, Severity, Vendor};

/// The NVIDIA bulletin table uses this token where other vendors would put a
/// severity; it is a real statement, not a missing cell, and maps to
/// Informational rather than Unknown.
pub const NOT_AFFECTED: &str = "NVIDIA products are not affected";

const NA: &str = "N/A";

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == NA {
        None
    } else {
        Some(value.to_string())
    }
}

/// Severity of a raw severity cell as set by the extractor, if it managed to
/// set one. When the extractor classified the row, that wins outright.
fn extractor_severity(raw: &str) -> Option<Severity> {
    if raw.trim() == NOT_AFFECTED {
        return Some(Severity::Informational);
    }
    Severity::from_label(raw)
}

/// Safety-net chain for rows the extractor left unclassified: exact label,
/// then a level token buried in free text, then the CVSS threshold mapping,
/// then Unknown.
fn severity_fallback(severity_raw: Option<&str>, description: Option<&str>, score: Option<f64>) -> Severity {
    if let Some(severity) = severity_raw.and_then(Severity::from_label) {
        return severity;
    }
    if let Some(text) = description {
        let token = Regex::new(r"(?i)\b(critical|high|medium|low|informational)\b")
            .ok()
            .and_then(|re| re.find(text).map(|m| m.as_str().to_string()));
        if let Some(severity) = token.as_deref().and_then(Severity::from_label) {
            return severity;
        }
    }
    if let Some(score) = score {
        return Severity::from_score(score);
    }
    Severity::Unknown
}

fn to_advisory(record: &RawRecord, vendor: Vendor) -> Advisory {
    let mut advisory = Advisory::new(vendor, NA);
    let mut severity_raw: Option<String> = None;

    for (name, value) in record.fields() {
        let canonical = match columns::canonical(vendor, name) {
            Some(canonical) => canonical,
            // unknown vendor columns are dropped, not propagated
            None => continue,
        };
        match canonical {
            columns::TITLE => {
                if let Some(title) = non_empty(value) {
                    advisory.title = title;
                }
            }
            columns::DESCRIPTION => advisory.description = non_empty(value),
            columns::IDENTIFIER => advisory.identifier = non_empty(value),
            columns::SEVERITY => severity_raw = Some(value.to_string()),
            columns::CVSS_SCORE => advisory.cvss_score = value.trim().parse::<f64>().ok(),
            columns::PUBLISHED => advisory.published = DateField::parse(value),
            columns::LAST_UPDATED => advisory.last_updated = DateField::parse(value),
            columns::URL => advisory.url = non_empty(value),
            columns::AFFECTED_VERSIONS => advisory.affected_versions = non_empty(value),
            columns::UNAFFECTED_VERSIONS => advisory.unaffected_versions = non_empty(value),
            columns::PRODUCT_NAME => advisory.product_name = non_empty(value),
            columns::PRODUCT_VERSION => advisory.product_version = non_empty(value),
            _ => {}
        }
    }

    advisory.severity = match severity_raw.as_deref().and_then(extractor_severity) {
        Some(severity) => severity,
        None => severity_fallback(
            severity_raw.as_deref(),
            advisory.description.as_deref(),
            advisory.cvss_score,
        ),
    };

    advisory
}

/// Normalize one vendor's harvested rows. Rows are never dropped for bad
/// fields, only for being duplicates of an earlier row. An empty input is a
/// valid input and yields an empty output.
pub fn normalize(records: &[RawRecord], vendor: Vendor) -> Vec<Advisory> {
    let mut seen = HashSet::new();
    let mut advisories = Vec::with_capacity(records.len());

    for record in records {
        let advisory = to_advisory(record, vendor);
        if seen.insert(advisory.dedup_key()) {
            advisories.push(advisory);
        } else {
            log::debug!("dropping duplicate {}", advisory.dedup_key());
        }
    }

    log::info!("{vendor}: normalized {} of {} harvested rows", advisories.len(), records.len());
    advisories
}

/// Keep only rows whose severity is in the allowed set. An empty result is a
/// valid outcome, not an error.
pub fn filter_by_severity(advisories: &[Advisory], allowed: &[Severity]) -> Vec<Advisory> {
    advisories
        .iter()
        .filter(|advisory| allowed.contains(&advisory.severity))
        .cloned()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw(vendor: Vendor, fields: &[(&str, &str)]) -> RawRecord {
        let mut record = RawRecord::new(vendor);
        for (name, value) in fields {
            record.push(*name, *value);
        }
        record
    }

    #[test]
    fn severity_is_always_an_enum_value() {
        let records = vec![
            raw(Vendor::Nvidia, &[("Title", "A"), ("Severity", "High")]),
            raw(Vendor::Nvidia, &[("Title", "B"), ("Severity", "weird text")]),
            raw(Vendor::Nvidia, &[("Title", "C"), ("Severity", NOT_AFFECTED)]),
            raw(Vendor::Nvidia, &[("Title", "D")]),
        ];
        let advisories = normalize(&records, Vendor::Nvidia);

        assert_eq!(advisories.len(), 4);
        assert_eq!(advisories[0].severity, Severity::High);
        assert_eq!(advisories[1].severity, Severity::Unknown);
        assert_eq!(advisories[2].severity, Severity::Informational);
        assert_eq!(advisories[3].severity, Severity::Unknown);
    }

    #[test]
    fn severity_extracted_from_free_text() {
        let records = vec![raw(
            Vendor::Cisco,
            &[
                ("Advisory", "Some advisory"),
                ("Impact", "This has Critical impact on the web UI"),
            ],
        )];
        let advisories = normalize(&records, Vendor::Cisco);
        assert_eq!(advisories[0].severity, Severity::Critical);
    }

    #[test]
    fn severity_from_score_when_no_text_matches() {
        let records = vec![raw(
            Vendor::PaloAlto,
            &[("Summary", "CVE-2025-0128 something"), ("CVSS", "8.2")],
        )];
        let advisories = normalize(&records, Vendor::PaloAlto);
        assert_eq!(advisories[0].severity, Severity::High);
        assert_eq!(advisories[0].cvss_score, Some(8.2));
    }

    #[test]
    fn missing_date_becomes_sentinel_and_row_survives() {
        let records = vec![raw(
            Vendor::Intel,
            &[("Title", "INTEL-SA-1000"), ("Release Date", "not a date at all")],
        )];
        let advisories = normalize(&records, Vendor::Intel);

        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].published, DateField::Unknown("not a date at all".into()));
        assert_eq!(advisories[0].last_updated, DateField::Missing);
    }

    #[test]
    fn dedup_on_identifier_keeps_first() {
        let records = vec![
            raw(Vendor::Dell, &[("Title", "first"), ("Identifier", "CVE-2025-1")]),
            raw(Vendor::Dell, &[("Title", "second"), ("Identifier", "CVE-2025-1")]),
            raw(Vendor::Dell, &[("Title", "third"), ("Identifier", "CVE-2025-2")]),
        ];
        let advisories = normalize(&records, Vendor::Dell);

        assert_eq!(advisories.len(), 2);
        assert_eq!(advisories[0].title, "first");
    }

    #[test]
    fn identifier_less_rows_do_not_merge() {
        let records = vec![
            raw(Vendor::Adobe, &[("Title", "APSB25-01"), ("URL", "https://a")]),
            raw(Vendor::Adobe, &[("Title", "APSB25-02"), ("URL", "https://b")]),
        ];
        assert_eq!(normalize(&records, Vendor::Adobe).len(), 2);
    }

    #[test]
    fn unknown_columns_dropped() {
        let records = vec![raw(Vendor::Dell, &[("Title", "x"), ("Type", "Advisory")])];
        let advisories = normalize(&records, Vendor::Dell);
        assert_eq!(advisories[0].description, None);
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(normalize(&[], Vendor::Cisco).is_empty());
    }

    #[test]
    fn severity_filter_is_exact() {
        let records = vec![
            raw(Vendor::Cisco, &[("Advisory", "a"), ("Severity", "Medium")]),
            raw(Vendor::Cisco, &[("Advisory", "b"), ("Severity", "Critical")]),
            raw(Vendor::Cisco, &[("Advisory", "c"), ("Severity", "Critical")]),
            raw(Vendor::Cisco, &[("Advisory", "d"), ("Severity", "High")]),
        ];
        let advisories = normalize(&records, Vendor::Cisco);
        let critical = filter_by_severity(&advisories, &[Severity::Critical]);

        assert_eq!(critical.len(), 2);
        assert!(critical.iter().all(|advisory| advisory.severity == Severity::Critical));
    }
}
