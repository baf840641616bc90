//! Canned questions over the canonical table.
//!
//! A fixed, ordered rule set; the first rule whose precondition matches the
//! question handles it. This is deliberate pattern matching, not language
//! understanding: anything the rules don't recognize gets the fixed
//! fallback message.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::process::ExitCode;

use regex::Regex;

use vigil_model::{Advisory, Severity};

const FALLBACK: &str = "I couldn't understand the question. Please try rephrasing.";

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Rows {
        rows: Vec<Advisory>,
        /// Rows date-based rules could not place, stated instead of
        /// silently dropped.
        note: Option<String>,
    },
    Message(String),
}

impl Answer {
    fn rows(rows: Vec<Advisory>) -> Self {
        Answer::Rows { rows, note: None }
    }
}

/// Newest first; rows without a usable date sort last.
pub fn sort_latest(rows: &mut [Advisory]) {
    rows.sort_by(|a, b| match (a.effective_date(), b.effective_date()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

pub fn answer(question: &str, table: &[Advisory]) -> Answer {
    let question = question.trim().to_lowercase();

    // latest-N
    if question.contains("latest") || question.contains("recent") {
        let n = if question.contains("10") { 10 } else { 5 };
        let mut rows = table.to_vec();
        sort_latest(&mut rows);
        rows.truncate(n);
        return Answer::rows(rows);
    }

    // severity-equals
    for severity in [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Informational,
    ] {
        let level = severity.as_label().to_lowercase();
        if question.contains(&format!("{level} severity")) || question.contains(&format!("{level} vulnerabilities")) {
            let rows = table.iter().filter(|row| row.severity == severity).cloned().collect();
            return Answer::rows(rows);
        }
    }

    let is_identifier = |text: &str| {
        text.starts_with("pan-sa-")
            || Regex::new(r"(?i)cve-\d{4}-\d{4,7}")
                .map(|re| re.is_match(text))
                .unwrap_or(false)
    };

    // free-text "for <product>" match; identifiers fall through to the
    // identifier rule below
    if let Ok(re) = Regex::new(r"for\s+(.+)") {
        if let Some(capture) = re.captures(&question) {
            let subject = capture[1].trim().to_string();
            if !is_identifier(&subject) {
                let rows = table
                    .iter()
                    .filter(|row| {
                        row.product_name
                            .as_deref()
                            .map(|name| name.to_lowercase().contains(&subject))
                            .unwrap_or(false)
                            || row.title.to_lowercase().contains(&subject)
                    })
                    .cloned()
                    .collect();
                return Answer::rows(rows);
            }
        }
    }

    // identifier match
    if let Ok(re) = Regex::new(r"(?i)(cve-\d{4}-\d{4,7}|pan-sa-\d{4}-\d{4})") {
        if let Some(found) = re.find(&question).map(|m| m.as_str().to_string()) {
            let rows = table
                .iter()
                .filter(|row| {
                    row.identifier
                        .as_deref()
                        .map(|id| id.to_lowercase().contains(&found))
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            return Answer::rows(rows);
        }
    }

    // date-after-year
    if let Some(capture) = Regex::new(r"after\s+(\d{4})").ok().and_then(|re| re.captures(&question).map(|c| c[1].to_string())) {
        if let Ok(year) = capture.parse::<i32>() {
            let cutoff = chrono::NaiveDate::from_ymd_opt(year, 1, 1);
            let (rows, unknown): (Vec<_>, Vec<_>) = table.iter().cloned().partition(|row| row.effective_date().is_some());
            let rows: Vec<Advisory> = rows
                .into_iter()
                .filter(|row| row.effective_date() > cutoff)
                .collect();
            let note = if unknown.is_empty() {
                None
            } else {
                Some(format!("{} rows have unknown dates and were not compared", unknown.len()))
            };
            return Answer::Rows { rows, note };
        }
    }

    Answer::Message(FALLBACK.to_string())
}

#[derive(clap::Args, Debug)]
#[command(about = "Ask a canned question of an exported advisory table", args_conflicts_with_subcommands = true)]
pub struct Run {
    /// Canonical CSV file to query.
    #[arg(short, long)]
    pub input: PathBuf,

    /// The question, e.g. "latest 5 advisories" or "critical severity".
    pub question: String,
}

impl Run {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let file = std::fs::File::open(&self.input)?;
        let table = vigil_report::from_csv(file)?;

        match answer(&self.question, &table) {
            Answer::Rows { rows, note } => {
                print!("{}", vigil_report::to_csv(&rows)?);
                if let Some(note) = note {
                    eprintln!("note: {note}");
                }
            }
            Answer::Message(message) => println!("{message}"),
        }

        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use vigil_model::{DateField, Vendor};

    fn advisory(title: &str, severity: Severity, date: &str) -> Advisory {
        let mut advisory = Advisory::new(Vendor::Cisco, title);
        advisory.severity = severity;
        advisory.published = DateField::parse(date);
        advisory
    }

    fn table() -> Vec<Advisory> {
        vec![
            advisory("b", Severity::Critical, "2025-05-07"),
            advisory("a", Severity::Medium, "2025-05-08"),
            advisory("c", Severity::Critical, "2025-05-07"),
            advisory("d", Severity::High, "someday"),
        ]
    }

    #[test]
    fn latest_sorts_unknown_dates_last() {
        match answer("show the latest advisories", &table()) {
            Answer::Rows { rows, .. } => {
                assert_eq!(rows.len(), 4);
                assert_eq!(rows[0].title, "a");
                assert_eq!(rows[3].title, "d");
            }
            other => panic!("unexpected answer: {other:?}"),
        }
    }

    #[test]
    fn latest_ten_changes_the_cut() {
        let mut many = Vec::new();
        for day in 1..=20 {
            many.push(advisory(&format!("t{day}"), Severity::Low, &format!("2025-04-{day:02}")));
        }
        match answer("latest 10 advisories", &many) {
            Answer::Rows { rows, .. } => {
                assert_eq!(rows.len(), 10);
                assert_eq!(rows[0].title, "t20");
            }
            other => panic!("unexpected answer: {other:?}"),
        }
    }

    #[test]
    fn severity_rule_is_exact() {
        match answer("critical severity vulnerabilities", &table()) {
            Answer::Rows { rows, .. } => {
                assert_eq!(rows.len(), 2);
                assert!(rows.iter().all(|row| row.severity == Severity::Critical));
            }
            other => panic!("unexpected answer: {other:?}"),
        }
    }

    #[test]
    fn identifier_rule_beats_the_product_rule() {
        let mut rows = table();
        rows[0].identifier = Some("CVE-2025-0128".into());
        match answer("details for CVE-2025-0128", &rows) {
            Answer::Rows { rows, .. } => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].identifier.as_deref(), Some("CVE-2025-0128"));
            }
            other => panic!("unexpected answer: {other:?}"),
        }
    }

    #[test]
    fn product_rule_searches_names_and_titles() {
        let mut rows = table();
        rows[1].product_name = Some("Prisma Access Browser".into());
        match answer("vulnerabilities for prisma access", &rows) {
            Answer::Rows { rows, .. } => assert_eq!(rows.len(), 1),
            other => panic!("unexpected answer: {other:?}"),
        }
    }

    #[test]
    fn after_year_reports_unknown_dates() {
        match answer("advisories after 2024", &table()) {
            Answer::Rows { rows, note } => {
                assert_eq!(rows.len(), 3);
                assert_eq!(note.unwrap(), "1 rows have unknown dates and were not compared");
            }
            other => panic!("unexpected answer: {other:?}"),
        }
    }

    #[test]
    fn unmatched_questions_get_the_fixed_message() {
        assert_eq!(
            answer("what is the meaning of life", &table()),
            Answer::Message(FALLBACK.into())
        );
    }
}
