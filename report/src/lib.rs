//! Canonical table export: CSV serialization and mailed reports.

use std::path::PathBuf;
use std::process::ExitCode;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use vigil_model::{Advisory, DateField, Severity, Vendor};

/// Canonical CSV column order. Every vendor populates a subset; absent
/// values render as "N/A".
pub const HEADER: &[&str] = &[
    "OEM Name",
    "Vulnerability",
    "Description",
    "Published Date",
    "Last Updated",
    "Unique ID",
    "URL",
    "Severity Level",
    "CVSS Score",
    "Affected Versions",
    "Unaffected Versions",
    "Product Name",
    "Product Version",
];

const NA: &str = "N/A";

fn cell(value: Option<&str>) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => NA.to_string(),
    }
}

pub fn to_csv(advisories: &[Advisory]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for advisory in advisories {
        writer.write_record([
            advisory.vendor.oem_name().to_string(),
            advisory.title.clone(),
            cell(advisory.description.as_deref()),
            advisory.published.to_string(),
            advisory.last_updated.to_string(),
            cell(advisory.identifier.as_deref()),
            cell(advisory.url.as_deref()),
            advisory.severity.to_string(),
            advisory.cvss_score.map(|s| s.to_string()).unwrap_or_else(|| NA.to_string()),
            cell(advisory.affected_versions.as_deref()),
            cell(advisory.unaffected_versions.as_deref()),
            cell(advisory.product_name.as_deref()),
            cell(advisory.product_version.as_deref()),
        ])?;
    }
    Ok(String::from_utf8(writer.into_inner()?)?)
}

fn uncell(value: &str) -> Option<String> {
    if value.trim().is_empty() || value == NA {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn from_csv(reader: impl std::io::Read) -> anyhow::Result<Vec<Advisory>> {
    let mut reader = csv::Reader::from_reader(reader);
    let header = reader.headers()?.clone();
    let index = |name: &str| header.iter().position(|column| column == name);

    let columns: Vec<Option<usize>> = HEADER.iter().map(|name| index(name)).collect();
    let field = |record: &csv::StringRecord, i: usize| -> String {
        columns[i]
            .and_then(|at| record.get(at))
            .unwrap_or(NA)
            .to_string()
    };

    let mut advisories = Vec::new();
    for record in reader.records() {
        let record = record?;
        let vendor: Vendor = field(&record, 0)
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let mut advisory = Advisory::new(vendor, field(&record, 1));
        advisory.description = uncell(&field(&record, 2));
        advisory.published = DateField::parse(&field(&record, 3));
        advisory.last_updated = DateField::parse(&field(&record, 4));
        advisory.identifier = uncell(&field(&record, 5));
        advisory.url = uncell(&field(&record, 6));
        advisory.severity = field(&record, 7).parse().unwrap_or(Severity::Unknown);
        advisory.cvss_score = field(&record, 8).parse().ok();
        advisory.affected_versions = uncell(&field(&record, 9));
        advisory.unaffected_versions = uncell(&field(&record, 10));
        advisory.product_name = uncell(&field(&record, 11));
        advisory.product_version = uncell(&field(&record, 12));
        advisories.push(advisory);
    }
    Ok(advisories)
}

#[derive(clap::Args, Debug, Clone)]
pub struct MailConfig {
    #[arg(env = "VIGIL_SMTP_HOST", long = "smtp-host")]
    pub smtp_host: String,

    #[arg(env = "VIGIL_SMTP_PORT", long = "smtp-port", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(env = "VIGIL_SMTP_USERNAME", long = "smtp-username")]
    pub smtp_username: String,

    #[arg(env = "VIGIL_SMTP_PASSWORD", long = "smtp-password", hide_env_values = true)]
    pub smtp_password: String,

    /// Sender address for outgoing reports.
    #[arg(env = "VIGIL_SMTP_FROM", long = "smtp-from")]
    pub from: String,
}

pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();
        Ok(Self {
            transport,
            from: config.from.parse()?,
        })
    }

    /// Send the canonical table as a CSV attachment with the fixed report
    /// subject and body.
    pub async fn send_report(&self, recipient: &str, oem: &str, csv: String) -> anyhow::Result<()> {
        let body = format!(
            "Dear recipient,\n\nAttached is the vulnerability report for {oem}.\n\nBest regards,\nVigil"
        );
        let attachment = Attachment::new(format!("vulnerability_report_{oem}.csv"))
            .body(csv.into_bytes(), ContentType::parse("text/csv")?);

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient.parse()?)
            .subject(format!("Vulnerability Report - {oem}"))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(body))
                    .singlepart(attachment),
            )?;

        self.transport.send(message).await?;
        log::info!("report for {oem} sent to {recipient}");
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
#[command(about = "Mail a previously exported advisory table", args_conflicts_with_subcommands = true)]
pub struct Run {
    /// Canonical CSV file to send.
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(short, long)]
    pub recipient: String,

    /// Label used in the report subject and attachment name.
    #[arg(long, default_value = "all-vendors")]
    pub oem: String,

    #[command(flatten)]
    pub mail: MailConfig,
}

impl Run {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let file = std::fs::File::open(&self.input)?;
        let advisories = from_csv(file)?;
        if advisories.is_empty() {
            log::warn!("{} holds no advisories, sending anyway", self.input.display());
        }

        let csv = to_csv(&advisories)?;
        Mailer::new(&self.mail)?.send_report(&self.recipient, &self.oem, csv).await?;

        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use vigil_model::DateField;

    fn sample() -> Advisory {
        let mut advisory = Advisory::new(Vendor::PaloAlto, "CVE-2025-0128 PAN-OS issue");
        advisory.identifier = Some("CVE-2025-0128".into());
        advisory.severity = Severity::Medium;
        advisory.cvss_score = Some(5.3);
        advisory.published = DateField::parse("2025-04-09");
        advisory.affected_versions = Some("< 11.2.3".into());
        advisory.unaffected_versions = Some(">= 11.2.3".into());
        advisory.product_name = Some("Cloud NGFW, PAN-OS 11.2".into());
        advisory
    }

    #[test]
    fn csv_roundtrip_keeps_the_record() {
        let csv = to_csv(&[sample()]).unwrap();
        assert!(csv.starts_with("OEM Name,"));
        assert!(csv.contains("Palo Alto Networks"));

        let parsed = from_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed, vec![sample()]);
    }

    #[test]
    fn unknown_date_survives_export() {
        let mut advisory = sample();
        advisory.published = DateField::Unknown("mid 2025".into());
        let csv = to_csv(&[advisory]).unwrap();
        let parsed = from_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed[0].published, DateField::Unknown("mid 2025".into()));
    }

    #[test]
    fn empty_table_serializes_to_header_only() {
        let csv = to_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(from_csv(csv.as_bytes()).unwrap().is_empty());
    }
}
