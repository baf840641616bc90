//! Continuous watch over the vendor listings.
//!
//! Scrapes on a fixed interval, keeps only severities worth waking someone
//! for, and mails a report containing advisories not seen in any earlier
//! cycle. State is in memory only; a restart re-reports the current page
//! contents once.

use std::collections::HashSet;
use std::process::ExitCode;
use std::time::Duration;

use vigil_enrichment::{EnrichmentCache, NvdClient};
use vigil_model::{Advisory, Severity, Vendor};
use vigil_normalize::{filter_by_severity, normalize};
use vigil_render::SessionOptions;
use vigil_report::{MailConfig, Mailer};
use vigil_scraper::{for_vendor, run_scrape, USER_AGENT};

/// Severities that trigger an alert cycle.
pub const ALERT_SEVERITIES: &[Severity] = &[Severity::Critical, Severity::High];

/// Dedup keys of advisories already reported in earlier cycles.
#[derive(Debug, Default)]
pub struct SeenIdentifiers {
    keys: HashSet<String>,
}

impl SeenIdentifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only advisories not reported before, and remember them.
    pub fn fresh(&mut self, advisories: Vec<Advisory>) -> Vec<Advisory> {
        advisories
            .into_iter()
            .filter(|advisory| self.keys.insert(advisory.dedup_key()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(clap::Args, Debug)]
#[command(about = "Watch vendor listings and mail newly published advisories", args_conflicts_with_subcommands = true)]
pub struct Run {
    /// Vendors to watch; repeatable. Defaults to all of them.
    #[arg(long = "vendor", value_enum)]
    pub vendors: Vec<Vendor>,

    /// Time between scrape cycles.
    #[arg(long, default_value = "1h")]
    pub interval: humantime::Duration,

    #[arg(env = "VIGIL_WEBDRIVER_URL", long, default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// NVD API key for severity enrichment; enrichment is skipped without it.
    #[arg(env = "NVD_API_KEY", long)]
    pub nvd_api_key: Option<String>,

    /// Where alert reports go.
    #[arg(short, long)]
    pub recipient: String,

    /// Overall per-vendor deadline, e.g. "5m".
    #[arg(long)]
    pub scrape_timeout: Option<humantime::Duration>,

    #[command(flatten)]
    pub mail: MailConfig,
}

impl Run {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let vendors: Vec<Vendor> = if self.vendors.is_empty() {
            Vendor::ALL.to_vec()
        } else {
            self.vendors.clone()
        };

        let mailer = Mailer::new(&self.mail)?;
        let options = SessionOptions {
            webdriver_url: self.webdriver_url.clone(),
            user_agent: Some(USER_AGENT.to_string()),
            ..SessionOptions::default()
        };
        let cache = EnrichmentCache::new(NvdClient::new(self.nvd_api_key.clone()));
        let deadline = self.scrape_timeout.map(Into::into);
        let mut seen = SeenIdentifiers::new();

        log::info!(
            "watching {} vendors every {}, alerting {} to {}",
            vendors.len(),
            self.interval,
            ALERT_SEVERITIES.iter().map(ToString::to_string).collect::<Vec<_>>().join("/"),
            self.recipient
        );

        let mut ticker = tokio::time::interval(self.interval.into());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    log::info!("shutting down after {} reported advisories", seen.len());
                    return Ok(ExitCode::SUCCESS);
                }
            }

            if let Err(e) = cycle(&vendors, &options, &cache, deadline, &mut seen, &mailer, &self.recipient).await {
                // a failed cycle must not stop the watch
                log::error!("monitor cycle failed: {e:#}");
            }
        }
    }
}

async fn cycle(
    vendors: &[Vendor],
    options: &SessionOptions,
    cache: &EnrichmentCache,
    deadline: Option<Duration>,
    seen: &mut SeenIdentifiers,
    mailer: &Mailer,
    recipient: &str,
) -> anyhow::Result<()> {
    let mut table = Vec::new();
    for &vendor in vendors {
        let scraper = for_vendor(vendor);
        let url = scraper.default_url();
        let rows = run_scrape(scraper.as_ref(), &url, options, cache, false, deadline).await;
        table.extend(normalize(&rows, vendor));
    }

    let alerts = seen.fresh(filter_by_severity(&table, ALERT_SEVERITIES));
    if alerts.is_empty() {
        log::info!("cycle complete, nothing new out of {} advisories", table.len());
        return Ok(());
    }

    log::info!("cycle found {} new high-impact advisories", alerts.len());
    let csv = vigil_report::to_csv(&alerts)?;
    mailer.send_report(recipient, "new-advisories", csv).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use vigil_model::Advisory;

    fn advisory(vendor: Vendor, id: &str) -> Advisory {
        let mut advisory = Advisory::new(vendor, format!("{id} issue"));
        advisory.identifier = Some(id.to_string());
        advisory
    }

    #[test]
    fn fresh_drops_previously_seen_rows() {
        let mut seen = SeenIdentifiers::new();

        let first = seen.fresh(vec![
            advisory(Vendor::Cisco, "CVE-2025-0001"),
            advisory(Vendor::Cisco, "CVE-2025-0002"),
        ]);
        assert_eq!(first.len(), 2);

        let second = seen.fresh(vec![
            advisory(Vendor::Cisco, "CVE-2025-0002"),
            advisory(Vendor::Cisco, "CVE-2025-0003"),
        ]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].identifier.as_deref(), Some("CVE-2025-0003"));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn same_identifier_from_two_vendors_is_two_rows() {
        let mut seen = SeenIdentifiers::new();
        let rows = seen.fresh(vec![
            advisory(Vendor::Cisco, "CVE-2025-0001"),
            advisory(Vendor::Dell, "CVE-2025-0001"),
        ]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn duplicates_inside_one_batch_collapse() {
        let mut seen = SeenIdentifiers::new();
        let rows = seen.fresh(vec![
            advisory(Vendor::Intel, "INTEL-SA-01234"),
            advisory(Vendor::Intel, "INTEL-SA-01234"),
        ]);
        assert_eq!(rows.len(), 1);
    }
}
