//! Per-vendor advisory extraction.
//!
//! Each vendor page gets its own [`VendorScraper`]; every extraction run
//! walks the same state machine: acquire a rendering session, navigate,
//! wait for the vendor's structural load signal, optionally expand
//! client-side pagination, harvest rows, enrich identifiers, and release
//! the session on every exit path. Any failure up to and including a fully
//! unrecognizable page yields an empty row set, never an error to the
//! caller.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use vigil_enrichment::{EnrichmentCache, NvdClient};
use vigil_model::{RawRecord, Severity, Vendor};
use vigil_normalize::{filter_by_severity, normalize};
use vigil_render::{RenderError, Session, SessionOptions};

pub mod vendor;

pub use vendor::for_vendor;

/// Work bound per run; vendor listings are "most recent first", so the cap
/// keeps the freshest rows.
pub const MAX_ROWS: usize = 100;

/// Sent with every session so the vendor pages serve us the same markup
/// they serve a desktop browser.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("expected page structure missing: {0}")]
    Structure(String),
    #[error("scrape exceeded the {0:?} deadline")]
    Deadline(Duration),
}

#[async_trait]
pub trait VendorScraper: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn default_url(&self) -> Url;

    /// Wait for the vendor's load signal, expand pagination where the page
    /// has any, and read the repeated record structure. Row-level problems
    /// degrade fields to "N/A"; only a wholly unexpected page errors.
    async fn harvest(&self, session: &Session, cache: &EnrichmentCache) -> Result<Vec<RawRecord>, ScrapeError>;
}

/// Drive one extraction run. Failures are absorbed here: the caller always
/// gets a row set, possibly empty, and the session is always released.
pub async fn run_scrape(
    scraper: &dyn VendorScraper,
    url: &Url,
    options: &SessionOptions,
    cache: &EnrichmentCache,
    snapshot_on_failure: bool,
    deadline: Option<Duration>,
) -> Vec<RawRecord> {
    let vendor = scraper.vendor();

    let session = match Session::acquire(options).await {
        Ok(session) => session,
        Err(e) => {
            log::error!("{vendor}: unable to acquire a browser session: {e}");
            return Vec::new();
        }
    };

    let work = async {
        session.navigate(url).await?;
        scraper.harvest(&session, cache).await
    };

    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Deadline(limit)),
        },
        None => work.await,
    };

    let rows = match result {
        Ok(rows) => {
            log::info!("{vendor}: harvested {} rows", rows.len());
            rows
        }
        Err(e) => {
            log::error!("{vendor}: scrape failed: {e}");
            if snapshot_on_failure {
                let _ = session.capture_snapshot(&format!("{}-failure", vendor.slug())).await;
            }
            Vec::new()
        }
    };

    session.release().await;
    rows
}

#[derive(clap::Args, Debug)]
#[command(about = "Scrape vendor advisory listings into the canonical table", args_conflicts_with_subcommands = true)]
pub struct Run {
    /// Vendors to scrape; repeatable. Defaults to all of them.
    #[arg(long = "vendor", value_enum)]
    pub vendors: Vec<Vendor>,

    /// Override the listing URL; requires exactly one --vendor.
    #[arg(long)]
    pub url: Option<Url>,

    #[arg(env = "VIGIL_WEBDRIVER_URL", long, default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// NVD API key for severity enrichment; enrichment is skipped without it.
    #[arg(env = "NVD_API_KEY", long)]
    pub nvd_api_key: Option<String>,

    /// Keep only these severities; repeatable. Default keeps everything.
    #[arg(long = "severity", value_enum)]
    pub severities: Vec<Severity>,

    /// Write the canonical CSV here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Persist a page snapshot when a page fails structurally.
    #[arg(long, default_value_t = false)]
    pub snapshots: bool,

    /// Overall per-vendor deadline, e.g. "5m".
    #[arg(long)]
    pub scrape_timeout: Option<humantime::Duration>,
}

impl Run {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let vendors: Vec<Vendor> = if self.vendors.is_empty() {
            Vendor::ALL.to_vec()
        } else {
            self.vendors.clone()
        };
        if self.url.is_some() && vendors.len() != 1 {
            anyhow::bail!("--url requires exactly one --vendor");
        }

        let options = SessionOptions {
            webdriver_url: self.webdriver_url.clone(),
            user_agent: Some(USER_AGENT.to_string()),
            ..SessionOptions::default()
        };
        let cache = EnrichmentCache::new(NvdClient::new(self.nvd_api_key.clone()));
        let deadline = self.scrape_timeout.map(Into::into);

        let mut table = Vec::new();
        for vendor in vendors {
            let scraper = for_vendor(vendor);
            let url = match &self.url {
                Some(url) => url.clone(),
                None => scraper.default_url(),
            };
            let rows = run_scrape(scraper.as_ref(), &url, &options, &cache, self.snapshots, deadline).await;
            if rows.is_empty() {
                log::warn!("{vendor}: no data");
            }
            table.extend(normalize(&rows, vendor));
        }

        if !self.severities.is_empty() {
            table = filter_by_severity(&table, &self.severities);
        }

        let csv = vigil_report::to_csv(&table)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, csv)?;
                log::info!("wrote {} advisories to {}", table.len(), path.display());
            }
            None => print!("{csv}"),
        }

        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_urls_parse() {
        for vendor in Vendor::ALL {
            let scraper = for_vendor(vendor);
            assert_eq!(scraper.vendor(), vendor);
            assert!(scraper.default_url().scheme().starts_with("http"));
        }
    }
}
