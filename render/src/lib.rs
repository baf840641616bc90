//! Headless browser session management.
//!
//! Every scrape owns exactly one [`Session`]: a WebDriver connection with an
//! isolated, uniquely-named temporary profile directory, so concurrent
//! sessions never share browser state. Navigation and waiting are the only
//! suspending operations; everything else is a plain DOM read.

use std::path::PathBuf;
use std::time::Duration;

use thirtyfour::prelude::*;
use thirtyfour::DesiredCapabilities;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("webdriver error: {0}")]
    WebDriver(#[from] WebDriverError),
    #[error("timed out after {timeout:?} waiting for {condition}")]
    WaitTimeout { condition: String, timeout: Duration },
}

/// What to wait for before reading the page.
#[derive(Debug, Clone)]
pub enum WaitCondition {
    /// An element matching the selector is present in the DOM.
    ElementPresent(By),
    /// An element matching the selector is present and clickable.
    Clickable(By),
    /// `document.readyState` is `complete`.
    DocumentReady,
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitCondition::ElementPresent(by) => write!(f, "element {by}"),
            WaitCondition::Clickable(by) => write!(f, "clickable {by}"),
            WaitCondition::DocumentReady => write!(f, "document ready"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// WebDriver endpoint, e.g. a local chromedriver.
    pub webdriver_url: String,
    pub user_agent: Option<String>,
    pub headless: bool,
    pub window_size: (u32, u32),
    pub page_load_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            user_agent: None,
            headless: true,
            window_size: (1920, 1080),
            page_load_timeout: Duration::from_secs(120),
        }
    }
}

/// One owned browser session. Callers must go through [`Session::release`];
/// the temporary profile directory is removed on every exit path, including
/// the error paths of [`Session::acquire`] itself.
pub struct Session {
    driver: WebDriver,
    // Held for its Drop: removing it tears down the profile.
    _profile_dir: tempfile::TempDir,
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

impl Session {
    pub async fn acquire(options: &SessionOptions) -> Result<Session, RenderError> {
        let profile_dir = tempfile::Builder::new()
            .prefix("vigil-profile-")
            .tempdir()
            .map_err(|e| WebDriverError::CustomError(format!("profile dir: {e}")))?;

        let mut caps = DesiredCapabilities::chrome();
        if options.headless {
            caps.add_arg("--headless")?;
        }
        caps.add_arg("--disable-gpu")?;
        caps.set_no_sandbox()?;
        caps.set_disable_dev_shm_usage()?;
        caps.add_arg(&format!("--window-size={},{}", options.window_size.0, options.window_size.1))?;
        caps.add_arg(&format!("--user-data-dir={}", profile_dir.path().display()))?;
        if let Some(user_agent) = &options.user_agent {
            caps.add_arg(&format!("--user-agent={user_agent}"))?;
        }

        // the profile dir is removed by Drop if this fails
        let driver = WebDriver::new(&options.webdriver_url, caps).await?;
        driver.set_page_load_timeout(options.page_load_timeout).await?;

        log::debug!("session acquired, profile {}", profile_dir.path().display());

        Ok(Session {
            driver,
            _profile_dir: profile_dir,
        })
    }

    pub async fn navigate(&self, url: &url::Url) -> Result<(), RenderError> {
        log::info!("navigating to {url}");
        self.driver.goto(url.as_str()).await?;
        Ok(())
    }

    /// Wait for a condition with an independent timeout. Expiry yields
    /// [`RenderError::WaitTimeout`], never a hang.
    pub async fn wait_for(&self, condition: WaitCondition, timeout: Duration) -> Result<(), RenderError> {
        let timed_out = || RenderError::WaitTimeout {
            condition: condition.to_string(),
            timeout,
        };

        match &condition {
            WaitCondition::ElementPresent(by) => {
                self.driver
                    .query(by.clone())
                    .wait(timeout, POLL_INTERVAL)
                    .first()
                    .await
                    .map_err(|_| timed_out())?;
            }
            WaitCondition::Clickable(by) => {
                let element = self
                    .driver
                    .query(by.clone())
                    .wait(timeout, POLL_INTERVAL)
                    .first()
                    .await
                    .map_err(|_| timed_out())?;
                element
                    .wait_until()
                    .wait(timeout, POLL_INTERVAL)
                    .clickable()
                    .await
                    .map_err(|_| timed_out())?;
            }
            WaitCondition::DocumentReady => {
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    let state = self.driver.execute("return document.readyState", Vec::new()).await?;
                    if state.json().as_str() == Some("complete") {
                        break;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(timed_out());
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
        Ok(())
    }

    /// Snapshot of the current DOM, rendered as page source.
    pub async fn page_source(&self) -> Result<String, RenderError> {
        Ok(self.driver.source().await?)
    }

    /// Persist the current page source for offline inspection; used when an
    /// expected DOM structure never showed up. Returns the snapshot path.
    pub async fn capture_snapshot(&self, label: &str) -> Result<PathBuf, RenderError> {
        let source = self.page_source().await?;
        let path = std::env::temp_dir().join(format!("vigil-{label}.html"));
        if let Err(e) = std::fs::write(&path, source) {
            log::warn!("unable to persist snapshot {}: {e}", path.display());
        } else {
            log::info!("page snapshot saved to {}", path.display());
        }
        Ok(path)
    }

    pub async fn find_all(&self, by: By) -> Result<Vec<WebElement>, RenderError> {
        Ok(self.driver.find_all(by).await?)
    }

    /// Direct access for element-level reads and clicks.
    pub fn driver(&self) -> &WebDriver {
        &self.driver
    }

    /// Quit the browser and remove the temporary profile.
    pub async fn release(self) {
        if let Err(e) = self.driver.quit().await {
            log::warn!("browser session did not quit cleanly: {e}");
        }
        // _profile_dir dropped here
    }
}

/// Fixed settle delay after an interaction, for pages that re-render
/// client-side without any observable load signal.
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wait_condition_labels() {
        let condition = WaitCondition::ElementPresent(By::Css("tr.rowRepeat"));
        assert!(condition.to_string().contains("tr.rowRepeat"));
    }

    #[test]
    fn default_options() {
        let options = SessionOptions::default();
        assert!(options.headless);
        assert_eq!(options.window_size, (1920, 1080));
    }
}
