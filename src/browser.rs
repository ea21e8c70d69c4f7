use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::time::Duration;
use thirtyfour::prelude::*;
use tracing::{debug, info};

use crate::extract::{PageEvent, PageSession};
use crate::models::ApplicationRecord;

const USER_AGENT: &str = concat!("jobtrack/", env!("CARGO_PKG_VERSION"));

/// One-shot page download for boards that render server-side.
pub struct PageFetcher {
    client: reqwest::blocking::Client,
}

impl PageFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn fetch(&self, url: &str) -> Result<String> {
        println!("Fetching {}...", url);
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow!("{} returned status {}", url, response.status()));
        }

        let body = response.text().context("Failed to read page body")?;
        debug!(url, bytes = body.len(), "page fetched");
        Ok(body)
    }
}

/// Drives a real browser through WebDriver and re-extracts whenever the tab's
/// URL changes, which is how single-page boards (LinkedIn, Indeed) swap jobs.
pub struct SpaWatcher {
    pub webdriver_url: String,
    /// Wait after a URL change before reading the DOM, so the new job has
    /// rendered.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
}

impl SpaWatcher {
    /// Opens `start_url` and watches until Ctrl-C. `on_candidate` sees each
    /// new page's candidate as the previous one is dropped.
    pub fn watch<F>(&self, start_url: &str, on_candidate: F) -> Result<()>
    where
        F: FnMut(&ApplicationRecord) -> Result<()>,
    {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
        runtime.block_on(self.watch_async(start_url, on_candidate))
    }

    async fn watch_async<F>(&self, start_url: &str, mut on_candidate: F) -> Result<()>
    where
        F: FnMut(&ApplicationRecord) -> Result<()>,
    {
        let caps = DesiredCapabilities::chrome();
        let driver = WebDriver::new(self.webdriver_url.as_str(), caps)
            .await
            .with_context(|| format!("Failed to reach WebDriver at {}. Is chromedriver running?", self.webdriver_url))?;

        println!("Navigating to: {}", start_url);
        driver.goto(start_url).await.context("Failed to navigate to start URL")?;

        let mut session = PageSession::new();
        let result = tokio::select! {
            r = Self::poll_loop(&driver, &mut session, self.settle_delay, self.poll_interval, &mut on_candidate) => r,
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping watcher...");
                Ok(())
            }
        };

        driver.quit().await.context("Failed to close browser session")?;
        result
    }

    async fn poll_loop<F>(
        driver: &WebDriver,
        session: &mut PageSession,
        settle_delay: Duration,
        poll_interval: Duration,
        on_candidate: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&ApplicationRecord) -> Result<()>,
    {
        loop {
            let url = driver.current_url().await?.to_string();
            if session.url_changed(&url) {
                debug!(url, "url changed, waiting for content");
                tokio::time::sleep(settle_delay).await;

                // The page may have moved again while settling.
                let url = driver.current_url().await?.to_string();
                let html = driver.source().await?;
                match session.observe(&url, &html, Utc::now()) {
                    PageEvent::Navigated { candidate: Some(record) } => {
                        info!(id = %record.id, "job detected");
                        on_candidate(&record)?;
                    }
                    PageEvent::Navigated { candidate: None } => {
                        println!("No job posting recognized at {}", url);
                    }
                    PageEvent::Unchanged => {}
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires network access
    fn test_fetch_page() {
        let fetcher = PageFetcher::new().expect("Failed to create fetcher");
        let body = fetcher.fetch("https://jobs.lever.co/").expect("fetch failed");
        assert!(!body.trim().is_empty());
    }
}
