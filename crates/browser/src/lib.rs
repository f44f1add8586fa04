//! Shared headless Chrome controller.
//!
//! One Chrome instance is started per runtime and shared read-only across
//! sessions; each operation opens its own tab and closes it on completion.
//! The session manager owns the controller's lifecycle — skills only borrow
//! it.

use std::sync::{Arc, Mutex};

use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser not started")]
    NotStarted,

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("page extraction failed: {0}")]
    ExtractionFailed(String),
}

/// Browser configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub enabled: bool,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
        }
    }
}

/// Manages a headless Chrome/Chromium instance.
pub struct Controller {
    cfg: BrowserConfig,
    browser: Mutex<Option<Arc<Browser>>>,
}

impl Controller {
    /// Create a controller. Chrome is not launched until `start`.
    pub fn new(cfg: BrowserConfig) -> Self {
        Self {
            cfg,
            browser: Mutex::new(None),
        }
    }

    /// Launch Chrome. A no-op when disabled or already started.
    pub async fn start(&self) -> Result<(), BrowserError> {
        if !self.cfg.enabled {
            return Ok(());
        }
        {
            let guard = self.browser.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_some() {
                return Ok(());
            }
        }

        let headless = self.cfg.headless;
        let browser = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .sandbox(false)
                .build()
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
            Browser::new(options).map_err(|e| BrowserError::LaunchFailed(e.to_string()))
        })
        .await
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))??;

        info!("Started headless browser");
        let mut guard = self.browser.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Arc::new(browser));
        Ok(())
    }

    /// Shut Chrome down. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut guard = self.browser.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            debug!("Stopped headless browser");
        }
    }

    pub fn is_running(&self) -> bool {
        self.browser
            .lock()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    fn handle(&self) -> Result<Arc<Browser>, BrowserError> {
        self.browser
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(BrowserError::NotStarted)
    }

    /// Go to a URL and extract the page's visible text.
    pub async fn navigate_and_extract(&self, url: &str) -> Result<String, BrowserError> {
        let browser = self.handle()?;
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            tab.navigate_to(&url)
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            let body = tab
                .wait_for_element("body")
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            let text = body
                .get_inner_text()
                .map_err(|e| BrowserError::ExtractionFailed(e.to_string()))?;
            if let Err(e) = tab.close(true) {
                warn!(error = %e, "Failed to close browser tab");
            }
            Ok(collapse_whitespace(&text))
        })
        .await
        .map_err(|e| BrowserError::ExtractionFailed(e.to_string()))?
    }

    /// Capture a PNG screenshot of a URL.
    pub async fn screenshot(&self, url: &str) -> Result<Vec<u8>, BrowserError> {
        let browser = self.handle()?;
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            tab.navigate_to(&url)
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            tab.wait_for_element("body")
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            let png = tab
                .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| BrowserError::ExtractionFailed(e.to_string()))?;
            if let Err(e) = tab.close(true) {
                warn!(error = %e, "Failed to close browser tab");
            }
            Ok(png)
        })
        .await
        .map_err(|e| BrowserError::ExtractionFailed(e.to_string()))?
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drop blank lines and trim the rest.
fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
