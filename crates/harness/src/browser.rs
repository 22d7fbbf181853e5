//! Browser session management - launching and releasing headless Chrome

use std::path::Path;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Handle to a running browser process and its CDP connection.
///
/// The session is exclusively owned by the test runner for the run's
/// duration. Dropping the handle aborts the CDP drain task; the browser
/// process itself is reaped by the underlying driver.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    closed: bool,
}

impl BrowserSession {
    /// Launch a browser instance per the harness configuration
    pub async fn launch(config: &HarnessConfig) -> Result<Self> {
        info!(headless = config.headless, "launching browser");

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(1440, 900);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(HarnessError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| HarnessError::BrowserLaunch(e.to_string()))?;

        // Drain the CDP WebSocket; event listeners starve without this.
        let handler_task = tokio::spawn(async move {
            while let Some(res) = handler.next().await {
                if res.is_err() {
                    debug!("CDP handler loop ended");
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            closed: false,
        })
    }

    /// Open a fresh page
    pub async fn new_page(&self) -> Result<Page> {
        Ok(self.browser.new_page("about:blank").await?)
    }

    /// Write a PNG screenshot of the page's current viewport to `path`
    pub async fn screenshot_to(page: &Page, path: &Path) -> Result<()> {
        let bytes = page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .build(),
            )
            .await?;
        std::fs::write(path, bytes)?;
        debug!(path = %path.display(), "screenshot written");
        Ok(())
    }

    /// Shut the browser down. Best-effort; safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.browser.close().await {
            warn!("error closing browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("error waiting for browser exit: {}", e);
        }
        self.handler_task.abort();
        info!("browser session released");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Async close may not have run on fatal paths; at minimum stop
        // the drain task. The driver kills the child process on drop.
        self.handler_task.abort();
    }
}
