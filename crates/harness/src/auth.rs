//! Authentication against the application's login view

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Performs one login attempt against the page.
///
/// Retry policy lives in the runner; this type only knows how to drive
/// the login form once and report failure.
pub struct Authenticator<'a> {
    page: &'a Page,
    config: &'a HarnessConfig,
}

impl<'a> Authenticator<'a> {
    pub fn new(page: &'a Page, config: &'a HarnessConfig) -> Self {
        Self { page, config }
    }

    /// Navigate to the application root and log in.
    ///
    /// Short-circuits when the session is already past the login
    /// boundary (e.g. a persisted session cookie).
    pub async fn attempt_login(&self) -> Result<()> {
        self.page.goto(self.config.base_url.as_str()).await?;
        self.page.wait_for_navigation().await?;

        if self.is_logged_in().await {
            info!("already authenticated, skipping login");
            return Ok(());
        }

        let selectors = &self.config.login;
        debug!("filling login form");

        let identifier = self.page.find_element(selectors.identifier.as_str()).await?;
        identifier.click().await?;
        identifier.type_str(self.config.username.as_str()).await?;

        let password = self.page.find_element(selectors.password.as_str()).await?;
        password.click().await?;
        password.type_str(self.config.password.as_str()).await?;

        self.page
            .find_element(selectors.submit.as_str())
            .await?
            .click()
            .await?;

        self.wait_for_redirect().await
    }

    async fn is_logged_in(&self) -> bool {
        match self.page.url().await {
            Ok(Some(url)) => url.contains(&self.config.login.post_login_prefix),
            _ => false,
        }
    }

    /// Wait for the post-login redirect, bounded by the page-load timeout
    async fn wait_for_redirect(&self) -> Result<()> {
        let deadline = Duration::from_millis(self.config.page_load_timeout_ms);
        let start = Instant::now();

        while start.elapsed() < deadline {
            if self.is_logged_in().await {
                info!("authenticated");
                return Ok(());
            }
            sleep(Duration::from_millis(250)).await;
        }

        Err(HarnessError::Timeout {
            what: "post-login redirect".to_string(),
            ms: self.config.page_load_timeout_ms,
        })
    }
}
