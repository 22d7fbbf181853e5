//! Menu navigation: driving the page through the target list
//!
//! One navigator is bound to the run's single page. Navigation is
//! serialized by the orchestrator; the navigator never issues commands
//! from a background task, so error attribution ("what page am I on")
//! stays unambiguous.

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::signal::{NavigationResult, PageProbe};

/// Probe script: counts visible tables, inputs and clickable elements
/// and how many of each are usable. Per-element checks are wrapped so an
/// element detaching mid-check (async re-render) counts as
/// non-interactive instead of aborting the whole probe.
const PROBE_JS: &str = r#"
(() => {
  const visible = (el) => {
    try {
      const r = el.getBoundingClientRect();
      const s = window.getComputedStyle(el);
      return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
    } catch (e) {
      return false;
    }
  };
  const out = { tables: 0, tablesWithRows: 0, inputs: 0, inputsEnabled: 0, buttons: 0, buttonsEnabled: 0 };
  for (const t of document.querySelectorAll('table, [role="table"], [role="grid"]')) {
    try {
      if (!visible(t)) continue;
      out.tables++;
      if (t.querySelector('tbody tr, [role="row"]')) out.tablesWithRows++;
    } catch (e) {}
  }
  for (const i of document.querySelectorAll('input, select, textarea')) {
    try {
      if (!visible(i)) continue;
      out.inputs++;
      if (!i.disabled) out.inputsEnabled++;
    } catch (e) {}
  }
  for (const b of document.querySelectorAll('button, a[href], [role="button"]')) {
    try {
      if (!visible(b)) continue;
      out.buttons++;
      if (!b.disabled) out.buttonsEnabled++;
    } catch (e) {}
  }
  return out;
})()
"#;

/// Drives the run's page through navigation targets
pub struct MenuNavigator {
    page: Page,
    base_url: String,
    page_load_timeout: Duration,
    interaction_timeout: Duration,
    settle_delay: Duration,
}

impl MenuNavigator {
    pub fn new(page: Page, config: &HarnessConfig) -> Self {
        Self {
            page,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_load_timeout: Duration::from_millis(config.page_load_timeout_ms),
            interaction_timeout: Duration::from_millis(config.interaction_timeout_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    /// Resolve a route against the session's origin
    pub fn resolve_url(&self, route: &str) -> String {
        resolve_url(&self.base_url, route)
    }

    /// Navigate to a route and probe the resulting page.
    ///
    /// A failed navigation does not raise: it is recorded as a failed
    /// [`NavigationResult`] and the sweep continues. One bad page must
    /// never halt an entire run.
    pub async fn navigate_to_route(&self, route: &str, target_name: &str) -> NavigationResult {
        let url = self.resolve_url(route);
        let start = Instant::now();
        info!(target_name, %url, "navigating");

        let nav = timeout(self.page_load_timeout, async {
            self.page.goto(url.as_str()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        match nav {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let elapsed = start.elapsed().as_millis() as u64;
                warn!(target_name, "navigation failed: {}", e);
                return NavigationResult::failure(
                    target_name,
                    route,
                    elapsed,
                    format!("navigation failed: {}", e),
                );
            }
            Err(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                warn!(target_name, "navigation timed out after {}ms", elapsed);
                return NavigationResult::failure(
                    target_name,
                    route,
                    elapsed,
                    format!("navigation timed out after {}ms", elapsed),
                );
            }
        }

        // Secondary settle wait. Some pages poll continuously and never
        // settle; that must not fail the navigation.
        if timeout(self.interaction_timeout, self.wait_for_ready())
            .await
            .is_err()
        {
            debug!(target_name, "page never settled; continuing");
        }

        // Let client-side rendering finish painting
        sleep(self.settle_delay).await;

        let load_time_ms = start.elapsed().as_millis() as u64;
        let probe = self.probe_page().await;

        NavigationResult {
            target_name: target_name.to_string(),
            route: route.to_string(),
            success: true,
            load_time_ms,
            probe,
            error: None,
        }
    }

    /// Wait until the document reports itself complete
    async fn wait_for_ready(&self) {
        loop {
            let ready = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<String>().ok())
                .map(|s| s == "complete")
                .unwrap_or(false);
            if ready {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    /// Count the page's structural affordances.
    ///
    /// Best effort: an evaluation failure yields an empty probe, never
    /// an error.
    pub async fn probe_page(&self) -> PageProbe {
        match self.page.evaluate(PROBE_JS).await {
            Ok(result) => match result.into_value::<PageProbe>() {
                Ok(probe) => {
                    debug!(
                        tables = probe.tables,
                        inputs = probe.inputs,
                        buttons = probe.buttons,
                        "page probed"
                    );
                    probe
                }
                Err(e) => {
                    warn!("probe result did not decode: {}", e);
                    PageProbe::default()
                }
            },
            Err(e) => {
                warn!("probe evaluation failed: {}", e);
                PageProbe::default()
            }
        }
    }

    /// The page's current URL, when the browser reports one
    pub async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }
}

fn resolve_url(base_url: &str, route: &str) -> String {
    if route.starts_with("http://") || route.starts_with("https://") {
        return route.to_string();
    }
    if route.starts_with('/') {
        format!("{}{}", base_url, route)
    } else {
        format!("{}/{}", base_url, route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_resolution() {
        assert_eq!(
            resolve_url("http://127.0.0.1:3000", "/costs/daily"),
            "http://127.0.0.1:3000/costs/daily"
        );
        assert_eq!(
            resolve_url("http://127.0.0.1:3000", "licenses"),
            "http://127.0.0.1:3000/licenses"
        );
        // Absolute routes pass through untouched
        assert_eq!(
            resolve_url("http://127.0.0.1:3000", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }
}
