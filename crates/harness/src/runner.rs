//! Run orchestration
//!
//! The runner owns every resource for the run's duration: the browser
//! session, the single page, the monitor and the navigator. It drives
//! the lifecycle
//!
//! ```text
//! UNINITIALIZED -> INITIALIZED -> AUTHENTICATING -> AUTHENTICATED
//!                                       |                |
//!                                  AUTH_FAILED       ITERATING -> CLEAN
//!                                                        |
//!                                                    EXHAUSTED
//! (every state) -> CLEANED_UP
//! ```
//!
//! and always attempts to reach `CLEANED_UP`, so browser resources are
//! never leaked even on fatal paths.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chromiumoxide::Page;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::auth::Authenticator;
use crate::browser::BrowserSession;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::menu::{self, FlatTarget};
use crate::monitor::ConsoleMonitor;
use crate::navigator::MenuNavigator;
use crate::report::{ErrorReporter, ProgressSummary};
use crate::signal::IterationResult;

const AUTH_ATTEMPTS: usize = 3;

/// Exponential backoff schedule for login retries: 1s, 2s, 4s
fn auth_backoff(attempt: usize) -> Duration {
    Duration::from_secs(1u64 << (attempt.saturating_sub(1) as u32))
}

/// Run lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Initialized,
    Authenticating,
    Authenticated,
    AuthFailed,
    Iterating,
    Clean,
    Exhausted,
    CleanedUp,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Uninitialized => "UNINITIALIZED",
            RunState::Initialized => "INITIALIZED",
            RunState::Authenticating => "AUTHENTICATING",
            RunState::Authenticated => "AUTHENTICATED",
            RunState::AuthFailed => "AUTH_FAILED",
            RunState::Iterating => "ITERATING",
            RunState::Clean => "CLEAN",
            RunState::Exhausted => "EXHAUSTED",
            RunState::CleanedUp => "CLEANED_UP",
        };
        write!(f, "{}", s)
    }
}

impl RunState {
    /// Whether `self -> to` is a legal lifecycle transition.
    ///
    /// `CleanedUp` is reachable from every state, including the terminal
    /// ones, so cleanup can run no matter where the run failed.
    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        if to == CleanedUp {
            return true;
        }
        matches!(
            (self, to),
            (Uninitialized, Initialized)
                | (Initialized, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticating, AuthFailed)
                | (Authenticated, Iterating)
                | (Iterating, Clean)
                | (Iterating, Exhausted)
        )
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// An iteration reached zero errors
    Clean,
    /// The iteration ceiling was reached with errors remaining
    Exhausted,
    /// Login never succeeded; no iteration executed
    AuthFailed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Clean => write!(f, "CLEAN"),
            RunOutcome::Exhausted => write!(f, "EXHAUSTED"),
            RunOutcome::AuthFailed => write!(f, "AUTH_FAILED"),
        }
    }
}

/// Run-level result, also persisted as `summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub iterations: usize,
    pub progress: ProgressSummary,
    pub reports: Vec<PathBuf>,
}

/// Orchestrates a whole sweep run
pub struct TestRunner {
    config: HarnessConfig,
    state: RunState,
    session: Option<BrowserSession>,
    page: Option<Page>,
    navigator: Option<MenuNavigator>,
    monitor: ConsoleMonitor,
    reporter: ErrorReporter,
    iterations: Vec<IterationResult>,
    reports: Vec<PathBuf>,
    shot_counter: u32,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> Self {
        let reporter = ErrorReporter::new(config.fingerprint_len);
        Self {
            config,
            state: RunState::Uninitialized,
            session: None,
            page: None,
            navigator: None,
            monitor: ConsoleMonitor::new(),
            reporter,
            iterations: Vec::new(),
            reports: Vec::new(),
            shot_counter: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn iterations(&self) -> &[IterationResult] {
        &self.iterations
    }

    /// Execute the full run. Cleanup is attempted no matter which phase
    /// failed; the final log line states the outcome explicitly.
    pub async fn run(&mut self) -> Result<RunSummary> {
        info!(base_url = %self.config.base_url, "starting sweep run");

        let outcome = self.run_inner().await;
        self.cleanup().await;
        let outcome = outcome?;

        let progress = self.reporter.progress_summary(&self.iterations);
        let summary = RunSummary {
            outcome,
            iterations: self.iterations.len(),
            progress,
            reports: self.reports.clone(),
        };

        info!("run ended {}", outcome);
        self.write_summary(&summary)?;
        Ok(summary)
    }

    async fn run_inner(&mut self) -> Result<RunOutcome> {
        self.initialize().await?;

        match self.authenticate().await {
            Ok(()) => {}
            Err(HarnessError::AuthenticationFailed { attempts }) => {
                error!("authentication failed after {} attempt(s), aborting run", attempts);
                self.transition(RunState::AuthFailed)?;
                return Ok(RunOutcome::AuthFailed);
            }
            Err(e) => return Err(e),
        }

        self.iterate().await
    }

    /// Acquire the browser session and page, attach the monitor, build
    /// the navigator. No application network activity yet.
    async fn initialize(&mut self) -> Result<()> {
        let session = BrowserSession::launch(&self.config).await?;
        let page = session.new_page().await?;
        self.monitor.attach(&page).await?;
        self.navigator = Some(MenuNavigator::new(page.clone(), &self.config));
        self.page = Some(page);
        self.session = Some(session);
        self.transition(RunState::Initialized)?;
        Ok(())
    }

    /// Log in with bounded retries and exponential backoff. A screenshot
    /// is captured on the final failure only, to limit noise.
    async fn authenticate(&mut self) -> Result<()> {
        self.transition(RunState::Authenticating)?;

        for attempt in 1..=AUTH_ATTEMPTS {
            let page = self
                .page
                .as_ref()
                .ok_or_else(|| HarnessError::Cdp("page not initialized".to_string()))?;
            let auth = Authenticator::new(page, &self.config);

            match auth.attempt_login().await {
                Ok(()) => {
                    self.transition(RunState::Authenticated)?;
                    return Ok(());
                }
                Err(e) if attempt < AUTH_ATTEMPTS => {
                    let backoff = auth_backoff(attempt);
                    warn!(
                        attempt,
                        "login attempt failed: {}; retrying in {:?}", e, backoff
                    );
                    sleep(backoff).await;
                }
                Err(e) => {
                    error!("final login attempt failed: {}", e);
                    self.capture_screenshot("login").await;
                }
            }
        }

        Err(HarnessError::AuthenticationFailed {
            attempts: AUTH_ATTEMPTS,
        })
    }

    async fn iterate(&mut self) -> Result<RunOutcome> {
        self.transition(RunState::Iterating)?;

        let targets = self.load_targets()?;
        info!(
            "sweeping {} target(s), up to {} iteration(s)",
            targets.len(),
            self.config.max_iterations
        );

        for index in 1..=self.config.max_iterations {
            let result = self.run_iteration(index, &targets).await?;
            let clean = result.is_clean();

            // Keep in-memory state intact before surfacing any report
            // I/O failure: losing the file must not lose the data.
            let write_res = self.reporter.write_report(&self.config.output_dir, &result);
            self.reporter.update_previous(&result.errors);
            self.iterations.push(result);
            self.reports.push(write_res?);

            if clean {
                self.transition(RunState::Clean)?;
                return Ok(RunOutcome::Clean);
            }
        }

        // Not an error state: persistent failures remain and the caller
        // must interpret that.
        self.transition(RunState::Exhausted)?;
        Ok(RunOutcome::Exhausted)
    }

    /// One full sweep over the flattened target list
    async fn run_iteration(&mut self, index: u32, targets: &[FlatTarget]) -> Result<IterationResult> {
        info!(iteration = index, "starting sweep");
        let started_at = Utc::now();
        let start = Instant::now();

        self.monitor.clear();
        let mut visited = 0usize;
        let mut screenshots = Vec::new();

        for t in targets {
            // Tag must take effect before the navigation is triggered,
            // or signals from the load race get attributed to the
            // previous target.
            self.monitor.set_current_target(&t.name);
            let navigator = self
                .navigator
                .as_ref()
                .ok_or_else(|| HarnessError::Cdp("navigator not initialized".to_string()))?;
            self.monitor.set_current_url(&navigator.resolve_url(&t.route));

            let errors_before = self.monitor.errors().len();
            let nav = navigator.navigate_to_route(&t.route, &t.name).await;
            visited += 1;

            if !nav.success {
                warn!(
                    target_name = %t.name,
                    "navigation failed: {}",
                    nav.error.as_deref().unwrap_or("unknown")
                );
            }

            let errors_after = self.monitor.errors().len();
            if self.config.screenshot_on_error && errors_after > errors_before {
                if let Some(path) = self.capture_screenshot(&t.id).await {
                    self.monitor.set_screenshot_for_current_target(&path);
                    screenshots.push(path);
                }
            }

            if self.config.action_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.action_delay_ms)).await;
            }
        }

        let mut errors = self.monitor.errors();
        let warnings = self.monitor.warnings();

        let diff = self.reporter.diff_current(&errors);
        let new_seqs: HashSet<u64> = diff.new.iter().map(|s| s.seq).collect();
        for e in &mut errors {
            e.is_new = new_seqs.contains(&e.seq);
        }

        let result = IterationResult::new(
            index,
            started_at,
            start.elapsed().as_millis() as u64,
            visited,
            errors,
            warnings,
            diff.new,
            diff.fixed,
            screenshots,
        );

        info!(
            iteration = index,
            errors = result.total_errors,
            warnings = result.total_warnings,
            new = result.new_errors.len(),
            fixed = result.fixed_errors.len(),
            progress = diff.progress_percent,
            "iteration complete"
        );

        Ok(result)
    }

    fn load_targets(&self) -> Result<Vec<FlatTarget>> {
        let tree = match &self.config.menu_file {
            Some(path) => menu::load_menu(path)?,
            None => {
                let tree = menu::default_menu();
                menu::validate(&tree)?;
                tree
            }
        };

        let mut flat = menu::flatten(&tree, self.config.include_admin);
        if let Some(only) = &self.config.only_targets {
            flat.retain(|t| only.iter().any(|id| id == &t.id));
        }
        Ok(flat)
    }

    /// Best-effort screenshot into the output directory
    async fn capture_screenshot(&mut self, label: &str) -> Option<PathBuf> {
        self.shot_counter += 1;
        let filename = format!("shot-{:03}-{}.png", self.shot_counter, label);
        let path = self.config.output_dir.join(filename);

        if let Err(e) = std::fs::create_dir_all(&self.config.output_dir) {
            warn!("cannot create output directory: {}", e);
            return None;
        }

        let page = self.page.as_ref()?;
        match BrowserSession::screenshot_to(page, &path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("screenshot failed: {}", e);
                None
            }
        }
    }

    /// Release page, session and monitor. Reachable from every state.
    async fn cleanup(&mut self) {
        self.monitor.detach();
        self.navigator = None;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("page close: {}", e);
            }
        }
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }

        let _ = self.transition(RunState::CleanedUp);
    }

    fn write_summary(&self, summary: &RunSummary) -> Result<()> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.config.output_dir.join("summary.json");
        std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        info!(path = %path.display(), "run summary written");
        Ok(())
    }

    fn transition(&mut self, to: RunState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(HarnessError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        debug!(from = %self.state, to = %to, "state transition");
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_are_legal() {
        use RunState::*;
        assert!(Uninitialized.can_transition(Initialized));
        assert!(Initialized.can_transition(Authenticating));
        assert!(Authenticating.can_transition(Authenticated));
        assert!(Authenticating.can_transition(AuthFailed));
        assert!(Authenticated.can_transition(Iterating));
        assert!(Iterating.can_transition(Clean));
        assert!(Iterating.can_transition(Exhausted));
    }

    #[test]
    fn illegal_transitions_rejected() {
        use RunState::*;
        // A failed login never reaches the iteration loop
        assert!(!AuthFailed.can_transition(Iterating));
        assert!(!Initialized.can_transition(Iterating));
        assert!(!Uninitialized.can_transition(Authenticated));
        assert!(!Clean.can_transition(Iterating));
    }

    #[test]
    fn cleanup_reachable_from_every_state() {
        use RunState::*;
        for s in [
            Uninitialized,
            Initialized,
            Authenticating,
            Authenticated,
            AuthFailed,
            Iterating,
            Clean,
            Exhausted,
            CleanedUp,
        ] {
            assert!(s.can_transition(CleanedUp));
        }
    }

    #[test]
    fn backoff_schedule_is_exponential() {
        assert_eq!(auth_backoff(1), Duration::from_secs(1));
        assert_eq!(auth_backoff(2), Duration::from_secs(2));
        assert_eq!(auth_backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn transition_enforcement() {
        let mut runner = TestRunner::new(HarnessConfig::default());
        assert_eq!(runner.state(), RunState::Uninitialized);
        assert!(runner.transition(RunState::Iterating).is_err());
        assert!(runner.transition(RunState::Initialized).is_ok());
        assert_eq!(runner.state(), RunState::Initialized);
        // Cleanup is always allowed
        assert!(runner.transition(RunState::CleanedUp).is_ok());
    }

    #[test]
    fn outcome_display_matches_log_contract() {
        assert_eq!(RunOutcome::Clean.to_string(), "CLEAN");
        assert_eq!(RunOutcome::Exhausted.to_string(), "EXHAUSTED");
        assert_eq!(RunOutcome::AuthFailed.to_string(), "AUTH_FAILED");
    }
}
