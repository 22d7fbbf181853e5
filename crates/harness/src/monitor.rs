//! Console monitor: CDP event capture and signal accumulation
//!
//! The monitor attaches to a single page for the lifetime of a run and
//! subscribes four event channels: console API calls, uncaught script
//! exceptions, failed network requests, and HTTP responses. Each
//! qualifying event becomes one [`CapturedSignal`], tagged with the
//! navigation target that was active at capture time.
//!
//! Capture is asynchronous relative to navigation: the orchestrator must
//! call [`ConsoleMonitor::set_current_target`] before triggering a
//! navigation so that signals produced during the load race are
//! attributed to the page that produced them.
//!
//! The monitor never raises. A malformed or unparseable event is
//! recorded as [`Category::Unknown`] rather than dropped, because a
//! crash here would abort an otherwise-healthy sweep over a single
//! anomalous signal.

use std::path::Path;
use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::network::{EventLoadingFailed, EventResponseReceived};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject, StackTrace,
};
use chromiumoxide::Page;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::classify::{classify, is_navigation_abort, Category};
use crate::error::Result;
use crate::signal::CapturedSignal;

/// Console message severity, as reported by the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
}

/// Monitors one browser page for error and warning signals.
///
/// Owned exclusively by the test runner; constructed once per run and
/// detached in cleanup. Not a process-wide singleton, so independent
/// runs can coexist in-process.
#[derive(Clone)]
pub struct ConsoleMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    errors: Vec<CapturedSignal>,
    warnings: Vec<CapturedSignal>,
    current_target: String,
    current_url: String,
    next_seq: u64,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for ConsoleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(MonitorState::default()),
            }),
        }
    }

    /// Attach the four event listeners to a live page.
    ///
    /// Safe to call more than once: a re-attach aborts the previous
    /// forwarding tasks first, so events are never double-captured.
    pub async fn attach(&self, page: &Page) -> Result<()> {
        self.detach();

        let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
        let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
        let mut failures = page.event_listener::<EventLoadingFailed>().await?;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;

        let mut tasks = Vec::with_capacity(4);

        let inner = self.inner.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(ev) = console.next().await {
                let level = match &ev.r#type {
                    ConsoleApiCalledType::Error => ConsoleLevel::Error,
                    ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
                    ConsoleApiCalledType::Info => ConsoleLevel::Info,
                    ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
                    _ => ConsoleLevel::Log,
                };
                let text = console_args_text(&ev.args);
                let stack = ev.stack_trace.as_ref().map(format_stack);
                inner.on_console_message(level, &text, stack);
            }
        }));

        let inner = self.inner.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(ev) = exceptions.next().await {
                let d = &ev.exception_details;
                let message = d
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| d.text.clone());
                let stack = d.stack_trace.as_ref().map(format_stack);
                inner.on_uncaught_exception(&message, stack);
            }
        }));

        let inner = self.inner.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(ev) = failures.next().await {
                // EventLoadingFailed carries no URL; correlating request
                // ids would need a fifth subscription, so the origin URL
                // stays unset on this path.
                let canceled = ev.canceled.unwrap_or(false);
                inner.on_request_failed(None, &ev.error_text, canceled);
            }
        }));

        let inner = self.inner.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(ev) = responses.next().await {
                let status = u16::try_from(ev.response.status).unwrap_or(0);
                inner.on_response(&ev.response.url, status);
            }
        }));

        self.inner.state.lock().tasks = tasks;
        debug!("console monitor attached");
        Ok(())
    }

    /// Detach the event listeners. Already-captured signals are kept.
    pub fn detach(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut st = self.inner.state.lock();
            st.tasks.drain(..).collect()
        };
        for t in &tasks {
            t.abort();
        }
        if !tasks.is_empty() {
            debug!("console monitor detached");
        }
    }

    /// Record the navigation target that subsequent captures belong to.
    ///
    /// Must be called before the corresponding navigation is triggered.
    pub fn set_current_target(&self, name: &str) {
        self.inner.state.lock().current_target = name.to_string();
    }

    /// Record the page URL that subsequent captures belong to
    pub fn set_current_url(&self, url: &str) {
        self.inner.state.lock().current_url = url.to_string();
    }

    /// Empty both collections. Listeners stay attached; the sequence
    /// counter keeps rising so signal ids stay unique across the run.
    pub fn clear(&self) {
        let mut st = self.inner.state.lock();
        st.errors.clear();
        st.warnings.clear();
    }

    /// Snapshot copy of accumulated errors, in capture order
    pub fn errors(&self) -> Vec<CapturedSignal> {
        self.inner.state.lock().errors.clone()
    }

    /// Snapshot copy of accumulated warnings, in capture order
    pub fn warnings(&self) -> Vec<CapturedSignal> {
        self.inner.state.lock().warnings.clone()
    }

    /// Attach a screenshot path to every signal of the presently-active
    /// target that does not already have one.
    ///
    /// The decision to screenshot is made only after observing that a
    /// target produced errors, which is after capture, hence the
    /// retroactive update.
    pub fn set_screenshot_for_current_target(&self, path: &Path) {
        let mut st = self.inner.state.lock();
        let target = st.current_target.clone();
        for s in st.errors.iter_mut() {
            if s.target_name == target && s.screenshot.is_none() {
                s.screenshot = Some(path.to_path_buf());
            }
        }
        for s in st.warnings.iter_mut() {
            if s.target_name == target && s.screenshot.is_none() {
                s.screenshot = Some(path.to_path_buf());
            }
        }
    }

    // Ingestion surface. The forwarding tasks land here, and tests feed
    // simulated browser events through the same methods.

    /// A console API call fired on the page
    pub fn on_console_message(&self, level: ConsoleLevel, text: &str, stack: Option<String>) {
        self.inner.on_console_message(level, text, stack);
    }

    /// An uncaught script exception reached the page's top level
    pub fn on_uncaught_exception(&self, message: &str, stack: Option<String>) {
        self.inner.on_uncaught_exception(message, stack);
    }

    /// A network request failed at the transport level
    pub fn on_request_failed(&self, request_url: Option<&str>, error_text: &str, canceled: bool) {
        self.inner.on_request_failed(request_url, error_text, canceled);
    }

    /// An HTTP response arrived
    pub fn on_response(&self, request_url: &str, status: u16) {
        self.inner.on_response(request_url, status);
    }
}

impl MonitorInner {
    fn on_console_message(&self, level: ConsoleLevel, text: &str, stack: Option<String>) {
        match level {
            ConsoleLevel::Error => {
                let message = non_empty(text);
                let category = classify(&message, None);
                self.push(false, category, message, stack, None, None);
            }
            ConsoleLevel::Warning => {
                let message = non_empty(text);
                self.push(true, Category::Warning, message, stack, None, None);
            }
            _ => trace!(level = ?level, "ignoring console message"),
        }
    }

    fn on_uncaught_exception(&self, message: &str, stack: Option<String>) {
        let message = non_empty(message);
        let category = classify(&message, None);
        self.push(false, category, message, stack, None, None);
    }

    fn on_request_failed(&self, request_url: Option<&str>, error_text: &str, canceled: bool) {
        // Navigation aborts are a property of single-page navigation
        // races, not product defects; they are discarded before they
        // ever become signals.
        if canceled || is_navigation_abort(error_text) {
            trace!(error_text, "discarding navigation-abort request failure");
            return;
        }
        let message = match request_url {
            Some(url) => format!("Request failed: {} ({})", error_text, url),
            None => format!("Request failed: {}", non_empty(error_text)),
        };
        let category = classify(&message, None);
        self.push(
            false,
            category,
            message,
            None,
            request_url.map(str::to_string),
            None,
        );
    }

    fn on_response(&self, request_url: &str, status: u16) {
        if status < 400 {
            return;
        }
        let message = format!("HTTP {} response from {}", status, request_url);
        let category = classify(&message, Some(status));
        self.push(
            false,
            category,
            message,
            None,
            Some(request_url.to_string()),
            Some(status),
        );
    }

    fn push(
        &self,
        warning: bool,
        category: Category,
        message: String,
        stack: Option<String>,
        request_url: Option<String>,
        http_status: Option<u16>,
    ) {
        let mut st = self.state.lock();
        let seq = st.next_seq;
        st.next_seq += 1;
        let signal = CapturedSignal {
            seq,
            timestamp: Utc::now(),
            page_url: st.current_url.clone(),
            target_name: st.current_target.clone(),
            category,
            message,
            stack,
            screenshot: None,
            request_url,
            http_status,
            is_new: false,
        };
        if warning {
            warn!(target_name = %signal.target_name, "console warning: {}", signal.message);
            st.warnings.push(signal);
        } else {
            warn!(
                target_name = %signal.target_name,
                category = %signal.category,
                "captured error: {}",
                signal.message
            );
            st.errors.push(signal);
        }
    }
}

fn non_empty(text: &str) -> String {
    if text.trim().is_empty() {
        "(no message)".to_string()
    } else {
        text.to_string()
    }
}

fn console_args_text(args: &[RemoteObject]) -> String {
    let parts: Vec<String> = args
        .iter()
        .map(|a| {
            if let Some(v) = &a.value {
                match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            } else if let Some(d) = &a.description {
                d.clone()
            } else {
                "[object]".to_string()
            }
        })
        .collect();
    parts.join(" ")
}

fn format_stack(st: &StackTrace) -> String {
    st.call_frames
        .iter()
        .map(|f| {
            format!(
                "    at {} ({}:{}:{})",
                f.function_name, f.url, f.line_number, f.column_number
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> ConsoleMonitor {
        let m = ConsoleMonitor::new();
        m.set_current_target("Dashboard");
        m.set_current_url("http://localhost/dashboard");
        m
    }

    #[test]
    fn each_event_kind_produces_exactly_one_signal() {
        let m = monitor();
        m.on_console_message(ConsoleLevel::Error, "TypeError: boom", None);
        m.on_console_message(ConsoleLevel::Warning, "deprecated prop", None);
        m.on_uncaught_exception("ReferenceError: x is not defined", Some("at x".into()));
        m.on_request_failed(Some("http://localhost/api/costs"), "net::ERR_CONNECTION_REFUSED", false);
        m.on_response("http://localhost/api/users", 500);

        assert_eq!(m.errors().len(), 4);
        assert_eq!(m.warnings().len(), 1);
    }

    #[test]
    fn navigation_abort_is_filtered() {
        let m = monitor();
        m.on_request_failed(None, "net::ERR_ABORTED", false);
        m.on_request_failed(Some("http://localhost/x"), "something", true);
        assert!(m.errors().is_empty());
    }

    #[test]
    fn successful_responses_are_ignored() {
        let m = monitor();
        m.on_response("http://localhost/api/ok", 200);
        m.on_response("http://localhost/api/redirect", 302);
        assert!(m.errors().is_empty());
    }

    #[test]
    fn metadata_is_complete() {
        let m = monitor();
        m.on_console_message(ConsoleLevel::Error, "boom", None);
        m.on_response("http://localhost/api/users", 401);

        for s in m.errors() {
            assert!(!s.page_url.is_empty());
            assert!(!s.message.is_empty());
            assert!(Category::ALL.contains(&s.category));
        }
        let errors = m.errors();
        assert_eq!(errors[1].category, Category::Auth);
        assert_eq!(errors[1].http_status, Some(401));
    }

    #[test]
    fn malformed_event_degrades_to_unknown() {
        let m = monitor();
        m.on_console_message(ConsoleLevel::Error, "   ", None);
        let errors = m.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, Category::Unknown);
        assert!(!errors[0].message.is_empty());
    }

    #[test]
    fn target_tagging_follows_set_current_target() {
        let m = monitor();
        m.on_console_message(ConsoleLevel::Error, "first", None);
        m.set_current_target("Costs");
        m.on_console_message(ConsoleLevel::Error, "second", None);

        let errors = m.errors();
        assert_eq!(errors[0].target_name, "Dashboard");
        assert_eq!(errors[1].target_name, "Costs");
    }

    #[test]
    fn clear_keeps_sequence_rising() {
        let m = monitor();
        m.on_console_message(ConsoleLevel::Error, "one", None);
        let first_seq = m.errors()[0].seq;
        m.clear();
        assert!(m.errors().is_empty());
        m.on_console_message(ConsoleLevel::Error, "two", None);
        assert!(m.errors()[0].seq > first_seq);
    }

    #[test]
    fn screenshot_attaches_to_current_target_only() {
        let m = monitor();
        m.on_console_message(ConsoleLevel::Error, "dash error", None);
        m.set_current_target("Costs");
        m.on_console_message(ConsoleLevel::Error, "costs error", None);
        m.set_screenshot_for_current_target(Path::new("shot-001-costs.png"));

        let errors = m.errors();
        assert!(errors[0].screenshot.is_none());
        assert_eq!(
            errors[1].screenshot.as_deref(),
            Some(Path::new("shot-001-costs.png"))
        );
    }

    #[test]
    fn snapshots_are_copies() {
        let m = monitor();
        m.on_console_message(ConsoleLevel::Error, "boom", None);
        let mut snapshot = m.errors();
        snapshot.clear();
        assert_eq!(m.errors().len(), 1);
    }
}
