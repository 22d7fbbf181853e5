//! Iteration diffing and report rendering
//!
//! Signals are matched across iterations by a normalized fingerprint:
//! `category:target:truncated-message`. Truncation is deliberate - full
//! messages can contain run-specific noise (timestamps, request ids)
//! that would defeat matching, while the prefix is enough to tell
//! genuinely distinct error types apart. The length is configurable and
//! not load-bearing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::classify::Category;
use crate::error::Result;
use crate::signal::{CapturedSignal, IterationResult};

/// Marker line emitted in reports for a clean iteration
pub const SUCCESS_MARKER: &str = "**PASS** - zero console errors";

/// Outcome of diffing one iteration against the previous one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationDiff {
    /// Current signals whose fingerprint was absent previously
    pub new: Vec<CapturedSignal>,

    /// Previous signals whose fingerprint is absent now
    pub fixed: Vec<CapturedSignal>,

    /// Current signals whose fingerprint also existed previously
    pub persistent: Vec<CapturedSignal>,

    /// Rounded percentage reduction in error count; 100 when there is
    /// no previous iteration or the previous total was 0
    pub progress_percent: i32,
}

/// Cumulative first-vs-last view over a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total_iterations: usize,
    pub initial_error_count: usize,
    pub current_error_count: usize,
    /// Net errors eliminated; never negative
    pub fixed_count: usize,
    pub progress_percent: i32,
    pub is_clean: bool,
}

/// Computes iteration diffs and renders reports.
///
/// The "previous iteration" fingerprint map is carried here, outside the
/// pure comparison function, so [`ErrorReporter::compare`] stays usable
/// with synthetic inputs in tests.
pub struct ErrorReporter {
    fingerprint_len: usize,
    previous: Option<BTreeMap<String, CapturedSignal>>,
}

impl ErrorReporter {
    pub fn new(fingerprint_len: usize) -> Self {
        Self {
            fingerprint_len,
            previous: None,
        }
    }

    /// Normalized matching key for a signal
    pub fn fingerprint(signal: &CapturedSignal, len: usize) -> String {
        let truncated: String = signal.message.chars().take(len).collect();
        format!("{}:{}:{}", signal.category, signal.target_name, truncated)
    }

    /// Diff a signal list against a previous iteration's fingerprint map.
    ///
    /// Pure: no reporter state is read or written.
    pub fn compare(
        current: &[CapturedSignal],
        previous: Option<&BTreeMap<String, CapturedSignal>>,
        len: usize,
    ) -> IterationDiff {
        let mut new = Vec::new();
        let mut persistent = Vec::new();

        let current_fps: std::collections::BTreeSet<String> = current
            .iter()
            .map(|s| Self::fingerprint(s, len))
            .collect();

        for s in current {
            let fp = Self::fingerprint(s, len);
            let seen_before = previous.map(|p| p.contains_key(&fp)).unwrap_or(false);
            let mut s = s.clone();
            s.is_new = !seen_before;
            if seen_before {
                persistent.push(s);
            } else {
                new.push(s);
            }
        }

        let fixed: Vec<CapturedSignal> = previous
            .map(|p| {
                p.iter()
                    .filter(|(fp, _)| !current_fps.contains(*fp))
                    .map(|(_, s)| s.clone())
                    .collect()
            })
            .unwrap_or_default();

        let progress_percent = match previous.map(|p| p.len()) {
            None | Some(0) => 100,
            Some(prev_total) => {
                let prev = prev_total as f64;
                let cur = current.len() as f64;
                ((prev - cur) / prev * 100.0).round() as i32
            }
        };

        IterationDiff {
            new,
            fixed,
            persistent,
            progress_percent,
        }
    }

    /// Diff against the retained previous iteration
    pub fn diff_current(&self, current: &[CapturedSignal]) -> IterationDiff {
        Self::compare(current, self.previous.as_ref(), self.fingerprint_len)
    }

    /// Replace the retained previous-iteration state wholesale
    pub fn update_previous(&mut self, current: &[CapturedSignal]) {
        let map: BTreeMap<String, CapturedSignal> = current
            .iter()
            .map(|s| (Self::fingerprint(s, self.fingerprint_len), s.clone()))
            .collect();
        self.previous = Some(map);
    }

    /// Render a deterministic markdown report for one iteration
    pub fn generate_report(&self, result: &IterationResult) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# Sweep Report - Iteration {}", result.index);
        let _ = writeln!(out);
        let _ = writeln!(out, "- Started: {}", result.started_at.to_rfc3339());
        let _ = writeln!(out, "- Duration: {} ms", result.duration_ms);
        let _ = writeln!(out, "- Targets visited: {}", result.targets_visited);
        let _ = writeln!(out);

        let _ = writeln!(out, "## Summary");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Metric | Count |");
        let _ = writeln!(out, "|---|---:|");
        let _ = writeln!(out, "| Total errors | {} |", result.total_errors);
        let _ = writeln!(out, "| Total warnings | {} |", result.total_warnings);
        let _ = writeln!(out, "| New this iteration | {} |", result.new_errors.len());
        let _ = writeln!(
            out,
            "| Fixed since last iteration | {} |",
            result.fixed_errors.len()
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "## Errors by category");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Category | Count |");
        let _ = writeln!(out, "|---|---:|");
        for cat in Category::ALL {
            if let Some(count) = result.by_category.get(&cat) {
                let _ = writeln!(out, "| {} | {} |", cat, count);
            }
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "## Signals by target");
        let _ = writeln!(out);
        if result.by_target.is_empty() {
            let _ = writeln!(out, "No signals captured.");
            let _ = writeln!(out);
        }
        for (target, signals) in &result.by_target {
            let _ = writeln!(out, "### {}", target);
            let _ = writeln!(out);
            for s in signals {
                render_signal(&mut out, s);
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "## New this iteration");
        let _ = writeln!(out);
        render_signal_list(&mut out, &result.new_errors);

        let _ = writeln!(out, "## Fixed since last iteration");
        let _ = writeln!(out);
        render_signal_list(&mut out, &result.fixed_errors);

        let _ = writeln!(out, "## Result");
        let _ = writeln!(out);
        if result.is_clean() {
            let _ = writeln!(out, "{}.", SUCCESS_MARKER);
        } else {
            let _ = writeln!(out, "**FAIL** - {} error(s) remain.", result.total_errors);
        }

        out
    }

    /// Write the iteration report to `dir/iteration-NN.md`.
    ///
    /// An I/O failure here surfaces as `Err` - it means loss of run
    /// evidence - but never touches iteration state already computed.
    pub fn write_report(&self, dir: &Path, result: &IterationResult) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("iteration-{:02}.md", result.index));
        std::fs::write(&path, self.generate_report(result))?;
        info!(path = %path.display(), "iteration report written");
        Ok(path)
    }

    /// Cumulative progress across a run: strictly the FIRST and LAST
    /// iteration of the sequence, however many lie between.
    pub fn progress_summary(&self, all: &[IterationResult]) -> ProgressSummary {
        let (Some(first), Some(last)) = (all.first(), all.last()) else {
            return ProgressSummary::default();
        };

        let initial = first.total_errors;
        let current = last.total_errors;
        let progress_percent = if initial == 0 {
            100
        } else {
            ((initial as f64 - current as f64) / initial as f64 * 100.0).round() as i32
        };

        ProgressSummary {
            total_iterations: all.len(),
            initial_error_count: initial,
            current_error_count: current,
            fixed_count: initial.saturating_sub(current),
            progress_percent,
            is_clean: current == 0,
        }
    }
}

fn render_signal(out: &mut String, s: &CapturedSignal) {
    let _ = writeln!(
        out,
        "- `#{}` [{}] {} - {}",
        s.seq,
        s.category,
        s.timestamp.to_rfc3339(),
        s.message
    );
    let _ = writeln!(out, "  - url: {}", s.page_url);
    if let Some(req) = &s.request_url {
        let _ = writeln!(out, "  - request: {}", req);
    }
    if let Some(status) = s.http_status {
        let _ = writeln!(out, "  - status: {}", status);
    }
    if let Some(shot) = &s.screenshot {
        let _ = writeln!(out, "  - screenshot: {}", shot.display());
    }
}

fn render_signal_list(out: &mut String, signals: &[CapturedSignal]) {
    if signals.is_empty() {
        let _ = writeln!(out, "None.");
    } else {
        for s in signals {
            let _ = writeln!(out, "- [{}] {} - {}", s.category, s.target_name, s.message);
        }
    }
    let _ = writeln!(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn signal(seq: u64, target: &str, category: Category, message: &str) -> CapturedSignal {
        CapturedSignal {
            seq,
            timestamp: Utc::now(),
            page_url: format!("http://localhost/{target}"),
            target_name: target.to_string(),
            category,
            message: message.to_string(),
            stack: None,
            screenshot: None,
            request_url: None,
            http_status: None,
            is_new: false,
        }
    }

    fn as_map(signals: &[CapturedSignal], len: usize) -> BTreeMap<String, CapturedSignal> {
        signals
            .iter()
            .map(|s| (ErrorReporter::fingerprint(s, len), s.clone()))
            .collect()
    }

    #[test]
    fn diff_is_set_difference_by_fingerprint() {
        let a = vec![
            signal(1, "a", Category::Js, "Cannot find module X"),
            signal(2, "b", Category::Network, "Timeout"),
        ];
        let b = vec![
            signal(3, "a", Category::Js, "Cannot find module X"),
            signal(4, "c", Category::Api, "HTTP 500"),
        ];
        let prev = as_map(&a, 100);

        let diff = ErrorReporter::compare(&b, Some(&prev), 100);
        assert_eq!(diff.new.len(), 1);
        assert_eq!(diff.new[0].target_name, "c");
        assert!(diff.new[0].is_new);
        assert_eq!(diff.fixed.len(), 1);
        assert_eq!(diff.fixed[0].message, "Timeout");
        assert_eq!(diff.persistent.len(), 1);
        assert!(!diff.persistent[0].is_new);
    }

    #[test]
    fn self_diff_is_empty() {
        let a = vec![
            signal(1, "a", Category::Js, "boom"),
            signal(2, "b", Category::Cors, "blocked by CORS"),
        ];
        let prev = as_map(&a, 100);
        let diff = ErrorReporter::compare(&a, Some(&prev), 100);
        assert!(diff.new.is_empty());
        assert!(diff.fixed.is_empty());
        assert_eq!(diff.persistent.len(), 2);
        assert_eq!(diff.progress_percent, 0);
    }

    #[test]
    fn truncation_tolerates_trailing_noise() {
        // Messages identical within the fingerprint window match even
        // when a run-specific suffix differs
        let len = 20;
        let a = vec![signal(1, "a", Category::Api, "HTTP 500 on /api/x [req-111]")];
        let b = vec![signal(2, "a", Category::Api, "HTTP 500 on /api/x [req-222]")];
        let prev = as_map(&a, len);
        let diff = ErrorReporter::compare(&b, Some(&prev), len);
        assert_eq!(diff.persistent.len(), 1);
        assert!(diff.new.is_empty());
    }

    #[test]
    fn no_previous_means_everything_new_and_full_progress() {
        let current = vec![signal(1, "a", Category::Js, "boom")];
        let diff = ErrorReporter::compare(&current, None, 100);
        assert_eq!(diff.new.len(), 1);
        assert!(diff.fixed.is_empty());
        assert_eq!(diff.progress_percent, 100);
    }

    #[test]
    fn fix_tracking_across_two_iterations() {
        let iter1 = vec![
            signal(1, "a", Category::Js, "Cannot find module X"),
            signal(2, "b", Category::Network, "Timeout"),
        ];
        let iter2 = vec![signal(3, "a", Category::Js, "Cannot find module X")];

        let mut reporter = ErrorReporter::new(100);
        reporter.update_previous(&iter1);
        let diff = reporter.diff_current(&iter2);

        assert!(diff.new.is_empty());
        assert_eq!(diff.fixed.len(), 1);
        assert_eq!(diff.fixed[0].message, "Timeout");
        assert_eq!(diff.persistent.len(), 1);
        assert_eq!(diff.persistent[0].message, "Cannot find module X");
        assert_eq!(diff.progress_percent, 50);
    }

    #[test]
    fn progress_summary_clamps_fixed_count() {
        let mk = |index: u32, errors: Vec<CapturedSignal>| {
            IterationResult::new(index, Utc::now(), 10, 3, errors, vec![], vec![], vec![], vec![])
        };
        let worse = vec![
            mk(1, vec![signal(1, "a", Category::Js, "boom")]),
            mk(
                2,
                vec![
                    signal(2, "a", Category::Js, "boom"),
                    signal(3, "b", Category::Api, "HTTP 500"),
                ],
            ),
        ];

        let reporter = ErrorReporter::new(100);
        let summary = reporter.progress_summary(&worse);
        assert_eq!(summary.fixed_count, 0);
        assert!(!summary.is_clean);
        assert_eq!(summary.initial_error_count, 1);
        assert_eq!(summary.current_error_count, 2);
    }

    #[test]
    fn report_contains_success_marker_when_clean() {
        let clean = IterationResult::new(1, Utc::now(), 42, 3, vec![], vec![], vec![], vec![], vec![]);
        let reporter = ErrorReporter::new(100);
        let report = reporter.generate_report(&clean);
        assert!(report.contains(SUCCESS_MARKER));
        assert!(report.contains("Iteration 1"));
        assert!(report.contains("Targets visited: 3"));
    }

    #[test]
    fn report_lists_signals_and_fail_marker() {
        let errors = vec![signal(1, "Daily Costs", Category::Network, "Failed to fetch")];
        let new = errors.clone();
        let ir = IterationResult::new(1, Utc::now(), 42, 3, errors, vec![], new, vec![], vec![]);
        let reporter = ErrorReporter::new(100);
        let report = reporter.generate_report(&ir);
        assert!(report.contains("**FAIL**"));
        assert!(report.contains("### Daily Costs"));
        assert!(report.contains("Failed to fetch"));
        assert!(report.contains("| NETWORK | 1 |"));
    }

    #[test]
    fn write_report_creates_one_file_per_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let clean = IterationResult::new(1, Utc::now(), 42, 3, vec![], vec![], vec![], vec![], vec![]);
        let reporter = ErrorReporter::new(100);
        let path = reporter.write_report(dir.path(), &clean).unwrap();
        assert!(path.ends_with("iteration-01.md"));
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(SUCCESS_MARKER));
    }
}
