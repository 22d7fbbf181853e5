//! Data model for captured signals and sweep results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::classify::Category;

/// One observed error or warning instance.
///
/// Created by the console monitor the instant a qualifying browser event
/// fires. Immutable afterwards except for `is_new` (set when diffing
/// against the previous iteration) and `screenshot` (attached
/// retroactively once a post-hoc screenshot is taken for the page that
/// produced it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedSignal {
    /// Monotonic sequence id, unique per run
    pub seq: u64,

    /// Capture timestamp
    pub timestamp: DateTime<Utc>,

    /// Page URL at capture time
    pub page_url: String,

    /// Navigation target active when captured
    pub target_name: String,

    /// Classified category
    pub category: Category,

    /// Raw message text (never empty)
    pub message: String,

    /// Stack trace, when the browser provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Screenshot taken for the page that produced this signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,

    /// Originating request URL for network-sourced signals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,

    /// HTTP status for response-sourced signals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    /// Whether this signal is new relative to the previous iteration
    #[serde(default)]
    pub is_new: bool,
}

/// Structural affordances found on a page after navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageProbe {
    pub tables: u32,
    pub tables_with_rows: u32,
    pub inputs: u32,
    pub inputs_enabled: u32,
    pub buttons: u32,
    pub buttons_enabled: u32,
}

impl PageProbe {
    /// Whether the page exposed any structural affordance at all
    pub fn has_content(&self) -> bool {
        self.tables > 0 || self.inputs > 0 || self.buttons > 0
    }
}

/// Outcome of visiting one navigation target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    pub target_name: String,
    pub route: String,
    pub success: bool,
    pub load_time_ms: u64,
    pub probe: PageProbe,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NavigationResult {
    pub fn failure(target_name: &str, route: &str, load_time_ms: u64, error: String) -> Self {
        Self {
            target_name: target_name.to_string(),
            route: route.to_string(),
            success: false,
            load_time_ms,
            probe: PageProbe::default(),
            error: Some(error),
        }
    }
}

/// The output of one full navigation sweep.
///
/// Retained for the life of the run so the reporter can compute
/// first-vs-last progress. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based iteration index
    pub index: u32,

    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub targets_visited: usize,

    pub total_errors: usize,
    pub total_warnings: usize,

    /// Error counts per category; sums to `total_errors`
    pub by_category: BTreeMap<Category, usize>,

    /// All signals (errors and warnings) grouped by target name
    pub by_target: BTreeMap<String, Vec<CapturedSignal>>,

    /// Full ordered error list for the sweep
    pub errors: Vec<CapturedSignal>,

    /// Full ordered warning list for the sweep
    pub warnings: Vec<CapturedSignal>,

    /// Errors newly appearing this iteration
    pub new_errors: Vec<CapturedSignal>,

    /// Errors present in the previous iteration but absent here
    pub fixed_errors: Vec<CapturedSignal>,

    /// Screenshots taken during this iteration
    pub screenshots: Vec<PathBuf>,
}

impl IterationResult {
    /// Build an iteration result, deriving the aggregate views from the
    /// signal lists so the count invariants hold by construction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u32,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        targets_visited: usize,
        errors: Vec<CapturedSignal>,
        warnings: Vec<CapturedSignal>,
        new_errors: Vec<CapturedSignal>,
        fixed_errors: Vec<CapturedSignal>,
        screenshots: Vec<PathBuf>,
    ) -> Self {
        let mut by_category: BTreeMap<Category, usize> = BTreeMap::new();
        for e in &errors {
            *by_category.entry(e.category).or_insert(0) += 1;
        }

        let mut by_target: BTreeMap<String, Vec<CapturedSignal>> = BTreeMap::new();
        for s in errors.iter().chain(warnings.iter()) {
            by_target
                .entry(s.target_name.clone())
                .or_default()
                .push(s.clone());
        }

        Self {
            index,
            started_at,
            duration_ms,
            targets_visited,
            total_errors: errors.len(),
            total_warnings: warnings.len(),
            by_category,
            by_target,
            errors,
            warnings,
            new_errors,
            fixed_errors,
            screenshots,
        }
    }

    /// Whether this iteration observed zero errors
    pub fn is_clean(&self) -> bool {
        self.total_errors == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn category_breakdown_sums_to_total() {
        let errors = vec![
            signal(1, "a", Category::Js, "TypeError: boom"),
            signal(2, "a", Category::Network, "Failed to fetch"),
            signal(3, "b", Category::Js, "TypeError: boom again"),
        ];
        let ir = IterationResult::new(1, Utc::now(), 10, 2, errors, vec![], vec![], vec![], vec![]);
        assert_eq!(ir.total_errors, 3);
        let sum: usize = ir.by_category.values().sum();
        assert_eq!(sum, ir.total_errors);
        assert_eq!(ir.by_category[&Category::Js], 2);
    }

    #[test]
    fn by_target_groups_errors_and_warnings() {
        let errors = vec![signal(1, "a", Category::Js, "TypeError: boom")];
        let warnings = vec![signal(2, "a", Category::Warning, "deprecated prop")];
        let ir = IterationResult::new(1, Utc::now(), 10, 1, errors, warnings, vec![], vec![], vec![]);
        assert_eq!(ir.by_target["a"].len(), 2);
        assert!(!ir.is_clean());
    }
}
