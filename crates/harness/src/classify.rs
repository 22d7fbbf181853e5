//! Error signal classification
//!
//! Maps a raw error signal (free-text message, optional HTTP status) to
//! exactly one [`Category`]. Matching is case-insensitive substring
//! matching with a fixed precedence, because a single message can contain
//! tokens for several categories (an API timeout mentioning "network"
//! must still classify by the first matching rule).

use serde::{Deserialize, Serialize};

/// Fixed error taxonomy for captured signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Cors,
    Auth,
    Network,
    Api,
    Js,
    /// Reserved for signals sourced from the browser's warning channel;
    /// never produced by message-based classification.
    Warning,
    Unknown,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Cors => write!(f, "CORS"),
            Category::Auth => write!(f, "AUTH"),
            Category::Network => write!(f, "NETWORK"),
            Category::Api => write!(f, "API"),
            Category::Js => write!(f, "JS"),
            Category::Warning => write!(f, "WARNING"),
            Category::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl Category {
    /// All categories in report order
    pub const ALL: [Category; 7] = [
        Category::Cors,
        Category::Auth,
        Category::Network,
        Category::Api,
        Category::Js,
        Category::Warning,
        Category::Unknown,
    ];
}

const CORS_TOKENS: &[&str] = &["cors", "access-control", "cross-origin"];
const AUTH_TOKENS: &[&str] = &["401", "unauthorized", "authentication", "not authenticated"];
const NETWORK_TOKENS: &[&str] = &["fetch", "network", "failed to load", "net::err"];
const API_TOKENS: &[&str] = &["api", "500", "502", "503", "504"];
const JS_TOKENS: &[&str] = &[
    "typeerror",
    "referenceerror",
    "syntaxerror",
    "cannot read",
    "is not defined",
];

/// Classify an error message into exactly one category.
///
/// Total and deterministic: every input maps to a category, identical
/// inputs always map to the same one. Precedence is CORS > AUTH >
/// NETWORK > API > JS > UNKNOWN; the first matching rule wins.
pub fn classify(message: &str, http_status: Option<u16>) -> Category {
    let msg = message.to_ascii_lowercase();

    if CORS_TOKENS.iter().any(|t| msg.contains(t)) {
        return Category::Cors;
    }
    if AUTH_TOKENS.iter().any(|t| msg.contains(t)) || matches!(http_status, Some(401) | Some(403)) {
        return Category::Auth;
    }
    if NETWORK_TOKENS.iter().any(|t| msg.contains(t))
        || http_status.is_some_and(|s| (400..500).contains(&s))
    {
        return Category::Network;
    }
    if API_TOKENS.iter().any(|t| msg.contains(t)) || http_status.is_some_and(|s| s >= 500) {
        return Category::Api;
    }
    if JS_TOKENS.iter().any(|t| msg.contains(t)) {
        return Category::Js;
    }
    Category::Unknown
}

/// Whether a failed-request error text is an expected navigation abort.
///
/// The browser cancels in-flight requests when the page navigates away;
/// counting those as defects would produce permanent false positives on
/// every sweep, so they are discarded before classification.
pub fn is_navigation_abort(error_text: &str) -> bool {
    error_text.to_ascii_lowercase().contains("err_aborted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_total_and_deterministic() {
        let inputs = [
            ("something completely different", None),
            ("CORS policy blocked the request", None),
            ("401 Unauthorized", None),
            ("Failed to fetch", Some(404)),
            ("Internal API failure 500", Some(500)),
            ("TypeError: x is undefined", None),
            ("", None),
        ];
        for (msg, status) in inputs {
            let a = classify(msg, status);
            let b = classify(msg, status);
            assert_eq!(a, b, "classification must be deterministic for {msg:?}");
            assert!(Category::ALL.contains(&a));
        }
    }

    #[test]
    fn cors_takes_precedence_over_js() {
        // Contains both a CORS token and a JS error class name
        let cat = classify(
            "TypeError: blocked by CORS policy (cross-origin request)",
            None,
        );
        assert_eq!(cat, Category::Cors);
    }

    #[test]
    fn auth_takes_precedence_over_network() {
        assert_eq!(classify("network request returned 401", None), Category::Auth);
        assert_eq!(classify("response error", Some(403)), Category::Auth);
    }

    #[test]
    fn status_4xx_is_network_unless_auth() {
        assert_eq!(classify("resource gone", Some(410)), Category::Network);
        assert_eq!(classify("resource gone", Some(401)), Category::Auth);
    }

    #[test]
    fn status_5xx_is_api() {
        assert_eq!(classify("bad gateway", Some(502)), Category::Api);
        assert_eq!(classify("upstream said 503", None), Category::Api);
    }

    #[test]
    fn js_runtime_errors() {
        assert_eq!(
            classify("Cannot read properties of undefined", None),
            Category::Js
        );
        assert_eq!(classify("ReferenceError: foo is not defined", None), Category::Js);
    }

    #[test]
    fn unmatched_is_unknown() {
        assert_eq!(classify("weird message with no tokens", None), Category::Unknown);
    }

    #[test]
    fn navigation_abort_detection() {
        assert!(is_navigation_abort("net::ERR_ABORTED"));
        assert!(is_navigation_abort("ERR_ABORTED"));
        assert!(!is_navigation_abort("net::ERR_CONNECTION_REFUSED"));
    }

    #[test]
    fn low_level_network_token() {
        assert_eq!(
            classify("net::ERR_CONNECTION_REFUSED", None),
            Category::Network
        );
    }
}
