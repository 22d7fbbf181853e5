//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Sweep harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Login identifier (email)
    pub username: String,

    /// Login secret
    pub password: String,

    /// Run the browser headless
    pub headless: bool,

    /// Timeout for a page navigation to complete
    pub page_load_timeout_ms: u64,

    /// Timeout for element interactions and secondary settle waits
    pub interaction_timeout_ms: u64,

    /// Fixed post-load delay for client-side rendering to finish painting
    pub settle_delay_ms: u64,

    /// Delay between target visits
    pub action_delay_ms: u64,

    /// Iteration ceiling for the sweep loop
    pub max_iterations: u32,

    /// Include admin-only targets in the sweep
    pub include_admin: bool,

    /// Restrict the sweep to these target ids (None = all)
    pub only_targets: Option<Vec<String>>,

    /// Capture a screenshot whenever a target produces errors
    pub screenshot_on_error: bool,

    /// Verbose logging
    pub verbose: bool,

    /// Directory for reports and screenshots
    pub output_dir: PathBuf,

    /// Fingerprint message truncation length for cross-iteration matching
    pub fingerprint_len: usize,

    /// Optional YAML menu file overriding the built-in tree
    pub menu_file: Option<PathBuf>,

    /// DOM selectors for the login view
    pub login: LoginSelectors,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            username: String::new(),
            password: String::new(),
            headless: true,
            page_load_timeout_ms: 30_000,
            interaction_timeout_ms: 10_000,
            settle_delay_ms: 1_500,
            action_delay_ms: 0,
            max_iterations: 5,
            include_admin: false,
            only_targets: None,
            screenshot_on_error: true,
            verbose: false,
            output_dir: PathBuf::from("sweep-results"),
            fingerprint_len: 100,
            menu_file: None,
            login: LoginSelectors::default(),
        }
    }
}

/// DOM contract expected of the application's login view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    /// Text-entry field for the login identifier
    pub identifier: String,

    /// Password-type field
    pub password: String,

    /// Submit control
    pub submit: String,

    /// URL prefix reached after a successful login
    pub post_login_prefix: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            identifier: "input[type='email'], input[name='email']".to_string(),
            password: "input[type='password']".to_string(),
            submit: "button[type='submit']".to_string(),
            post_login_prefix: "/dashboard".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.page_load_timeout_ms, 30_000);
        assert_eq!(config.interaction_timeout_ms, 10_000);
        assert_eq!(config.max_iterations, 5);
        assert!(config.headless);
        assert!(config.only_targets.is_none());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
base_url: https://console.example.com
username: sweeper@example.com
max_iterations: 3
"#;
        let config: HarnessConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.base_url, "https://console.example.com");
        assert_eq!(config.max_iterations, 3);
        // Untouched fields keep their defaults
        assert_eq!(config.fingerprint_len, 100);
        assert_eq!(config.login.post_login_prefix, "/dashboard");
    }
}
