//! FinSweep console error sweep harness
//!
//! This crate drives a headless browser through the FinOps console,
//! captures every error signal the browser surface produces, classifies
//! each one, and diffs iterations against each other until the
//! application is clean or an iteration ceiling is reached.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     TestRunner (orchestrator)                │
//! ├──────────────────────────────────────────────────────────────┤
//! │  BrowserSession                                              │
//! │    └── launch() -> headless Chrome + CDP handler task        │
//! │  ConsoleMonitor                                              │
//! │    ├── attach(page) -> four CDP event subscriptions          │
//! │    │     console messages / uncaught exceptions              │
//! │    │     failed requests / HTTP responses                    │
//! │    └── errors() / warnings() -> Vec<CapturedSignal>          │
//! │  MenuNavigator                                               │
//! │    ├── flatten(menu) -> pre-order target list                │
//! │    └── navigate_to_route() -> NavigationResult + PageProbe   │
//! │  ErrorReporter                                               │
//! │    ├── compare() -> new / fixed / persistent                 │
//! │    └── write_report() -> iteration-NN.md                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sweep is strictly sequential: one browser, one page, targets
//! visited one at a time in pre-order. The only background tasks are the
//! CDP handler drain and the monitor's event forwarders, which never
//! navigate and only append to the monitor's collections.

pub mod auth;
pub mod browser;
pub mod classify;
pub mod config;
pub mod error;
pub mod menu;
pub mod monitor;
pub mod navigator;
pub mod report;
pub mod runner;
pub mod signal;

pub use classify::{classify, Category};
pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use menu::NavigationTarget;
pub use monitor::ConsoleMonitor;
pub use report::ErrorReporter;
pub use runner::{RunOutcome, RunSummary, TestRunner};
pub use signal::{CapturedSignal, IterationResult, NavigationResult};
