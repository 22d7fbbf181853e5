//! FinSweep CLI
//!
//! Runs a full sweep against the configured console deployment and maps
//! the outcome to an exit code: 0 when the application swept clean, 1
//! when the iteration ceiling was exhausted with errors remaining, 2 for
//! fatal harness failures (login, browser startup).

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use finsweep_harness::{HarnessConfig, RunOutcome, TestRunner};

mod output;

#[derive(Parser, Debug)]
#[command(name = "finsweep")]
#[command(about = "Browser-driven console error sweep for the FinOps console")]
#[command(version)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the application under test
    #[arg(long)]
    base_url: Option<String>,

    /// Login identifier
    #[arg(long, env = "FINSWEEP_USER")]
    username: Option<String>,

    /// Login secret
    #[arg(long, env = "FINSWEEP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Maximum number of sweep iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Include admin-only targets
    #[arg(long)]
    include_admin: bool,

    /// Restrict the sweep to these target ids
    #[arg(long = "only", value_delimiter = ',')]
    only_targets: Vec<String>,

    /// YAML menu file overriding the built-in navigation tree
    #[arg(long)]
    menu: Option<PathBuf>,

    /// Output directory for reports and screenshots
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable screenshots on error
    #[arg(long)]
    no_screenshots: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&format!("invalid configuration: {e}"));
            std::process::exit(2);
        }
    };

    let filter = if args.debug || config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let code = rt.block_on(run(config));
    std::process::exit(code);
}

async fn run(config: HarnessConfig) -> i32 {
    info!(output_dir = %config.output_dir.display(), "finsweep starting");

    let mut runner = TestRunner::new(config);
    match runner.run().await {
        Ok(summary) => {
            output::print_summary(&summary);
            match summary.outcome {
                RunOutcome::Clean => 0,
                RunOutcome::Exhausted => 1,
                RunOutcome::AuthFailed => 2,
            }
        }
        Err(e) => {
            output::print_error(&format!("run failed: {e}"));
            2
        }
    }
}

fn build_config(args: &Args) -> anyhow::Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(username) = &args.username {
        config.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    if args.headed {
        config.headless = false;
    }
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    if args.include_admin {
        config.include_admin = true;
    }
    if !args.only_targets.is_empty() {
        config.only_targets = Some(args.only_targets.clone());
    }
    if let Some(menu) = &args.menu {
        config.menu_file = Some(menu.clone());
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if args.no_screenshots {
        config.screenshot_on_error = false;
    }
    if args.debug {
        config.verbose = true;
    }

    if config.username.is_empty() || config.password.is_empty() {
        anyhow::bail!("credentials required: set --username/--password or FINSWEEP_USER/FINSWEEP_PASSWORD");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from([
            "finsweep",
            "--username",
            "sweeper@example.com",
            "--password",
            "secret",
        ])
    }

    #[test]
    fn flags_override_defaults() {
        let mut args = base_args();
        args.max_iterations = Some(2);
        args.headed = true;
        args.only_targets = vec!["costs-daily".to_string()];

        let config = build_config(&args).unwrap();
        assert_eq!(config.max_iterations, 2);
        assert!(!config.headless);
        assert_eq!(
            config.only_targets.as_deref(),
            Some(&["costs-daily".to_string()][..])
        );
    }

    #[test]
    fn missing_credentials_rejected() {
        let args = Args::parse_from(["finsweep"]);
        // No env fallback in this test context means empty credentials
        if args.username.is_none() && args.password.is_none() {
            assert!(build_config(&args).is_err());
        }
    }
}
