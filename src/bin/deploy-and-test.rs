//! # Deploy and Test
//!
//! Deploys each security sample to the targeted Cloud Foundry space, checks
//! its endpoints under the different authorization states and deletes
//! everything again.
//!
//! ## Usage
//!
//! Log in with `cf login` first, then run from the samples directory (the one
//! containing `vars.yml`):
//!
//! ```bash
//! deploy-and-test                                  # all scenarios
//! deploy-and-test JavaSecurity                     # one suite
//! deploy-and-test SpringSecurity.token_flows       # one case
//! deploy-and-test --samples-dir ../samples JavaSecurity
//! ```
//!
//! `CFUSER` and `CFPASSWORD` provide the operator credentials; missing values
//! are prompted for. Set `ENABLE_2_FACTOR` when the account requires a
//! second-factor code. `RUST_LOG` controls the log level (default `info`).
//!
//! The process exits with status 1 if any scenario fails.

use sample_verifier::{
    CfCli, Credentials, Harness, HarnessConfig, HttpClient, ProcessRunner, Scenario,
    TerminalPrompt, run_suite,
};
use std::env;
use std::process;

const PROGRAM: &str = "deploy-and-test";
const SAMPLES_DIR_VAR: &str = "SAMPLES_DIR";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (samples_dir, filters) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!();
            eprintln!("Usage: {PROGRAM} [--samples-dir <dir>] [<suite>|<suite.case> ...]");
            eprintln!();
            eprintln!("Scenarios:");
            for scenario in Scenario::ALL {
                eprintln!("  {scenario}");
            }
            process::exit(2);
        }
    };

    let scenarios = match select_scenarios(&filters) {
        Ok(scenarios) => scenarios,
        Err(unknown) => {
            eprintln!("❌ Unknown scenario '{unknown}'");
            process::exit(2);
        }
    };

    let cli = CfCli::new(ProcessRunner);
    if cli.is_logged_off().await {
        eprintln!("To run this script you must be logged into CF via 'cf login'");
        eprintln!("Also make sure to change settings in vars.yml");
        process::exit(1);
    }

    let mut config = HarnessConfig::from_env();
    if let Some(dir) = samples_dir.or_else(|| env::var(SAMPLES_DIR_VAR).ok()) {
        config = config.with_samples_dir(dir);
    }
    let settings = match config.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };
    let credentials = match Credentials::resolve(&mut TerminalPrompt) {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    let harness = Harness::new(cli, HttpClient::new(), credentials, settings, config);
    let report = run_suite(&harness, &scenarios).await;

    println!();
    println!("{report}");
    if !report.is_success() {
        process::exit(1);
    }
}

/// Split arguments into an optional samples directory and scenario filters.
fn parse_args(args: &[String]) -> Result<(Option<String>, Vec<String>), String> {
    let mut samples_dir = None;
    let mut filters = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--samples-dir" => {
                let dir = iter
                    .next()
                    .ok_or_else(|| "--samples-dir requires a directory".to_string())?;
                samples_dir = Some(dir.clone());
            }
            "-h" | "--help" => return Err("help requested".to_string()),
            other if other.starts_with('-') => return Err(format!("unknown option {other}")),
            other => filters.push(other.to_string()),
        }
    }
    Ok((samples_dir, filters))
}

/// All scenarios when no filter is given, otherwise the matching ones in
/// catalog order.
fn select_scenarios(filters: &[String]) -> Result<Vec<Scenario>, String> {
    if filters.is_empty() {
        return Ok(Scenario::ALL.to_vec());
    }
    let mut selected = Vec::new();
    for filter in filters {
        let matches = Scenario::select(filter);
        if matches.is_empty() {
            return Err(filter.clone());
        }
        selected.extend(matches);
    }
    Ok(Scenario::ALL
        .into_iter()
        .filter(|s| selected.contains(s))
        .collect())
}
