use std::path::PathBuf;

use clap::{ArgAction, Parser};
use planbridge_runtime::ReporterConfig;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "planbridge",
    about = "Replay recorded test completions into a remote test plan",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "PLANBRIDGE_CONFIG",
        default_value = "planbridge.toml",
        help = "Reporter configuration file (TOML, or JSON when the extension is .json)"
    )]
    pub config: PathBuf,

    #[arg(
        long,
        env = "PLANBRIDGE_EVENTS",
        help = "JSON-lines file with one {\"test\": .., \"result\": ..} object per completed test"
    )]
    pub events: PathBuf,

    #[arg(
        long,
        env = "PLANBRIDGE_TOKEN",
        hide_env_values = true,
        help = "Access token; overrides the token from the configuration file"
    )]
    pub token: Option<String>,

    #[arg(long = "run-title", help = "Title of the created test run")]
    pub run_title: Option<String>,

    #[arg(
        long = "test-run-id",
        value_parser = parse_positive_u64,
        help = "Publish into this existing run instead of creating one"
    )]
    pub test_run_id: Option<u64>,

    #[arg(
        long,
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Emit informational progress logs"
    )]
    pub logging: bool,
}

impl Cli {
    /// Fold command-line overrides into the file configuration.
    pub fn apply_overrides(&self, config: &mut ReporterConfig) {
        if let Some(token) = self.token.as_deref().filter(|token| !token.trim().is_empty()) {
            config.token = token.to_string();
        }
        if let Some(title) = self.run_title.as_deref() {
            config.test_run_title = title.to_string();
        }
        if let Some(run_id) = self.test_run_id {
            config.is_existing_test_run = true;
            config.test_run_id = Some(run_id);
        }
        config.logging |= self.logging;
    }
}
