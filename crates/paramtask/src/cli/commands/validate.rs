//! Validate command

use clap::Args;
use tracing::info;

use paramtask_core::config::load_config_from_dir;

use crate::cli::{output, Cli, OutputFormat};

/// Validate the configuration
#[derive(Debug, Args)]
pub struct ValidateCommand {}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing validate command");
        let cwd = std::env::current_dir()?;

        // Loading validates
        let (config, path) = load_config_from_dir(&cwd)?;

        if cli.format == OutputFormat::Json {
            let report = serde_json::json!({
                "valid": true,
                "path": path.display().to_string(),
                "tasks": config.tasks.keys().collect::<Vec<_>>(),
                "compositions": config.compositions.keys().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if !cli.quiet {
            output::success(&format!(
                "Configuration is valid ({})",
                output::path_style().apply_to(path.display())
            ));
            println!(
                "{}",
                output::key_value("tasks", &config.tasks.keys().cloned().collect::<Vec<_>>().join(", "))
            );
            println!(
                "{}",
                output::key_value(
                    "compositions",
                    &config.compositions.keys().cloned().collect::<Vec<_>>().join(", ")
                )
            );
        }
        Ok(())
    }
}
