//! Init command

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use dialoguer::{Confirm, Select};
use tracing::info;

use paramtask_core::config::defaults::{
    DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML,
};
use paramtask_core::config::Config;

use crate::cli::{output, Cli};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

/// Write a starter configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Use defaults without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Configuration format (prompted for unless --yes)
    #[arg(long)]
    pub config_format: Option<ConfigFormat>,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, yes = self.yes, "executing init command");
        let cwd = std::env::current_dir()?;

        let format = match self.config_format {
            Some(format) => format,
            None if self.yes => ConfigFormat::Toml,
            None => {
                let formats = ["toml", "yaml"];
                let selection = Select::new()
                    .with_prompt("Configuration format")
                    .items(&formats)
                    .default(0)
                    .interact()?;
                if selection == 0 {
                    ConfigFormat::Toml
                } else {
                    ConfigFormat::Yaml
                }
            }
        };

        let config_path = self.output.clone().unwrap_or_else(|| {
            cwd.join(match format {
                ConfigFormat::Toml => DEFAULT_CONFIG_TOML,
                ConfigFormat::Yaml => DEFAULT_CONFIG_YAML,
            })
        });

        // Check if config already exists
        if config_path.exists() && !self.force {
            if self.yes {
                anyhow::bail!(
                    "Configuration file already exists at {}. Use --force to overwrite.",
                    config_path.display()
                );
            }

            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "Configuration file already exists at {}. Overwrite?",
                    config_path.display()
                ))
                .default(false)
                .interact()?;

            if !overwrite {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        write_config(&config_path, format)?;

        if !cli.quiet {
            output::success(&format!(
                "Created configuration at {}",
                output::path_style().apply_to(config_path.display())
            ));
            println!();
            println!("Next steps:");
            println!("  1. Edit {} to declare your tasks", config_path.display());
            println!("  2. Run {} to verify your setup", style("paramtask validate").cyan());
            println!("  3. Run {} to try the example composition", style("paramtask run ci").cyan());
        }

        Ok(())
    }
}

/// Render the starter configuration in a format
fn render_template(format: ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Toml => DEFAULT_CONFIG_TEMPLATE.to_string(),
        ConfigFormat::Yaml => {
            let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE)?;
            format!("# paramtask configuration\n\n{}", serde_yaml::to_string(&config)?)
        }
    })
}

fn write_config(path: &Path, format: ConfigFormat) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_template(format)?)?;
    Ok(())
}
