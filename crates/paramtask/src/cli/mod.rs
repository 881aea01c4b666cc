//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{InitCommand, ParseCommand, RunCommand, TreeCommand, ValidateCommand};

/// paramtask - run parameterized build tasks
#[derive(Debug, Parser)]
#[command(name = "paramtask")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a starter configuration
    Init(InitCommand),

    /// Parse flags into per-task parameters
    Parse(ParseCommand),

    /// Run configured tasks and compositions
    Run(RunCommand),

    /// Show composition trees
    Tree(TreeCommand),

    /// Validate the configuration
    Validate(ValidateCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Parse(ref cmd) => cmd.execute(&self),
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Tree(ref cmd) => cmd.execute(&self),
            Commands::Validate(ref cmd) => cmd.execute(&self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_keeps_flags_for_tasks() {
        let cli = Cli::parse_from(["paramtask", "run", "--dry-run", "build", "--mode", "release", "-j", "4"]);
        match cli.command {
            Commands::Run(cmd) => {
                assert!(cmd.dry_run);
                assert_eq!(cmd.tokens, ["build", "--mode", "release", "-j", "4"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["paramtask", "--format", "json", "-C", "/tmp", "tree"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.directory.as_deref(), Some(std::path::Path::new("/tmp")));
    }
}
