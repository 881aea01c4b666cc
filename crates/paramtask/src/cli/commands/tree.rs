//! Tree command

use std::sync::Arc;

use clap::Args;
use indexmap::IndexMap;
use tracing::info;

use paramtask_tasks::{InlineScheduler, TracingReporter, TreeNode};

use crate::cli::{output, Cli, OutputFormat};
use crate::project::Project;

/// Show composition trees
#[derive(Debug, Args)]
pub struct TreeCommand {
    /// Tasks or compositions to show (default: all compositions)
    pub names: Vec<String>,

    /// Command-line parameters to render into the labels, e.g. "--mode release"
    #[arg(long, allow_hyphen_values = true)]
    pub params: Option<String>,
}

impl TreeCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(names = ?self.names, "executing tree command");
        let cwd = std::env::current_dir()?;

        let (config, root) = Project::locate(&cwd)?;
        let cli_params = match &self.params {
            Some(flags) => config.parser.parser().parse_params(flags.as_str())?,
            None => Default::default(),
        };
        let scheduler = InlineScheduler::with_reporter(Arc::new(TracingReporter));
        let project = Project::build(config, root, cli_params, scheduler)?;

        let trees = collect(&project, &self.names)?;
        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&trees)?);
            return Ok(());
        }

        if trees.is_empty() {
            output::info("No compositions configured");
            return Ok(());
        }
        for (name, tree) in &trees {
            println!("{}", output::header(name));
            print!("{tree}");
            println!();
        }
        Ok(())
    }
}

fn collect(project: &Project, names: &[String]) -> anyhow::Result<IndexMap<String, TreeNode>> {
    let names: Vec<String> = if names.is_empty() {
        project.config().compositions.keys().cloned().collect()
    } else {
        names.to_vec()
    };

    names
        .into_iter()
        .map(|name| match project.describe(&name) {
            Some(tree) => Ok((name, tree)),
            None => anyhow::bail!("unknown task or composition: {name}"),
        })
        .collect()
}
