//! Run command: execute configured tasks with command-line parameters

use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::info;

use paramtask_core::ParsedArgs;
use paramtask_tasks::{
    InlineScheduler, SchedulerOptions, TaskEvent, TaskReporter, TracingReporter,
};

use crate::cli::{output, Cli, OutputFormat};
use crate::project::Project;

/// Run configured tasks and compositions.
///
/// Flags before the first task name apply to every task; flags after a
/// task name are that task's defaults.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Show the composition tree without running
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum parallel members running at once (default: number of CPUs)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Task names and flags, e.g. `--jobs 4 build --mode release test`
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "TASKS_AND_FLAGS"
    )]
    pub tokens: Vec<String>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(tokens = ?self.tokens, dry_run = self.dry_run, "executing run command");
        let cwd = std::env::current_dir()?;

        let reporter: Arc<dyn TaskReporter> = if cli.quiet || cli.format == OutputFormat::Json {
            Arc::new(TracingReporter)
        } else {
            Arc::new(ConsoleReporter::new(cli.verbose))
        };

        // Parameter declarations come from the configuration, so parse after loading it
        let (config, root) = Project::locate(&cwd)?;
        let parsed = config.parser.parser().parse(self.tokens.clone())?;
        let cli_params = parsed.untargeted().cloned().unwrap_or_default();

        let mut options = SchedulerOptions::default();
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        let scheduler = InlineScheduler::with_options(options, reporter);
        let project = Project::build(config, root, cli_params, scheduler)?;
        let task = project.invocation(&parsed)?;

        if self.dry_run {
            let tree = project.parameterized().describe(&task);
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
                OutputFormat::Text => {
                    print!("{tree}");
                    output::warning("Dry run: no tasks were executed");
                }
            }
            return Ok(());
        }

        let started = Instant::now();
        let result = project.scheduler().run(&task);

        if cli.format == OutputFormat::Json {
            let summary = serde_json::json!({
                "tasks": selected(&parsed),
                "success": result.is_ok(),
                "error": result.as_ref().err().map(ToString::to_string),
                "duration_ms": started.elapsed().as_millis(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        result.map_err(anyhow::Error::from)
    }
}

fn selected(parsed: &ParsedArgs) -> Vec<&str> {
    parsed.task_names().collect()
}

/// Console reporter with live output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn line(&self, event: &TaskEvent) -> Option<String> {
        let indent = "  ";
        let line = match event {
            TaskEvent::Started { name } => {
                format!("{indent}{} {}", style("▸").dim(), style(name).bold())
            }
            TaskEvent::Completed { name, duration } => format!(
                "{indent}{} {} {}",
                style("✓").green(),
                style(name).green(),
                style(format!("{:.1}s", duration.as_secs_f64())).dim()
            ),
            TaskEvent::Failed {
                name,
                duration,
                error,
            } => format!(
                "{indent}{} {} {} {}",
                style("✗").red(),
                style(name).red(),
                style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                style(error).red().dim()
            ),
            TaskEvent::Skipped { name, reason } => format!(
                "{indent}{} {} {}",
                style("○").yellow(),
                style(name).yellow(),
                style(format!("({reason})")).dim()
            ),
            TaskEvent::GroupStarted { kind, task_count } => {
                if !self.verbose {
                    return None;
                }
                format!("{indent}{} {kind} ({task_count} tasks)", style("─").dim())
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                duration,
            } => format!(
                "\n  {} {}/{} succeeded, {} failed ({:.1}s)",
                if *failed == 0 {
                    style("✓").green().bold()
                } else {
                    style("✗").red().bold()
                },
                succeeded,
                total,
                failed,
                duration.as_secs_f64()
            ),
        };
        Some(line)
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        if let Some(line) = self.line(event) {
            println!("{line}");
        }
    }
}
