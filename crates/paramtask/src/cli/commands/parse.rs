//! Parse command

use clap::Args;
use console::style;
use tracing::info;

use paramtask_core::{ParamsParser, ParsedArgs};

use crate::cli::{Cli, OutputFormat};

/// Parse flags into per-task parameters
#[derive(Debug, Args)]
pub struct ParseCommand {
    /// Alias declaration, e.g. `out=o,output` (can be repeated)
    #[arg(long, value_name = "NAME=ALIASES")]
    pub alias: Vec<String>,

    /// Allowed values, e.g. `mode=debug,release` (can be repeated)
    #[arg(long, value_name = "KEY=VALUES")]
    pub choices: Vec<String>,

    /// Coerce the key to a number (can be repeated)
    #[arg(long, value_name = "KEY")]
    pub number: Vec<String>,

    /// Keep the key as a string (can be repeated)
    #[arg(long, value_name = "KEY")]
    pub string: Vec<String>,

    /// Normalize the key as a path (can be repeated)
    #[arg(long, value_name = "KEY")]
    pub normalize: Vec<String>,

    /// Print each bucket as a flag string
    #[arg(long)]
    pub flags: bool,

    /// Tokens to parse
    #[arg(last = true)]
    pub tokens: Vec<String>,
}

impl ParseCommand {
    /// Execute the parse command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(tokens = self.tokens.len(), "executing parse command");
        let parser = self.parser()?;
        let parsed = parser.parse(self.tokens.clone())?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            return Ok(());
        }
        print!("{}", render(&parsed, self.flags));
        Ok(())
    }

    fn parser(&self) -> anyhow::Result<ParamsParser> {
        let mut parser = ParamsParser::new()
            .number(&self.number)
            .string(&self.string)
            .normalize(&self.normalize);
        for decl in &self.alias {
            let (name, aliases) = split_decl(decl)?;
            parser = parser.alias(name, aliases);
        }
        for decl in &self.choices {
            let (key, values) = split_decl(decl)?;
            parser = parser.choices(key, values);
        }
        Ok(parser)
    }
}

/// `key=a,b` -> (`key`, [`a`, `b`])
fn split_decl(decl: &str) -> anyhow::Result<(&str, Vec<&str>)> {
    let Some((key, values)) = decl.split_once('=') else {
        anyhow::bail!("expected KEY=VALUE[,VALUE...], got '{decl}'");
    };
    let values: Vec<&str> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if key.trim().is_empty() || values.is_empty() {
        anyhow::bail!("expected KEY=VALUE[,VALUE...], got '{decl}'");
    }
    Ok((key.trim(), values))
}

fn render(parsed: &ParsedArgs, as_flags: bool) -> String {
    let mut out = String::new();
    for (task, bag) in parsed.iter() {
        let heading = match task {
            Some(name) => style(name).cyan().bold().to_string(),
            None => style("(untargeted)").dim().to_string(),
        };
        if as_flags {
            let line = format!("{heading} {}", bag.to_flags());
            out.push_str(line.trim_end());
            out.push('\n');
            continue;
        }
        out.push_str(&heading);
        out.push('\n');
        for (key, value) in bag.iter() {
            out.push_str(&format!("  {}: {}\n", style(key).dim(), value));
        }
    }
    out
}
