//! Configuration types

use std::collections::BTreeMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flags::FlagOptions;
use crate::params::ParamBag;
use crate::parser::ParamsParser;

use super::defaults::{default_callback_names, default_params_names};

/// Main configuration for paramtask
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime options
    pub options: OptionsConfig,

    /// Flag declarations used when parsing command-line tokens
    pub parser: ParserConfig,

    /// Shell tasks by name
    pub tasks: IndexMap<String, TaskConfig>,

    /// Series/parallel compositions by name
    pub compositions: IndexMap<String, CompositionConfig>,
}

impl Config {
    /// Check whether a task or composition of this name exists
    pub fn defines(&self, name: &str) -> bool {
        self.tasks.contains_key(name) || self.compositions.contains_key(name)
    }
}

/// Runtime options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    /// Parameter alias names, first is primary
    pub params_name: Vec<String>,

    /// Completion callback alias names, first is primary
    pub callback_name: Vec<String>,

    /// Record composition trees for introspection
    pub metadata: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            params_name: default_params_names(),
            callback_name: default_callback_names(),
            metadata: true,
        }
    }
}

/// Flag declarations for command-line parsing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Flag name to its aliases
    pub alias: BTreeMap<String, Vec<String>>,

    /// Flags always parsed as numbers
    pub number: Vec<String>,

    /// Flags always kept as strings
    pub string: Vec<String>,

    /// Flag name to its allowed values
    pub choices: BTreeMap<String, Vec<String>>,

    /// Flags whose values are normalized as paths
    pub normalize: Vec<String>,
}

impl ParserConfig {
    /// Build the flag declarations
    pub fn flag_options(&self) -> FlagOptions {
        let mut options = FlagOptions::new()
            .number(self.number.iter().cloned())
            .string(self.string.iter().cloned())
            .normalize(self.normalize.iter().cloned());
        for (name, aliases) in &self.alias {
            options = options.alias(name.clone(), aliases.iter().cloned());
        }
        for (key, values) in &self.choices {
            options = options.choices(key.clone(), values.iter().cloned());
        }
        options
    }

    /// Build a parser using these declarations
    pub fn parser(&self) -> ParamsParser {
        ParamsParser::with_options(self.flag_options())
    }
}

/// Parameter defaults, written as a flag string or a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamsConfig {
    /// `"--mode debug --out dist"`
    Flags(String),
    /// `{ mode = "debug", jobs = 4 }`
    Table(ParamBag),
}

impl ParamsConfig {
    /// Resolve into a bag with no flag declarations
    pub fn to_bag(&self) -> Result<ParamBag> {
        self.parse_with(&ParamsParser::new())
    }

    /// Resolve into a bag, parsing flag strings with `parser`
    pub fn parse_with(&self, parser: &ParamsParser) -> Result<ParamBag> {
        match self {
            Self::Flags(flags) => parser.parse_params(flags.as_str()),
            Self::Table(bag) => Ok(bag.without_reserved()),
        }
    }
}

/// A shell task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Shell command; `{param}` placeholders are replaced by parameter values
    pub command: String,

    /// Default parameters
    pub params: Option<ParamsConfig>,

    /// Working directory, relative to the config file
    pub cwd: Option<PathBuf>,

    /// Human-readable description
    pub description: Option<String>,
}

impl TaskConfig {
    /// Declared default parameters
    pub fn defaults(&self) -> Result<ParamBag> {
        self.defaults_with(&ParamsParser::new())
    }

    /// Declared default parameters, parsed with the configured flag declarations
    pub fn defaults_with(&self, parser: &ParamsParser) -> Result<ParamBag> {
        self.params
            .as_ref()
            .map_or_else(|| Ok(ParamBag::new()), |params| params.parse_with(parser))
    }
}

/// Execution style of a composition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionKind {
    /// One member after another
    #[default]
    Series,
    /// All members concurrently
    Parallel,
}

impl std::fmt::Display for CompositionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Series => write!(f, "series"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// A named composition of tasks and other compositions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Series or parallel
    pub kind: CompositionKind,

    /// Member names, in order
    pub tasks: Vec<String>,

    /// Override applied to every member
    pub params: Option<ParamsConfig>,

    /// Human-readable description
    pub description: Option<String>,
}

impl CompositionConfig {
    /// Declared override parameters
    pub fn overrides(&self) -> Result<ParamBag> {
        self.overrides_with(&ParamsParser::new())
    }

    pub fn overrides_with(&self, parser: &ParamsParser) -> Result<ParamBag> {
        self.params
            .as_ref()
            .map_or_else(|| Ok(ParamBag::new()), |params| params.parse_with(parser))
    }
}
