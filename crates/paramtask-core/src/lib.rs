//! paramtask core - parameter parsing for build tasks
//!
//! This crate provides the parameter value types, the command-line flag
//! decoder, task-bucket splitting of token streams, the parameter parser and
//! the file configuration layer used by the paramtask runtime and CLI.

pub mod config;
pub mod error;
pub mod flags;
pub mod params;
pub mod parser;
pub mod split;

pub use error::{ConfigError, ParamError, Result};
pub use flags::{is_flag, is_number, FlagOptions};
pub use params::{ParamBag, ParamSource, ParamValue, ParsedArgs, RESERVED_KEYS};
pub use parser::{parse, parse_params, tokenize, ParamsParser};
pub use split::{split_into_tasks, TaskBuckets};
