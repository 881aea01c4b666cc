//! CLI commands

mod init;
mod parse;
mod run;
mod tree;
mod validate;

pub use init::InitCommand;
pub use parse::ParseCommand;
pub use run::RunCommand;
pub use tree::TreeCommand;
pub use validate::ValidateCommand;
