//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "paramtask.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "paramtask.yaml";

/// Names under which a task body receives its merged parameters
pub const DEFAULT_PARAMS_NAMES: [&str; 2] = ["params", "parameters"];

/// Names under which a task body receives its completion callback
pub const DEFAULT_CALLBACK_NAMES: [&str; 3] = ["done", "cb", "callback"];

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".paramtask.toml",
        ".paramtask.yaml",
    ]
}

pub(crate) fn default_params_names() -> Vec<String> {
    DEFAULT_PARAMS_NAMES.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn default_callback_names() -> Vec<String> {
    DEFAULT_CALLBACK_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Starter configuration written by `paramtask init`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# paramtask configuration

[options]
params_name = ["params", "parameters"]
callback_name = ["done", "cb", "callback"]
metadata = true

[parser]
number = ["jobs"]
normalize = ["out"]

[parser.alias]
out = ["o"]

[parser.choices]
mode = ["debug", "release"]

[tasks.build]
description = "Compile the project"
command = "echo building {mode} into {out}"
params = "--mode debug --out dist"

[tasks.test]
description = "Run the test suite"
command = "echo testing with {jobs} jobs"
params = { jobs = 4 }

[compositions.ci]
kind = "series"
tasks = ["build", "test"]
params = "--mode release"
"#;
