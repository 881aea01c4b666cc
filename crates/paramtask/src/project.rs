//! Configured tasks and compositions, registered with a scheduler

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use paramtask_core::config::{load_config_or_default, validate_config, CompositionKind, Config};
use paramtask_core::{ParamBag, ParamError, ParsedArgs, Result};
use paramtask_tasks::{
    InlineScheduler, Parameterized, RuntimeConfig, ShellCommand, Task, TaskArg, TaskSpec,
    TreeNode,
};
use tracing::{debug, info};

/// A loaded configuration turned into runnable tasks
pub struct Project {
    config: Config,
    root: PathBuf,
    scheduler: Arc<InlineScheduler>,
    parameterized: Parameterized,
    entries: IndexMap<String, Task>,
}

impl Project {
    /// Load the configuration found from `dir` upwards, or the defaults
    pub fn load(dir: &Path, cli_params: ParamBag, scheduler: InlineScheduler) -> Result<Self> {
        let (config, root) = Self::locate(dir)?;
        Self::build(config, root, cli_params, scheduler)
    }

    /// Configuration found from `dir` upwards, with the directory it lives in
    pub fn locate(dir: &Path) -> Result<(Config, PathBuf)> {
        let (config, path) = load_config_or_default(dir)?;
        let root = path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
        if let Some(path) = &path {
            info!(path = %path.display(), "loaded configuration");
        }
        Ok((config, root))
    }

    /// Register every task and composition of a configuration.
    ///
    /// Commands run relative to `root` unless a task sets its own `cwd`.
    pub fn build(
        config: Config,
        root: PathBuf,
        cli_params: ParamBag,
        scheduler: InlineScheduler,
    ) -> Result<Self> {
        validate_config(&config)?;

        let scheduler = Arc::new(scheduler);
        let runtime = RuntimeConfig::from_options(&config.options)
            .scheduler(scheduler.clone())
            .parser(config.parser.parser())
            .cli_params(cli_params);
        let parameterized = Parameterized::new(runtime)?;

        let mut project = Self {
            config,
            root,
            scheduler,
            parameterized,
            entries: IndexMap::new(),
        };
        project.register_tasks()?;

        let names: Vec<String> = project.config.compositions.keys().cloned().collect();
        for name in names {
            project.entry(&name)?;
        }
        debug!(entries = project.entries.len(), "project assembled");
        Ok(project)
    }

    fn register_tasks(&mut self) -> Result<()> {
        let parser = self.config.parser.parser();
        for (name, task) in &self.config.tasks {
            let cwd = match &task.cwd {
                Some(dir) => self.root.join(dir),
                None => self.root.clone(),
            };
            let command = ShellCommand::new(name, &task.command).with_cwd(cwd);
            let spec = TaskSpec::new(name, command.into_task())
                .with_defaults(task.defaults_with(&parser)?);
            let wrapped = self.parameterized.task(spec)?;

            self.scheduler.register(name, wrapped.clone());
            self.entries.insert(name.clone(), wrapped);
        }
        Ok(())
    }

    /// Task or composition by name, building compositions on first use
    fn entry(&mut self, name: &str) -> Result<Task> {
        if let Some(task) = self.entries.get(name) {
            return Ok(task.clone());
        }
        let Some(composition) = self.config.compositions.get(name).cloned() else {
            return Err(ParamError::other(format!(
                "unknown task or composition: {name}"
            )));
        };

        let mut args = Vec::with_capacity(composition.tasks.len() + 1);
        for member in &composition.tasks {
            args.push(TaskArg::Body(self.entry(member)?));
        }
        let overrides = composition.overrides_with(&self.config.parser.parser())?;
        if !overrides.is_empty() {
            args.push(TaskArg::from(overrides));
        }

        let task = match composition.kind {
            CompositionKind::Series => self.parameterized.series(args)?,
            CompositionKind::Parallel => self.parameterized.parallel(args)?,
        };
        self.scheduler.register(name, task.clone());
        self.entries.insert(name.to_string(), task.clone());
        Ok(task)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<InlineScheduler> {
        &self.scheduler
    }

    pub fn parameterized(&self) -> &Parameterized {
        &self.parameterized
    }

    /// Names of all tasks and compositions, tasks first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.entries.get(name)
    }

    /// Tree of a task or composition
    pub fn describe(&self, name: &str) -> Option<TreeNode> {
        self.get(name).map(|task| self.parameterized.describe(task))
    }

    /// Build the task for a command line.
    ///
    /// Each named bucket selects a task or composition and binds its flags as
    /// that invocation's defaults; the selections run in series.
    pub fn invocation(&self, parsed: &ParsedArgs) -> Result<Task> {
        let mut selected = Vec::new();
        for name in parsed.task_names() {
            if !self.entries.contains_key(name) {
                return Err(ParamError::other(format!(
                    "unknown task '{name}' (available: {})",
                    self.names().collect::<Vec<_>>().join(", ")
                )));
            }
            let defaults = parsed.task(name).cloned().unwrap_or_default();
            let task = self
                .parameterized
                .task(TaskSpec::named(name).with_defaults(defaults))?;
            selected.push(TaskArg::Body(task));
        }

        if selected.is_empty() {
            return Err(ParamError::other("no task given"));
        }
        self.parameterized.series(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramtask_core::config::{CompositionConfig, ParamsConfig, TaskConfig};
    use paramtask_tasks::{CollectingReporter, TaskEvent};

    fn task(command: &str, params: Option<&str>) -> TaskConfig {
        TaskConfig {
            command: command.to_string(),
            params: params.map(|p| ParamsConfig::Flags(p.to_string())),
            cwd: None,
            description: None,
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.tasks.insert("build".into(), task("true", Some("--mode debug")));
        config.tasks.insert("test".into(), task("true", None));
        config.compositions.insert(
            "ci".into(),
            CompositionConfig {
                kind: CompositionKind::Series,
                tasks: vec!["build".into(), "test".into()],
                params: Some(ParamsConfig::Flags("--mode release".into())),
                description: None,
            },
        );
        config.compositions.insert(
            "all".into(),
            CompositionConfig {
                kind: CompositionKind::Parallel,
                tasks: vec!["ci".into(), "test".into()],
                params: None,
                description: None,
            },
        );
        config
    }

    fn project(cli_params: ParamBag) -> (Project, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let dir = std::env::temp_dir();
        let scheduler = InlineScheduler::with_reporter(reporter.clone());
        let project = Project::build(config(), dir, cli_params, scheduler).unwrap();
        (project, reporter)
    }

    #[test]
    fn test_registers_tasks_then_compositions() {
        let (project, _) = project(ParamBag::new());
        let names: Vec<_> = project.names().collect();
        assert_eq!(names, ["build", "test", "ci", "all"]);
        assert!(project.scheduler().task_names().contains(&"ci".to_string()));
    }

    #[test]
    fn test_composition_tree_shows_overrides() {
        let (project, _) = project(ParamBag::new());
        let tree = project.describe("ci").unwrap();
        assert_eq!(tree.label, "<series>");
        let labels: Vec<_> = tree.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["build --mode=release", "test --mode=release"]);
    }

    #[test]
    fn test_nested_composition_reuses_tree() {
        let (project, _) = project(ParamBag::new());
        let tree = project.describe("all").unwrap();
        assert_eq!(tree.label, "<parallel>");
        assert_eq!(tree.children[0], project.describe("ci").unwrap());
    }

    #[test]
    fn test_cli_params_appear_in_labels() {
        let (project, _) = project(ParamBag::from([("mode", "fast")]));
        assert_eq!(project.describe("build").unwrap().label, "build --mode=fast");
    }

    #[test]
    #[cfg(unix)]
    fn test_invocation_runs_selected_in_series() {
        let (project, reporter) = project(ParamBag::new());
        let parsed = project
            .config()
            .parser
            .parser()
            .parse("test build --mode release")
            .unwrap();

        let task = project.invocation(&parsed).unwrap();
        project.scheduler().run(&task).unwrap();

        let started = reporter.started();
        let test = started.iter().position(|n| n == "test").unwrap();
        let build = started.iter().position(|n| n == "build").unwrap();
        assert!(test < build);
        assert!(reporter
            .events()
            .iter()
            .any(|e| matches!(e, TaskEvent::AllCompleted { failed: 0, .. })));
    }

    #[test]
    fn test_invocation_tree_follows_registered_entries() {
        let (project, _) = project(ParamBag::new());
        let parsed = project.config().parser.parser().parse("ci build").unwrap();

        let task = project.invocation(&parsed).unwrap();
        let tree = project.parameterized().describe(&task);
        assert_eq!(tree.label, "<series>");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0], project.describe("ci").unwrap());
        assert_eq!(tree.children[1].label, "build --mode=debug");
    }

    #[test]
    fn test_invocation_tree_shows_bucket_flags() {
        let (project, _) = project(ParamBag::new());
        let parsed = project
            .config()
            .parser
            .parser()
            .parse("test build --mode fast")
            .unwrap();

        let task = project.invocation(&parsed).unwrap();
        let tree = project.parameterized().describe(&task);
        let labels: Vec<_> = tree.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["test", "build --mode=fast"]);
    }

    #[test]
    fn test_declared_aliases_apply_to_task_params() {
        let mut config = config();
        config.parser.alias.insert("mode".into(), vec!["m".into()]);
        config.tasks.insert("lint".into(), task("true", Some("-m strict")));
        let scheduler = InlineScheduler::with_reporter(Arc::new(CollectingReporter::default()));
        let project = Project::build(config, std::env::temp_dir(), ParamBag::new(), scheduler).unwrap();

        let defaults = project.get("lint").unwrap().defaults();
        assert_eq!(defaults.get_str("mode"), Some("strict"));
        assert_eq!(defaults.get_str("m"), Some("strict"));
    }

    #[test]
    fn test_invocation_rejects_unknown_and_empty() {
        let (project, _) = project(ParamBag::new());

        let parsed = project.config().parser.parser().parse("deploy").unwrap();
        let err = project.invocation(&parsed).unwrap_err();
        assert!(err.to_string().contains("unknown task 'deploy'"));

        let parsed = project.config().parser.parser().parse("--mode x").unwrap();
        assert!(project.invocation(&parsed).is_err());
    }

    #[test]
    fn test_load_resolves_cwd_against_config_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("paramtask.toml"),
            "[tasks.build]\ncommand = \"true\"\n",
        )
        .unwrap();
        let nested = dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();

        let reporter = Arc::new(CollectingReporter::default());
        let project =
            Project::load(&nested, ParamBag::new(), InlineScheduler::with_reporter(reporter)).unwrap();
        assert_eq!(project.root, dir.path());
        assert!(project.get("build").is_some());
    }
}
