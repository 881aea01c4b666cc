//! Entry point: runtime configuration and the parameterized task factory

use std::fmt;
use std::sync::Arc;

use paramtask_core::config::{
    CompositionKind, OptionsConfig, DEFAULT_CALLBACK_NAMES, DEFAULT_PARAMS_NAMES,
};
use paramtask_core::{ParamBag, ParamError, ParamsParser, ParsedArgs, Result};
use tracing::{debug, info};

use crate::composition;
use crate::scheduler::Scheduler;
use crate::task::{Done, Task};
use crate::tree::{TreeNode, TreeRegistry};
use crate::wrapper::{self, TaskArg, TaskSpec};

/// Sink for user-facing diagnostics
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// Produces a scheduler on demand, `None` when none is available
pub type SchedulerFactory = Arc<dyn Fn() -> Option<Arc<dyn Scheduler>> + Send + Sync>;

/// How the entry point obtains its scheduler
#[derive(Clone)]
pub enum SchedulerSource {
    /// A ready instance
    Instance(Arc<dyn Scheduler>),
    /// Called once when the entry point is constructed
    Factory(SchedulerFactory),
}

/// Options of a [`Parameterized`] entry point.
///
/// Never mutated once handed over; variants are made from clones.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Command-line parameters, highest precedence in every merge
    pub cli_params: Arc<ParamBag>,
    /// Names the merged parameters are reachable under; the first is primary
    pub params_name: Vec<String>,
    /// Names the completion handle answers to
    pub callback_name: Vec<String>,
    /// Scheduler instance or factory
    pub scheduler: Option<SchedulerSource>,
    /// Fallback used when no scheduler source is set
    pub scheduler_loader: Option<SchedulerFactory>,
    /// Diagnostics sink
    pub logger: Logger,
    /// Record composition trees for introspection
    pub metadata: bool,
    /// Flag declarations applied to flags in task names, defaults and overrides
    pub parser: ParamsParser,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the options section of a configuration file
    pub fn from_options(options: &OptionsConfig) -> Self {
        Self::new()
            .params_name(options.params_name.iter().cloned())
            .callback_name(options.callback_name.iter().cloned())
            .metadata(options.metadata)
    }

    /// Use a scheduler instance
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(SchedulerSource::Instance(scheduler));
        self
    }

    /// Obtain the scheduler from a factory
    pub fn scheduler_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Option<Arc<dyn Scheduler>> + Send + Sync + 'static,
    {
        self.scheduler = Some(SchedulerSource::Factory(Arc::new(factory)));
        self
    }

    /// Fallback loader consulted when no scheduler source is set
    pub fn scheduler_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> Option<Arc<dyn Scheduler>> + Send + Sync + 'static,
    {
        self.scheduler_loader = Some(Arc::new(loader));
        self
    }

    /// Set the command-line parameters
    pub fn cli_params(mut self, params: ParamBag) -> Self {
        self.cli_params = Arc::new(params.without_reserved());
        self
    }

    /// Take the command-line parameters from the untargeted bucket
    pub fn cli_args(self, parsed: &ParsedArgs) -> Self {
        let params = parsed.untargeted().cloned().unwrap_or_default();
        self.cli_params(params)
    }

    pub fn params_name<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params_name = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn callback_name<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.callback_name = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.logger = Arc::new(logger);
        self
    }

    pub fn metadata(mut self, enabled: bool) -> Self {
        self.metadata = enabled;
        self
    }

    /// Parse flag strings with these declarations
    pub fn parser(mut self, parser: ParamsParser) -> Self {
        self.parser = parser;
        self
    }

    fn load_scheduler(&self) -> Option<Arc<dyn Scheduler>> {
        match &self.scheduler {
            Some(SchedulerSource::Instance(scheduler)) => Some(scheduler.clone()),
            Some(SchedulerSource::Factory(factory)) => factory(),
            None => self.scheduler_loader.as_ref().and_then(|load| load()),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cli_params: Arc::new(ParamBag::new()),
            params_name: DEFAULT_PARAMS_NAMES.iter().map(|s| s.to_string()).collect(),
            callback_name: DEFAULT_CALLBACK_NAMES.iter().map(|s| s.to_string()).collect(),
            scheduler: None,
            scheduler_loader: None,
            logger: Arc::new(|msg: &str| tracing::error!("{}", msg)),
            metadata: true,
            parser: ParamsParser::new(),
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheduler = match &self.scheduler {
            Some(SchedulerSource::Instance(_)) => "instance",
            Some(SchedulerSource::Factory(_)) => "factory",
            None => "none",
        };
        f.debug_struct("RuntimeConfig")
            .field("cli_params", &self.cli_params)
            .field("params_name", &self.params_name)
            .field("callback_name", &self.callback_name)
            .field("scheduler", &scheduler)
            .field("scheduler_loader", &self.scheduler_loader.is_some())
            .field("metadata", &self.metadata)
            .field("parser", &self.parser.options())
            .finish()
    }
}

/// State shared by every wrapper built from one entry point
pub(crate) struct Runtime {
    pub config: RuntimeConfig,
    pub scheduler: Arc<dyn Scheduler>,
}

impl Runtime {
    pub fn log(&self, message: &str) {
        (self.config.logger)(message);
    }

    /// Parameters handed in by the caller: those on the completion handle
    /// under the primary alias when present, else the positional bag
    pub fn caller_params(&self, done: &Done, positional: Option<ParamBag>) -> ParamBag {
        self.config
            .params_name
            .first()
            .and_then(|primary| done.params_as(primary))
            .cloned()
            .or(positional)
            .unwrap_or_default()
    }

    /// Defaults < caller < command line, reserved keys removed
    pub fn merge(&self, defaults: &ParamBag, caller: &ParamBag) -> ParamBag {
        let mut merged = ParamBag::layered([defaults, caller, self.config.cli_params.as_ref()]);
        merged.strip_reserved();
        merged
    }
}

/// Factory of parameterized tasks and compositions.
///
/// Cheap to clone; clones share the scheduler and the tree registry.
#[derive(Clone)]
pub struct Parameterized {
    runtime: Arc<Runtime>,
    trees: Arc<TreeRegistry>,
}

impl Parameterized {
    /// Create an entry point, resolving the scheduler from the configuration
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::assemble(config, None)
    }

    fn assemble(config: RuntimeConfig, trees: Option<Arc<TreeRegistry>>) -> Result<Self> {
        let Some(scheduler) = config.load_scheduler() else {
            let message = "no task scheduler available: pass one with \
                RuntimeConfig::scheduler, or provide a factory or loader that returns one";
            (config.logger)(message);
            return Err(ParamError::SchedulerUnavailable(
                "scheduler source returned nothing".to_string(),
            ));
        };

        let trees = match trees {
            Some(trees) if trees.is_enabled() == config.metadata => trees,
            _ => Arc::new(TreeRegistry::new(config.metadata)),
        };
        info!(
            cli_params = config.cli_params.len(),
            metadata = config.metadata,
            "parameterized runtime ready"
        );

        Ok(Self {
            runtime: Arc::new(Runtime { config, scheduler }),
            trees,
        })
    }

    /// New entry point using another scheduler
    pub fn with_scheduler(&self, scheduler: Arc<dyn Scheduler>) -> Result<Self> {
        let config = self.runtime.config.clone().scheduler(scheduler);
        Self::assemble(config, Some(self.trees.clone()))
    }

    /// New entry point with adjusted options
    pub fn with_options<F>(&self, adjust: F) -> Result<Self>
    where
        F: FnOnce(RuntimeConfig) -> RuntimeConfig,
    {
        let mut config = adjust(self.runtime.config.clone());
        if config.scheduler.is_none() && config.scheduler_loader.is_none() {
            config = config.scheduler(self.runtime.scheduler.clone());
        }
        Self::assemble(config, Some(self.trees.clone()))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.runtime.config
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.runtime.scheduler
    }

    pub fn cli_params(&self) -> &ParamBag {
        &self.runtime.config.cli_params
    }

    /// Tree registry shared by this entry point and its variants
    pub fn trees(&self) -> &TreeRegistry {
        &self.trees
    }

    /// Wrap a declared task
    pub fn task(&self, spec: TaskSpec) -> Result<Task> {
        let resolved = spec.resolve(&self.runtime.config.parser)?;
        debug!(
            task = resolved.name.as_deref().unwrap_or("<anonymous>"),
            defaults = %resolved.defaults,
            "wrapping task"
        );
        Ok(wrapper::wrap(&self.runtime, resolved))
    }

    /// Wrap a task from dynamic arguments; see [`TaskSpec::from_args`]
    pub fn wrap(&self, args: Vec<TaskArg>) -> Result<Task> {
        self.task(TaskSpec::from_args(args)?)
    }

    /// Compose members to run one after another, with an optional trailing
    /// parameter override
    pub fn series(&self, args: Vec<TaskArg>) -> Result<Task> {
        composition::compose(self, CompositionKind::Series, args)
    }

    /// Compose members to run concurrently, with an optional trailing
    /// parameter override
    pub fn parallel(&self, args: Vec<TaskArg>) -> Result<Task> {
        composition::compose(self, CompositionKind::Parallel, args)
    }

    /// Recorded tree of a composed task
    pub fn tree(&self, task: &Task) -> Option<TreeNode> {
        self.trees.get(task)
    }

    /// Recorded tree of a task, or a leaf for tasks that have none
    pub fn describe(&self, task: &Task) -> TreeNode {
        self.tree(task)
            .unwrap_or_else(|| TreeNode::leaf(composition::label(task, self.cli_params())))
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub(crate) fn parser(&self) -> &ParamsParser {
        &self.runtime.config.parser
    }
}

impl fmt::Debug for Parameterized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameterized")
            .field("config", &self.runtime.config)
            .field("trees", &self.trees.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::InlineScheduler;
    use crate::task::{TaskError, TaskOutcome};
    use paramtask_core::ParamValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    fn runtime(cli: ParamBag) -> (Parameterized, Arc<InlineScheduler>) {
        let scheduler = Arc::new(InlineScheduler::with_reporter(Arc::new(
            crate::reporter::TaskReporterRegistry::empty(),
        )));
        let p = Parameterized::new(
            RuntimeConfig::new()
                .scheduler(scheduler.clone())
                .cli_params(cli),
        )
        .unwrap();
        (p, scheduler)
    }

    /// Task capturing the bag it was invoked with
    fn capture(slot: &Arc<Mutex<Option<ParamBag>>>) -> Task {
        let slot = slot.clone();
        Task::named("capture", move |done, params| {
            *slot.lock().unwrap() = params;
            done.ok();
            TaskOutcome::Pending
        })
    }

    fn captured(slot: &Arc<Mutex<Option<ParamBag>>>) -> ParamBag {
        slot.lock().unwrap().clone().unwrap()
    }

    #[test]
    fn test_precedence_table() {
        let cli = ParamBag::from([("P3", "C3"), ("P4", "C4"), ("P5", "C5"), ("P7", "C7")]);
        let (p, scheduler) = runtime(cli);

        let slot = Arc::new(Mutex::new(None));
        let task1 = p.task(TaskSpec::new("task1", capture(&slot))).unwrap();
        let task2 = p
            .task(
                TaskSpec::anonymous(task1.clone())
                    .with_defaults(ParamBag::from([("P1", "D1"), ("P2", "D2"), ("P4", "D4"), ("P5", "D5")])),
            )
            .unwrap();

        let caller = ParamBag::from([("P2", "R2"), ("P5", "R5"), ("P6", "R6"), ("P7", "R7")]);
        let (done, rx) = Done::channel("test");
        assert!(task2.call(done, Some(caller)).is_pending());
        assert_eq!(rx.blocking_recv().unwrap(), Ok(()));

        let expected = ParamBag::from([
            ("P1", "D1"),
            ("P2", "R2"),
            ("P3", "C3"),
            ("P4", "C4"),
            ("P5", "C5"),
            ("P6", "R6"),
            ("P7", "C7"),
        ]);
        assert_eq!(captured(&slot), expected);

        // A default declared on the inner task itself survives the merge
        let slot = Arc::new(Mutex::new(None));
        let inner = p
            .task(TaskSpec::new("inner", capture(&slot)).with_defaults("--P1 own --P8 D8"))
            .unwrap();
        let outer = p
            .task(TaskSpec::anonymous(inner).with_defaults(ParamBag::from([("P1", "D1")])))
            .unwrap();
        assert_eq!(scheduler.run(&outer), Ok(()));
        let bag = captured(&slot);
        assert_eq!(bag.get_str("P1"), Some("D1"));
        assert_eq!(bag.get_str("P8"), Some("D8"));
    }

    #[test]
    fn test_declared_defaults_arrive_unchanged() {
        let (p, scheduler) = runtime(ParamBag::new());
        let slot = Arc::new(Mutex::new(None));
        let task = p
            .task(TaskSpec::new("build", capture(&slot)).with_defaults("--mode debug --jobs 2 --verbose"))
            .unwrap();

        assert_eq!(scheduler.run(&task), Ok(()));

        let mut expected = ParamBag::new();
        expected.insert("mode", "debug");
        expected.insert("jobs", 2);
        expected.insert("verbose", true);
        assert_eq!(captured(&slot), expected);
    }

    #[test]
    fn test_configured_parser_reads_name_flags() {
        let scheduler = Arc::new(InlineScheduler::with_reporter(Arc::new(
            crate::reporter::TaskReporterRegistry::empty(),
        )));
        let p = Parameterized::new(
            RuntimeConfig::new()
                .scheduler(scheduler.clone())
                .parser(ParamsParser::new().alias("mode", ["m"]).number(["jobs"])),
        )
        .unwrap();
        let slot = Arc::new(Mutex::new(None));
        scheduler.register("build", capture(&slot));

        let task = p.task(TaskSpec::named("build -m release --jobs many")).unwrap();
        assert_eq!(scheduler.run(&task), Ok(()));

        let bag = captured(&slot);
        assert_eq!(bag.get_str("mode"), Some("release"));
        assert_eq!(bag.get_str("m"), Some("release"));
        assert!(bag.get("jobs").is_some_and(ParamValue::is_nan));
    }

    #[test]
    fn test_completion_channel_wins_over_positional() {
        let (p, _) = runtime(ParamBag::new());
        let slot = Arc::new(Mutex::new(None));
        let task = p.task(TaskSpec::anonymous(capture(&slot))).unwrap();

        let names = vec!["params".to_string()];
        let done = Done::noop().with_params(&names, ParamBag::from([("from", "handle")]));
        let _ = task.call(done, Some(ParamBag::from([("from", "positional")])));
        assert_eq!(captured(&slot).get_str("from"), Some("handle"));

        let empty = Done::noop().with_params(&names, ParamBag::new());
        let _ = task.call(empty, Some(ParamBag::from([("from", "positional")])));
        assert!(captured(&slot).is_empty());

        let _ = task.call(Done::noop(), Some(ParamBag::from([("from", "positional")])));
        assert_eq!(captured(&slot).get_str("from"), Some("positional"));
    }

    #[test]
    fn test_reserved_keys_never_reach_body() {
        let (p, _) = runtime(ParamBag::from([("$0", "paramtask"), ("c", "1")]));
        let slot = Arc::new(Mutex::new(None));
        let task = p.task(TaskSpec::anonymous(capture(&slot))).unwrap();

        let _ = task.call(Done::noop(), Some(ParamBag::from([("_", "x"), ("a", "1")])));
        assert_eq!(captured(&slot), ParamBag::from([("a", "1"), ("c", "1")]));
    }

    #[test]
    fn test_callback_aliases_fire_once() {
        let (p, _) = runtime(ParamBag::from([("x", "1")]));
        let body = Task::new(|done, _| {
            assert_eq!(done.params_as("parameters").and_then(|b| b.get_str("x")), Some("1"));
            if let Some(cb) = done.callback("cb") {
                cb.ok();
            }
            if let Some(callback) = done.callback("callback") {
                callback.ok();
            }
            done.ok();
            TaskOutcome::Pending
        });
        let task = p.task(TaskSpec::anonymous(body)).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let done = Done::new("outer", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let _ = task.call(done, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_custom_alias_names() {
        let (p, _) = runtime(ParamBag::new());
        let p = p
            .with_options(|c| c.params_name(["opts"]).callback_name(["next"]))
            .unwrap();
        let body = Task::new(|done, _| {
            assert!(done.params_as("opts").is_some());
            assert!(done.params_as("params").is_none());
            match done.callback("next") {
                Some(next) => next.ok(),
                None => done.fail(TaskError::failed("missing alias")),
            }
            TaskOutcome::Pending
        });
        let task = p.task(TaskSpec::anonymous(body)).unwrap();
        let (done, rx) = Done::channel("t");
        let _ = task.call(done, None);
        assert_eq!(rx.blocking_recv().unwrap(), Ok(()));
    }

    #[test]
    fn test_missing_task_is_reported_not_retried() {
        let logged = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = logged.clone();
        let scheduler = Arc::new(InlineScheduler::new());
        let p = Parameterized::new(
            RuntimeConfig::new()
                .scheduler(scheduler.clone())
                .logger(move |msg| sink.lock().unwrap().push(msg.to_string())),
        )
        .unwrap();

        let task = p.task(TaskSpec::named("deploy")).unwrap();
        assert_eq!(
            scheduler.run(&task),
            Err(TaskError::NeverDefined("deploy".to_string()))
        );
        assert_eq!(*logged.lock().unwrap(), vec!["task never defined: deploy"]);
    }

    #[test]
    fn test_forward_reference_resolves_at_invocation() {
        let (p, scheduler) = runtime(ParamBag::new());
        let task = p.task(TaskSpec::named("later --n 1")).unwrap();

        let slot = Arc::new(Mutex::new(None));
        scheduler.register("later", capture(&slot));

        assert_eq!(scheduler.run(&task), Ok(()));
        assert_eq!(captured(&slot).get("n"), Some(&1.into()));
    }

    #[test]
    fn test_concurrent_invocations_are_independent() {
        let (p, _) = runtime(ParamBag::new());
        let task = p
            .task(TaskSpec::anonymous(Task::new(|done, params| {
                let id = params.and_then(|b| b.get_str("id").map(str::to_string));
                let echoed = done.params().and_then(|b| b.get_str("id").map(str::to_string));
                if id == echoed {
                    TaskOutcome::ok()
                } else {
                    TaskOutcome::err(TaskError::failed("params crossed"))
                }
            })))
            .unwrap();

        thread::scope(|scope| {
            for i in 0..8 {
                let task = task.clone();
                scope.spawn(move || {
                    let params = ParamBag::from([("id", format!("run{i}"))]);
                    assert_eq!(task.call(Done::noop(), Some(params)), TaskOutcome::ok());
                });
            }
        });
    }

    #[test]
    fn test_scheduler_unavailable() {
        let logged = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = logged.clone();
        let err = Parameterized::new(
            RuntimeConfig::new()
                .scheduler_factory(|| None)
                .logger(move |msg| sink.lock().unwrap().push(msg.to_string())),
        )
        .unwrap_err();

        assert!(matches!(err, ParamError::SchedulerUnavailable(_)));
        assert_eq!(logged.lock().unwrap().len(), 1);
        assert!(logged.lock().unwrap()[0].contains("RuntimeConfig::scheduler"));
    }

    #[test]
    fn test_scheduler_loader_fallback() {
        let config = RuntimeConfig::new().scheduler_loader(|| {
            let scheduler: Arc<dyn Scheduler> = Arc::new(InlineScheduler::new());
            Some(scheduler)
        });
        assert!(Parameterized::new(config).is_ok());
    }

    #[test]
    fn test_variants_leave_original_untouched() {
        let (p, _) = runtime(ParamBag::from([("a", "1")]));
        let other = p.with_scheduler(Arc::new(InlineScheduler::new())).unwrap();
        let quiet = p.with_options(|c| c.metadata(false)).unwrap();

        assert!(!Arc::ptr_eq(p.scheduler(), other.scheduler()));
        assert_eq!(other.cli_params().get_str("a"), Some("1"));
        assert!(p.config().metadata);
        assert!(!quiet.trees().is_enabled());
    }

    #[test]
    fn test_from_options() {
        let options = OptionsConfig {
            params_name: vec!["opts".to_string()],
            callback_name: vec!["next".to_string()],
            metadata: false,
        };
        let config = RuntimeConfig::from_options(&options);
        assert_eq!(config.params_name, vec!["opts"]);
        assert_eq!(config.callback_name, vec!["next"]);
        assert!(!config.metadata);
    }
}
