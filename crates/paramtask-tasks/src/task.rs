//! Task callables and completion handles

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use paramtask_core::ParamBag;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{trace, warn};

/// Name shown for tasks that have neither an explicit nor an intrinsic name
pub const ANONYMOUS: &str = "<anonymous>";

/// Failure reported by a task through its completion handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// A by-name task was not registered when it was invoked
    #[error("task never defined: {0}")]
    NeverDefined(String),

    /// The task body reported a failure
    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    /// Create a failure with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Completion state of a single task run
pub type TaskResult = Result<(), TaskError>;

/// What a task body returns when called.
///
/// Callback-style bodies return `Pending` and fire their [`Done`] later;
/// return-value style bodies return `Finished` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum TaskOutcome {
    /// Completion will be signalled through the handle
    Pending,
    /// The body already finished
    Finished(TaskResult),
}

impl TaskOutcome {
    /// Finished successfully
    pub fn ok() -> Self {
        Self::Finished(Ok(()))
    }

    /// Finished with an error
    pub fn err(error: TaskError) -> Self {
        Self::Finished(Err(error))
    }

    /// Check whether completion is still outstanding
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl From<TaskResult> for TaskOutcome {
    fn from(result: TaskResult) -> Self {
        Self::Finished(result)
    }
}

type Callback = Box<dyn FnOnce(TaskResult) + Send>;

struct Completion {
    label: String,
    callback: Mutex<Option<Callback>>,
}

impl Completion {
    fn take(&self) -> Option<Callback> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Completion handle passed to a task body.
///
/// Clones share one completion, which fires at most once. A handle may also
/// carry the parameters resolved for the body, reachable under each of its
/// parameter alias names, and answer to each of its callback alias names.
#[derive(Clone)]
pub struct Done {
    completion: Arc<Completion>,
    params: Option<Arc<ParamBag>>,
    params_names: Arc<[String]>,
    callback_names: Arc<[String]>,
}

impl Done {
    /// Create a handle that invokes `callback` on completion
    pub fn new(label: impl Into<String>, callback: impl FnOnce(TaskResult) + Send + 'static) -> Self {
        Self {
            completion: Arc::new(Completion {
                label: label.into(),
                callback: Mutex::new(Some(Box::new(callback))),
            }),
            params: None,
            params_names: Arc::from(Vec::new()),
            callback_names: Arc::from(Vec::new()),
        }
    }

    /// Create a handle whose completion is ignored
    pub fn noop() -> Self {
        Self::new(ANONYMOUS, |_| {})
    }

    /// Create a handle paired with a receiver of its completion
    pub fn channel(label: impl Into<String>) -> (Self, oneshot::Receiver<TaskResult>) {
        let (tx, rx) = oneshot::channel();
        let done = Self::new(label, move |result| {
            let _ = tx.send(result);
        });
        (done, rx)
    }

    /// Create a handle that forwards its completion, unchanged, to `parent`
    pub fn forwarding(parent: Done, label: impl Into<String>) -> Self {
        Self::new(label, move |result| parent.complete(result))
    }

    /// Attach parameters, reachable under every name in `names`
    pub fn with_params(mut self, names: &[String], params: ParamBag) -> Self {
        self.params_names = Arc::from(names.to_vec());
        self.params = Some(Arc::new(params));
        self
    }

    /// Make the handle answer to every name in `names`
    pub fn with_callback_names(mut self, names: &[String]) -> Self {
        self.callback_names = Arc::from(names.to_vec());
        self
    }

    /// Label of the task this handle completes
    pub fn label(&self) -> &str {
        &self.completion.label
    }

    /// Parameters under the primary alias
    pub fn params(&self) -> Option<&ParamBag> {
        self.params_names
            .first()
            .and_then(|primary| self.params_as(primary))
    }

    /// Parameters under a specific alias
    pub fn params_as(&self, alias: &str) -> Option<&ParamBag> {
        if self.params_names.iter().any(|n| n == alias) {
            self.params.as_deref()
        } else {
            None
        }
    }

    /// This handle, if it answers to `alias`
    pub fn callback(&self, alias: &str) -> Option<Done> {
        self.callback_names
            .iter()
            .any(|n| n == alias)
            .then(|| self.clone())
    }

    /// Check whether the completion has already fired
    pub fn is_fired(&self) -> bool {
        self.completion
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Signal completion; calls after the first are ignored with a warning
    pub fn complete(&self, result: TaskResult) {
        match self.completion.take() {
            Some(callback) => {
                trace!(task = %self.label(), ok = result.is_ok(), "completion fired");
                callback(result);
            }
            None => {
                warn!(task = %self.label(), "completion already signalled, ignoring");
            }
        }
    }

    /// Signal success
    pub fn ok(&self) {
        self.complete(Ok(()));
    }

    /// Signal failure
    pub fn fail(&self, error: TaskError) {
        self.complete(Err(error));
    }

    /// Signal completion unless it already fired
    pub fn settle(&self, result: TaskResult) {
        if let Some(callback) = self.completion.take() {
            callback(result);
        }
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("label", &self.label())
            .field("params", &self.params)
            .field("params_names", &self.params_names)
            .field("callback_names", &self.callback_names)
            .finish()
    }
}

/// Signature of a task body
pub type TaskFn = dyn Fn(Done, Option<ParamBag>) -> TaskOutcome + Send + Sync;

/// Identity of a task callable; clones of a [`Task`] share it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

/// A named, cloneable task callable
#[derive(Clone)]
pub struct Task {
    name: Option<String>,
    func: Arc<TaskFn>,
    defaults: ParamBag,
    target: Option<String>,
}

impl Task {
    /// Create an anonymous task
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Done, Option<ParamBag>) -> TaskOutcome + Send + Sync + 'static,
    {
        Self {
            name: None,
            func: Arc::new(func),
            defaults: ParamBag::new(),
            target: None,
        }
    }

    /// Create a task with an intrinsic name
    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Done, Option<ParamBag>) -> TaskOutcome + Send + Sync + 'static,
    {
        Self::new(func).with_name(name)
    }

    /// Create a return-value style task from a function of its parameters.
    ///
    /// Parameters come from the positional argument, else from the handle.
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ParamBag) -> TaskResult + Send + Sync + 'static,
    {
        Self::named(name, move |done, params| {
            let params = params
                .or_else(|| done.params().cloned())
                .unwrap_or_default();
            TaskOutcome::Finished(func(&params))
        })
    }

    /// Set the intrinsic name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Record the defaults this task was declared with
    pub fn with_defaults(mut self, defaults: ParamBag) -> Self {
        self.defaults = defaults;
        self
    }

    /// Mark this task as resolving its body through the scheduler by `name`
    pub(crate) fn with_target(mut self, name: impl Into<String>) -> Self {
        self.target = Some(name.into());
        self
    }

    /// Registered name this task looks up on every call, if any
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Intrinsic name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for display, `<anonymous>` when unnamed
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(ANONYMOUS)
    }

    /// Declared defaults
    pub fn defaults(&self) -> &ParamBag {
        &self.defaults
    }

    /// Identity of the underlying callable
    pub fn id(&self) -> TaskId {
        TaskId(Arc::as_ptr(&self.func) as *const () as usize)
    }

    /// Call the body
    pub fn call(&self, done: Done, params: Option<ParamBag>) -> TaskOutcome {
        (self.func)(done, params)
    }

    /// Call the body and route a direct return value into `done`
    pub fn start(&self, done: Done) {
        if let TaskOutcome::Finished(result) = self.call(done.clone(), None) {
            done.settle(result);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.display_name())
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_done_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let done = Done::new("t", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        done.ok();
        done.clone().ok();
        done.fail(TaskError::failed("late"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(done.is_fired());
    }

    #[test]
    fn test_forwarding_passes_error_unchanged() {
        let (parent, rx) = Done::channel("parent");
        let child = Done::forwarding(parent, "child");

        child.fail(TaskError::failed("boom"));

        assert_eq!(rx.blocking_recv().unwrap(), Err(TaskError::failed("boom")));
    }

    #[test]
    fn test_params_reachable_under_every_alias() {
        let bag = ParamBag::from([("p", "v")]);
        let done = Done::noop().with_params(&names(&["params", "parameters"]), bag.clone());

        assert_eq!(done.params(), Some(&bag));
        assert_eq!(done.params_as("parameters"), Some(&bag));
        assert_eq!(done.params_as("opts"), None);
    }

    #[test]
    fn test_callback_aliases() {
        let done = Done::noop().with_callback_names(&names(&["done", "cb", "callback"]));
        assert!(done.callback("cb").is_some());
        assert!(done.callback("next").is_none());
    }

    #[test]
    fn test_settle_is_silent_after_fire() {
        let (done, mut rx) = Done::channel("t");
        done.ok();
        done.settle(Err(TaskError::failed("ignored")));
        assert_eq!(rx.try_recv().unwrap(), Ok(()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_task_identity_shared_by_clones() {
        let task = Task::new(|_, _| TaskOutcome::ok());
        let other = Task::new(|_, _| TaskOutcome::ok());

        assert_eq!(task.id(), task.clone().id());
        assert_ne!(task.id(), other.id());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Task::new(|_, _| TaskOutcome::ok()).display_name(), "<anonymous>");
        assert_eq!(
            Task::named("build", |_, _| TaskOutcome::ok()).display_name(),
            "build"
        );
    }

    #[test]
    fn test_start_routes_return_value() {
        let task = Task::from_fn("fails", |_| Err(TaskError::failed("nope")));
        let (done, rx) = Done::channel("fails");
        task.start(done);
        assert_eq!(rx.blocking_recv().unwrap(), Err(TaskError::failed("nope")));
    }

    #[test]
    fn test_from_fn_reads_params_from_handle() {
        let task = Task::from_fn("check", |params| {
            if params.get_str("mode") == Some("ci") {
                Ok(())
            } else {
                Err(TaskError::failed("wrong mode"))
            }
        });
        let done = Done::noop().with_params(&names(&["params"]), ParamBag::from([("mode", "ci")]));
        assert_eq!(task.call(done, None), TaskOutcome::ok());
    }

    #[test]
    fn test_never_defined_message() {
        assert_eq!(
            TaskError::NeverDefined("deploy".to_string()).to_string(),
            "task never defined: deploy"
        );
    }
}
