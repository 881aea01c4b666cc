//! Parameter resolution around task bodies
//!
//! A wrapped task merges, per invocation and highest precedence last:
//! its declared defaults, the parameters handed in by its caller, and the
//! command-line parameters. Reserved keys are dropped. The body receives the
//! merged bag both positionally and on its completion handle.

use std::sync::Arc;

use paramtask_core::{ParamBag, ParamError, ParamSource, ParamsParser, ParsedArgs, Result};
use tracing::debug;

use crate::runtime::Runtime;
use crate::task::{Done, Task, TaskError, TaskOutcome, ANONYMOUS};

/// One argument of the dynamic task and composition constructors
#[derive(Debug, Clone)]
pub enum TaskArg {
    /// Task name, optionally followed by flags: `"build --mode release"`
    Name(String),
    /// Task body
    Body(Task),
    /// Parameter defaults or overrides
    Params(ParamSource),
}

impl TaskArg {
    /// Wrap any parameter source, including flag strings
    pub fn params(source: impl Into<ParamSource>) -> Self {
        Self::Params(source.into())
    }

    /// Kind name used in shape errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Name(_) => "string",
            Self::Body(_) => "function",
            Self::Params(source) => source.kind(),
        }
    }

    pub(crate) fn kinds(args: &[TaskArg]) -> Vec<&'static str> {
        args.iter().map(TaskArg::kind).collect()
    }
}

impl From<&str> for TaskArg {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TaskArg {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Task> for TaskArg {
    fn from(task: Task) -> Self {
        Self::Body(task)
    }
}

impl From<ParamBag> for TaskArg {
    fn from(bag: ParamBag) -> Self {
        Self::Params(bag.into())
    }
}

impl From<ParsedArgs> for TaskArg {
    fn from(parsed: ParsedArgs) -> Self {
        Self::Params(parsed.into())
    }
}

impl From<serde_json::Value> for TaskArg {
    fn from(value: serde_json::Value) -> Self {
        Self::Params(value.into())
    }
}

/// Declaration of a parameterized task
#[derive(Debug, Clone)]
pub struct TaskSpec {
    name: Option<String>,
    body: Option<Task>,
    defaults: Option<ParamSource>,
}

impl TaskSpec {
    /// Task resolved by name from the scheduler when invoked.
    ///
    /// Flags after the name become defaults: `"build --mode release"`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            body: None,
            defaults: None,
        }
    }

    /// Task with a body and no explicit name
    pub fn anonymous(task: Task) -> Self {
        Self {
            name: None,
            body: Some(task),
            defaults: None,
        }
    }

    /// Task with a name (flags allowed, as in [`TaskSpec::named`]) and a body
    pub fn new(name: impl Into<String>, task: Task) -> Self {
        Self {
            name: Some(name.into()),
            body: Some(task),
            defaults: None,
        }
    }

    /// Set the declared defaults; flags in the name still take precedence
    pub fn with_defaults(mut self, defaults: impl Into<ParamSource>) -> Self {
        self.defaults = Some(defaults.into());
        self
    }

    /// Resolve the dynamic argument forms:
    /// `(name)`, `(body)`, `(name, body)`, `(name, params)`, `(body, params)`
    /// and `(name, body, params)`
    pub fn from_args(args: Vec<TaskArg>) -> Result<Self> {
        if args.is_empty() || args.len() > 3 {
            return Err(ParamError::ArgumentCount(args.len()));
        }
        let kinds = TaskArg::kinds(&args);

        let mut it = args.into_iter();
        let spec = match (it.next(), it.next(), it.next()) {
            (Some(TaskArg::Name(name)), None, None) => Self::named(name),
            (Some(TaskArg::Body(task)), None, None) => Self::anonymous(task),
            (Some(TaskArg::Name(name)), Some(TaskArg::Body(task)), None) => Self::new(name, task),
            (Some(TaskArg::Name(name)), Some(TaskArg::Params(params)), None) => {
                Self::named(name).with_defaults(params)
            }
            (Some(TaskArg::Body(task)), Some(TaskArg::Params(params)), None) => {
                Self::anonymous(task).with_defaults(params)
            }
            (
                Some(TaskArg::Name(name)),
                Some(TaskArg::Body(task)),
                Some(TaskArg::Params(params)),
            ) => Self::new(name, task).with_defaults(params),
            _ => return Err(ParamError::argument_shape(kinds)),
        };
        Ok(spec)
    }

    pub(crate) fn resolve(self, parser: &ParamsParser) -> Result<Resolved> {
        let (name, inline) = match self.name {
            Some(full) => {
                let (name, inline) = split_name(&full)?;
                (Some(name.to_string()), inline.map(str::to_string))
            }
            None => (None, None),
        };

        let explicit = match self.defaults {
            Some(source) => parser.parse_params(source)?,
            None => ParamBag::new(),
        };
        let inline = match inline {
            Some(flags) => parser.parse_params(flags)?,
            None => ParamBag::new(),
        };
        let defaults = ParamBag::layered([&explicit, &inline]);

        let body = match (self.body, &name) {
            (Some(task), _) => Body::Bound(task),
            (None, Some(name)) => Body::Named(name.clone()),
            (None, None) => return Err(ParamError::argument_shape(Vec::<String>::new())),
        };
        let name = name.or_else(|| match &body {
            Body::Bound(task) => task.name().map(str::to_string),
            Body::Named(name) => Some(name.clone()),
        });

        Ok(Resolved {
            name,
            body,
            defaults,
        })
    }
}

/// Split `"name --flags..."` at the first whitespace run
fn split_name(full: &str) -> Result<(&str, Option<&str>)> {
    let trimmed = full.trim();
    if trimmed.is_empty() {
        return Err(ParamError::other("task name cannot be empty"));
    }
    Ok(match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim_start())),
        None => (trimmed, None),
    })
}

/// Where a wrapper finds its body
#[derive(Debug, Clone)]
pub(crate) enum Body {
    /// Fixed at declaration
    Bound(Task),
    /// Looked up in the scheduler on every invocation
    Named(String),
}

/// A declaration with its defaults decoded
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub name: Option<String>,
    pub body: Body,
    pub defaults: ParamBag,
}

/// Build the scheduler-facing callable for a resolved declaration
pub(crate) fn wrap(runtime: &Arc<Runtime>, resolved: Resolved) -> Task {
    let Resolved {
        name,
        body,
        defaults,
    } = resolved;
    let label = name.clone().unwrap_or_else(|| ANONYMOUS.to_string());
    let declared = defaults.clone();
    let target = match &body {
        Body::Named(name) => Some(name.clone()),
        Body::Bound(_) => None,
    };

    let runtime = runtime.clone();
    let task = Task::new(move |done, params| {
        invoke(&runtime, &label, &body, &defaults, done, params)
    });
    let task = match name {
        Some(name) => task.with_name(name),
        None => task,
    };
    let task = match target {
        Some(target) => task.with_target(target),
        None => task,
    };
    task.with_defaults(declared)
}

fn invoke(
    runtime: &Runtime,
    label: &str,
    body: &Body,
    defaults: &ParamBag,
    done: Done,
    positional: Option<ParamBag>,
) -> TaskOutcome {
    let task = match body {
        Body::Bound(task) => task.clone(),
        Body::Named(name) => match runtime.scheduler.lookup(name) {
            Some(task) => task,
            None => {
                let error = TaskError::NeverDefined(name.clone());
                runtime.log(&error.to_string());
                return TaskOutcome::err(error);
            }
        },
    };

    let caller = runtime.caller_params(&done, positional);
    let params = runtime.merge(defaults, &caller);
    debug!(task = label, params = %params, "invoking task");

    let config = &runtime.config;
    let decorated = Done::forwarding(done, label)
        .with_params(&config.params_name, params.clone())
        .with_callback_names(&config.callback_name);

    task.call(decorated, Some(params))
}
