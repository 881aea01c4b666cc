//! Series and parallel compositions with parameter overrides

use paramtask_core::config::CompositionKind;
use paramtask_core::{ParamBag, ParamError, ParamSource, Result};
use tracing::{debug, instrument};

use crate::runtime::Parameterized;
use crate::task::{Task, TaskOutcome};
use crate::tree::TreeNode;
use crate::wrapper::{self, Body, Resolved, TaskArg, TaskSpec};

/// Typed builder for a composition
#[derive(Debug, Clone)]
pub struct Composition {
    kind: CompositionKind,
    members: Vec<TaskArg>,
    params: Option<ParamSource>,
}

impl Composition {
    pub fn new(kind: CompositionKind) -> Self {
        Self {
            kind,
            members: Vec::new(),
            params: None,
        }
    }

    pub fn series() -> Self {
        Self::new(CompositionKind::Series)
    }

    pub fn parallel() -> Self {
        Self::new(CompositionKind::Parallel)
    }

    /// Add a member: a task name (flags allowed) or a task
    pub fn task(mut self, member: impl Into<TaskArg>) -> Self {
        self.members.push(member.into());
        self
    }

    /// Override handed to every member
    pub fn params(mut self, params: impl Into<ParamSource>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Build the composite task
    pub fn build(self, parameterized: &Parameterized) -> Result<Task> {
        let mut args = self.members;
        if let Some(params) = self.params {
            args.push(TaskArg::Params(params));
        }
        compose(parameterized, self.kind, args)
    }
}

/// Display label of a member: its name followed by its rendered parameters
pub(crate) fn label(task: &Task, params: &ParamBag) -> String {
    format!("{} {}", task.display_name(), params.to_flags())
        .trim_end()
        .to_string()
}

/// Separate members from the trailing override
fn split_args(args: Vec<TaskArg>) -> Result<(Vec<TaskArg>, Option<ParamSource>)> {
    let kinds = TaskArg::kinds(&args);
    let mut members = args;
    let params = match members.last() {
        Some(TaskArg::Params(_)) => match members.pop() {
            Some(TaskArg::Params(params)) => Some(params),
            _ => None,
        },
        _ => None,
    };

    let misplaced = members.iter().any(|m| matches!(m, TaskArg::Params(_)));
    if members.is_empty() || misplaced {
        return Err(ParamError::argument_shape(kinds));
    }
    Ok((members, params))
}

#[instrument(skip_all, fields(kind = %kind, args = args.len()))]
pub(crate) fn compose(
    parameterized: &Parameterized,
    kind: CompositionKind,
    args: Vec<TaskArg>,
) -> Result<Task> {
    let (members, params) = split_args(args)?;
    let overrides = match params {
        Some(source) => parameterized.parser().parse_params(source)?,
        None => ParamBag::new(),
    };

    let scheduler = parameterized.scheduler();
    let cli = parameterized.cli_params();
    let mut bases = Vec::with_capacity(members.len());
    let mut children = Vec::with_capacity(members.len());

    for member in members {
        // `bound` carries the defaults of a wrapper that delegates to a registered task
        let (base, known, bound) = match member {
            TaskArg::Name(name) => {
                let base = parameterized.task(TaskSpec::named(name))?;
                let known = base.target().and_then(|n| scheduler.lookup(n));
                (base, known, ParamBag::new())
            }
            TaskArg::Body(task) => {
                let base = parameterized.task(TaskSpec::anonymous(task.clone()))?;
                match task.target().and_then(|n| scheduler.lookup(n)) {
                    Some(registered) => (base, Some(registered), task.defaults().clone()),
                    None => (base, Some(task), ParamBag::new()),
                }
            }
            TaskArg::Params(_) => unreachable!("overrides are split off above"),
        };

        let child = known
            .as_ref()
            .and_then(|task| parameterized.tree(task))
            .unwrap_or_else(|| {
                let member_defaults = known.as_ref().map(Task::defaults).cloned().unwrap_or_default();
                let params = ParamBag::layered([
                    &member_defaults,
                    &bound,
                    base.defaults(),
                    &overrides,
                    cli,
                ]);
                TreeNode::leaf(label(&base, &params))
            });

        bases.push(base);
        children.push(child);
    }

    let composite_name = format!("<{kind}>");
    debug!(
        composite = %composite_name,
        members = bases.len(),
        overrides = %overrides,
        "building composition"
    );

    let runtime = parameterized.runtime().clone();
    let body = Task::named(composite_name.clone(), move |done, params| {
        let params = params.unwrap_or_default();
        let members = bases
            .iter()
            .map(|base| {
                wrapper::wrap(
                    &runtime,
                    Resolved {
                        name: base.name().map(str::to_string),
                        body: Body::Bound(base.clone()),
                        defaults: params.clone(),
                    },
                )
            })
            .collect();
        let combined = match kind {
            CompositionKind::Series => runtime.scheduler.series(members),
            CompositionKind::Parallel => runtime.scheduler.parallel(members),
        };
        match combined.call(done.clone(), None) {
            TaskOutcome::Finished(result) => {
                done.settle(result);
                TaskOutcome::Pending
            }
            TaskOutcome::Pending => TaskOutcome::Pending,
        }
    });

    let composite = parameterized.task(TaskSpec::new(composite_name.clone(), body).with_defaults(overrides))?;
    parameterized
        .trees()
        .record(&composite, TreeNode::composite(composite_name, children));
    Ok(composite)
}
