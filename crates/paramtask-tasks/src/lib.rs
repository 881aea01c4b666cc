//! paramtask tasks - parameterized task wrappers and compositions
//!
//! This crate wraps task bodies so that each invocation receives parameters
//! merged from declared defaults, its caller and the command line, composes
//! wrapped tasks into series and parallel groups through a [`Scheduler`],
//! and records composition trees for introspection.

pub mod composition;
pub mod reporter;
pub mod runtime;
pub mod scheduler;
pub mod shell;
pub mod task;
pub mod tree;
pub mod wrapper;

pub use composition::Composition;
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use runtime::{Logger, Parameterized, RuntimeConfig, SchedulerFactory, SchedulerSource};
pub use scheduler::{InlineScheduler, Scheduler, SchedulerOptions};
pub use shell::{ShellCommand, ShellOutput};
pub use task::{Done, Task, TaskError, TaskId, TaskOutcome, TaskResult};
pub use tree::{NodeKind, TreeNode, TreeRegistry};
pub use wrapper::{TaskArg, TaskSpec};
