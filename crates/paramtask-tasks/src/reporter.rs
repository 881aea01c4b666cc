//! Task execution reporting

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use paramtask_core::config::CompositionKind;

/// Events emitted while a scheduler runs tasks
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A task is starting execution
    Started { name: String },
    /// A task completed successfully
    Completed { name: String, duration: Duration },
    /// A task failed
    Failed {
        name: String,
        duration: Duration,
        error: String,
    },
    /// A series member was not run because an earlier one failed
    Skipped { name: String, reason: String },
    /// A series or parallel group is starting
    GroupStarted {
        kind: CompositionKind,
        task_count: usize,
    },
    /// A top-level run finished
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        duration: Duration,
    },
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { name } => {
                tracing::info!("Starting {}", name);
            }
            TaskEvent::Completed { name, duration } => {
                tracing::info!("{} completed in {:.1}s", name, duration.as_secs_f64());
            }
            TaskEvent::Failed {
                name,
                duration,
                error,
            } => {
                tracing::error!("{} failed after {:.1}s: {}", name, duration.as_secs_f64(), error);
            }
            TaskEvent::Skipped { name, reason } => {
                tracing::info!("{} skipped: {}", name, reason);
            }
            TaskEvent::GroupStarted { kind, task_count } => {
                tracing::debug!("Starting {} group ({} tasks)", kind, task_count);
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                duration,
            } => {
                tracing::info!(
                    "All tasks complete: {}/{} succeeded, {} failed ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of started tasks, in start order
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Started { name } => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Registry of task reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    /// Register a reporter that is also held elsewhere
    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }
}

impl TaskReporter for TaskReporterRegistry {
    /// Broadcast an event to all registered reporters
    fn report(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
