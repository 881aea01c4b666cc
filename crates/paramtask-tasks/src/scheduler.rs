//! Scheduler collaborator and an in-process implementation

use std::cell::RefCell;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use paramtask_core::config::CompositionKind;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, instrument};

use crate::reporter::{TaskEvent, TaskReporter, TaskReporterRegistry};
use crate::task::{Done, Task, TaskError, TaskOutcome, TaskResult};

/// Task registry and combinators of a host task runner.
///
/// Wrapped tasks resolve by-name bodies through [`Scheduler::lookup`] at
/// invocation time, and compositions delegate ordering to
/// [`Scheduler::series`] and [`Scheduler::parallel`].
pub trait Scheduler: Send + Sync {
    /// Find a registered task by name
    fn lookup(&self, name: &str) -> Option<Task>;

    /// Combine tasks into one that runs them one after another
    fn series(&self, tasks: Vec<Task>) -> Task;

    /// Combine tasks into one that runs them concurrently
    fn parallel(&self, tasks: Vec<Task>) -> Task;
}

/// Options for the inline scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum members of parallel groups running at once
    pub concurrency: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

thread_local! {
    /// Permit of the parallel member running on this thread
    static HELD: RefCell<Option<OwnedSemaphorePermit>> = const { RefCell::new(None) };
}

/// Keeps a permit in [`HELD`] while a member runs
struct HeldPermit;

impl HeldPermit {
    fn hold(permit: OwnedSemaphorePermit) -> Self {
        HELD.with(|slot| *slot.borrow_mut() = Some(permit));
        Self
    }
}

impl Drop for HeldPermit {
    fn drop(&mut self) {
        HELD.with(|slot| slot.borrow_mut().take());
    }
}

/// Blocking pool shared by the parallel groups of one scheduler
struct Executor {
    runtime: OnceLock<Runtime>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl Executor {
    fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            runtime: OnceLock::new(),
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Handle of the runtime, started on first use
    fn handle(&self) -> Result<Handle, TaskError> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime.handle().clone());
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("paramtask-worker")
            .enable_all()
            .build()
            .map_err(|e| TaskError::failed(format!("cannot start task runtime: {e}")))?;
        debug!(concurrency = self.concurrency, "task runtime started");
        // Another group may have won the race; its runtime is kept
        let _ = self.runtime.set(runtime);
        self.runtime
            .get()
            .map(|runtime| runtime.handle().clone())
            .ok_or_else(|| TaskError::failed("task runtime unavailable"))
    }

    /// Run members on the blocking pool, at most `concurrency` at a time.
    ///
    /// Returns the first failure in member order.
    fn run_all(&self, tasks: &[Task], reporter: &Arc<dyn TaskReporter>) -> TaskResult {
        let handle = self.handle()?;

        // A member waiting on its own group hands its slot to the group
        let released = HELD.with(|slot| slot.borrow_mut().take()).is_some();

        let results = handle.block_on(async {
            let mut set = JoinSet::new();
            for (index, task) in tasks.iter().cloned().enumerate() {
                let permits = self.permits.clone();
                let reporter = reporter.clone();
                set.spawn(async move {
                    let result = match permits.acquire_owned().await {
                        Ok(permit) => tokio::task::spawn_blocking(move || {
                            let _held = HeldPermit::hold(permit);
                            run_one(&task, reporter.as_ref())
                        })
                        .await
                        .unwrap_or_else(|e| Err(TaskError::failed(format!("task panicked: {e}")))),
                        Err(_) => Err(TaskError::failed("task scheduler closed")),
                    };
                    (index, result)
                });
            }

            let mut results: Vec<TaskResult> = vec![Ok(()); tasks.len()];
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, result)) => results[index] = result,
                    Err(e) => results.push(Err(TaskError::failed(format!("task panicked: {e}")))),
                }
            }
            results
        });

        if released {
            if let Ok(permit) = handle.block_on(self.permits.clone().acquire_owned()) {
                HELD.with(|slot| *slot.borrow_mut() = Some(permit));
            }
        }

        results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
    }
}

/// Scheduler running series on the calling thread and parallel groups on a
/// bounded tokio blocking pool. A series stops at its first failure.
pub struct InlineScheduler {
    registry: RwLock<IndexMap<String, Task>>,
    reporter: Arc<dyn TaskReporter>,
    executor: Arc<Executor>,
}

impl InlineScheduler {
    /// Create a scheduler reporting through tracing
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(TaskReporterRegistry::new()))
    }

    /// Create a scheduler with a specific reporter
    pub fn with_reporter(reporter: Arc<dyn TaskReporter>) -> Self {
        Self::with_options(SchedulerOptions::default(), reporter)
    }

    /// Create a scheduler with options and a reporter
    pub fn with_options(options: SchedulerOptions, reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            registry: RwLock::new(IndexMap::new()),
            reporter,
            executor: Arc::new(Executor::new(options.concurrency)),
        }
    }

    /// Maximum members of parallel groups running at once
    pub fn concurrency(&self) -> usize {
        self.executor.concurrency
    }

    /// Register a task under a name, replacing any previous one
    pub fn register(&self, name: impl Into<String>, task: Task) {
        let name = name.into();
        debug!(task = %name, "registering task");
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, task);
    }

    /// Registered names, in registration order
    pub fn task_names(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Run a task to completion, blocking the caller.
    ///
    /// Must not be called from inside an async context.
    #[instrument(skip_all, fields(task = %task.display_name()))]
    pub fn run(&self, task: &Task) -> TaskResult {
        let start = Instant::now();
        let result = run_one(task, self.reporter.as_ref());
        let failed = usize::from(result.is_err());
        self.reporter.report(&TaskEvent::AllCompleted {
            total: 1,
            succeeded: 1 - failed,
            failed,
            duration: start.elapsed(),
        });
        result
    }

    /// Run a registered task by name
    pub fn run_named(&self, name: &str) -> TaskResult {
        let task = self
            .lookup(name)
            .ok_or_else(|| TaskError::NeverDefined(name.to_string()))?;
        self.run(&task)
    }
}

impl Default for InlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for InlineScheduler {
    fn lookup(&self, name: &str) -> Option<Task> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn series(&self, tasks: Vec<Task>) -> Task {
        let reporter = self.reporter.clone();
        Task::named("<series>", move |_done, _params| {
            reporter.report(&TaskEvent::GroupStarted {
                kind: CompositionKind::Series,
                task_count: tasks.len(),
            });
            for (i, task) in tasks.iter().enumerate() {
                if let Err(error) = run_one(task, reporter.as_ref()) {
                    for skipped in &tasks[i + 1..] {
                        reporter.report(&TaskEvent::Skipped {
                            name: skipped.display_name().to_string(),
                            reason: format!("{} failed", task.display_name()),
                        });
                    }
                    return TaskOutcome::err(error);
                }
            }
            TaskOutcome::ok()
        })
    }

    fn parallel(&self, tasks: Vec<Task>) -> Task {
        let reporter = self.reporter.clone();
        let executor = self.executor.clone();
        Task::named("<parallel>", move |_done, _params| {
            reporter.report(&TaskEvent::GroupStarted {
                kind: CompositionKind::Parallel,
                task_count: tasks.len(),
            });
            executor.run_all(&tasks, &reporter).into()
        })
    }
}

/// Run one task and wait for its completion
fn run_one(task: &Task, reporter: &dyn TaskReporter) -> TaskResult {
    let name = task.display_name().to_string();
    let start = Instant::now();
    reporter.report(&TaskEvent::Started { name: name.clone() });

    let (done, rx) = Done::channel(name.clone());
    task.start(done);
    let result = rx
        .blocking_recv()
        .unwrap_or_else(|_| Err(TaskError::failed(format!("{name} never signalled completion"))));

    report_finished(reporter, name, start.elapsed(), &result);
    result
}

fn report_finished(reporter: &dyn TaskReporter, name: String, duration: Duration, result: &TaskResult) {
    let event = match result {
        Ok(()) => TaskEvent::Completed { name, duration },
        Err(error) => TaskEvent::Failed {
            name,
            duration,
            error: error.to_string(),
        },
    };
    reporter.report(&event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    fn scheduler() -> (InlineScheduler, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        (InlineScheduler::with_reporter(reporter.clone()), reporter)
    }

    fn recording(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Task {
        let log = log.clone();
        let label = name.to_string();
        Task::from_fn(name, move |_| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    #[test]
    fn test_register_and_lookup() {
        let (scheduler, _) = scheduler();
        scheduler.register("build", Task::new(|_, _| TaskOutcome::ok()));

        assert!(scheduler.lookup("build").is_some());
        assert!(scheduler.lookup("deploy").is_none());
        assert_eq!(scheduler.task_names(), vec!["build"]);
    }

    #[test]
    fn test_run_named_missing() {
        let (scheduler, _) = scheduler();
        assert_eq!(
            scheduler.run_named("deploy"),
            Err(TaskError::NeverDefined("deploy".to_string()))
        );
    }

    #[test]
    fn test_run_callback_style_task() {
        let (scheduler, _) = scheduler();
        let task = Task::new(|done, _| {
            thread::spawn(move || done.ok());
            TaskOutcome::Pending
        });
        assert_eq!(scheduler.run(&task), Ok(()));
    }

    #[test]
    fn test_dropped_handle_is_failure() {
        let (scheduler, _) = scheduler();
        let task = Task::named("lost", |_done, _| TaskOutcome::Pending);
        let err = scheduler.run(&task).unwrap_err();
        assert!(err.to_string().contains("lost never signalled completion"));
    }

    #[test]
    fn test_series_runs_in_order() {
        let (scheduler, reporter) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let series = scheduler.series(vec![recording("a", &log), recording("b", &log)]);

        assert_eq!(scheduler.run(&series), Ok(()));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(reporter.started(), vec!["<series>", "a", "b"]);
    }

    #[test]
    fn test_series_stops_at_first_failure() {
        let (scheduler, reporter) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = Task::from_fn("fails", |_| Err(TaskError::failed("boom")));
        let series = scheduler.series(vec![failing, recording("after", &log)]);

        assert_eq!(scheduler.run(&series), Err(TaskError::failed("boom")));
        assert!(log.lock().unwrap().is_empty());
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            TaskEvent::Skipped { name, .. } if name == "after"
        )));
    }

    #[test]
    fn test_parallel_runs_all_members() {
        let (scheduler, _) = scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let tasks = (0..4)
            .map(|_| {
                let count = count.clone();
                Task::from_fn("inc", move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        assert_eq!(scheduler.run(&scheduler.parallel(tasks)), Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_parallel_reports_failure() {
        let (scheduler, _) = scheduler();
        let tasks = vec![
            Task::from_fn("ok", |_| Ok(())),
            Task::from_fn("bad", |_| Err(TaskError::failed("bad"))),
        ];
        assert_eq!(
            scheduler.run(&scheduler.parallel(tasks)),
            Err(TaskError::failed("bad"))
        );
    }

    /// Task that records how many tasks run at once
    fn gauge(running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Task {
        let running = running.clone();
        let peak = peak.clone();
        Task::from_fn("gauge", move |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_parallel_respects_concurrency() {
        let scheduler = InlineScheduler::with_options(
            SchedulerOptions { concurrency: 2 },
            Arc::new(TaskReporterRegistry::empty()),
        );
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks = (0..16).map(|_| gauge(&running, &peak)).collect();

        assert_eq!(scheduler.run(&scheduler.parallel(tasks)), Ok(()));
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "{peak} tasks ran at once");
        assert!(peak >= 1);
    }

    #[test]
    fn test_nested_parallel_with_single_slot() {
        let scheduler = InlineScheduler::with_options(
            SchedulerOptions { concurrency: 1 },
            Arc::new(TaskReporterRegistry::empty()),
        );
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let inner = scheduler.parallel(vec![gauge(&running, &peak), gauge(&running, &peak)]);
        let outer = scheduler.parallel(vec![inner, gauge(&running, &peak)]);

        assert_eq!(scheduler.run(&outer), Ok(()));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        let scheduler = InlineScheduler::with_options(
            SchedulerOptions { concurrency: 0 },
            Arc::new(TaskReporterRegistry::empty()),
        );
        assert_eq!(scheduler.concurrency(), 1);
        assert!(SchedulerOptions::default().concurrency >= 1);
    }
}
