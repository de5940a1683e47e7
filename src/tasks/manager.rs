//! Task manager — named, supervised units of long-running work.
//!
//! `run` registers a task under its name and spawns a supervisor that awaits
//! the executor, reports the terminal outcome exactly once, and then removes
//! the name from the registry. Cancellation is cooperative: `cancel` only
//! fires the task's token, and the supervisor drops the executor at its
//! current await point the next time it is polled.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::executor::TaskExecutor;
use super::reporter::{OutcomeReporter, TaskOutcome};
use super::state::{TaskAssignment, TaskRecord, TaskStatus};
use crate::context;
use crate::error::TaskError;

/// Tracked task handle.
struct TrackedTask {
    /// Distinguishes successive runs that reuse a name.
    run_id: Uuid,
    record: TaskRecord,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<String, TrackedTask>>>;

/// Runs named tasks and supervises their lifecycle.
#[derive(Clone)]
pub struct TaskManager {
    reporter: Arc<dyn OutcomeReporter>,
    /// Running tasks by name.
    tasks: Registry,
}

impl TaskManager {
    /// Create a manager that reports outcomes through `reporter`.
    pub fn new(reporter: Arc<dyn OutcomeReporter>) -> Self {
        Self {
            reporter,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start `executor` as the task `name` and return without waiting for it.
    ///
    /// The task inherits the caller's execution context. Must be called from
    /// within a Tokio runtime.
    pub fn run(
        &self,
        executor: Arc<dyn TaskExecutor>,
        name: impl Into<String>,
        description: impl Into<String>,
        assignment: TaskAssignment,
    ) -> Result<(), TaskError> {
        let name = name.into();
        let description = description.into();

        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&name) {
            warn!(task = %name, "Rejected task: already running");
            return Err(TaskError::AlreadyRunning { name });
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let record = TaskRecord::running(name.clone(), description.clone(), assignment.clone());

        let supervised = SupervisedRun {
            tasks: Arc::clone(&self.tasks),
            reporter: Arc::clone(&self.reporter),
            executor,
            run_id,
            cancel: cancel.clone(),
            name: name.clone(),
            description,
            assignment,
        };
        let span = info_span!("task", task = %name, run_id = %run_id);
        // The supervisor cannot deregister before this insert: it needs the lock.
        let handle = context::spawn(supervised.supervise().instrument(span));

        tasks.insert(
            name.clone(),
            TrackedTask {
                run_id,
                record,
                cancel,
                handle,
            },
        );

        info!(task = %name, run_id = %run_id, "Task started");
        Ok(())
    }

    /// Request cancellation of a running task. Does not wait for it to stop.
    pub fn cancel(&self, name: &str) -> Result<(), TaskError> {
        let tasks = self.tasks.lock();
        let tracked = tasks.get(name).ok_or_else(|| TaskError::NotRunning {
            name: name.to_string(),
        })?;

        tracked.cancel.cancel();
        info!(task = %name, "Task cancellation requested");
        Ok(())
    }

    /// Cancel every running task and clear the registry.
    pub fn teardown(&self) {
        let handles = self.drain();
        info!(count = handles.len(), "Task manager torn down");
    }

    /// Tear down and wait for every cancelled task to finish reporting.
    pub async fn shutdown(&self) {
        for handle in self.drain() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Task supervisor ended abnormally");
            }
        }
        info!("Task manager shut down");
    }

    fn drain(&self) -> Vec<JoinHandle<()>> {
        let drained: Vec<(String, TrackedTask)> = self.tasks.lock().drain().collect();
        drained
            .into_iter()
            .map(|(name, tracked)| {
                tracked.cancel.cancel();
                debug!(task = %name, "Task cancelled by teardown");
                tracked.handle
            })
            .collect()
    }

    /// Look up a running task.
    pub fn get(&self, name: &str) -> Result<TaskRecord, TaskError> {
        self.tasks
            .lock()
            .get(name)
            .map(|tracked| tracked.record.clone())
            .ok_or_else(|| TaskError::NotRunning {
                name: name.to_string(),
            })
    }

    /// Check if a task is registered.
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.lock().contains_key(name)
    }

    /// Names of all registered tasks.
    pub fn running_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get count of registered tasks.
    pub fn running_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// Everything a supervisor owns for one run.
struct SupervisedRun {
    tasks: Registry,
    reporter: Arc<dyn OutcomeReporter>,
    executor: Arc<dyn TaskExecutor>,
    run_id: Uuid,
    cancel: CancellationToken,
    name: String,
    description: String,
    assignment: TaskAssignment,
}

impl SupervisedRun {
    async fn supervise(self) {
        let deregister = Deregister {
            tasks: Arc::clone(&self.tasks),
            name: self.name.clone(),
            run_id: self.run_id,
        };

        let outcome = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => TaskOutcome::cancelled(
                self.name.clone(),
                self.description.clone(),
                self.assignment.clone(),
            ),

            result = AssertUnwindSafe(
                self.executor.execute(&self.name, &self.description, &self.assignment),
            )
            .catch_unwind() => match result {
                Ok(Ok(output)) => TaskOutcome::succeeded(
                    self.name.clone(),
                    self.description.clone(),
                    self.assignment.clone(),
                    output,
                ),
                Ok(Err(e)) => TaskOutcome::failed(
                    self.name.clone(),
                    self.description.clone(),
                    self.assignment.clone(),
                    e.to_string(),
                ),
                Err(panic) => TaskOutcome::failed(
                    self.name.clone(),
                    self.description.clone(),
                    self.assignment.clone(),
                    panic_message(&*panic),
                ),
            },
        };

        self.mark_terminal(outcome.status);
        match outcome.status {
            TaskStatus::Failed => warn!(task = %self.name, error = %outcome.error, "Task failed"),
            status => info!(task = %self.name, status = %status, "Task finished"),
        }

        if let Err(e) = self.reporter.report(&outcome).await {
            error!(task = %self.name, "Failed to finalize task");
            debug!(task = %self.name, error = %e, "Outcome report failed");
        }

        drop(deregister);
    }

    fn mark_terminal(&self, status: TaskStatus) {
        let mut tasks = self.tasks.lock();
        if let Some(tracked) = tasks
            .get_mut(&self.name)
            .filter(|tracked| tracked.run_id == self.run_id)
            && let Err(e) = tracked.record.transition_to(status)
        {
            warn!(task = %self.name, error = %e, "Unexpected task transition");
        }
    }
}

/// Removes a run's registry entry when the supervisor finishes or unwinds.
struct Deregister {
    tasks: Registry,
    name: String,
    run_id: Uuid,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock();
        if tasks
            .get(&self.name)
            .is_some_and(|tracked| tracked.run_id == self.run_id)
        {
            tasks.remove(&self.name);
            debug!(task = %self.name, "Task removed from registry");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    use super::*;
    use crate::activity::ActivityBroadcaster;
    use crate::context::ActivityContext;
    use crate::error::ClientError;
    use crate::tasks::reporter::CANCELLED_ERROR;

    /// Reporter that records outcomes, optionally failing or blocking.
    #[derive(Default)]
    struct RecordingReporter {
        outcomes: Mutex<Vec<TaskOutcome>>,
        /// Execution id visible while each report ran.
        contexts: Mutex<Vec<Option<String>>>,
        attempts: AtomicUsize,
        fail: bool,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl RecordingReporter {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn outcomes(&self) -> Vec<TaskOutcome> {
            self.outcomes.lock().clone()
        }
    }

    #[async_trait]
    impl OutcomeReporter for RecordingReporter {
        async fn report(&self, outcome: &TaskOutcome) -> Result<(), ClientError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().push(outcome.clone());
            self.contexts
                .lock()
                .push(context::get().map(|(_, exec)| exec.execution_id));

            let gate = self.gate.lock().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }

            if self.fail {
                Err(ClientError::Connection("roster API unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn assignment() -> TaskAssignment {
        TaskAssignment::new("a", "X", "worker")
    }

    fn pending_executor() -> Arc<dyn TaskExecutor> {
        Arc::new(|_: String, _: String, _: TaskAssignment| {
            std::future::pending::<anyhow::Result<String>>()
        })
    }

    fn ok_executor(output: &'static str) -> Arc<dyn TaskExecutor> {
        Arc::new(move |_: String, _: String, _: TaskAssignment| async move {
            Ok::<_, anyhow::Error>(output.to_string())
        })
    }

    fn failing_executor(message: &'static str) -> Arc<dyn TaskExecutor> {
        Arc::new(move |_: String, _: String, _: TaskAssignment| async move {
            Err::<String, _>(anyhow::anyhow!(message))
        })
    }

    async fn wait_until_absent(manager: &TaskManager, name: &str) {
        timeout(Duration::from_secs(5), async {
            while manager.is_running(name) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task never left the registry");
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        manager
            .run(pending_executor(), "T1", "desc", assignment())
            .unwrap();
        let err = manager
            .run(ok_executor("second"), "T1", "desc", assignment())
            .unwrap_err();
        assert_eq!(err, TaskError::AlreadyRunning { name: "T1".to_string() });
        assert_eq!(manager.running_count(), 1);

        manager.cancel("T1").unwrap();
        wait_until_absent(&manager, "T1").await;
        assert_eq!(reporter.outcomes().len(), 1);
    }

    #[tokio::test]
    async fn success_is_reported_then_removed() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        manager
            .run(ok_executor("done"), "T1", "desc", assignment())
            .unwrap();
        assert!(manager.is_running("T1"));

        wait_until_absent(&manager, "T1").await;
        assert_eq!(
            reporter.outcomes(),
            vec![TaskOutcome::succeeded("T1", "desc", assignment(), "done")]
        );
    }

    #[tokio::test]
    async fn executor_error_is_contained_and_reported() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        let started = manager.run(failing_executor("boom"), "T1", "desc", assignment());
        assert!(started.is_ok());

        wait_until_absent(&manager, "T1").await;
        let outcomes = reporter.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].name, "T1");
        assert_eq!(outcomes[0].description, "desc");
        assert_eq!(outcomes[0].assignment, assignment());
        assert_eq!(outcomes[0].result, "");
        assert_eq!(outcomes[0].error, "boom");
        assert_eq!(outcomes[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_before_completion_reports_cancelled() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        manager
            .run(pending_executor(), "T1", "desc", assignment())
            .unwrap();
        manager.cancel("T1").unwrap();

        wait_until_absent(&manager, "T1").await;
        let outcomes = reporter.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, TaskStatus::Cancelled);
        assert_eq!(outcomes[0].result, "");
        assert_eq!(outcomes[0].error, CANCELLED_ERROR);
    }

    #[tokio::test]
    async fn cancel_interrupts_suspended_executor() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());
        let (entered_tx, entered_rx) = oneshot::channel::<()>();
        let entered_tx = Mutex::new(Some(entered_tx));

        let executor: Arc<dyn TaskExecutor> =
            Arc::new(move |_: String, _: String, _: TaskAssignment| {
                let entered = entered_tx.lock().take();
                async move {
                    if let Some(tx) = entered {
                        let _ = tx.send(());
                    }
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, anyhow::Error>("never".to_string())
                }
            });

        manager.run(executor, "T1", "desc", assignment()).unwrap();
        entered_rx.await.unwrap();
        manager.cancel("T1").unwrap();

        wait_until_absent(&manager, "T1").await;
        assert_eq!(reporter.outcomes()[0].status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_unknown_task() {
        let manager = TaskManager::new(Arc::new(RecordingReporter::default()));
        assert_eq!(
            manager.cancel("missing"),
            Err(TaskError::NotRunning { name: "missing".to_string() })
        );
        assert!(matches!(
            manager.get("missing"),
            Err(TaskError::NotRunning { .. })
        ));
    }

    #[tokio::test]
    async fn failed_report_still_cleans_up_once() {
        let reporter = Arc::new(RecordingReporter::failing());
        let manager = TaskManager::new(reporter.clone());

        manager
            .run(failing_executor("boom"), "T1", "desc", assignment())
            .unwrap();
        wait_until_absent(&manager, "T1").await;
        assert_eq!(reporter.attempts.load(Ordering::SeqCst), 1);

        // The name is free again.
        manager
            .run(ok_executor("again"), "T1", "desc", assignment())
            .unwrap();
        wait_until_absent(&manager, "T1").await;
        assert_eq!(reporter.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn removal_waits_for_report() {
        let (release, gate) = oneshot::channel();
        let reporter = Arc::new(RecordingReporter {
            gate: Mutex::new(Some(gate)),
            ..Default::default()
        });
        let manager = TaskManager::new(reporter.clone());

        manager
            .run(failing_executor("boom"), "T1", "desc", assignment())
            .unwrap();

        timeout(Duration::from_secs(5), async {
            while reporter.outcomes().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // Reporting is in flight: the entry is still there, already terminal.
        let record = manager.get("T1").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.finished_at.is_some());

        release.send(()).unwrap();
        wait_until_absent(&manager, "T1").await;
    }

    #[tokio::test]
    async fn panicking_executor_is_reported_as_failed() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        let executor: Arc<dyn TaskExecutor> =
            Arc::new(|_: String, _: String, _: TaskAssignment| async move {
                if true {
                    panic!("executor exploded");
                }
                Ok::<_, anyhow::Error>(String::new())
            });

        manager.run(executor, "T1", "desc", assignment()).unwrap();
        wait_until_absent(&manager, "T1").await;

        let outcomes = reporter.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, TaskStatus::Failed);
        assert_eq!(outcomes[0].error, "executor exploded");
    }

    #[tokio::test]
    async fn shutdown_cancels_everything() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        manager
            .run(pending_executor(), "T1", "one", assignment())
            .unwrap();
        manager
            .run(pending_executor(), "T2", "two", assignment())
            .unwrap();
        assert_eq!(manager.running_tasks(), vec!["T1", "T2"]);

        manager.shutdown().await;
        assert_eq!(manager.running_count(), 0);

        let mut outcomes = reporter.outcomes();
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == TaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn stale_supervisor_keeps_new_run_registered() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        manager
            .run(pending_executor(), "T1", "first", assignment())
            .unwrap();
        manager.teardown();
        assert!(!manager.is_running("T1"));

        manager
            .run(pending_executor(), "T1", "second", assignment())
            .unwrap();

        timeout(Duration::from_secs(5), async {
            while reporter.outcomes().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        tokio::task::yield_now().await;

        assert_eq!(reporter.outcomes()[0].description, "first");
        let record = manager.get("T1").unwrap();
        assert_eq!(record.description, "second");
        assert_eq!(record.status, TaskStatus::Running);

        manager.cancel("T1").unwrap();
        wait_until_absent(&manager, "T1").await;
    }

    #[tokio::test]
    async fn task_runs_in_spawners_context() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());

        let executor: Arc<dyn TaskExecutor> =
            Arc::new(|_: String, _: String, _: TaskAssignment| async move {
                let (agent, exec) = context::get().expect("context inherited");
                Ok::<_, anyhow::Error>(format!("{}@{}", exec.execution_id, agent.identity))
            });

        context::scope(ActivityContext::task("T1", &assignment()), async {
            manager.run(executor, "T1", "desc", assignment()).unwrap();
        })
        .await;

        wait_until_absent(&manager, "T1").await;
        assert_eq!(reporter.outcomes()[0].result, "T1@a");
        assert_eq!(reporter.contexts.lock().clone(), vec![Some("T1".to_string())]);
    }

    #[tokio::test]
    async fn concurrent_tasks_never_mislabel_activity() {
        let reporter = Arc::new(RecordingReporter::default());
        let manager = TaskManager::new(reporter.clone());
        let broadcaster = ActivityBroadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            broadcaster.subscribe(move |event| {
                seen.lock().push((
                    event.execution_id().to_string(),
                    event.agent_context().identity.clone(),
                    event.content().to_string(),
                ));
            });
        }

        let make_executor = |broadcaster: Arc<ActivityBroadcaster>| -> Arc<dyn TaskExecutor> {
            Arc::new(move |name: String, _: String, _: TaskAssignment| {
                let broadcaster = Arc::clone(&broadcaster);
                async move {
                    for step in 0..5 {
                        broadcaster.thought(format!("{name}:{step}"));
                        tokio::task::yield_now().await;
                    }
                    Ok::<_, anyhow::Error>(name)
                }
            })
        };

        for (name, identity) in [("A", "alice"), ("B", "bob")] {
            let task_assignment = TaskAssignment::new(identity, "X", "worker");
            let executor = make_executor(Arc::clone(&broadcaster));
            context::scope(ActivityContext::task(name, &task_assignment), async {
                manager
                    .run(executor, name, "desc", task_assignment.clone())
                    .unwrap();
            })
            .await;
        }

        wait_until_absent(&manager, "A").await;
        wait_until_absent(&manager, "B").await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 10);
        for (execution_id, identity, content) in seen.iter() {
            assert!(content.starts_with(execution_id.as_str()));
            let expected = if execution_id == "A" { "alice" } else { "bob" };
            assert_eq!(identity, expected);
        }
    }
}
