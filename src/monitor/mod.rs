// src/monitor/mod.rs

//! Per-executor polling monitor.
//!
//! One monitor is created per executor per session. Producers admit task
//! handlers through [`TaskPollingMonitor::schedule`], which blocks while
//! the bounded queue is full; a dedicated poll task then drives every
//! active handler through its lifecycle and emits a
//! [`MonitorEvent::TaskCompleted`] when a task reaches its terminal state.
//!
//! An error thrown by one handler's checks never stops the loop: the
//! handler is force-completed with an error status and polling continues
//! for the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::errors::{GridflowError, Result};
use crate::handler::{HandlerStatus, TaskHandler};
use crate::task::TaskRun;

/// Default diagnostic dump interval.
const DEFAULT_DUMP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long shutdown waits for the poll loop to kill and drain its
/// handlers before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// How often the shutdown drain re-checks for admissions still handing
/// their handler over.
const ADMISSION_DRAIN_TICK: Duration = Duration::from_millis(10);

/// Events emitted by a monitor towards the dispatcher.
#[derive(Debug)]
pub enum MonitorEvent {
    /// A task reached its terminal state and left the monitor queue. The
    /// task carries its exit status and output (or error, for native
    /// tasks).
    TaskCompleted { executor: String, task: TaskRun },
}

struct ActiveEntry {
    handler: Box<dyn TaskHandler>,
    permit: OwnedSemaphorePermit,
    admitted_at: Instant,
}

/// Per-executor scheduler: bounded admission plus a polling loop.
pub struct TaskPollingMonitor {
    name: String,
    queue_size: usize,
    capacity: Arc<Semaphore>,
    submit_tx: mpsc::UnboundedSender<ActiveEntry>,
    shutdown: CancellationToken,
    /// Admissions that hold a slot but have not finished handing their
    /// handler to the poll loop yet; the shutdown drain waits for these.
    in_flight: Arc<AtomicUsize>,
    poll_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TaskPollingMonitor {
    /// Create the monitor and start its poll loop.
    ///
    /// `queue_size`, `poll_interval` and `dump_interval` are resolved from
    /// the session configuration, scoped by executor name, with the given
    /// caller defaults.
    pub fn spawn(
        config: &SessionConfig,
        name: &str,
        default_queue_size: usize,
        default_poll_interval: Duration,
        events_tx: mpsc::Sender<MonitorEvent>,
    ) -> Result<Self> {
        let queue_size = config.queue_size(Some(name), default_queue_size)?;
        let poll_interval = config.poll_interval(Some(name), default_poll_interval)?;
        let dump_interval = config.dump_interval(Some(name), DEFAULT_DUMP_INTERVAL)?;

        let capacity = Arc::new(Semaphore::new(queue_size));
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));

        info!(
            executor = %name,
            queue_size,
            poll_interval = ?poll_interval,
            "starting task monitor"
        );

        let poll_loop = PollLoop {
            name: name.to_string(),
            poll_interval,
            dump_interval,
            events_tx,
            shutdown: shutdown.clone(),
            submit_rx,
            in_flight: in_flight.clone(),
            active: Vec::new(),
            last_dump: Instant::now(),
        };
        let poll_task = tokio::spawn(poll_loop.run());

        Ok(Self {
            name: name.to_string(),
            queue_size,
            capacity,
            submit_tx,
            shutdown,
            in_flight,
            poll_task: tokio::sync::Mutex::new(Some(poll_task)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Number of handlers currently holding queue slots.
    pub fn active_count(&self) -> usize {
        self.queue_size - self.capacity.available_permits()
    }

    /// Admit a handler: wait for a free queue slot, submit the task while
    /// holding it, then hand the handler to the poll loop.
    ///
    /// A failed submit releases the slot and propagates the error to the
    /// caller. Admissions from the same producer keep their order in the
    /// polling queue.
    pub async fn schedule(&self, handler: Box<dyn TaskHandler>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(GridflowError::ShutdownError);
        }

        let permit = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(GridflowError::ShutdownError),
            permit = self.capacity.clone().acquire_owned() => {
                permit.map_err(|_| GridflowError::ShutdownError)?
            }
        };

        // From here until the hand-off completes, the shutdown drain waits
        // for us, so a submitted handler cannot fall between the threads.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.submit_and_hand_off(handler, permit).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn submit_and_hand_off(
        &self,
        mut handler: Box<dyn TaskHandler>,
        permit: OwnedSemaphorePermit,
    ) -> Result<()> {
        debug!(
            executor = %self.name,
            task = %handler.task().name,
            "queue slot acquired; submitting task"
        );

        if let Err(e) = handler.submit().await {
            warn!(
                executor = %self.name,
                task = %handler.task().name,
                error = %e,
                "submit failed; releasing queue slot"
            );
            return Err(e);
        }

        // Shutdown may have fired while the submit was in flight. The
        // backend already has the task, so kill it rather than leave it
        // running untracked.
        if self.shutdown.is_cancelled() {
            self.kill_unadmitted(handler).await;
            return Err(GridflowError::ShutdownError);
        }

        let entry = ActiveEntry {
            handler,
            permit,
            admitted_at: Instant::now(),
        };
        if let Err(send_error) = self.submit_tx.send(entry) {
            // The poll loop is already gone; the permit drops here.
            let ActiveEntry { handler, .. } = send_error.0;
            self.kill_unadmitted(handler).await;
            return Err(GridflowError::ShutdownError);
        }
        Ok(())
    }

    /// A handler submitted its task but lost the admission race against
    /// shutdown: terminate the backend work and report the rejection.
    async fn kill_unadmitted(&self, mut handler: Box<dyn TaskHandler>) {
        warn!(
            executor = %self.name,
            task = %handler.task().name,
            "monitor shut down during admission; killing the submitted task"
        );
        if let Err(e) = handler.kill().await {
            warn!(
                executor = %self.name,
                task = %handler.task().name,
                error = %e,
                "failed to kill task rejected at admission"
            );
        }
    }

    /// Stop admitting, kill all active handlers, drain their completion
    /// events, then stop the poll loop. Idempotent; bounded by a grace
    /// period after which the loop is abandoned.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let task = self.poll_task.lock().await.take();
        if let Some(mut task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(
                    executor = %self.name,
                    "poll loop did not stop within the shutdown grace period; abandoning it"
                );
                task.abort();
            }
        }
    }
}

struct PollLoop {
    name: String,
    poll_interval: Duration,
    dump_interval: Duration,
    events_tx: mpsc::Sender<MonitorEvent>,
    shutdown: CancellationToken,
    submit_rx: mpsc::UnboundedReceiver<ActiveEntry>,
    in_flight: Arc<AtomicUsize>,
    /// Active handlers in admission order, for polling fairness.
    active: Vec<ActiveEntry>,
    last_dump: Instant,
}

impl PollLoop {
    async fn run(mut self) {
        info!(executor = %self.name, "task monitor loop started");

        loop {
            // Interruptible sleep: wakes early for new admissions and for
            // shutdown.
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
                entry = self.submit_rx.recv() => {
                    match entry {
                        Some(entry) => self.admit(entry),
                        // All senders gone: the monitor handle was dropped.
                        None => break,
                    }
                }
            }

            // Pick up anything else that arrived while sleeping.
            while let Ok(entry) = self.submit_rx.try_recv() {
                self.admit(entry);
            }

            self.poll_active().await;

            if self.last_dump.elapsed() >= self.dump_interval {
                self.dump();
                self.last_dump = Instant::now();
            }
        }

        self.drain().await;
        info!(executor = %self.name, "task monitor loop finished");
    }

    fn admit(&mut self, entry: ActiveEntry) {
        debug!(
            executor = %self.name,
            task = %entry.handler.task().name,
            active = self.active.len() + 1,
            "task admitted to polling queue"
        );
        self.active.push(entry);
    }

    async fn poll_active(&mut self) {
        let mut idx = 0;
        while idx < self.active.len() {
            let entry = &mut self.active[idx];
            let done = match Self::poll_handler(&mut entry.handler).await {
                Ok(done) => done,
                Err(e) => {
                    warn!(
                        executor = %self.name,
                        task = %entry.handler.task().name,
                        error = %e,
                        "handler check failed; forcing completion"
                    );
                    entry.handler.fail(anyhow::Error::new(e));
                    true
                }
            };

            if done {
                let entry = self.active.remove(idx);
                self.finish(entry).await;
            } else {
                idx += 1;
            }
        }
    }

    async fn poll_handler(handler: &mut Box<dyn TaskHandler>) -> Result<bool> {
        handler.check_if_running().await?;
        match handler.status() {
            HandlerStatus::Running | HandlerStatus::Completed => {
                handler.check_if_completed().await
            }
            _ => Ok(false),
        }
    }

    /// Release the queue slot, then emit the completion event.
    async fn finish(&mut self, entry: ActiveEntry) {
        let ActiveEntry {
            handler,
            permit,
            admitted_at,
        } = entry;
        let task = handler.into_task();

        info!(
            executor = %self.name,
            task = %task.name,
            exit_status = ?task.exit_status,
            elapsed = ?admitted_at.elapsed(),
            "task completed"
        );

        drop(permit);

        let event = MonitorEvent::TaskCompleted {
            executor: self.name.clone(),
            task,
        };
        if self.events_tx.send(event).await.is_err() {
            debug!(executor = %self.name, "completion event receiver dropped");
        }
    }

    /// Shutdown path: kill everything still active, give each handler one
    /// chance to report, then abandon the rest with an error status.
    async fn drain(&mut self) {
        // Admissions that passed the shutdown check may still be handing
        // their handler over; wait for them before treating the channel as
        // exhausted.
        loop {
            while let Ok(entry) = self.submit_rx.try_recv() {
                self.admit(entry);
            }
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(ADMISSION_DRAIN_TICK).await;
        }
        while let Ok(entry) = self.submit_rx.try_recv() {
            self.admit(entry);
        }

        if self.active.is_empty() {
            return;
        }

        info!(
            executor = %self.name,
            active = self.active.len(),
            "monitor shutting down; killing active tasks"
        );

        for entry in &mut self.active {
            if let Err(e) = entry.handler.kill().await {
                warn!(
                    executor = %self.name,
                    task = %entry.handler.task().name,
                    error = %e,
                    "failed to kill task during shutdown"
                );
            }
        }

        for mut entry in std::mem::take(&mut self.active) {
            let done = matches!(Self::poll_handler(&mut entry.handler).await, Ok(true));
            if !done {
                entry
                    .handler
                    .fail(anyhow::anyhow!("monitor shut down before the task completed"));
            }
            self.finish(entry).await;
        }
    }

    fn dump(&self) {
        let mut by_status: HashMap<&'static str, usize> = HashMap::new();
        let mut tasks = Vec::with_capacity(self.active.len());
        for entry in &self.active {
            let status = match entry.handler.status() {
                HandlerStatus::New => "new",
                HandlerStatus::Submitted => "submitted",
                HandlerStatus::Running => "running",
                HandlerStatus::Completed => "completed",
            };
            *by_status.entry(status).or_default() += 1;
            tasks.push(format!(
                "{} [{}] {}s",
                entry.handler.task().name,
                status,
                entry.admitted_at.elapsed().as_secs()
            ));
        }
        info!(
            executor = %self.name,
            active = self.active.len(),
            counts = ?by_status,
            tasks = ?tasks,
            "monitor queue snapshot"
        );
    }
}
