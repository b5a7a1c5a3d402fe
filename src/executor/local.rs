// src/executor/local.rs

//! Executor for tasks running on the local machine.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::errors::Result;
use crate::executor::Executor;
use crate::handler::{LocalTaskHandler, NativeTaskHandler, TaskHandler};
use crate::session::Session;
use crate::task::{TaskBody, TaskRun};
use crate::wrapper::BashWrapperBuilder;

/// Default monitor poll interval for the local executor.
const DEFAULT_LOCAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct LocalExecutor {
    session: Arc<Session>,
    name: String,
}

impl LocalExecutor {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            name: "local".to_string(),
        }
    }

    /// Default monitor queue capacity: one slot per available core.
    fn default_queue_size() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Executor for LocalExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, task: TaskRun) -> BoxFuture<'_, Result<()>> {
        async move {
            let handler: Box<dyn TaskHandler> = match &task.body {
                TaskBody::Shell(script) => {
                    BashWrapperBuilder::new(&task.work_dir, script.as_str())
                        .build()
                        .await?;
                    Box::new(LocalTaskHandler::new(task)?)
                }
                TaskBody::Native(_) => Box::new(NativeTaskHandler::new(task)),
            };

            let monitor = self
                .session
                .monitor_for(
                    &self.name,
                    Self::default_queue_size(),
                    DEFAULT_LOCAL_POLL_INTERVAL,
                )
                .await?;
            monitor.schedule(handler).await
        }
        .boxed()
    }
}
