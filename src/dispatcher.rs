//! Background service registry.
//!
//! A [`Dispatcher`] owns a set of long-running tasks that share one
//! cancellation token. `stop_services` cancels them all, `join_services`
//! waits until every one has returned. The scheduler is registered through
//! [`start_scheduler`], which allows a single live scheduler per dispatcher.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scheduler::{SchedulerRunner, SchedulerState};

pub struct Dispatcher {
    tracker: TaskTracker,
    cancel: CancellationToken,
    scheduler_active: Arc<AtomicBool>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            scheduler_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn `service` on the current runtime. It receives a child of the
    /// dispatcher's token and should return once that token is cancelled.
    pub fn add_service<S, F>(&self, name: &'static str, service: S)
    where
        S: FnOnce(CancellationToken) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let task = service(self.cancel.child_token());
        self.tracker.spawn(async move {
            debug!(service = name, "service started");
            task.await;
            debug!(service = name, "service finished");
        });
    }

    /// Ask every service to stop. Safe to call more than once.
    pub fn stop_services(&self) {
        if !self.cancel.is_cancelled() {
            info!("stopping services");
        }
        self.cancel.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for every registered service to finish.
    pub async fn join_services(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn service_count(&self) -> usize {
        self.tracker.len()
    }
}

/// Handle to a registered scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    runner: Arc<SchedulerRunner>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        self.runner.state()
    }
}

/// Register `runner` as a background service and return immediately.
///
/// Fails with [`Error::AlreadyRunning`] while another scheduler registered on
/// the same dispatcher is still live.
pub fn start_scheduler(dispatcher: &Dispatcher, runner: Arc<SchedulerRunner>) -> Result<SchedulerHandle> {
    if dispatcher.scheduler_active.swap(true, Ordering::SeqCst) {
        return Err(Error::AlreadyRunning);
    }

    let active = Arc::clone(&dispatcher.scheduler_active);
    let service_runner = Arc::clone(&runner);
    dispatcher.add_service("scheduler", move |cancel| async move {
        service_runner.run(cancel).await;
        active.store(false, Ordering::SeqCst);
    });

    Ok(SchedulerHandle { runner })
}

/// Start the scheduler, then block until it and every other service on the
/// dispatcher have finished.
pub async fn start_scheduler_and_wait(dispatcher: &Dispatcher, runner: Arc<SchedulerRunner>) -> Result<()> {
    start_scheduler(dispatcher, runner)?;
    dispatcher.join_services().await;
    Ok(())
}
