use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::driver::Driver;
use crate::error::{DriverError, Error};
use crate::operation::Operation;

/// Owns the driver value; the last holder to drop it runs library teardown.
/// Holders are the executor core and each worker lane thread, so teardown
/// waits for every lane to drain.
pub(crate) struct DriverCell<D: Driver> {
    driver: D,
}

impl<D: Driver> Drop for DriverCell<D> {
    fn drop(&mut self) {
        debug!("driver library teardown");
        self.driver.terminate();
    }
}

/// Lanes and driver shared by an executor and every connector built on it.
/// Connectors hold this through an `Arc`, so lanes outlive the executor value
/// while connections still use them.
pub(crate) struct Core<D: Driver> {
    driver: Arc<DriverCell<D>>,
    lanes: Vec<Sender<Operation<D>>>,
    next_lane: AtomicUsize,
}

impl<D: Driver> Core<D> {
    pub(crate) fn driver(&self) -> &D {
        &self.driver.driver
    }

    pub(crate) fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Pick the lane for a newly created connection. Round-robin; a
    /// connection stays pinned to its lane for life, which is what keeps its
    /// operations in submission order.
    pub(crate) fn assign_lane(&self) -> usize {
        self.next_lane.fetch_add(1, Ordering::Relaxed) % self.lanes.len()
    }

    /// Hand an operation to its connection's lane. Returns the operation
    /// back when the lane is gone.
    pub(crate) fn submit(&self, lane: usize, op: Operation<D>) -> Result<(), Operation<D>> {
        self.lanes[lane].send(op).map_err(|err| err.0)
    }
}

/// Background executor that runs the blocking driver calls.
///
/// Worker lanes are dedicated OS threads; operations submitted against one
/// connection always land on the connection's own lane and execute in
/// submission order, never concurrently. The driver library is initialized
/// before the first lane starts and torn down after the last lane drains.
pub struct Executor<D: Driver> {
    core: Arc<Core<D>>,
}

impl<D: Driver> Executor<D> {
    /// Executor with the default single worker lane.
    ///
    /// # Errors
    /// [`Error::Open`] when the driver library fails to initialize or a
    /// worker thread cannot be spawned.
    pub fn new(driver: D) -> Result<Self, Error> {
        ExecutorBuilder::new().build(driver)
    }

    /// Number of worker lanes.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.core.lane_count()
    }

    pub(crate) fn core(&self) -> &Arc<Core<D>> {
        &self.core
    }
}

impl<D: Driver> fmt::Debug for Executor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("workers", &self.core.lane_count())
            .finish()
    }
}

/// Configuration for [`Executor`] construction.
#[derive(Debug, Clone)]
pub struct ExecutorBuilder {
    workers: usize,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl ExecutorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker lanes, clamped to at least one.
    ///
    /// Each connection is pinned to a single lane, so extra lanes spread
    /// distinct connections over threads; one connection's operations stay
    /// serialized regardless.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Initialize the driver library and start the worker lanes.
    ///
    /// # Errors
    /// [`Error::Open`] when the driver library fails to initialize or a
    /// worker thread cannot be spawned.
    pub fn build<D: Driver>(self, driver: D) -> Result<Executor<D>, Error> {
        driver.initialize().map_err(Error::Open)?;
        let driver = Arc::new(DriverCell { driver });
        debug!(workers = self.workers, "driver library initialized");

        let mut lanes = Vec::with_capacity(self.workers);
        for index in 0..self.workers {
            let (sender, receiver) = mpsc::channel::<Operation<D>>();
            let cell = Arc::clone(&driver);
            let handle = Handle::try_current().ok();
            thread::Builder::new()
                .name(format!("relay-worker-{index}"))
                .spawn(move || {
                    let runtime_guard = handle.as_ref().map(|h| h.enter());
                    run_worker(index, &cell, &receiver);
                    drop(runtime_guard);
                })
                .map_err(|err| {
                    Error::Open(DriverError::local(format!(
                        "failed to spawn worker thread: {err}"
                    )))
                })?;
            lanes.push(sender);
        }

        Ok(Executor {
            core: Arc::new(Core {
                driver,
                lanes,
                next_lane: AtomicUsize::new(0),
            }),
        })
    }
}

/// Lane loop: take operations in queue order and run them to completion.
/// Ends when every sender for this lane is gone.
fn run_worker<D: Driver>(lane: usize, driver: &DriverCell<D>, receiver: &Receiver<Operation<D>>) {
    debug!(lane, "worker lane running");
    while let Ok(op) = receiver.recv() {
        trace!(lane, "operation dequeued");
        op.run(&driver.driver);
    }
    debug!(lane, "worker lane stopped");
}
