//! # TaskProcessorsStorage: owns the pools and every processor.
//!
//! The storage is populated once during manager construction and emptied by
//! [`reset`](TaskProcessorsStorage::reset), which implements the
//! drain-then-stop shutdown:
//!
//! ```text
//! reset()
//!   ├─► initiate_shutdown on every processor   (stop accepting)
//!   ├─► poll pools.active_tasks() == 0         (drain, 10 ms cadence)
//!   ├─► drop processors in insertion order     (joins worker threads)
//!   └─► release the pools handle               (sole-ownership check)
//! ```
//!
//! ## Rules
//! - The drain is **unbounded**: any deadline would free the engine while a
//!   task could still be running on it.
//! - `reset` is idempotent and also runs from `Drop`, so an aborted manager
//!   construction still drains cleanly.
//! - `reset` must run on the host domain; dropping a runtime from async
//!   context panics in tokio.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{error, trace};

use crate::engine::pools::EnginePools;
use crate::engine::processor::TaskProcessor;

/// How often the drain re-checks the live-task counter.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Insertion-ordered map from processor name to processor.
pub type TaskProcessorsMap = IndexMap<String, Arc<TaskProcessor>>;

/// Owns the engine pools and the named task processors.
pub struct TaskProcessorsStorage {
    pools: Option<Arc<EnginePools>>,
    processors: TaskProcessorsMap,
}

impl TaskProcessorsStorage {
    pub(crate) fn new(pools: Arc<EnginePools>) -> Self {
        Self {
            pools: Some(pools),
            processors: TaskProcessorsMap::new(),
        }
    }

    /// Registers a processor. Only called during construction, before any
    /// task has been spawned; duplicate names are rejected by the manager's
    /// descriptor validation.
    pub(crate) fn add(&mut self, name: String, processor: TaskProcessor) {
        self.processors.insert(name, Arc::new(processor));
    }

    /// Read-only view of the processor map.
    pub fn map(&self) -> &TaskProcessorsMap {
        &self.processors
    }

    /// Looks a processor up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<TaskProcessor>> {
        self.processors.get(name)
    }

    /// The shared pools handle; `None` once the storage has been reset.
    pub fn pools(&self) -> Option<&Arc<EnginePools>> {
        self.pools.as_ref()
    }

    /// Drains and destroys every processor, then releases the pools.
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub fn reset(&mut self) {
        let Some(pools) = self.pools.take() else {
            return;
        };

        trace!("initiating task processors shutdown");
        for processor in self.processors.values() {
            processor.initiate_shutdown();
        }

        trace!("waiting for all tasks to finish");
        while pools.active_tasks() != 0 {
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }

        trace!("stopping task processors");
        for (name, processor) in self.processors.drain(..) {
            match Arc::try_unwrap(processor) {
                // Dropping the runtime joins its worker threads.
                Ok(processor) => drop(processor),
                Err(leaked) => {
                    error!(
                        processor = %name,
                        references = Arc::strong_count(&leaked),
                        "task processor still referenced at reset; worker threads may outlive the storage"
                    );
                }
            }
        }
        trace!("stopped task processors");

        let references = Arc::strong_count(&pools);
        if references != 1 {
            error!(
                references,
                "engine pools still referenced at reset; releasing the storage handle anyway"
            );
        }
        trace!("released engine pools");
    }
}

impl Drop for TaskProcessorsStorage {
    fn drop(&mut self) {
        if self.pools.is_some() {
            self.reset();
        }
    }
}
