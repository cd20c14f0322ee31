//! # TaskProcessor: one named scheduler.
//!
//! A processor owns a dedicated multi-threaded tokio runtime with a fixed
//! worker count. Its worker threads are tagged with the processor id so the
//! dispatch bridge can tell "already on this processor" from "on another
//! processor" from "plain OS thread".
//!
//! ## Shutdown protocol
//! - [`initiate_shutdown`](TaskProcessor::initiate_shutdown) is non-blocking:
//!   it only flips a flag so new spawns are rejected while in-flight tasks
//!   wind down.
//! - Dropping the processor shuts the runtime down and joins its worker
//!   threads. The storage drops processors only after the engine-wide drain
//!   has observed zero live tasks, so nothing is aborted mid-flight.
//!
//! ## Rules
//! - Boot and bridge tasks are **critical**: they are tracked by the pool
//!   counter and never attached to a cancellation token. They end by
//!   returning, or by observing the load-cancel broadcast in-band.
//! - Processors must be dropped from the host domain (dropping a runtime
//!   inside async context panics in tokio); the storage guarantees this.

use std::cell::Cell;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use crate::config::TaskProcessorConfig;
use crate::engine::pools::{EnginePools, TaskGuard};
use crate::error::DispatchError;

/// Process-wide processor id source.
static NEXT_PROCESSOR_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the processor owning the current thread, if any.
    static CURRENT_PROCESSOR: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Returns the id of the processor whose thread is currently executing.
pub(crate) fn current_processor_id() -> Option<u64> {
    CURRENT_PROCESSOR.with(Cell::get)
}

/// A named cooperative scheduler backed by a fixed pool of OS worker threads.
pub struct TaskProcessor {
    name: String,
    id: u64,
    worker_threads: usize,
    runtime: Runtime,
    pools: Arc<EnginePools>,
    shutting_down: AtomicBool,
}

impl TaskProcessor {
    /// Starts the processor's runtime with `worker_threads` workers.
    ///
    /// Worker thread names follow `<processor>-<nn>`; every thread the runtime
    /// starts is tagged with the processor id for dispatch classification.
    pub(crate) fn start(
        config: &TaskProcessorConfig,
        worker_threads: usize,
        pools: Arc<EnginePools>,
    ) -> io::Result<Self> {
        let id = NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed);
        let thread_counter = Arc::new(AtomicUsize::new(0));
        let thread_name = config.name.clone();

        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .max_blocking_threads(pools.config().max_blocking_threads)
            .thread_stack_size(pools.config().thread_stack_size)
            .thread_name_fn(move || {
                let n = thread_counter.fetch_add(1, Ordering::SeqCst);
                format!("{thread_name}-{n:02}")
            })
            .on_thread_start(move || CURRENT_PROCESSOR.with(|slot| slot.set(Some(id))))
            .on_thread_stop(|| CURRENT_PROCESSOR.with(|slot| slot.set(None)))
            .enable_all()
            .build()?;

        debug!(processor = %config.name, worker_threads, "task processor started");
        Ok(Self {
            name: config.name.clone(),
            id,
            worker_threads,
            runtime,
            pools,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Returns the processor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of OS worker threads backing this processor.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Whether the current OS thread belongs to this processor.
    pub fn runs_current_thread(&self) -> bool {
        current_processor_id() == Some(self.id)
    }

    /// Stops accepting new tasks. Non-blocking; running tasks wind down on
    /// their own and are awaited by the storage drain.
    pub fn initiate_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::AcqRel) {
            debug!(processor = %self.name, "task processor shutdown initiated");
        }
    }

    /// Whether [`initiate_shutdown`](Self::initiate_shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Spawns a critical task on this processor.
    ///
    /// The task is counted by the engine pools until its future is dropped
    /// and carries a tracing span naming the task and the processor. Critical
    /// tasks ignore ordinary cancellation; they end only by returning.
    ///
    /// Fails with [`DispatchError::ProcessorShutdown`] once shutdown has been
    /// initiated.
    pub fn spawn_critical<F>(
        &self,
        task_name: &str,
        future: F,
    ) -> Result<JoinHandle<F::Output>, DispatchError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(DispatchError::ProcessorShutdown {
                processor: self.name.clone(),
                task: task_name.to_string(),
            });
        }

        let guard = TaskGuard::new(Arc::clone(&self.pools));
        let span = tracing::info_span!("task", task = %task_name, processor = %self.name);
        Ok(self.runtime.handle().spawn(
            async move {
                let _guard = guard;
                future.await
            }
            .instrument(span),
        ))
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        debug!(processor = %self.name, "task processor stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use std::time::Duration;

    fn processor(name: &str, workers: usize) -> (TaskProcessor, Arc<EnginePools>) {
        let pools = EnginePools::new(PoolConfig::default());
        let cfg = TaskProcessorConfig::new(name, workers);
        let tp = TaskProcessor::start(&cfg, workers, Arc::clone(&pools)).unwrap();
        (tp, pools)
    }

    #[test]
    fn spawned_task_is_counted_until_done() {
        let (tp, pools) = processor("count", 2);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tp
            .spawn_critical("hold", async move {
                let _ = release_rx.await;
                7usize
            })
            .unwrap();

        // The task is parked on the channel, so it must be live.
        while pools.active_tasks() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pools.active_tasks(), 1);

        release_tx.send(()).unwrap();
        let value = tp.handle().block_on(handle).unwrap();
        assert_eq!(value, 7);

        while pools.active_tasks() != 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn shutdown_rejects_new_tasks() {
        let (tp, _pools) = processor("reject", 1);
        tp.initiate_shutdown();
        assert!(tp.is_shutting_down());

        let err = tp.spawn_critical("late", async {}).unwrap_err();
        assert!(matches!(err, DispatchError::ProcessorShutdown { .. }));
        assert_eq!(err.as_label(), "dispatch_processor_shutdown");
    }

    #[test]
    fn worker_threads_are_tagged() {
        let (tp, _pools) = processor("tagged", 1);
        let id = tp.id();

        let tagged = tp
            .spawn_critical("probe", async move { current_processor_id() == Some(id) })
            .unwrap();
        assert!(tp.handle().block_on(tagged).unwrap());

        // The host thread stays untagged.
        assert_eq!(current_processor_id(), None);
        assert!(!tp.runs_current_thread());
    }
}
