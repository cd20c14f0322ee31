//! # Cross-domain dispatch bridge.
//!
//! [`run_on_processor`] synchronously runs a future on a chosen task
//! processor and hands its output back to the caller. It is the only legal
//! way to enter the cooperative domain from a plain OS thread, which is
//! exactly what manager construction and teardown need: both run on the
//! thread of whoever created the manager.
//!
//! ## The three cases
//! 1. **Already on the target processor** — run inline. Scheduling and then
//!    blocking would deadlock a processor whose workers are all occupied by
//!    callers waiting on their own submissions.
//! 2. **On a different processor** — spawn a critical task on the target and
//!    park the calling worker thread without starving its own scheduler.
//! 3. **Plain OS thread** — spawn a critical task on the target, detach, and
//!    block the OS thread on the result channel.
//!
//! ## Rules
//! - The future's output (value or error) reaches the caller unchanged;
//!   [`DispatchError`](crate::DispatchError) covers only bridge failures.
//! - Call from a task or from outside the runtime. Blocking-pool threads
//!   count as processor threads here, and the inline path cannot run there.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::engine::processor::{current_processor_id, TaskProcessor};
use crate::error::DispatchError;

/// Runs `future` on `processor` and blocks the caller until it finishes.
///
/// `task_name` labels the spawned task in logs when scheduling is needed.
pub fn run_on_processor<F>(
    processor: &Arc<TaskProcessor>,
    task_name: &str,
    future: F,
) -> Result<F::Output, DispatchError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current_processor_id() {
        // Already here: no context switch, no self-deadlock.
        Some(id) if id == processor.id() => Ok(tokio::task::block_in_place(|| {
            processor.handle().block_on(future)
        })),
        // On another processor: schedule there, park this worker thread.
        Some(_) => {
            let receiver = schedule(processor, task_name, future)?;
            tokio::task::block_in_place(|| receiver.blocking_recv()).map_err(|_| {
                DispatchError::TaskLost {
                    processor: processor.name().to_string(),
                    task: task_name.to_string(),
                }
            })
        }
        // Host domain: detach and block the OS thread.
        None => {
            let receiver = schedule(processor, task_name, future)?;
            receiver.blocking_recv().map_err(|_| DispatchError::TaskLost {
                processor: processor.name().to_string(),
                task: task_name.to_string(),
            })
        }
    }
}

/// Spawns `future` as a critical task wired to a one-shot result channel.
fn schedule<F>(
    processor: &Arc<TaskProcessor>,
    task_name: &str,
    future: F,
) -> Result<oneshot::Receiver<F::Output>, DispatchError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    processor.spawn_critical(task_name, async move {
        // The receiver may have given up; its loss is reported there.
        let _ = tx.send(future.await);
    })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolConfig, TaskProcessorConfig};
    use crate::engine::pools::EnginePools;
    use crate::error::ComponentError;

    fn processor(name: &str, workers: usize) -> Arc<TaskProcessor> {
        let pools = EnginePools::new(PoolConfig::default());
        let cfg = TaskProcessorConfig::new(name, workers);
        Arc::new(TaskProcessor::start(&cfg, workers, pools).unwrap())
    }

    #[test]
    fn host_thread_gets_value_back() {
        let p = processor("host", 2);
        let value = run_on_processor(&p, "answer", async { 41 + 1 }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn failure_inside_future_is_observed_once_unchanged() {
        let p = processor("host-err", 1);
        let out: Result<(), ComponentError> =
            run_on_processor(&p, "boom", async { Err(ComponentError::failed("boom")) }).unwrap();
        assert!(matches!(out, Err(ComponentError::Failed { reason }) if reason == "boom"));
    }

    #[test]
    fn same_processor_runs_inline() {
        let p = processor("inline", 1);
        let inner = Arc::clone(&p);

        // One worker thread: if the nested call scheduled and blocked instead
        // of running inline, it would deadlock and the test would hang.
        let handle = p
            .spawn_critical("outer", async move {
                run_on_processor(&inner, "nested", async { 5 }).unwrap()
            })
            .unwrap();
        let value = run_on_processor(&p, "collect", async move { handle.await.unwrap() }).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn cross_processor_call_lands_on_target() {
        let p = processor("p", 2);
        let q = processor("q", 2);
        let q_id = q.id();

        let target = Arc::clone(&q);
        let observed = run_on_processor(&p, "hop", async move {
            run_on_processor(&target, "probe", async move {
                current_processor_id() == Some(q_id)
            })
            .unwrap()
        })
        .unwrap();
        assert!(observed);
    }

    #[test]
    fn panicking_task_reports_task_lost() {
        let p = processor("lost", 1);
        let err = run_on_processor(&p, "kaboom", async { panic!("kaboom") }).unwrap_err();
        assert!(matches!(err, DispatchError::TaskLost { .. }));
        assert_eq!(err.as_label(), "dispatch_task_lost");
    }

    #[test]
    fn shutdown_processor_rejects_dispatch() {
        let p = processor("closed", 1);
        p.initiate_shutdown();
        let err = run_on_processor(&p, "late", async {}).unwrap_err();
        assert!(matches!(err, DispatchError::ProcessorShutdown { .. }));
    }
}
