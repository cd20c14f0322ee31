//! # Shared engine pools.
//!
//! One [`EnginePools`] handle is shared by every task processor of a manager.
//! It owns the common sizing parameters and the live-task counter that the
//! storage's shutdown drain polls: a processor may only be destroyed once no
//! tracked task remains anywhere in the engine, otherwise a task could outlive
//! the threads it runs on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::PoolConfig;

/// Shared ownership of the engine-wide resources.
///
/// Cheap to clone through `Arc`; the storage holds the reference of record
/// and releases it last during [`reset`](crate::TaskProcessorsStorage::reset).
pub struct EnginePools {
    config: PoolConfig,
    active_tasks: AtomicUsize,
}

impl EnginePools {
    pub(crate) fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            active_tasks: AtomicUsize::new(0),
        })
    }

    /// Sizing parameters applied to every processor runtime.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of tracked tasks currently live across all processors.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active_tasks: self.active_tasks(),
        }
    }
}

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Tracked tasks currently live.
    pub active_tasks: usize,
}

/// RAII accounting for one tracked task.
///
/// Incremented when the task is spawned, decremented when its future is
/// dropped — which also covers panics, so the drain can never wait on a task
/// that no longer exists.
pub(crate) struct TaskGuard {
    pools: Arc<EnginePools>,
}

impl TaskGuard {
    pub(crate) fn new(pools: Arc<EnginePools>) -> Self {
        pools.active_tasks.fetch_add(1, Ordering::AcqRel);
        Self { pools }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.pools.active_tasks.fetch_sub(1, Ordering::AcqRel);
    }
}
