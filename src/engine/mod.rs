//! # Engine: task processors and the cross-domain dispatch bridge.
//!
//! A *task processor* is a named scheduler with a fixed pool of OS worker
//! threads. All processors share one [`EnginePools`] handle that carries the
//! common sizing parameters and the live-task counter the shutdown drain
//! polls. [`run_on_processor`] bridges a blocking caller thread into a
//! processor from either side of the runtime boundary.

mod cpu_limit;
mod dispatch;
mod pools;
mod processor;
mod storage;

pub(crate) use cpu_limit::guess_cpu_limit;
pub use dispatch::run_on_processor;
pub use pools::{EnginePools, PoolStats};
pub use processor::TaskProcessor;
pub use storage::{TaskProcessorsMap, TaskProcessorsStorage};
