//! # compvisor
//!
//! **Compvisor** is a component lifecycle manager for server applications.
//!
//! It hosts user-defined "components" (long-lived objects such as HTTP
//! clients, cache services, message-queue clients) on named task processors —
//! dedicated schedulers with fixed worker-thread pools — bringing every
//! component up in dependency order and tearing everything down in reverse.
//!
//! ## Features
//!
//! | Area                | Description                                                      | Key types / traits                         |
//! |---------------------|------------------------------------------------------------------|--------------------------------------------|
//! | **Components**      | Define components with async factories and lifecycle hooks.      | [`Component`], [`ComponentList`]           |
//! | **Dependencies**    | Resolve inter-component dependencies, detect cycles.             | [`LoadContext`], [`ComponentContext`]      |
//! | **Task processors** | Named schedulers with fixed OS worker pools.                     | [`TaskProcessor`], [`TaskProcessorsStorage`] |
//! | **Dispatch**        | Enter a processor synchronously from any thread.                 | [`run_on_processor`]                       |
//! | **Lifecycle**       | Parallel boot, cancellation cascade, reverse-order teardown.     | [`Manager`]                                |
//! | **Errors**          | Typed errors for boot, components, and dispatch.                 | [`ManagerError`], [`ComponentError`]       |
//! | **Configuration**   | Processor descriptors and per-component option views.            | [`ManagerConfig`], [`ComponentConfig`]     |
//!
//! ```no_run
//! use std::sync::Arc;
//! use compvisor::{
//!     Component, ComponentConfig, ComponentList, ComponentRef, ManagerConfig, Manager,
//! };
//!
//! struct CacheService;
//! impl Component for CacheService {}
//!
//! struct HttpApi {
//!     // Dependencies are held by reference; teardown order keeps them valid.
//!     _cache: ComponentRef,
//! }
//! impl Component for HttpApi {}
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ManagerConfig::single_processor("main", 4)
//!         .with_component(ComponentConfig::new("cache"))
//!         .with_component(ComponentConfig::new("http-api"));
//!
//!     let components = ComponentList::new()
//!         .append("cache", |_config, _ctx| async {
//!             Ok(Arc::new(CacheService) as ComponentRef)
//!         })
//!         .append("http-api", |_config, ctx| async move {
//!             let cache = ctx.find_component("cache").await?;
//!             Ok(Arc::new(HttpApi { _cache: cache }) as ComponentRef)
//!         });
//!
//!     // Boots "cache" and "http-api" concurrently; the http-api factory
//!     // suspends until the cache exists. Dropping the manager stops
//!     // http-api first, then cache, then joins every worker thread.
//!     let manager = Manager::new(config, components)?;
//!     assert!(manager.load_duration() > std::time::Duration::ZERO);
//!     Ok(())
//! }
//! ```
//!
//! ---

mod components;
mod config;
mod engine;
mod error;

// ---- Public re-exports ----

pub use components::{
    BoxComponentFuture, Component, ComponentAdder, ComponentContext, ComponentList, ComponentRef,
    LoadContext, Manager,
};
pub use config::{ComponentConfig, ManagerConfig, PoolConfig, TaskProcessorConfig};
pub use engine::{
    run_on_processor, EnginePools, PoolStats, TaskProcessor, TaskProcessorsMap,
    TaskProcessorsStorage,
};
pub use error::{ComponentError, DispatchError, ManagerError};
