//! # Component abstraction.
//!
//! Defines the core [`Component`] trait for long-lived, named service objects.
//!
//! - **[`Component`]** — trait for lifecycle hooks (ready, unload, log rotate)
//! - **[`ComponentRef`]** — shared handle (`Arc<dyn Component>`) for passing
//!   components across the runtime
//! - **[`BoxComponentFuture`]** — type alias for boxed factory futures
//!
//! ## Rules
//! - A component is created exactly once, by its factory, inside a boot task.
//! - Dependencies obtained through
//!   [`LoadContext::find_component`](crate::LoadContext::find_component) may
//!   be held for the component's whole lifetime; reverse-order teardown
//!   guarantees a dependency outlives its dependents.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::error::ComponentError;

/// Boxed future returned by a component factory.
///
/// - **Boxed**: required for trait objects (dynamic dispatch)
/// - **Pinned**: required for async futures
/// - **Send**: factories run on task-processor worker threads
pub type BoxComponentFuture =
    Pin<Box<dyn Future<Output = Result<ComponentRef, ComponentError>> + Send + 'static>>;

/// Shared handle to a component object.
pub type ComponentRef = Arc<dyn Component>;

/// A long-lived object hosted by the manager.
///
/// All hooks have no-op defaults; implement only what the component needs.
pub trait Component: Send + Sync + 'static {
    /// Called once after *every* component has been created, in completion
    /// order. A failure aborts startup.
    fn on_all_components_loaded(&self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Called during teardown, in reverse completion order, before the
    /// component is dropped. Failures are logged and never stop teardown.
    fn on_unload(&self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Reopen log sinks. Only the first component returning `true` from
    /// [`is_logging_component`](Self::is_logging_component) receives this.
    fn on_log_rotate(&self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Marks this component as the process-wide logging sink.
    fn is_logging_component(&self) -> bool {
        false
    }
}
