//! # Error types used by the manager, the dispatch bridge, and components.
//!
//! This module defines three error enums:
//!
//! - [`ManagerError`] errors raised while constructing or booting the manager.
//! - [`ComponentError`] errors raised by component factories, hooks, and
//!   dependency lookups.
//! - [`DispatchError`] errors raised by the cross-domain dispatch bridge and
//!   by task spawning on a shut-down processor.
//!
//! All types provide `as_label` helpers for metrics. [`ComponentError`] has an
//! additional `is_cancelled()` predicate: a cancelled load is an in-band
//! signal, not a root cause, and the boot orchestrator treats it differently
//! from every other failure.

use thiserror::Error;

/// # Errors produced while constructing or booting the manager.
///
/// These are fatal to startup; the constructor clears any components it
/// managed to create before returning one of them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Two registrations in the component list share a name.
    #[error("duplicate component name in component list: '{name}'")]
    DuplicateComponentName {
        /// The duplicated component name.
        name: String,
    },

    /// The configuration mentions a component that was never registered.
    #[error(
        "component config is present for '{name}', but no component with that \
         name is registered; forgot to add it to the component list?"
    )]
    UnknownComponentConfig {
        /// The unregistered component name.
        name: String,
    },

    /// Two task-processor descriptors share a name.
    #[error("duplicate task processor name: '{name}'")]
    DuplicateTaskProcessor {
        /// The duplicated processor name.
        name: String,
    },

    /// A task-processor descriptor is invalid (empty name or zero workers).
    #[error("invalid task processor descriptor '{name}': {reason}")]
    InvalidTaskProcessor {
        /// The offending processor name (possibly empty).
        name: String,
        /// What is wrong with the descriptor.
        reason: String,
    },

    /// No task processor matches `default_task_processor`.
    #[error("cannot start component manager: missing default task processor '{name}'")]
    MissingDefaultTaskProcessor {
        /// The configured default processor name.
        name: String,
    },

    /// A task-processor runtime failed to start its worker threads.
    #[error("failed to start task processor '{name}'")]
    ProcessorStart {
        /// The processor that failed to start.
        name: String,
        /// The underlying runtime build error.
        #[source]
        source: std::io::Error,
    },

    /// A component failed to boot; this is the first real failure observed.
    #[error("cannot start component '{name}'")]
    ComponentBoot {
        /// The component whose boot task failed.
        name: String,
        /// The failure raised inside the boot task.
        #[source]
        source: ComponentError,
    },

    /// A component's ready hook failed after every factory had succeeded.
    #[error("component '{name}' failed in its ready hook")]
    ReadyHook {
        /// The component whose hook failed.
        name: String,
        /// The failure raised by the hook.
        #[source]
        source: ComponentError,
    },

    /// Load was cancelled but no real failure preceded the cancellation.
    ///
    /// Cancellation is never a root cause; observing only cancellations means
    /// the failure path that should have triggered them is missing.
    #[error("components load cancelled, but only load-cancelled failures were observed")]
    LoadCancelledOnly,

    /// The dispatch bridge failed while entering the cooperative domain.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::DuplicateComponentName { .. } => "manager_duplicate_component",
            ManagerError::UnknownComponentConfig { .. } => "manager_unknown_component_config",
            ManagerError::DuplicateTaskProcessor { .. } => "manager_duplicate_task_processor",
            ManagerError::InvalidTaskProcessor { .. } => "manager_invalid_task_processor",
            ManagerError::MissingDefaultTaskProcessor { .. } => "manager_missing_default_processor",
            ManagerError::ProcessorStart { .. } => "manager_processor_start",
            ManagerError::ComponentBoot { .. } => "manager_component_boot",
            ManagerError::ReadyHook { .. } => "manager_ready_hook",
            ManagerError::LoadCancelledOnly => "manager_load_cancelled_only",
            ManagerError::Dispatch(_) => "manager_dispatch",
        }
    }
}

/// # Errors produced by component factories, hooks, and dependency lookups.
///
/// `LoadCancelled` is special: it signals that some *other* component's boot
/// failed and the current task should abandon its wait. It is not a failure
/// on its own and must never be the root cause of a failed boot.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ComponentError {
    /// The load-cancel broadcast reached this task.
    #[error("component load cancelled")]
    LoadCancelled,

    /// A required component has no entry in the configuration.
    #[error("cannot start component '{name}': missing config")]
    MissingConfig {
        /// The component without configuration.
        name: String,
    },

    /// The `load-enabled` option is present but not a boolean.
    #[error("component '{name}': `load-enabled` must be a boolean")]
    InvalidLoadEnabled {
        /// The component with the malformed option.
        name: String,
    },

    /// A dependency lookup named a component that is not registered.
    #[error("component '{name}' is not registered")]
    UnknownComponent {
        /// The unknown dependency name.
        name: String,
    },

    /// A dependency lookup named a component disabled in the configuration.
    #[error("component '{name}' is disabled in config")]
    Disabled {
        /// The disabled dependency name.
        name: String,
    },

    /// Two loading components wait on each other.
    #[error("dependency cycle detected: '{from}' waits on '{to}' which already waits back")]
    DependencyCycle {
        /// The component that attempted the lookup.
        from: String,
        /// The dependency it asked for.
        to: String,
    },

    /// A factory or hook failed for a component-specific reason.
    #[error("{reason}")]
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl ComponentError {
    /// Builds a `Failed` error from anything displayable.
    ///
    /// Convenience for factories wrapping their own error types.
    pub fn failed(reason: impl Into<String>) -> Self {
        ComponentError::Failed {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentError::LoadCancelled => "component_load_cancelled",
            ComponentError::MissingConfig { .. } => "component_missing_config",
            ComponentError::InvalidLoadEnabled { .. } => "component_invalid_load_enabled",
            ComponentError::UnknownComponent { .. } => "component_unknown",
            ComponentError::Disabled { .. } => "component_disabled",
            ComponentError::DependencyCycle { .. } => "component_dependency_cycle",
            ComponentError::Failed { .. } => "component_failed",
        }
    }

    /// Indicates whether this error is the load-cancel broadcast.
    ///
    /// The boot orchestrator keeps collecting on cancelled tasks and only
    /// fails once a non-cancelled error (the root cause) is known.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ComponentError::LoadCancelled)
    }
}

/// # Errors produced by the dispatch bridge and critical-task spawning.
///
/// These cover the machinery around a dispatched future, never the future's
/// own output: whatever the future returns is handed to the caller unchanged.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The target processor no longer accepts tasks.
    #[error("task processor '{processor}' is shutting down, task '{task}' rejected")]
    ProcessorShutdown {
        /// The rejecting processor.
        processor: String,
        /// The rejected task name.
        task: String,
    },

    /// The dispatched task died before producing a result (panicked).
    #[error("task '{task}' on processor '{processor}' dropped its result channel")]
    TaskLost {
        /// The processor the task ran on.
        processor: String,
        /// The lost task name.
        task: String,
    },
}

impl DispatchError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::ProcessorShutdown { .. } => "dispatch_processor_shutdown",
            DispatchError::TaskLost { .. } => "dispatch_task_lost",
        }
    }
}
