//! # Manager configuration.
//!
//! Provides [`ManagerConfig`] the immutable settings the manager is
//! constructed with: engine pool sizing, task-processor descriptors, and
//! per-component configuration views.
//!
//! Config is used in two ways:
//! 1. **Manager construction**: `Manager::new(config, component_list)`
//! 2. **Component factories**: each factory receives its own
//!    [`ComponentConfig`] view with the raw options for that component.
//!
//! Parsing config files is out of scope here; all structs derive
//! `serde::Deserialize` so callers can load them from whatever format their
//! deployment uses, or build them in code.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ComponentError;

/// Sizing for the engine pools shared by every task processor.
///
/// ## Field semantics
/// - `thread_stack_size`: stack size of each worker thread, in bytes
/// - `max_blocking_threads`: cap on the blocking-thread pool of each processor
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker thread stack size in bytes.
    pub thread_stack_size: usize,
    /// Maximum number of blocking threads per task processor.
    pub max_blocking_threads: usize,
}

impl Default for PoolConfig {
    /// Default pool sizing:
    /// - `thread_stack_size = 2 MiB`
    /// - `max_blocking_threads = 512`
    fn default() -> Self {
        Self {
            thread_stack_size: 2 * 1024 * 1024,
            max_blocking_threads: 512,
        }
    }
}

/// Descriptor of one named task processor.
///
/// ## Invariants (validated by the manager)
/// - `name` is non-empty and unique within [`ManagerConfig::task_processors`]
/// - `worker_threads >= 1`
/// - `guess_cpu_limit` is honored only on the default processor; on any other
///   descriptor it is logged and ignored
#[derive(Clone, Debug, Deserialize)]
pub struct TaskProcessorConfig {
    /// Processor name; also the worker-thread name prefix.
    pub name: String,
    /// Number of OS worker threads backing this processor.
    pub worker_threads: usize,
    /// Derive `worker_threads` from the `CPU_LIMIT` environment variable.
    #[serde(default)]
    pub guess_cpu_limit: bool,
}

impl TaskProcessorConfig {
    /// Creates a descriptor with the given name and worker count.
    pub fn new(name: impl Into<String>, worker_threads: usize) -> Self {
        Self {
            name: name.into(),
            worker_threads,
            guess_cpu_limit: false,
        }
    }

    /// Enables CPU-limit guessing for this descriptor.
    pub fn with_guess_cpu_limit(mut self) -> Self {
        self.guess_cpu_limit = true;
        self
    }
}

/// Raw configuration view of one component.
///
/// `options` carries the component's own settings untouched; the manager
/// itself interprets only the `load-enabled` key.
#[derive(Clone, Debug, Deserialize)]
pub struct ComponentConfig {
    /// Component name; must match a registration in the component list.
    pub name: String,
    /// Raw component options.
    #[serde(default)]
    pub options: Value,
}

/// Key controlling whether a configured component is created at boot.
const LOAD_ENABLED_KEY: &str = "load-enabled";

impl ComponentConfig {
    /// Creates a config view with empty options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
        }
    }

    /// Creates a config view with the given raw options.
    pub fn with_options(name: impl Into<String>, options: Value) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Returns the raw value of an option, if present.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Whether this component should be created at boot.
    ///
    /// Missing `load-enabled` means enabled; a present non-boolean value is a
    /// configuration error.
    pub fn load_enabled(&self) -> Result<bool, ComponentError> {
        match self.option(LOAD_ENABLED_KEY) {
            None => Ok(true),
            Some(Value::Bool(enabled)) => Ok(*enabled),
            Some(_) => Err(ComponentError::InvalidLoadEnabled {
                name: self.name.clone(),
            }),
        }
    }
}

/// Immutable configuration for the component manager.
///
/// Defines:
/// - **Engine pools**: shared sizing for every processor's threads
/// - **Task processors**: the named schedulers components run on
/// - **Components**: per-component raw option views
///
/// ## Field semantics
/// - `default_task_processor`: must name exactly one entry of
///   `task_processors`; boot tasks and the teardown path run there
/// - `components`: order is irrelevant (boot order comes from the component
///   list); names not present in the list fail construction
#[derive(Clone, Debug, Deserialize)]
pub struct ManagerConfig {
    /// Shared engine pool sizing.
    #[serde(default)]
    pub pools: PoolConfig,
    /// Ordered task-processor descriptors.
    pub task_processors: Vec<TaskProcessorConfig>,
    /// Name of the processor boot and teardown run on.
    pub default_task_processor: String,
    /// Per-component configuration views.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl ManagerConfig {
    /// Creates a config with a single default processor and no components.
    ///
    /// Useful as a starting point in tests and small binaries.
    pub fn single_processor(name: impl Into<String>, worker_threads: usize) -> Self {
        let name = name.into();
        Self {
            pools: PoolConfig::default(),
            task_processors: vec![TaskProcessorConfig::new(name.clone(), worker_threads)],
            default_task_processor: name,
            components: Vec::new(),
        }
    }

    /// Appends a component config view.
    pub fn with_component(mut self, component: ComponentConfig) -> Self {
        self.components.push(component);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_enabled_defaults_to_true() {
        let cfg = ComponentConfig::new("http-client");
        assert!(cfg.load_enabled().unwrap());
    }

    #[test]
    fn load_enabled_reads_boolean() {
        let cfg = ComponentConfig::with_options("cache", json!({ "load-enabled": false }));
        assert!(!cfg.load_enabled().unwrap());

        let cfg = ComponentConfig::with_options("cache", json!({ "load-enabled": true }));
        assert!(cfg.load_enabled().unwrap());
    }

    #[test]
    fn load_enabled_rejects_non_boolean() {
        let cfg = ComponentConfig::with_options("cache", json!({ "load-enabled": "yes" }));
        assert!(matches!(
            cfg.load_enabled(),
            Err(ComponentError::InvalidLoadEnabled { name }) if name == "cache"
        ));
    }

    #[test]
    fn component_options_are_reachable() {
        let cfg = ComponentConfig::with_options("queue", json!({ "brokers": ["a:9092"] }));
        assert!(cfg.option("brokers").is_some());
        assert!(cfg.option("missing").is_none());
    }

    #[test]
    fn manager_config_deserializes() {
        let raw = json!({
            "task_processors": [
                { "name": "main", "worker_threads": 4 },
                { "name": "fs", "worker_threads": 2, "guess_cpu_limit": false }
            ],
            "default_task_processor": "main",
            "components": [
                { "name": "logging", "options": { "path": "/dev/stdout" } }
            ]
        });
        let cfg: ManagerConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(cfg.task_processors.len(), 2);
        assert_eq!(cfg.default_task_processor, "main");
        assert_eq!(cfg.components[0].name, "logging");
    }
}
