//! # Manager: orchestrates component boot and teardown.
//!
//! The [`Manager`] owns the engine (pools + task processors) and every
//! component. Construction brings components up concurrently on the default
//! processor; dropping the manager tears everything down in reverse and only
//! returns once every worker thread has joined.
//!
//! ## Architecture
//! ```text
//! Manager::new(config, component_list)          (host thread)
//!   ├─► validate processor descriptors, guess CPU limit
//!   ├─► start one TaskProcessor per descriptor
//!   └─► run_on_processor(default) ──► boot orchestrator
//!            ├─► duplicate/unknown-name checks
//!            ├─► spawn critical task "boot/<name>" per registration
//!            │        └─► factory ──► LoadContext::find_component(...)
//!            ├─► collect outcomes, cancellation cascade on failure
//!            ├─► ready hooks (completion order)
//!            └─► publish load_duration
//!
//! Drop                                           (host thread)
//!   ├─► run_on_processor(default) ──► clear components (reverse order)
//!   ├─► release context
//!   └─► storage.reset()  (drain, join workers, release pools)
//! ```
//!
//! ## Rules
//! - Boot tasks are **critical**: only the load-cancel broadcast can unwind
//!   them, and only by resuming `find_component` waits with a failure.
//! - The *first* non-cancelled failure wins; cancellations observed after it
//!   are discarded.
//! - Teardown never propagates failures; everything is logged and contained.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{error, info, trace, warn};

use crate::components::component::ComponentRef;
use crate::components::context::ComponentContext;
use crate::components::list::{ComponentAdder, ComponentList};
use crate::config::{ComponentConfig, ManagerConfig};
use crate::engine::{
    guess_cpu_limit, run_on_processor, EnginePools, TaskProcessor, TaskProcessorsMap,
    TaskProcessorsStorage,
};
use crate::error::{ComponentError, ManagerError};

/// State guarded by the lifecycle lock.
///
/// `on_log_rotate` takes it shared; the clear path takes it exclusive, so a
/// rotate can never race the logging component's destruction.
#[derive(Default)]
struct LifecycleState {
    components_cleared: bool,
    logging_component: Option<ComponentRef>,
}

/// Hosts user-defined components on named task processors.
///
/// See the [module docs](self) for the lifecycle; see
/// [`ComponentList`](crate::ComponentList) for registering components.
pub struct Manager {
    config: ManagerConfig,
    storage: TaskProcessorsStorage,
    default_processor: Option<Arc<TaskProcessor>>,
    context: Option<Arc<ComponentContext>>,
    lifecycle: Arc<RwLock<LifecycleState>>,
    start_time: Instant,
    load_duration: Duration,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").finish_non_exhaustive()
    }
}

impl Manager {
    /// Builds the engine and boots every registered component.
    ///
    /// Runs on the caller's OS thread; returns once every component has been
    /// created and every ready hook has run. On failure the partially built
    /// system is cleared and drained before the error is returned.
    pub fn new(config: ManagerConfig, component_list: ComponentList) -> Result<Self, ManagerError> {
        let start_time = Instant::now();
        info!("starting component manager");

        validate_task_processors(&config)?;

        let pools = EnginePools::new(config.pools.clone());
        let mut storage = TaskProcessorsStorage::new(Arc::clone(&pools));
        for descriptor in &config.task_processors {
            let workers = effective_worker_threads(descriptor, &config.default_task_processor);
            let processor = TaskProcessor::start(descriptor, workers, Arc::clone(&pools))
                .map_err(|source| ManagerError::ProcessorStart {
                    name: descriptor.name.clone(),
                    source,
                })?;
            storage.add(descriptor.name.clone(), processor);
        }
        // The storage holds the pools reference of record; releasing this
        // clone keeps the reset-time ownership check meaningful.
        drop(pools);

        let default_processor = storage
            .get(&config.default_task_processor)
            .cloned()
            .ok_or_else(|| ManagerError::MissingDefaultTaskProcessor {
                name: config.default_task_processor.clone(),
            })?;

        let lifecycle = Arc::new(RwLock::new(LifecycleState::default()));
        let boot = boot_components(
            config.components.clone(),
            component_list,
            Arc::clone(&default_processor),
            Arc::clone(&lifecycle),
        );
        // A failed boot has already cleared its components; the storage is
        // drained by its own drop when we bail out here.
        let (context, load_duration) =
            run_on_processor(&default_processor, "boot", boot).map_err(ManagerError::from)??;

        info!(?load_duration, "started component manager");
        Ok(Self {
            config,
            storage,
            default_processor: Some(default_processor),
            context: Some(context),
            lifecycle,
            start_time,
            load_duration,
        })
    }

    /// The configuration the manager was constructed with.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The shared engine pools handle.
    pub fn task_processor_pools(&self) -> &Arc<EnginePools> {
        self.storage
            .pools()
            .expect("engine pools are alive for the manager lifetime")
    }

    /// Insertion-ordered map of the named task processors.
    pub fn task_processors(&self) -> &TaskProcessorsMap {
        self.storage.map()
    }

    /// The processor boot ran on and teardown will run on.
    pub fn default_task_processor(&self) -> &Arc<TaskProcessor> {
        self.default_processor
            .as_ref()
            .expect("default processor is alive for the manager lifetime")
    }

    /// When construction started.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Wall time from parallel boot start until every ready hook returned.
    pub fn load_duration(&self) -> Duration {
        self.load_duration
    }

    /// Forwards a log-rotation request to the logging component.
    ///
    /// Callable from any OS thread (typically a signal handler's notify
    /// path). A no-op once components have been cleared.
    pub fn on_log_rotate(&self) -> Result<(), ComponentError> {
        let state = self.lifecycle.read();
        if state.components_cleared {
            return Ok(());
        }
        match &state.logging_component {
            Some(component) => component.on_log_rotate(),
            None => Ok(()),
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        info!("stopping component manager");
        if let (Some(processor), Some(context)) =
            (self.default_processor.take(), self.context.take())
        {
            let lifecycle = Arc::clone(&self.lifecycle);
            let outcome = run_on_processor(&processor, "shutdown/components", async move {
                clear_components(&lifecycle, &context);
            });
            if let Err(err) = outcome {
                error!(error = %err, "failed to clear components");
            }
        }
        self.storage.reset();
        info!("stopped component manager");
    }
}

/// Sets the cleared flag and tears the context down. Idempotent: the flag
/// transitions once, later calls return without touching the context.
fn clear_components(lifecycle: &Arc<RwLock<LifecycleState>>, context: &Arc<ComponentContext>) {
    {
        let mut state = lifecycle.write();
        if state.components_cleared {
            return;
        }
        state.components_cleared = true;
        state.logging_component = None;
    }
    trace!("clearing components");
    context.clear_components();
}

/// Rejects empty, duplicate, and zero-worker processor descriptors.
fn validate_task_processors(config: &ManagerConfig) -> Result<(), ManagerError> {
    let mut seen = std::collections::HashSet::new();
    for descriptor in &config.task_processors {
        if descriptor.name.is_empty() {
            return Err(ManagerError::InvalidTaskProcessor {
                name: descriptor.name.clone(),
                reason: "name must be non-empty".to_string(),
            });
        }
        if descriptor.worker_threads == 0 {
            return Err(ManagerError::InvalidTaskProcessor {
                name: descriptor.name.clone(),
                reason: "worker_threads must be at least 1".to_string(),
            });
        }
        if !seen.insert(descriptor.name.as_str()) {
            return Err(ManagerError::DuplicateTaskProcessor {
                name: descriptor.name.clone(),
            });
        }
    }
    Ok(())
}

/// Worker count for a descriptor, honoring the CPU-limit guess on the
/// default processor only.
fn effective_worker_threads(
    descriptor: &crate::config::TaskProcessorConfig,
    default_name: &str,
) -> usize {
    if !descriptor.guess_cpu_limit {
        return descriptor.worker_threads;
    }
    if descriptor.name != default_name {
        error!(
            processor = %descriptor.name,
            "guess_cpu_limit is set for a non-default task processor, ignoring it"
        );
        return descriptor.worker_threads;
    }
    guess_cpu_limit(&descriptor.name).unwrap_or(descriptor.worker_threads)
}

/// The boot orchestrator; runs inside the default processor.
///
/// On success returns the populated context and the measured load duration.
/// On failure the context has already been cleared.
async fn boot_components(
    component_configs: Vec<ComponentConfig>,
    component_list: ComponentList,
    default_processor: Arc<TaskProcessor>,
    lifecycle: Arc<RwLock<LifecycleState>>,
) -> Result<(Arc<ComponentContext>, Duration), ManagerError> {
    let mut names = std::collections::HashSet::new();
    for adder in component_list.iter() {
        if !names.insert(adder.component_name().to_string()) {
            let name = adder.component_name().to_string();
            error!(component = %name, "duplicate component name in component list");
            return Err(ManagerError::DuplicateComponentName { name });
        }
    }
    let context = ComponentContext::new(names);

    let mut config_map: IndexMap<String, ComponentConfig> = IndexMap::new();
    for component_config in component_configs {
        if !component_list.contains(&component_config.name) {
            clear_components(&lifecycle, &context);
            return Err(ManagerError::UnknownComponentConfig {
                name: component_config.name,
            });
        }
        config_map.insert(component_config.name.clone(), component_config);
    }
    let config_map = Arc::new(config_map);

    let boot_start = Instant::now();
    let mut tasks = VecDeque::new();
    for adder in component_list.iter() {
        let name = adder.component_name().to_string();
        let task = spawn_boot_task(
            &default_processor,
            Arc::clone(adder),
            Arc::clone(&context),
            Arc::clone(&config_map),
            Arc::clone(&lifecycle),
        );
        match task {
            Ok(handle) => tasks.push_back((name, handle)),
            Err(err) => {
                // Spawning cannot fail during boot unless the engine is
                // already going away; treat it like a component failure.
                context.cancel_components_load();
                wait_remaining(&mut tasks).await;
                clear_components(&lifecycle, &context);
                return Err(err.into());
            }
        }
    }

    let mut load_cancelled = false;
    while let Some((name, handle)) = tasks.pop_front() {
        let failure = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) if err.is_cancelled() => {
                load_cancelled = true;
                None
            }
            Ok(Err(err)) => Some(ManagerError::ComponentBoot { name, source: err }),
            Err(join_err) => Some(ManagerError::ComponentBoot {
                name,
                source: ComponentError::failed(format!("boot task panicked: {join_err}")),
            }),
        };
        if let Some(err) = failure {
            context.cancel_components_load();
            // Wait for the peers to settle, but don't inspect their results:
            // the root cause is already known.
            wait_remaining(&mut tasks).await;
            clear_components(&lifecycle, &context);
            return Err(err);
        }
    }

    if load_cancelled {
        clear_components(&lifecycle, &context);
        return Err(ManagerError::LoadCancelledOnly);
    }

    info!("all components created");
    if let Err((name, source)) = context.on_all_components_loaded() {
        clear_components(&lifecycle, &context);
        return Err(ManagerError::ReadyHook { name, source });
    }
    let load_duration = boot_start.elapsed();
    info!("all components loaded");

    Ok((context, load_duration))
}

type BootHandle = tokio::task::JoinHandle<Result<(), ComponentError>>;

/// Spawns the critical task `boot/<name>` for one registration.
fn spawn_boot_task(
    processor: &Arc<TaskProcessor>,
    adder: Arc<ComponentAdder>,
    context: Arc<ComponentContext>,
    config_map: Arc<IndexMap<String, ComponentConfig>>,
    lifecycle: Arc<RwLock<LifecycleState>>,
) -> Result<BootHandle, crate::error::DispatchError> {
    let task_name = format!("boot/{}", adder.component_name());
    processor.spawn_critical(&task_name, async move {
        let name = adder.component_name().to_string();
        let result = add_component_impl(&adder, &context, &config_map, &lifecycle).await;
        if let Err(err) = &result {
            if err.is_cancelled() {
                warn!(component = %name, error = %err, "cannot start component");
            } else {
                error!(component = %name, error = %err, "cannot start component");
            }
            context.mark_failed(&name);
            context.cancel_components_load();
        }
        result
    })
}

/// Classifies one component's config and runs its factory.
async fn add_component_impl(
    adder: &ComponentAdder,
    context: &Arc<ComponentContext>,
    config_map: &IndexMap<String, ComponentConfig>,
    lifecycle: &RwLock<LifecycleState>,
) -> Result<(), ComponentError> {
    let name = adder.component_name();
    let component_config = config_map.get(name).ok_or_else(|| {
        ComponentError::MissingConfig {
            name: name.to_string(),
        }
    })?;

    if !component_config.load_enabled()? {
        info!(component = %name, "component load disabled in config, skipping");
        context.mark_skipped(name);
        return Ok(());
    }

    info!(component = %name, "starting component");
    let component_config = component_config.clone();
    let component = context
        .add_component(name, move |load| adder.build(component_config, load))
        .await?;

    if component.is_logging_component() {
        let mut state = lifecycle.write();
        // First logging component wins.
        if state.logging_component.is_none() {
            state.logging_component = Some(component);
        }
    }
    info!(component = %name, "started component");
    Ok(())
}

/// Awaits the remaining boot tasks, discarding their outcomes.
async fn wait_remaining(tasks: &mut VecDeque<(String, BootHandle)>) {
    while let Some((_, handle)) = tasks.pop_front() {
        let _ = handle.await;
    }
}
