//! # ComponentContext: dependency resolution between booting components.
//!
//! The context owns one *slot* per registered component. A boot task asking
//! for a dependency through [`LoadContext::find_component`] suspends on the
//! target slot until that component's own boot publishes a result.
//!
//! ## Architecture
//! ```text
//! boot/<A> ──► add_component("A", factory)
//!                  │ factory awaits find_component("B")
//!                  ▼
//!            slot "B" (watch channel) ◄── boot/<B> publishes Ready(B)
//!                  │
//!                  └─► cancel token ◄── cancel_components_load()
//! ```
//!
//! ## Rules
//! - A slot resolves exactly once: `Ready`, `Failed`, or `Skipped`.
//! - Waiters on a **failed** slot resume with `LoadCancelled`: the broadcast
//!   that the failure triggered is the signal they observe, and the real
//!   failure stays attributed to the component that raised it.
//! - Waiters on a **skipped** (`load-enabled: false`) slot get an ordinary
//!   failure; depending on a disabled component is a configuration mistake,
//!   not a casualty of someone else's crash.
//! - Cycle detection walks the waits-on chain before suspending; cycles are
//!   reported as ordinary failures, never as `LoadCancelled`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::components::component::ComponentRef;
use crate::error::ComponentError;

/// State of one component slot.
#[derive(Clone)]
enum SlotState {
    /// Boot task not finished yet.
    Loading,
    /// Component created; waiters receive this reference.
    Ready(ComponentRef),
    /// Boot task failed; waiters resume with `LoadCancelled`.
    Failed,
    /// Disabled in config; waiters fail with an ordinary error.
    Skipped,
}

/// Registry resolving dependencies between components.
///
/// Created by the manager before boot tasks are spawned; one slot per
/// registered component name. Lookups against unknown names fail fast.
pub struct ComponentContext {
    slots: DashMap<String, watch::Sender<SlotState>>,
    /// `waits_on[a] = b` while component `a` is suspended waiting for `b`.
    waits_on: Mutex<HashMap<String, String>>,
    /// Completion order; teardown walks it in reverse.
    completed: Mutex<Vec<(String, ComponentRef)>>,
    cancel: CancellationToken,
}

impl ComponentContext {
    pub(crate) fn new(names: impl IntoIterator<Item = String>) -> Arc<Self> {
        let slots = DashMap::new();
        for name in names {
            let (tx, _rx) = watch::channel(SlotState::Loading);
            slots.insert(name, tx);
        }
        Arc::new(Self {
            slots,
            waits_on: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Runs `factory` for `name` and publishes the outcome to the slot.
    ///
    /// Returns the stored component on success. The factory receives a
    /// [`LoadContext`] that attributes its dependency lookups to `name`.
    pub(crate) async fn add_component<F>(
        self: &Arc<Self>,
        name: &str,
        factory: F,
    ) -> Result<ComponentRef, ComponentError>
    where
        F: FnOnce(LoadContext) -> crate::components::component::BoxComponentFuture,
    {
        let ctx = LoadContext {
            context: Arc::clone(self),
            owner: name.to_string(),
        };
        match factory(ctx).await {
            Ok(component) => {
                self.completed
                    .lock()
                    .push((name.to_string(), Arc::clone(&component)));
                self.publish(name, SlotState::Ready(Arc::clone(&component)));
                Ok(component)
            }
            Err(err) => {
                self.publish(name, SlotState::Failed);
                Err(err)
            }
        }
    }

    /// Marks a component as disabled by configuration.
    pub(crate) fn mark_skipped(&self, name: &str) {
        self.publish(name, SlotState::Skipped);
    }

    /// Marks a component's boot as failed without a created component.
    ///
    /// Used for failures before the factory runs (missing config, malformed
    /// options); idempotent with the factory-failure path.
    pub(crate) fn mark_failed(&self, name: &str) {
        self.publish(name, SlotState::Failed);
    }

    /// Broadcasts the load-cancel signal.
    ///
    /// Every task suspended in `find_component` resumes with `LoadCancelled`;
    /// later lookups fail immediately with the same kind.
    pub(crate) fn cancel_components_load(&self) {
        if !self.cancel.is_cancelled() {
            warn!("component load cancelled");
            self.cancel.cancel();
        }
    }

    /// Whether the load-cancel broadcast has fired.
    pub fn is_load_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of successfully created components.
    pub fn components_count(&self) -> usize {
        self.completed.lock().len()
    }

    /// Runs every component's ready hook in completion order.
    ///
    /// The first failure aborts and is returned with the component's name.
    pub(crate) fn on_all_components_loaded(&self) -> Result<(), (String, ComponentError)> {
        let components: Vec<(String, ComponentRef)> = self.completed.lock().clone();
        for (name, component) in components {
            debug!(component = %name, "running ready hook");
            component
                .on_all_components_loaded()
                .map_err(|err| (name.clone(), err))?;
        }
        Ok(())
    }

    /// Tears every component down in reverse completion order.
    ///
    /// Unload-hook failures are logged; teardown always completes. Safe to
    /// call on a context that created nothing.
    pub(crate) fn clear_components(&self) {
        let completed = std::mem::take(&mut *self.completed.lock());
        for (name, component) in completed.into_iter().rev() {
            info!(component = %name, "stopping component");
            if let Err(err) = component.on_unload() {
                error!(component = %name, error = %err, "component unload failed");
            }
            // Drop the slot's clone so this iteration holds the last
            // reference and components are destroyed in reverse order.
            self.slots.remove(&name);
            drop(component);
            info!(component = %name, "stopped component");
        }
        self.slots.clear();
    }

    async fn find_component(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<ComponentRef, ComponentError> {
        let mut rx = match self.slots.get(name) {
            Some(slot) => slot.subscribe(),
            None => {
                return Err(ComponentError::UnknownComponent {
                    name: name.to_string(),
                })
            }
        };

        if self.cancel.is_cancelled() {
            return Err(ComponentError::LoadCancelled);
        }

        // Resolve without suspending when the slot already has an outcome.
        if let Some(outcome) = Self::resolve(name, &rx.borrow_and_update()) {
            return outcome;
        }

        self.register_wait(owner, name)?;
        let result = self.wait_for_slot(name, &mut rx).await;
        self.waits_on.lock().remove(owner);
        result
    }

    /// Records `owner` waiting on `name`, detecting waits-on cycles.
    fn register_wait(&self, owner: &str, name: &str) -> Result<(), ComponentError> {
        let mut waits = self.waits_on.lock();
        let mut cursor = name;
        while let Some(next) = waits.get(cursor) {
            if next == owner {
                return Err(ComponentError::DependencyCycle {
                    from: owner.to_string(),
                    to: name.to_string(),
                });
            }
            cursor = next.as_str();
        }
        waits.insert(owner.to_string(), name.to_string());
        Ok(())
    }

    async fn wait_for_slot(
        &self,
        name: &str,
        rx: &mut watch::Receiver<SlotState>,
    ) -> Result<ComponentRef, ComponentError> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ComponentError::LoadCancelled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Slot dropped while loading: teardown is underway.
                        return Err(ComponentError::LoadCancelled);
                    }
                    if let Some(outcome) = Self::resolve(name, &rx.borrow_and_update()) {
                        return outcome;
                    }
                }
            }
        }
    }

    fn resolve(name: &str, state: &SlotState) -> Option<Result<ComponentRef, ComponentError>> {
        match state {
            SlotState::Loading => None,
            SlotState::Ready(component) => Some(Ok(Arc::clone(component))),
            SlotState::Failed => Some(Err(ComponentError::LoadCancelled)),
            SlotState::Skipped => Some(Err(ComponentError::Disabled {
                name: name.to_string(),
            })),
        }
    }

    fn publish(&self, name: &str, state: SlotState) {
        if let Some(slot) = self.slots.get(name) {
            slot.send_replace(state);
        }
    }
}

/// The context as seen by one loading component.
///
/// Handed to the component's factory; dependency lookups are attributed to
/// the owning component for cycle detection.
#[derive(Clone)]
pub struct LoadContext {
    context: Arc<ComponentContext>,
    owner: String,
}

impl LoadContext {
    /// Name of the component this factory is building.
    pub fn component_name(&self) -> &str {
        &self.owner
    }

    /// Returns the named component, suspending until it has been created.
    ///
    /// Fails immediately for unknown names; fails with
    /// [`ComponentError::LoadCancelled`] once the load-cancel broadcast has
    /// fired or the dependency's own boot failed.
    pub async fn find_component(&self, name: &str) -> Result<ComponentRef, ComponentError> {
        self.context.find_component(&self.owner, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::component::Component;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Plain;
    impl Component for Plain {}

    fn context(names: &[&str]) -> Arc<ComponentContext> {
        ComponentContext::new(names.iter().map(|n| n.to_string()))
    }

    fn plain() -> ComponentRef {
        Arc::new(Plain)
    }

    fn expect_err(result: Result<ComponentRef, ComponentError>) -> ComponentError {
        match result {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn find_waits_for_dependency() {
        let ctx = context(&["a", "b"]);

        let waiter = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.add_component("b", |load| {
                    Box::pin(async move {
                        load.find_component("a").await?;
                        Ok(plain())
                    })
                })
                .await
            })
        };

        // Give the waiter time to suspend, then publish "a".
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.add_component("a", |_load| Box::pin(async { Ok(plain()) }))
            .await
            .unwrap();

        timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(ctx.components_count(), 2);
    }

    #[tokio::test]
    async fn unknown_component_fails_fast() {
        let ctx = context(&["a"]);
        let err = expect_err(
            ctx.add_component("a", |load| {
                Box::pin(async move {
                    load.find_component("ghost").await?;
                    Ok(plain())
                })
            })
            .await,
        );
        assert!(matches!(err, ComponentError::UnknownComponent { name } if name == "ghost"));
    }

    #[tokio::test]
    async fn cancel_resumes_suspended_waiters() {
        let ctx = context(&["a", "b"]);

        let waiter = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.add_component("b", |load| {
                    Box::pin(async move {
                        load.find_component("a").await?;
                        Ok(plain())
                    })
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel_components_load();

        let err = expect_err(timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap());
        assert!(err.is_cancelled());

        // Later lookups fail immediately with the same kind.
        let err = expect_err(
            ctx.add_component("a", |load| {
                Box::pin(async move {
                    load.find_component("b").await?;
                    Ok(plain())
                })
            })
            .await,
        );
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn failed_dependency_cancels_waiter() {
        let ctx = context(&["a", "b"]);

        let waiter = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.add_component("b", |load| {
                    Box::pin(async move {
                        load.find_component("a").await?;
                        Ok(plain())
                    })
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = expect_err(
            ctx.add_component("a", |_load| {
                Box::pin(async { Err(ComponentError::failed("disk on fire")) })
            })
            .await,
        );
        assert!(!err.is_cancelled());

        let err = expect_err(timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap());
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn skipped_dependency_is_an_ordinary_failure() {
        let ctx = context(&["a", "b"]);
        ctx.mark_skipped("a");

        let err = expect_err(
            ctx.add_component("b", |load| {
                Box::pin(async move {
                    load.find_component("a").await?;
                    Ok(plain())
                })
            })
            .await,
        );
        assert!(matches!(err, ComponentError::Disabled { name } if name == "a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn mutual_waits_are_reported_as_cycle() {
        let ctx = context(&["a", "b"]);

        let first = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.add_component("a", |load| {
                    Box::pin(async move {
                        load.find_component("b").await?;
                        Ok(plain())
                    })
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.add_component("b", |load| {
                    Box::pin(async move {
                        load.find_component("a").await?;
                        Ok(plain())
                    })
                })
                .await
            })
        };

        let err = expect_err(timeout(Duration::from_secs(1), second).await.unwrap().unwrap());
        assert!(
            matches!(err, ComponentError::DependencyCycle { .. }),
            "cycle must surface as an ordinary failure, got: {err}"
        );

        // The first waiter resumes once "b" publishes its failure.
        let err = expect_err(timeout(Duration::from_secs(1), first).await.unwrap().unwrap());
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn clear_components_runs_in_reverse_and_is_idempotent() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Tracked {
            name: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        impl Component for Tracked {
            fn on_unload(&self) -> Result<(), ComponentError> {
                self.order.lock().push(self.name);
                Ok(())
            }
        }

        let ctx = context(&["a", "b"]);
        for name in ["a", "b"] {
            let order = Arc::clone(&order);
            ctx.add_component(name, move |_load| {
                Box::pin(async move { Ok(Arc::new(Tracked { name, order }) as ComponentRef) })
            })
            .await
            .unwrap();
        }

        ctx.clear_components();
        ctx.clear_components();
        assert_eq!(*order.lock(), ["b", "a"]);
        assert_eq!(ctx.components_count(), 0);
    }

    #[tokio::test]
    async fn unload_failure_does_not_stop_teardown() {
        struct Sour;
        impl Component for Sour {
            fn on_unload(&self) -> Result<(), ComponentError> {
                Err(ComponentError::failed("refuses to die"))
            }
        }

        let ctx = context(&["a", "b"]);
        ctx.add_component("a", |_load| {
            Box::pin(async { Ok(Arc::new(Sour) as ComponentRef) })
        })
        .await
        .unwrap();
        ctx.add_component("b", |_load| Box::pin(async { Ok(plain()) }))
            .await
            .unwrap();

        ctx.clear_components();
        assert_eq!(ctx.components_count(), 0);
    }

    #[tokio::test]
    async fn ready_hooks_run_in_completion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Hooked {
            name: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        impl Component for Hooked {
            fn on_all_components_loaded(&self) -> Result<(), ComponentError> {
                self.order.lock().push(self.name);
                Ok(())
            }
        }

        let ctx = context(&["x", "y"]);
        for name in ["y", "x"] {
            let order = Arc::clone(&order);
            ctx.add_component(name, move |_load| {
                Box::pin(async move { Ok(Arc::new(Hooked { name, order }) as ComponentRef) })
            })
            .await
            .unwrap();
        }

        ctx.on_all_components_loaded().unwrap();
        assert_eq!(*order.lock(), ["y", "x"]);
    }
}
