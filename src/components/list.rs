//! # Ordered component registrations.
//!
//! [`ComponentList`] is the boot order: one [`ComponentAdder`] per component,
//! each carrying the component name and an async factory. Factories receive
//! the component's [`ComponentConfig`] view and a [`LoadContext`] for
//! dependency lookups.
//!
//! ```rust
//! use compvisor::{Component, ComponentList, ComponentRef};
//! use std::sync::Arc;
//!
//! struct Greeter;
//! impl Component for Greeter {}
//!
//! let list = ComponentList::new().append("greeter", |_config, _ctx| async {
//!     Ok(Arc::new(Greeter) as ComponentRef)
//! });
//! assert!(list.contains("greeter"));
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::components::component::{BoxComponentFuture, ComponentRef};
use crate::components::context::LoadContext;
use crate::config::ComponentConfig;
use crate::error::ComponentError;

type BoxedFactory = Box<dyn Fn(ComponentConfig, LoadContext) -> BoxComponentFuture + Send + Sync>;

/// One named registration: a component name plus its factory.
pub struct ComponentAdder {
    name: String,
    factory: BoxedFactory,
}

impl ComponentAdder {
    /// Wraps an async factory under the given component name.
    pub fn new<F, Fut>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ComponentConfig, LoadContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ComponentRef, ComponentError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(move |config, ctx| Box::pin(factory(config, ctx))),
        }
    }

    /// Returns the registered component name.
    pub fn component_name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(&self, config: ComponentConfig, ctx: LoadContext) -> BoxComponentFuture {
        (self.factory)(config, ctx)
    }
}

/// Ordered sequence of component registrations.
///
/// Order is the *start* order of boot tasks; completion order is decided by
/// dependency resolution at runtime.
#[derive(Default)]
pub struct ComponentList {
    entries: Vec<Arc<ComponentAdder>>,
}

impl ComponentList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a registration built from a name and an async factory.
    pub fn append<F, Fut>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ComponentConfig, LoadContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ComponentRef, ComponentError>> + Send + 'static,
    {
        self.append_adder(ComponentAdder::new(name, factory))
    }

    /// Appends a prebuilt registration.
    pub fn append_adder(mut self, adder: ComponentAdder) -> Self {
        self.entries.push(Arc::new(adder));
        self
    }

    /// Whether a component with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<ComponentAdder>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::component::Component;

    struct Nothing;
    impl Component for Nothing {}

    fn noop_list() -> ComponentList {
        ComponentList::new()
            .append("alpha", |_config, _ctx| async {
                Ok(Arc::new(Nothing) as ComponentRef)
            })
            .append("beta", |_config, _ctx| async {
                Ok(Arc::new(Nothing) as ComponentRef)
            })
    }

    #[test]
    fn preserves_registration_order() {
        let list = noop_list();
        let names: Vec<&str> = list.iter().map(|a| a.component_name()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(list.len(), 2);
        assert!(!list.is_empty());
    }

    #[test]
    fn contains_checks_by_name() {
        let list = noop_list();
        assert!(list.contains("alpha"));
        assert!(!list.contains("gamma"));
    }
}
