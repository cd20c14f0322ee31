//! # Components: user-defined long-lived objects and their lifecycle.
//!
//! A *component* is created once by an async factory, may depend on other
//! components by name, and lives until the manager tears everything down in
//! reverse completion order. The [`ComponentContext`] resolves dependencies
//! between factories running in parallel; the [`Manager`] owns the whole
//! lifecycle.

mod component;
mod context;
mod list;
mod manager;

pub use component::{BoxComponentFuture, Component, ComponentRef};
pub use context::{ComponentContext, LoadContext};
pub use list::{ComponentAdder, ComponentList};
pub use manager::Manager;
