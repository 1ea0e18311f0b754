//! Domain types for the namespace hierarchy

pub mod context;
pub mod item;

pub use context::{owning_item, ContextKind, ContextRef, NamespaceContext};
pub use item::Item;
