//! Observable model graph with dirty and validation propagation.
//!
//! Business objects are modeled as nodes holding registered properties. A
//! property may hold another node or a collection of nodes, which makes the
//! holder that child's parent. Every node keeps an aggregate dirty flag and
//! aggregate validation flags that are true when the node itself, or anything
//! reachable beneath it, is dirty or invalid. Changes raise events that
//! listeners observe, and bulk work can hold those events back through
//! suspension scopes.
//!
//! # Overview
//!
//! The main entry point is [`ModelGraph`], which combines:
//!
//! - [`PropertyRegistry`]: the per-type property catalog, shared through an `Arc`
//! - Node and collection storage with generation-checked handles
//! - Child subscription bookkeeping ([`Link`], [`Slot`])
//! - Upward propagation of dirty and validation flags, cycles included
//! - Listener dispatch ([`ModelGraph::subscribe`], [`ListenerResult`])
//! - [`SuspensionScope`]: nested, exactly-once event suspension
//! - Validation ([`ValidatorFn`], [`ValidationContext`])
//! - Typed property keys ([`Property`]) and snapshot export ([`NodeSnapshot`])
//!
//! # Example
//!
//! ```
//! use mg_core::{Value, ValueType};
//! use mg_graph::{ModelGraph, PropertyRegistry, PropertySpec};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(PropertyRegistry::new());
//! let order = registry.register_type("Order", None)?;
//! let line = registry.register_type("OrderLine", None)?;
//! registry.register(order, PropertySpec::new("Lines", ValueType::Collection).new_collection())?;
//! registry.register(line, PropertySpec::new("Quantity", ValueType::Int))?;
//!
//! let mut graph = ModelGraph::with_registry(registry, Default::default());
//! let order_node = graph.create(order)?;
//! let line_node = graph.create(line)?;
//!
//! let lines = graph.get_value(order_node, "Lines")?;
//! if let Some(lines) = lines.as_collection() {
//!     graph.push(lines, line_node)?;
//! }
//! graph.clear_dirty_on_subtree(order_node, false)?;
//!
//! graph.set_value(line_node, "Quantity", Value::Int(3))?;
//! assert!(graph.is_dirty(order_node)?);
//! assert!(!graph.is_locally_dirty(order_node)?);
//! # Ok::<(), mg_graph::GraphError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod arena;
mod collection;
pub mod error;
mod events;
mod graph;
mod propagation;
pub mod registry;
mod serialization;
mod subscription;
mod suspension;
mod typed;
mod validation;

pub use error::GraphError;
pub use events::ListenerResult;
pub use graph::ModelGraph;
pub use registry::{
    DeclareFn, DefaultFactory, ModelType, PropertyDefinition, PropertyRegistry, PropertySpec,
    TypeDeclaration, TypeSchema,
};
pub use serialization::{NodeSnapshot, SnapshotValue};
pub use subscription::{Link, Slot};
pub use suspension::SuspensionScope;
pub use typed::Property;
pub use validation::{ValidationContext, ValidatorFn};
