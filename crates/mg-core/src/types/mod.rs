//! Domain types for the model graph.
//!
//! # Module Organization
//!
//! - [`ids`] - Generation-checked handles and registry identifiers
//! - [`value`] - The variant value store and its type descriptors
//! - [`validation`] - Validation messages, results, and summaries
//! - [`event`] - Outward change events and their sources
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use mg_core::{NodeId, Value, ValueType, GraphEvent};
//! ```

pub mod event;
pub mod ids;
pub mod validation;
pub mod value;

pub use event::{CollectionChange, EventSource, GraphEvent};
pub use ids::{CollectionId, ListenerId, ModelTypeId, NodeId, SlotHandle};
pub use validation::{Severity, ValidationMessage, ValidationResults, ValidationSummary};
pub use value::{PropertyValue, Value, ValueType};
