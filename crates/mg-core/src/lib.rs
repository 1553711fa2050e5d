//! Core handles, values, events, and configuration for the model graph.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - Generation-checked handles ([`NodeId`], [`CollectionId`], [`ListenerId`])
//!   and registry identifiers ([`ModelTypeId`])
//! - The variant value store types ([`Value`], [`ValueType`], [`PropertyValue`])
//! - Validation results and their aggregate summary
//! - Outward graph events ([`GraphEvent`], [`EventSource`])
//! - Configuration structures and [`ConfigError`]
//! - Type aliases for `FxHashMap`/`FxHashSet`

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{Config, GraphConfig, LogConfig, SuspensionMode};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet, fx_hash_map_with_capacity, fx_hash_set_with_capacity};
pub use types::{
    CollectionChange, CollectionId, EventSource, GraphEvent, ListenerId, ModelTypeId, NodeId,
    PropertyValue, Severity, SlotHandle, ValidationMessage, ValidationResults, ValidationSummary,
    Value, ValueType,
};
