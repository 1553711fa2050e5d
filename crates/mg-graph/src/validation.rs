//! Validation runner and per-node validation state.
//!
//! Validators are plain functions registered per model type. They read the
//! node through a [`ValidationContext`] and append messages to a fresh
//! [`ValidationResults`], which then replaces the node's own results. The
//! node's error and warning flags propagate to every ancestor like dirty
//! state does.

use mg_core::{NodeId, PropertyValue, ValidationResults, ValidationSummary, Value};

use crate::error::GraphError;
use crate::graph::ModelGraph;
use crate::propagation::Pass;
use crate::typed::Property;

/// A model type validator.
pub type ValidatorFn = fn(&ValidationContext<'_>, &mut ValidationResults);

/// Read-only view of the node being validated.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'g> {
    graph: &'g ModelGraph,
    node: NodeId,
}

impl<'g> ValidationContext<'g> {
    /// The node being validated.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// The whole graph, for validators that look at related nodes.
    #[must_use]
    pub const fn graph(&self) -> &'g ModelGraph {
        self.graph
    }

    /// Reads a property of the node without storing defaults.
    pub fn value(&self, name: &str) -> Result<Value, GraphError> {
        self.graph.peek_value(self.node, name)
    }

    /// Reads a typed property of the node.
    pub fn get<T: PropertyValue>(&self, property: &Property<T>) -> Result<T, GraphError> {
        let value = self.value(property.name())?;
        property.decode(value)
    }
}

impl ModelGraph {
    /// Runs the node's validators, base-type validators first, and replaces
    /// its own results. Returns the node's own summary.
    pub fn validate(&mut self, node: NodeId) -> Result<ValidationSummary, GraphError> {
        let mut pass = Pass::default();
        let summary = self.run_validators(node, &mut pass)?;
        self.finish_pass(pass);
        self.dispatch()?;
        Ok(summary)
    }

    pub(crate) fn run_validators(&mut self, node: NodeId, pass: &mut Pass) -> Result<ValidationSummary, GraphError> {
        let ty = self.node(node)?.ty;
        let schema = self.registry().schema(ty)?;
        let mut results = ValidationResults::new();
        let context = ValidationContext { graph: self, node };
        for validator in schema.validators() {
            validator(&context, &mut results);
        }
        let summary = results.summary();
        self.apply_validation(node, results, pass)?;
        Ok(summary)
    }

    /// Replaces the node's own validation results.
    pub fn set_validation_results(&mut self, node: NodeId, results: ValidationResults) -> Result<(), GraphError> {
        let mut pass = Pass::default();
        self.apply_validation(node, results, &mut pass)?;
        self.finish_pass(pass);
        self.dispatch()
    }

    /// Removes every own validation message of the node.
    pub fn clear_validation(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.set_validation_results(node, ValidationResults::new())
    }

    /// The node's own validation results.
    pub fn validation_results(&self, node: NodeId) -> Result<&ValidationResults, GraphError> {
        Ok(&self.node(node)?.own_validation)
    }

    /// Aggregate flags of the node and everything beneath it.
    pub fn validation_summary(&self, node: NodeId) -> Result<ValidationSummary, GraphError> {
        Ok(self.node(node)?.aggregate.summary())
    }

    fn apply_validation(&mut self, node: NodeId, results: ValidationResults, pass: &mut Pass) -> Result<(), GraphError> {
        let data = self.node_mut(node)?;
        let changed = data.own_validation.summary() != results.summary();
        data.own_validation = results;
        if changed {
            self.propagate_from(node, pass);
        }
        Ok(())
    }
}
