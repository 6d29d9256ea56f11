//! Explicit dependency graph between pipeline steps.
//!
//! Ordering between steps is represented as a directed graph rather than
//! being implied by call sequence: nodes are step identifiers, and an edge
//! `a -> b` means `a` must not start before `b` has completed. The graph is
//! validated for unknown nodes and cycles before a pipeline is finalised.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Identifier of one step in the pipeline's execution graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Create a new step identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Directed graph of must-complete-before constraints between steps.
///
/// Nodes keep insertion order, and the computed execution order breaks ties
/// by insertion order, so composing stages in sequence yields a stable,
/// reproducible schedule.
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    nodes: Vec<StepId>,
    /// Prerequisites of each step, keyed by the dependent step.
    edges: HashMap<StepId, Vec<StepId>>,
}

impl StepGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step node.
    ///
    /// Step identifiers are unique within one pipeline; adding the same
    /// identifier twice is a configuration error.
    pub fn add_step(&mut self, step: StepId) -> PipelineResult<()> {
        if self.contains(&step) {
            return Err(PipelineError::config(format!(
                "step {step} already present in the execution graph"
            )));
        }
        self.edges.insert(step.clone(), Vec::new());
        self.nodes.push(step);
        Ok(())
    }

    /// Record that `step` must not start before `prerequisite` completes.
    pub fn must_complete_before(
        &mut self,
        step: &StepId,
        prerequisite: &StepId,
    ) -> PipelineResult<()> {
        if !self.contains(prerequisite) {
            return Err(PipelineError::UnknownStep {
                step: prerequisite.to_string(),
            });
        }
        let Some(prerequisites) = self.edges.get_mut(step) else {
            return Err(PipelineError::UnknownStep {
                step: step.to_string(),
            });
        };
        if !prerequisites.contains(prerequisite) {
            prerequisites.push(prerequisite.clone());
        }
        Ok(())
    }

    /// Whether the graph contains the given step.
    #[must_use]
    pub fn contains(&self, step: &StepId) -> bool {
        self.edges.contains_key(step)
    }

    /// Number of steps in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Prerequisites recorded for one step.
    #[must_use]
    pub fn prerequisites_of(&self, step: &StepId) -> &[StepId] {
        self.edges.get(step).map_or(&[], Vec::as_slice)
    }

    /// Compute the execution order.
    ///
    /// Kahn's algorithm over the must-complete-before edges. Ready steps are
    /// released in insertion order. Returns a cycle error naming one step on
    /// the cycle if the constraints cannot be satisfied.
    pub fn execution_order(&self) -> PipelineResult<Vec<StepId>> {
        let mut remaining: HashMap<&StepId, usize> = self
            .nodes
            .iter()
            .map(|node| (node, self.prerequisites_of(node).len()))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while order.len() < self.nodes.len() {
            let ready = self
                .nodes
                .iter()
                .find(|node| remaining.get(node).is_some_and(|count| *count == 0));

            let Some(ready) = ready else {
                // Every unscheduled step still has an unmet prerequisite.
                let stuck = self
                    .nodes
                    .iter()
                    .find(|node| remaining.contains_key(node))
                    .map_or_else(String::new, ToString::to_string);
                return Err(PipelineError::DependencyCycle { step: stuck });
            };

            let ready = ready.clone();
            remaining.remove(&ready);
            for (node, count) in &mut remaining {
                if self.prerequisites_of(node).contains(&ready) {
                    *count = count.saturating_sub(1);
                }
            }
            order.push(ready);
        }

        Ok(order)
    }

    /// Validate the graph: every edge endpoint known, no cycles.
    pub fn validate(&self) -> PipelineResult<()> {
        self.execution_order().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> StepId {
        StepId::new(id)
    }

    #[test]
    fn insertion_order_without_edges() {
        let mut graph = StepGraph::new();
        graph.add_step(step("a")).unwrap();
        graph.add_step(step("b")).unwrap();
        graph.add_step(step("c")).unwrap();

        let order = graph.execution_order().unwrap();
        assert_eq!(order, vec![step("a"), step("b"), step("c")]);
    }

    #[test]
    fn prerequisite_runs_first() {
        let mut graph = StepGraph::new();
        graph.add_step(step("deploy")).unwrap();
        graph.add_step(step("configure")).unwrap();
        graph
            .must_complete_before(&step("deploy"), &step("configure"))
            .unwrap();

        let order = graph.execution_order().unwrap();
        assert_eq!(order, vec![step("configure"), step("deploy")]);
    }

    #[test]
    fn duplicate_step_rejected() {
        let mut graph = StepGraph::new();
        graph.add_step(step("a")).unwrap();
        let err = graph.add_step(step("a")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn unknown_edge_endpoint_rejected() {
        let mut graph = StepGraph::new();
        graph.add_step(step("a")).unwrap();

        let err = graph
            .must_complete_before(&step("a"), &step("ghost"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStep { .. }));
    }

    #[test]
    fn cycle_detected() {
        let mut graph = StepGraph::new();
        graph.add_step(step("a")).unwrap();
        graph.add_step(step("b")).unwrap();
        graph.must_complete_before(&step("a"), &step("b")).unwrap();
        graph.must_complete_before(&step("b"), &step("a")).unwrap();

        let err = graph.execution_order().unwrap_err();
        assert!(matches!(err, PipelineError::DependencyCycle { .. }));
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut graph = StepGraph::new();
        graph.add_step(step("deploy")).unwrap();
        graph.add_step(step("configure")).unwrap();
        graph
            .must_complete_before(&step("deploy"), &step("configure"))
            .unwrap();
        graph
            .must_complete_before(&step("deploy"), &step("configure"))
            .unwrap();

        assert_eq!(graph.prerequisites_of(&step("deploy")).len(), 1);
    }
}
