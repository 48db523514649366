//! Dependency graph for ordering requirements.
//!
//! Nodes are keyed by environment variable. A dependency on a variable
//! that is not a node is allowed only when the caller says it can be
//! ignored (the variable is already in the environment).

use std::collections::{BTreeSet, HashMap};

use crate::environ::Environ;
use crate::error::{Result, StagehandError};
use crate::requirements::RequirementStatus;

/// Dependency relationships between keyed nodes, in insertion order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    keys: Vec<String>,
    /// Index of each node's direct dependencies.
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Create a new dependency graph builder.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::default()
    }

    /// Get the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Node indices with dependencies before dependents.
    ///
    /// Nodes with no ordering constraint between them keep insertion order.
    /// Returns an error if a cycle is detected.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        fn visit(
            node: usize,
            graph: &DependencyGraph,
            state: &mut [State],
            path: &mut Vec<usize>,
            order: &mut Vec<usize>,
        ) -> Result<()> {
            match state[node] {
                State::Visited => return Ok(()),
                State::Visiting => {
                    let start = path.iter().position(|&n| n == node).unwrap_or(0);
                    let mut cycle: Vec<&str> =
                        path[start..].iter().map(|&n| graph.keys[n].as_str()).collect();
                    cycle.push(&graph.keys[node]);
                    return Err(StagehandError::CircularDependency {
                        cycle: cycle.join(" -> "),
                    });
                }
                State::Unvisited => {}
            }

            state[node] = State::Visiting;
            path.push(node);
            for &dep in &graph.dependencies[node] {
                visit(dep, graph, state, path, order)?;
            }
            path.pop();
            state[node] = State::Visited;
            order.push(node);
            Ok(())
        }

        let mut state = vec![State::Unvisited; self.keys.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(self.keys.len());
        for node in 0..self.keys.len() {
            visit(node, self, &mut state, &mut path, &mut order)?;
        }
        Ok(order)
    }
}

/// Builder for constructing a DependencyGraph.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    nodes: Vec<(String, BTreeSet<String>)>,
}

impl DependencyGraphBuilder {
    /// Add a node with the keys it depends on.
    pub fn add_node(mut self, key: impl Into<String>, depends_on: BTreeSet<String>) -> Self {
        self.nodes.push((key.into(), depends_on));
        self
    }

    /// Build the dependency graph.
    ///
    /// Dependencies on unknown keys are dropped when `can_ignore` accepts
    /// them and are an error otherwise, as are duplicate keys.
    pub fn build(self, can_ignore: impl Fn(&str) -> bool) -> Result<DependencyGraph> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, (key, _)) in self.nodes.iter().enumerate() {
            if index.insert(key.as_str(), i).is_some() {
                return Err(StagehandError::UnorderableRequirements {
                    message: format!("two nodes with the same key {}", key),
                });
            }
        }

        let mut dependencies = Vec::with_capacity(self.nodes.len());
        for (key, deps) in &self.nodes {
            let mut resolved = Vec::new();
            for dep in deps {
                match index.get(dep.as_str()) {
                    Some(&i) => resolved.push(i),
                    None if can_ignore(dep) => {}
                    None => {
                        return Err(StagehandError::UnorderableRequirements {
                            message: format!("{} depends on {} which is not a requirement", key, dep),
                        })
                    }
                }
            }
            dependencies.push(resolved);
        }

        Ok(DependencyGraph {
            keys: self.nodes.into_iter().map(|(key, _)| key).collect(),
            dependencies,
        })
    }
}

/// Sort statuses so that every status comes after the statuses supplying
/// the variables `missing_vars` says it waits on.
///
/// Variables already in `environ` don't need a supplier.
///
/// # Panics
///
/// Panics when the statuses can't be ordered (a cycle, a duplicate
/// variable, or a dependency nothing supplies). That is a bug in a
/// provider's declared dependencies, not something a user can fix.
pub fn sort_statuses<F>(
    environ: &Environ,
    statuses: &[RequirementStatus],
    missing_vars: F,
) -> Vec<RequirementStatus>
where
    F: Fn(&RequirementStatus) -> BTreeSet<String>,
{
    let graph = statuses
        .iter()
        .fold(DependencyGraph::builder(), |builder, status| {
            builder.add_node(status.requirement.env_var.clone(), missing_vars(status))
        })
        .build(|key| environ.contains_key(key))
        .and_then(|graph| graph.topological_order());

    match graph {
        Ok(order) => order.into_iter().map(|i| statuses[i].clone()).collect(),
        Err(e) => panic!("{}", e),
    }
}
