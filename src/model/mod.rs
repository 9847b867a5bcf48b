//! Logical model descriptors consumed by the query layer.
//!
//! - [`cube`] - cubes and their physical hints
//! - [`dimension`] - dimensions, hierarchies and levels
//! - [`attribute`] - attributes, measures and aggregates
//! - [`expression`] - derived attribute expressions

pub mod attribute;
pub mod cube;
pub mod dimension;
pub mod expression;

pub use attribute::{
    is_window_function, Attribute, LogicalAttribute, Measure, MeasureAggregate, WINDOW_FUNCTIONS,
};
pub use cube::Cube;
pub use dimension::{
    Cardinality, Dimension, Hierarchy, HierarchyPath, Level, DEFAULT_HIERARCHY_NAME,
};
pub use expression::AttributeExpr;

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{QueryError, QueryResult};

/// Order `attributes` so that every attribute follows the attributes it is
/// computed from. Attributes of one dependency depth keep their input order.
///
/// Every dependency must be part of `attributes`.
pub fn depsort_attributes<'a>(
    attributes: Vec<&'a dyn LogicalAttribute>,
) -> QueryResult<Vec<&'a dyn LogicalAttribute>> {
    let mut graph: DiGraph<&'a dyn LogicalAttribute, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for attribute in &attributes {
        nodes.insert(attribute.reference(), graph.add_node(*attribute));
    }

    for attribute in &attributes {
        let target = nodes[attribute.reference()];
        for dependency in attribute.dependencies() {
            let source = nodes.get(dependency.as_str()).copied().ok_or_else(|| {
                QueryError::NoSuchAttribute {
                    name: dependency.clone(),
                    available: nodes.keys().map(|k| k.to_string()).collect(),
                }
            })?;
            graph.add_edge(source, target, ());
        }
    }

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut sorted = Vec::with_capacity(attributes.len());
    let mut ready: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .collect();

    while !ready.is_empty() {
        let mut next = Vec::new();
        for node in ready {
            sorted.push(graph[node]);
            for dependant in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[dependant.index()] -= 1;
                if in_degree[dependant.index()] == 0 {
                    next.push(dependant);
                }
            }
        }
        next.sort();
        next.dedup();
        ready = next;
    }

    if sorted.len() < attributes.len() {
        let mut remaining: Vec<String> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || graph.edges_connecting(scc[0], scc[0]).next().is_some()
            })
            .flatten()
            .map(|n| graph[n].reference().to_string())
            .collect();
        remaining.sort();
        return Err(QueryError::model(format!(
            "Circular attribute reference (remaining: {})",
            remaining.join(", ")
        )));
    }

    Ok(sorted)
}
