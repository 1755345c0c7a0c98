//! Processing order over the graph model.
//!
//! Feedback loops are legitimate in an audio graph, so a cycle is not an
//! error here: whatever Kahn's algorithm cannot place is appended after the
//! resolved prefix, in the order the nodes appear in the graph.

use std::collections::{HashMap, VecDeque};

use super::model::{GraphModel, NodeId};

/// A linear node order with the length of its topologically sorted prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessingOrder {
    /// Every node of the graph exactly once.
    pub nodes: Vec<NodeId>,
    /// Number of leading nodes placed by the topological reduction.
    pub resolved: usize,
}

impl ProcessingOrder {
    /// Returns true when the graph had no cycles.
    pub fn is_complete(&self) -> bool {
        self.resolved == self.nodes.len()
    }

    /// Nodes that sit on or downstream of a cycle.
    pub fn unresolved(&self) -> &[NodeId] {
        &self.nodes[self.resolved..]
    }

    /// Position of a node in the order.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Computes deterministic processing orders.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessingOrderResolver;

impl ProcessingOrderResolver {
    /// Computes the order using Kahn's algorithm.
    ///
    /// The ready queue is FIFO and seeded in graph order, so ties always
    /// break the same way for the same model.
    pub fn resolve(model: &GraphModel) -> ProcessingOrder {
        let nodes = model.nodes();

        // Build in-degree map
        let mut in_degree: HashMap<NodeId, usize> = nodes.iter().map(|n| (n.id, 0)).collect();
        for conn in model.connections() {
            if let Some(degree) = in_degree.get_mut(&conn.target_node) {
                *degree += 1;
            }
        }

        let mut queue: VecDeque<NodeId> = nodes
            .iter()
            .filter(|n| in_degree[&n.id] == 0)
            .map(|n| n.id)
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(node_id) = queue.pop_front() {
            order.push(node_id);

            for conn in model.connections() {
                if conn.source_node != node_id {
                    continue;
                }
                if let Some(degree) = in_degree.get_mut(&conn.target_node) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(conn.target_node);
                    }
                }
            }
        }

        let resolved = order.len();
        if resolved < nodes.len() {
            tracing::debug!(
                "processing order: {} node(s) on or behind a cycle",
                nodes.len() - resolved
            );
            for node in nodes {
                if !order.contains(&node.id) {
                    order.push(node.id);
                }
            }
        }

        ProcessingOrder {
            nodes: order,
            resolved,
        }
    }
}
