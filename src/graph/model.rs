//! Graph model: nodes, ports and connections.
//!
//! The GraphModel is a plain data structure with no knowledge of the audio
//! backend. It enforces the structural invariants (existing endpoints,
//! matching port kinds, cascading deletes) and is cheap to deep-copy for
//! history snapshots, since every field is owned data.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dsp::{Parameter, Port};
use crate::error::{GraphError, Result};

use super::templates::{NodeTemplate, NodeType};
use super::validation::validate_connection;

/// Unique identifier for a node in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for a connection in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Node position in the graph editor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A node in the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Display name, initially the template name.
    pub name: String,
    pub position: Position,
    /// When set, audio passes around the node instead of through it.
    pub bypass: bool,
    pub parameters: Vec<Parameter>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Node {
    /// Creates a node with the template's default parameters and ports.
    pub fn from_template(id: NodeId, template: &NodeTemplate, position: Position) -> Self {
        Self {
            id,
            node_type: template.node_type,
            name: template.name.to_string(),
            position,
            bypass: false,
            parameters: template.parameters.iter().map(|p| p.instantiate()).collect(),
            inputs: template.inputs.iter().map(|p| p.instantiate()).collect(),
            outputs: template.outputs.iter().map(|p| p.instantiate()).collect(),
        }
    }

    /// Looks up a parameter by id.
    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Looks up a parameter by id for writing.
    pub fn parameter_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }

    /// Looks up an input port by id.
    pub fn input(&self, id: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == id)
    }

    /// Looks up an output port by id.
    pub fn output(&self, id: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == id)
    }

    /// Returns true for the protected output sink.
    pub fn is_output(&self) -> bool {
        self.node_type == NodeType::Output
    }
}

/// A directed edge from an output port to an input port.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    pub id: ConnectionId,
    pub source_node: NodeId,
    pub source_port: String,
    pub target_node: NodeId,
    pub target_port: String,
}

impl Connection {
    /// Creates a new connection.
    pub fn new(
        id: ConnectionId,
        source_node: NodeId,
        source_port: impl Into<String>,
        target_node: NodeId,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source_node,
            source_port: source_port.into(),
            target_node,
            target_port: target_port.into(),
        }
    }

    /// Returns true if either endpoint is on the given node.
    pub fn involves(&self, node: NodeId) -> bool {
        self.source_node == node || self.target_node == node
    }

    /// Returns true if this connection joins the same two ports.
    pub fn same_endpoints(&self, other: &Connection) -> bool {
        self.source_node == other.source_node
            && self.source_port == other.source_port
            && self.target_node == other.target_node
            && self.target_port == other.target_port
    }
}

/// The in-memory graph: nodes in insertion order plus connections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphModel {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
}

impl GraphModel {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the connections in insertion order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of connections in the graph.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Checks if a node exists in the graph.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Returns a node by id.
    pub fn find_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns a mutable node by id.
    pub fn find_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Returns a connection by id.
    pub fn find_connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Returns the output node, if present.
    pub fn output_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_output())
    }

    /// Iterates over the connections touching a node.
    pub fn connections_of(&self, node: NodeId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.involves(node))
    }

    /// Appends a node. The id must not already be in use.
    pub fn add_node(&mut self, node: Node) {
        debug_assert!(!self.contains_node(node.id), "duplicate node id {}", node.id);
        self.nodes.push(node);
    }

    /// Removes a node and every connection referencing it.
    ///
    /// Returns the removed node and the connections that went with it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(Node, Vec<Connection>)> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(GraphError::NodeNotFound(id))?;
        let node = self.nodes.remove(index);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|c| c.involves(id));
        self.connections = kept;

        self.refresh_port_flags();
        Ok((node, removed))
    }

    /// Adds a connection after validating both endpoints.
    pub fn add_connection(&mut self, connection: Connection) -> Result<()> {
        validate_connection(
            self,
            connection.source_node,
            &connection.source_port,
            connection.target_node,
            &connection.target_port,
        )?;
        self.connections.push(connection);
        self.refresh_port_flags();
        Ok(())
    }

    /// Removes a connection by id.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection> {
        let index = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;
        let connection = self.connections.remove(index);
        self.refresh_port_flags();
        Ok(connection)
    }

    /// Recomputes every port's `is_connected` flag.
    pub fn refresh_port_flags(&mut self) {
        let connections = &self.connections;
        for node in &mut self.nodes {
            let id = node.id;
            for port in &mut node.inputs {
                port.is_connected = connections
                    .iter()
                    .any(|c| c.target_node == id && c.target_port == port.id);
            }
            for port in &mut node.outputs {
                port.is_connected = connections
                    .iter()
                    .any(|c| c.source_node == id && c.source_port == port.id);
            }
        }
    }
}
