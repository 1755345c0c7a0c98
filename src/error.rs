//! Error types for graph engine operations.

use std::fmt;

use thiserror::Error;

use crate::dsp::PortKind;
use crate::engine::{BackendError, EngineState};
use crate::graph::{ConnectionId, NodeId};

/// Result type for graph engine operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Which capacity limit was hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityKind {
    Nodes,
    Connections,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityKind::Nodes => f.write_str("nodes"),
            CapacityKind::Connections => f.write_str("connections"),
        }
    }
}

/// Errors returned by the graph engine.
///
/// Everything except `BackendOperationFailed` is a validation failure that
/// aborts only the requested operation and leaves the graph unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Engine is not initialized (state: {0})")]
    NotInitialized(EngineState),

    #[error("Cannot {action} while engine is {state}")]
    InvalidTransition {
        state: EngineState,
        action: &'static str,
    },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("Port '{port}' not found on node {node}")]
    PortNotFound { node: NodeId, port: String },

    #[error("Parameter '{parameter}' not found on node {node}")]
    ParameterNotFound { node: NodeId, parameter: String },

    #[error("Invalid value for parameter '{parameter}': {value}")]
    InvalidParameterValue { parameter: String, value: f32 },

    #[error("Capacity exceeded: at most {limit} {kind}")]
    CapacityExceeded { kind: CapacityKind, limit: usize },

    #[error("Output node {0} is protected and cannot be deleted")]
    ProtectedNodeDeletion(NodeId),

    #[error("Graph already has an output node")]
    OutputNodeExists,

    #[error("Cannot connect {output} port to {input} port")]
    IncompatiblePortKind { output: PortKind, input: PortKind },

    #[error("Connection already exists")]
    DuplicateConnection,

    #[error("Node {0} is not an oscillator")]
    NotAnOscillator(NodeId),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Graph format version {found} is newer than supported version {expected}")]
    IncompatibleGraphVersion { found: u32, expected: u32 },

    #[error("Backend operation failed: {0}")]
    BackendOperationFailed(#[from] BackendError),
}

impl GraphError {
    /// Returns true for synchronous validation failures.
    pub fn is_validation(&self) -> bool {
        !matches!(self, GraphError::BackendOperationFailed(_))
    }
}
