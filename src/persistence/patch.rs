//! Graph export format.
//!
//! A `GraphExport` is a plain, self-contained record of a graph: every node
//! with its type, position and parameter values, every connection, and the
//! engine settings it was captured under. Node types are stored as strings so
//! that a document naming a type this build does not know still parses; the
//! importer decides what to do with it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{Connection, GraphModel, Node, Position};

/// Current export format version.
/// Increment this when making breaking changes to the format.
pub const GRAPH_FORMAT_VERSION: u32 = 1;

fn current_version() -> u32 {
    GRAPH_FORMAT_VERSION
}

/// A complete exported graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExport {
    /// Format version, for compatibility checks.
    #[serde(default = "current_version")]
    pub version: u32,
    pub nodes: Vec<NodeRecord>,
    pub connections: Vec<ConnectionRecord>,
    pub sample_rate: u32,
    pub buffer_size: usize,
    #[serde(default)]
    pub is_playing: bool,
}

impl GraphExport {
    /// Creates an empty export for the given settings.
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            version: GRAPH_FORMAT_VERSION,
            nodes: Vec::new(),
            connections: Vec::new(),
            sample_rate,
            buffer_size,
            is_playing: false,
        }
    }

    /// Captures a model.
    pub fn from_model(model: &GraphModel, sample_rate: u32, buffer_size: usize, is_playing: bool) -> Self {
        Self {
            nodes: model.nodes().iter().map(NodeRecord::from_node).collect(),
            connections: model
                .connections()
                .iter()
                .map(ConnectionRecord::from_connection)
                .collect(),
            is_playing,
            ..Self::new(sample_rate, buffer_size)
        }
    }

    /// Check if this export's version can be read by this build.
    pub fn is_compatible(&self) -> bool {
        self.version <= GRAPH_FORMAT_VERSION
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses JSON and checks the version.
    pub fn from_json(json: &str) -> Result<Self, PatchError> {
        let export: GraphExport = serde_json::from_str(json)?;
        if !export.is_compatible() {
            return Err(PatchError::IncompatibleVersion {
                found: export.version,
                expected: GRAPH_FORMAT_VERSION,
            });
        }
        Ok(export)
    }
}

/// Serialized data for a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Node id at export time. Only meaningful for resolving connections.
    pub id: u64,
    /// Node type identifier, e.g. "oscillator".
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub bypass: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterRecord>,
}

impl NodeRecord {
    pub fn from_node(node: &Node) -> Self {
        Self {
            id: node.id.0,
            node_type: node.node_type.as_str().to_string(),
            name: Some(node.name.clone()),
            position: node.position,
            bypass: node.bypass,
            parameters: node
                .parameters
                .iter()
                .map(|p| ParameterRecord {
                    id: p.id.clone(),
                    value: p.value,
                })
                .collect(),
        }
    }
}

/// A stored parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub id: String,
    pub value: f32,
}

/// Serialized data for a connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(default)]
    pub id: u64,
    pub source_node: u64,
    pub source_port: String,
    pub target_node: u64,
    pub target_port: String,
}

impl ConnectionRecord {
    /// Create new connection data.
    pub fn new(
        source_node: u64,
        source_port: impl Into<String>,
        target_node: u64,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            source_node,
            source_port: source_port.into(),
            target_node,
            target_port: target_port.into(),
        }
    }

    pub fn from_connection(connection: &Connection) -> Self {
        Self {
            id: connection.id.0,
            source_node: connection.source_node.0,
            source_port: connection.source_port.clone(),
            target_node: connection.target_node.0,
            target_port: connection.target_port.clone(),
        }
    }
}

/// Error type for export file operations.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Incompatible graph format version: found {found}, expected <= {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
}

/// Save an export to a JSON file.
pub fn save_to_file(export: &GraphExport, path: &Path) -> Result<(), PatchError> {
    std::fs::write(path, export.to_json()?)?;
    Ok(())
}

/// Load an export from a JSON file.
pub fn load_from_file(path: &Path) -> Result<GraphExport, PatchError> {
    let json = std::fs::read_to_string(path)?;
    GraphExport::from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{builtin_template, ConnectionId, NodeId, NodeType};

    fn sample_model() -> GraphModel {
        let mut model = GraphModel::new();
        for (id, node_type) in [(1, NodeType::Output), (2, NodeType::Oscillator)] {
            model.add_node(Node::from_template(
                NodeId(id),
                &builtin_template(node_type),
                Position::new(10.0 * id as f32, 0.0),
            ));
        }
        model
            .add_connection(Connection::new(ConnectionId(1), NodeId(2), "out", NodeId(1), "in"))
            .unwrap();
        model
    }

    #[test]
    fn test_export_uses_camel_case_and_type_strings() {
        let export = GraphExport::from_model(&sample_model(), 48000, 256, true);
        let json = export.to_json().unwrap();

        assert!(json.contains("\"sampleRate\": 48000"));
        assert!(json.contains("\"bufferSize\": 256"));
        assert!(json.contains("\"isPlaying\": true"));
        assert!(json.contains("\"type\": \"oscillator\""));
        assert!(json.contains("\"sourceNode\": 2"));
    }

    #[test]
    fn test_json_round_trip() {
        let export = GraphExport::from_model(&sample_model(), 44100, 512, false);
        let loaded = GraphExport::from_json(&export.to_json().unwrap()).unwrap();
        assert_eq!(loaded, export);
        assert_eq!(loaded.nodes[1].parameters.len(), 3);
    }

    #[test]
    fn test_minimal_document_parses() {
        let json = r#"{
            "nodes": [{ "id": 7, "type": "gain" }],
            "connections": [{ "sourceNode": 7, "sourcePort": "out", "targetNode": 1, "targetPort": "in" }],
            "sampleRate": 44100,
            "bufferSize": 512
        }"#;
        let export = GraphExport::from_json(json).unwrap();
        assert_eq!(export.version, GRAPH_FORMAT_VERSION);
        assert!(!export.is_playing);
        assert_eq!(export.nodes[0].position, Position::default());
        assert!(export.nodes[0].parameters.is_empty());
    }

    #[test]
    fn test_version_compatibility() {
        let mut export = GraphExport::new(44100, 512);
        assert!(export.is_compatible());

        export.version = GRAPH_FORMAT_VERSION + 1;
        let json = serde_json::to_string(&export).unwrap();
        assert!(matches!(
            GraphExport::from_json(&json),
            Err(PatchError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let export = GraphExport::from_model(&sample_model(), 44100, 512, false);

        save_to_file(&export, &path).unwrap();
        assert_eq!(load_from_file(&path).unwrap(), export);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_from_file(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(PatchError::Io(_))));
    }
}
