//! Connection validation for the graph model.
//!
//! A connection is valid when both endpoints exist, the source is an output
//! port, the target is an input port, their kinds match, and no connection
//! already joins the same two ports.

use crate::dsp::PortKind;
use crate::error::{GraphError, Result};

use super::model::{GraphModel, NodeId};

/// Returns true if a port of kind `output` may feed a port of kind `input`.
///
/// # Connection Rules
///
/// | From → To          | Allowed |
/// |--------------------|---------|
/// | Audio → Audio      | ✓       |
/// | Control → Control  | ✓       |
/// | Audio → Control    | ✗       |
/// | Control → Audio    | ✗       |
pub fn kinds_compatible(output: PortKind, input: PortKind) -> bool {
    output == input
}

/// Validates a prospective connection against the model.
///
/// Self-loops and longer cycles are permitted; feedback paths are legitimate
/// in an audio graph.
pub fn validate_connection(
    model: &GraphModel,
    source_node: NodeId,
    source_port: &str,
    target_node: NodeId,
    target_port: &str,
) -> Result<()> {
    let source = model
        .find_node(source_node)
        .ok_or(GraphError::NodeNotFound(source_node))?;
    let target = model
        .find_node(target_node)
        .ok_or(GraphError::NodeNotFound(target_node))?;

    let output = source.output(source_port).ok_or_else(|| GraphError::PortNotFound {
        node: source_node,
        port: source_port.to_string(),
    })?;
    let input = target.input(target_port).ok_or_else(|| GraphError::PortNotFound {
        node: target_node,
        port: target_port.to_string(),
    })?;

    if !kinds_compatible(output.kind, input.kind) {
        return Err(GraphError::IncompatiblePortKind {
            output: output.kind,
            input: input.kind,
        });
    }

    let duplicate = model.connections().iter().any(|c| {
        c.source_node == source_node
            && c.source_port == source_port
            && c.target_node == target_node
            && c.target_port == target_port
    });
    if duplicate {
        return Err(GraphError::DuplicateConnection);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Connection, ConnectionId, Node, Position};
    use crate::graph::templates::{builtin_template, NodeType};

    fn model() -> GraphModel {
        let mut model = GraphModel::new();
        for (id, node_type) in [
            (1, NodeType::Output),
            (2, NodeType::Oscillator),
            (3, NodeType::Lfo),
            (4, NodeType::Delay),
        ] {
            model.add_node(Node::from_template(
                NodeId(id),
                &builtin_template(node_type),
                Position::default(),
            ));
        }
        model
    }

    #[test]
    fn test_compatible_kinds() {
        assert!(kinds_compatible(PortKind::Audio, PortKind::Audio));
        assert!(kinds_compatible(PortKind::Control, PortKind::Control));
        assert!(!kinds_compatible(PortKind::Audio, PortKind::Control));
        assert!(!kinds_compatible(PortKind::Control, PortKind::Audio));
    }

    #[test]
    fn test_valid_audio_connection() {
        let model = model();
        assert!(validate_connection(&model, NodeId(2), "out", NodeId(1), "in").is_ok());
    }

    #[test]
    fn test_audio_to_control_rejected() {
        let model = model();
        let err = validate_connection(&model, NodeId(2), "out", NodeId(4), "time").unwrap_err();
        assert_eq!(
            err,
            GraphError::IncompatiblePortKind {
                output: PortKind::Audio,
                input: PortKind::Control,
            }
        );
    }

    #[test]
    fn test_control_to_audio_rejected() {
        let model = model();
        let err = validate_connection(&model, NodeId(3), "out", NodeId(1), "in").unwrap_err();
        assert!(matches!(err, GraphError::IncompatiblePortKind { .. }));
    }

    #[test]
    fn test_lfo_modulates_frequency() {
        let model = model();
        assert!(validate_connection(&model, NodeId(3), "out", NodeId(2), "frequency").is_ok());
    }

    #[test]
    fn test_direction_enforced() {
        let model = model();
        // "in" is an input on the output node, never a source.
        let err = validate_connection(&model, NodeId(1), "in", NodeId(4), "in").unwrap_err();
        assert!(matches!(err, GraphError::PortNotFound { node: NodeId(1), .. }));
    }

    #[test]
    fn test_missing_node_and_port() {
        let model = model();
        assert_eq!(
            validate_connection(&model, NodeId(9), "out", NodeId(1), "in").unwrap_err(),
            GraphError::NodeNotFound(NodeId(9))
        );
        assert!(matches!(
            validate_connection(&model, NodeId(2), "nope", NodeId(1), "in").unwrap_err(),
            GraphError::PortNotFound { .. }
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut model = model();
        model
            .add_connection(Connection::new(ConnectionId(1), NodeId(2), "out", NodeId(1), "in"))
            .unwrap();
        assert_eq!(
            validate_connection(&model, NodeId(2), "out", NodeId(1), "in").unwrap_err(),
            GraphError::DuplicateConnection
        );
    }

    #[test]
    fn test_self_loop_allowed() {
        let model = model();
        assert!(validate_connection(&model, NodeId(4), "out", NodeId(4), "in").is_ok());
    }
}
