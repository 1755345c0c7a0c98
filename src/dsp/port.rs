//! Port definitions for graph nodes.
//!
//! Ports are the connection points on nodes where signals flow in and out.
//! A [`PortDefinition`] is the static template form; a [`Port`] is the
//! per-node instance stored in the graph model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of signal a port carries.
///
/// Connections are only valid between ports of the same kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Sample stream.
    Audio,
    /// Modulation signal driving a parameter.
    Control,
}

impl PortKind {
    /// Returns a human-readable name for the port kind.
    pub fn name(&self) -> &'static str {
        match self {
            PortKind::Audio => "audio",
            PortKind::Control => "control",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a port on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// An input port that receives signals.
    Input,
    /// An output port that sends signals.
    Output,
}

impl PortDirection {
    /// Returns a human-readable name for the port direction.
    pub fn name(&self) -> &'static str {
        match self {
            PortDirection::Input => "Input",
            PortDirection::Output => "Output",
        }
    }
}

/// Where a port lands on the node's backend unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortBinding {
    /// Numbered input of the backend unit.
    Input(usize),
    /// Numbered output of the backend unit.
    Output(usize),
    /// A control input wired straight into a named automatable parameter.
    Param(&'static str),
}

/// Static definition of a port on a node template.
#[derive(Clone, Debug)]
pub struct PortDefinition {
    /// Unique identifier for this port within the node.
    pub id: &'static str,
    /// Human-readable name displayed in the UI.
    pub name: &'static str,
    /// Whether this is an input or output port.
    pub direction: PortDirection,
    /// The kind of signal this port accepts or produces.
    pub kind: PortKind,
    /// Backend target for wires touching this port.
    pub binding: PortBinding,
}

impl PortDefinition {
    /// Creates an audio input bound to a numbered unit input.
    pub fn audio_input(id: &'static str, name: &'static str, index: usize) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Input,
            kind: PortKind::Audio,
            binding: PortBinding::Input(index),
        }
    }

    /// Creates an audio output bound to a numbered unit output.
    pub fn audio_output(id: &'static str, name: &'static str, index: usize) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Output,
            kind: PortKind::Audio,
            binding: PortBinding::Output(index),
        }
    }

    /// Creates a control input that modulates the named unit parameter.
    pub fn control_input(id: &'static str, name: &'static str, param: &'static str) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Input,
            kind: PortKind::Control,
            binding: PortBinding::Param(param),
        }
    }

    /// Creates a control input bound to a numbered unit input (e.g. a gate).
    pub fn control_trigger(id: &'static str, name: &'static str, index: usize) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Input,
            kind: PortKind::Control,
            binding: PortBinding::Input(index),
        }
    }

    /// Creates a control output bound to a numbered unit output.
    pub fn control_output(id: &'static str, name: &'static str, index: usize) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Output,
            kind: PortKind::Control,
            binding: PortBinding::Output(index),
        }
    }

    /// Returns true if this is an input port.
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Returns true if this is an output port.
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    /// Creates the per-node port instance.
    pub fn instantiate(&self) -> Port {
        Port {
            id: self.id.to_string(),
            name: self.name.to_string(),
            kind: self.kind,
            direction: self.direction,
            is_connected: false,
        }
    }
}

/// A port on a node in the graph model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Identifier, unique within the owning node.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Signal kind.
    pub kind: PortKind,
    /// Input or output.
    pub direction: PortDirection,
    /// Derived flag, recomputed whenever connections change.
    #[serde(default)]
    pub is_connected: bool,
}
