//! Node templates for the synthesizer graph.
//!
//! Defines the available node types, their default parameters and port
//! layout, and the backend unit each one is realized with. The registry is
//! built once and never changes afterwards.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::{ParameterCategory, ParameterDefinition, PortDefinition};
use crate::engine::UnitKind;
use crate::error::{GraphError, Result};

/// Every node type the engine knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    /// Periodic waveform source.
    Oscillator,
    /// Noise source.
    Noise,
    /// Biquad filter.
    Filter,
    /// Amplifier.
    Gain,
    /// Delay line with feedback.
    Delay,
    /// Convolution reverb.
    Reverb,
    /// Waveshaping distortion.
    Distortion,
    /// Dynamics compressor.
    Compressor,
    /// Stereo panner.
    Panner,
    /// Low frequency oscillator.
    Lfo,
    /// ADSR envelope generator.
    Envelope,
    /// Four-input summing mixer.
    Mixer,
    /// Final destination in the signal chain.
    Output,
}

impl NodeType {
    /// All node types in palette order.
    pub const ALL: [NodeType; 13] = [
        NodeType::Oscillator,
        NodeType::Noise,
        NodeType::Filter,
        NodeType::Gain,
        NodeType::Delay,
        NodeType::Reverb,
        NodeType::Distortion,
        NodeType::Compressor,
        NodeType::Panner,
        NodeType::Lfo,
        NodeType::Envelope,
        NodeType::Mixer,
        NodeType::Output,
    ];

    /// Stable identifier used in exported graphs.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Oscillator => "oscillator",
            NodeType::Noise => "noise",
            NodeType::Filter => "filter",
            NodeType::Gain => "gain",
            NodeType::Delay => "delay",
            NodeType::Reverb => "reverb",
            NodeType::Distortion => "distortion",
            NodeType::Compressor => "compressor",
            NodeType::Panner => "panner",
            NodeType::Lfo => "lfo",
            NodeType::Envelope => "envelope",
            NodeType::Mixer => "mixer",
            NodeType::Output => "output",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = GraphError;

    /// Parses an exported type identifier, ignoring case.
    fn from_str(s: &str) -> Result<Self> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GraphError::UnknownNodeType(s.to_string()))
    }
}

/// Category of a node type, used for palette grouping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Sound sources (oscillators, noise).
    Source,
    /// Frequency-shaping nodes.
    Filter,
    /// Modulation sources (envelopes, LFOs).
    Modulation,
    /// Audio effects (delay, reverb, distortion).
    Effect,
    /// Utility nodes (gain, mixer, panner).
    Utility,
    /// The output sink.
    Output,
}

impl NodeCategory {
    /// Categories in palette display order.
    pub const DISPLAY_ORDER: [NodeCategory; 6] = [
        NodeCategory::Source,
        NodeCategory::Filter,
        NodeCategory::Modulation,
        NodeCategory::Effect,
        NodeCategory::Utility,
        NodeCategory::Output,
    ];

    /// Returns a human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            NodeCategory::Source => "Source",
            NodeCategory::Filter => "Filter",
            NodeCategory::Modulation => "Modulation",
            NodeCategory::Effect => "Effect",
            NodeCategory::Utility => "Utility",
            NodeCategory::Output => "Output",
        }
    }
}

/// Static definition of a node type.
#[derive(Clone, Debug)]
pub struct NodeTemplate {
    pub node_type: NodeType,
    /// Default display name for new nodes.
    pub name: &'static str,
    pub category: NodeCategory,
    pub description: &'static str,
    /// Backend unit that realizes this node.
    pub unit_kind: UnitKind,
    pub parameters: Vec<ParameterDefinition>,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl NodeTemplate {
    /// Looks up a parameter definition by id.
    pub fn parameter(&self, id: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Looks up an input port definition by id.
    pub fn input(&self, id: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.id == id)
    }

    /// Looks up an output port definition by id.
    pub fn output(&self, id: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

const WAVEFORMS: &[&str] = &["sine", "square", "sawtooth", "triangle"];
const NOISE_COLORS: &[&str] = &["white", "pink", "brown"];
const FILTER_TYPES: &[&str] = &["lowpass", "highpass", "bandpass", "notch"];
const OVERSAMPLING: &[&str] = &["none", "2x", "4x"];

/// Catalog of node templates, keyed by type.
pub struct NodeTemplateRegistry {
    templates: HashMap<NodeType, NodeTemplate>,
}

impl NodeTemplateRegistry {
    /// Creates a registry holding only the given templates.
    pub fn with_templates(templates: impl IntoIterator<Item = NodeTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.node_type, t)).collect(),
        }
    }

    /// Creates the registry with every built-in node type.
    pub fn builtin() -> Self {
        Self::with_templates(NodeType::ALL.into_iter().map(builtin_template))
    }

    /// Returns the template for a node type.
    pub fn get_template(&self, node_type: NodeType) -> Result<&NodeTemplate> {
        self.templates
            .get(&node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))
    }

    /// Parses an untyped identifier and returns its registered template.
    pub fn parse_type(&self, name: &str) -> Result<&NodeTemplate> {
        let node_type: NodeType = name.parse()?;
        self.get_template(node_type)
            .map_err(|_| GraphError::UnknownNodeType(name.to_string()))
    }

    /// Returns the templates of one category in palette order.
    pub fn templates_by_category(&self, category: NodeCategory) -> Vec<&NodeTemplate> {
        NodeType::ALL
            .iter()
            .filter_map(|t| self.templates.get(t))
            .filter(|t| t.category == category)
            .collect()
    }

    /// Returns all templates grouped by category.
    ///
    /// Only includes categories that have at least one template.
    pub fn by_category(&self) -> Vec<(NodeCategory, Vec<&NodeTemplate>)> {
        NodeCategory::DISPLAY_ORDER
            .into_iter()
            .map(|cat| (cat, self.templates_by_category(cat)))
            .filter(|(_, templates)| !templates.is_empty())
            .collect()
    }

    /// Returns the number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if no templates are registered.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Checks if a node type is registered.
    pub fn contains(&self, node_type: NodeType) -> bool {
        self.templates.contains_key(&node_type)
    }
}

impl Default for NodeTemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Builds the built-in template for a node type.
pub fn builtin_template(node_type: NodeType) -> NodeTemplate {
    use ParameterCategory as Cat;
    use ParameterDefinition as P;
    use PortDefinition as Port;

    let (name, category, description, unit_kind, parameters, inputs, outputs) = match node_type {
        NodeType::Oscillator => (
            "Oscillator",
            NodeCategory::Source,
            "Periodic waveform generator",
            UnitKind::Oscillator,
            vec![
                P::automatable("frequency", "Frequency", Cat::Frequency, (20.0, 20000.0), 440.0, "frequency"),
                P::automatable("detune", "Detune", Cat::Detune, (-1200.0, 1200.0), 0.0, "detune"),
                P::choice("waveform", "Waveform", WAVEFORMS, 0, "type"),
            ],
            vec![
                Port::control_input("frequency", "Frequency", "frequency"),
                Port::control_input("detune", "Detune", "detune"),
            ],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Noise => (
            "Noise",
            NodeCategory::Source,
            "Noise generator",
            UnitKind::Noise,
            vec![P::choice("color", "Color", NOISE_COLORS, 0, "color")],
            vec![],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Filter => (
            "Filter",
            NodeCategory::Filter,
            "Biquad filter with selectable response",
            UnitKind::BiquadFilter,
            vec![
                P::choice("type", "Type", FILTER_TYPES, 0, "type"),
                P::automatable("frequency", "Cutoff", Cat::Frequency, (20.0, 20000.0), 1000.0, "frequency"),
                P::automatable("q", "Resonance", Cat::Q, (0.0001, 30.0), 1.0, "Q"),
                P::automatable("gain", "Gain", Cat::Gain, (-40.0, 40.0), 0.0, "gain"),
            ],
            vec![
                Port::audio_input("in", "Input", 0),
                Port::control_input("frequency", "Cutoff", "frequency"),
            ],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Gain => (
            "Gain",
            NodeCategory::Utility,
            "Amplifier",
            UnitKind::Gain,
            vec![P::automatable("gain", "Gain", Cat::Gain, (0.0, 2.0), 1.0, "gain")],
            vec![
                Port::audio_input("in", "Input", 0),
                Port::control_input("gain", "Gain", "gain"),
            ],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Delay => (
            "Delay",
            NodeCategory::Effect,
            "Delay line with feedback",
            UnitKind::Delay,
            vec![
                P::automatable("time", "Time", Cat::Time, (0.0, 5.0), 0.3, "delayTime"),
                P::automatable("feedback", "Feedback", Cat::Mix, (0.0, 0.95), 0.4, "feedback"),
                P::automatable("mix", "Mix", Cat::Mix, (0.0, 1.0), 0.5, "mix"),
            ],
            vec![
                Port::audio_input("in", "Input", 0),
                Port::control_input("time", "Time", "delayTime"),
            ],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Reverb => (
            "Reverb",
            NodeCategory::Effect,
            "Convolution reverb",
            UnitKind::Convolver,
            vec![
                P::property("decay", "Decay", Cat::Time, (0.1, 10.0), 2.0, "decay"),
                P::automatable("mix", "Mix", Cat::Mix, (0.0, 1.0), 0.3, "mix"),
            ],
            vec![Port::audio_input("in", "Input", 0)],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Distortion => (
            "Distortion",
            NodeCategory::Effect,
            "Waveshaping distortion",
            UnitKind::WaveShaper,
            vec![
                P::curve("amount", "Amount", (0.0, 100.0), 20.0),
                P::choice("oversample", "Oversample", OVERSAMPLING, 2, "oversample")
                    .with_category(Cat::Amount),
            ],
            vec![Port::audio_input("in", "Input", 0)],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Compressor => (
            "Compressor",
            NodeCategory::Effect,
            "Dynamics compressor",
            UnitKind::Compressor,
            vec![
                P::automatable("threshold", "Threshold", Cat::Threshold, (-100.0, 0.0), -24.0, "threshold"),
                P::automatable("ratio", "Ratio", Cat::Ratio, (1.0, 20.0), 4.0, "ratio"),
                P::automatable("attack", "Attack", Cat::Time, (0.0, 1.0), 0.003, "attack"),
                P::automatable("release", "Release", Cat::Time, (0.0, 1.0), 0.25, "release"),
                P::automatable("knee", "Knee", Cat::Amount, (0.0, 40.0), 30.0, "knee"),
            ],
            vec![Port::audio_input("in", "Input", 0)],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Panner => (
            "Panner",
            NodeCategory::Utility,
            "Stereo panner",
            UnitKind::StereoPanner,
            vec![P::automatable("pan", "Pan", Cat::Pan, (-1.0, 1.0), 0.0, "pan")],
            vec![
                Port::audio_input("in", "Input", 0),
                Port::control_input("pan", "Pan", "pan"),
            ],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Lfo => (
            "LFO",
            NodeCategory::Modulation,
            "Low frequency oscillator for modulation",
            UnitKind::Lfo,
            vec![
                P::automatable("rate", "Rate", Cat::Rate, (0.01, 20.0), 2.0, "frequency"),
                P::automatable("depth", "Depth", Cat::Depth, (0.0, 1000.0), 100.0, "depth"),
                P::choice("waveform", "Waveform", WAVEFORMS, 0, "type"),
            ],
            vec![Port::control_input("rate", "Rate", "frequency")],
            vec![Port::control_output("out", "Output", 0)],
        ),
        NodeType::Envelope => (
            "ADSR Envelope",
            NodeCategory::Modulation,
            "Attack-decay-sustain-release envelope generator",
            UnitKind::Envelope,
            vec![
                P::property("attack", "Attack", Cat::Time, (0.001, 5.0), 0.01, "attack"),
                P::property("decay", "Decay", Cat::Time, (0.001, 5.0), 0.1, "decay"),
                P::property("sustain", "Sustain", Cat::Gain, (0.0, 1.0), 0.7, "sustain"),
                P::property("release", "Release", Cat::Time, (0.001, 10.0), 0.3, "release"),
            ],
            vec![Port::control_trigger("gate", "Gate", 0)],
            vec![Port::control_output("out", "Output", 0)],
        ),
        NodeType::Mixer => (
            "Mixer",
            NodeCategory::Utility,
            "Sums four inputs",
            UnitKind::Gain,
            vec![P::automatable("level", "Level", Cat::Gain, (0.0, 2.0), 1.0, "gain")],
            vec![
                Port::audio_input("in1", "Input 1", 0),
                Port::audio_input("in2", "Input 2", 0),
                Port::audio_input("in3", "Input 3", 0),
                Port::audio_input("in4", "Input 4", 0),
            ],
            vec![Port::audio_output("out", "Output", 0)],
        ),
        NodeType::Output => (
            "Output",
            NodeCategory::Output,
            "Master output to the audio device",
            UnitKind::Gain,
            vec![P::automatable("volume", "Volume", Cat::Gain, (0.0, 1.0), 0.8, "gain")],
            vec![Port::audio_input("in", "Input", 0)],
            vec![],
        ),
    };

    NodeTemplate {
        node_type,
        name,
        category,
        description,
        unit_kind,
        parameters,
        inputs,
        outputs,
    }
}
