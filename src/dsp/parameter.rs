//! Parameter definitions for graph nodes.
//!
//! Parameters are the controllable values on nodes (knobs, sliders, switches).
//! A [`ParameterDefinition`] lives in a node template; a [`Parameter`] is the
//! per-node value stored in the graph model.

use serde::{Deserialize, Serialize};

/// What a parameter controls, used for grouping and display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterCategory {
    Frequency,
    Detune,
    Gain,
    Q,
    Time,
    Ratio,
    Mix,
    Threshold,
    Pan,
    Amount,
    Waveform,
    Rate,
    Depth,
}

/// How a parameter reaches the backend unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamBinding {
    /// Automatable unit parameter, written with a scheduled ramp.
    AudioParam(&'static str),
    /// Discrete unit property (filter type, waveform), written directly.
    Property(&'static str),
    /// Regenerates the unit's shaping curve from the value.
    Curve,
}

/// Definition of a parameter on a node template.
#[derive(Clone, Debug)]
pub struct ParameterDefinition {
    /// Unique identifier for this parameter within the node.
    pub id: &'static str,
    /// Human-readable name displayed in the UI.
    pub name: &'static str,
    /// What the parameter controls.
    pub category: ParameterCategory,
    /// Minimum value of the parameter.
    pub min: f32,
    /// Maximum value of the parameter.
    pub max: f32,
    /// Default value when the node is created.
    pub default: f32,
    /// Labels for discrete choices, indexed by value.
    pub labels: &'static [&'static str],
    /// Backend dispatch target.
    pub binding: ParamBinding,
}

impl ParameterDefinition {
    /// Creates an automatable parameter bound to a backend unit parameter.
    pub fn automatable(
        id: &'static str,
        name: &'static str,
        category: ParameterCategory,
        range: (f32, f32),
        default: f32,
        param: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            category,
            min: range.0,
            max: range.1,
            default,
            labels: &[],
            binding: ParamBinding::AudioParam(param),
        }
    }

    /// Creates a continuous parameter written as a plain unit property.
    pub fn property(
        id: &'static str,
        name: &'static str,
        category: ParameterCategory,
        range: (f32, f32),
        default: f32,
        property: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            category,
            min: range.0,
            max: range.1,
            default,
            labels: &[],
            binding: ParamBinding::Property(property),
        }
    }

    /// Creates a discrete choice parameter written as a unit property.
    pub fn choice(
        id: &'static str,
        name: &'static str,
        labels: &'static [&'static str],
        default_index: usize,
        property: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            category: ParameterCategory::Waveform,
            min: 0.0,
            max: (labels.len().saturating_sub(1)) as f32,
            default: default_index as f32,
            labels,
            binding: ParamBinding::Property(property),
        }
    }

    /// Creates a parameter that drives a shaping curve.
    pub fn curve(id: &'static str, name: &'static str, range: (f32, f32), default: f32) -> Self {
        Self {
            id,
            name,
            category: ParameterCategory::Amount,
            min: range.0,
            max: range.1,
            default,
            labels: &[],
            binding: ParamBinding::Curve,
        }
    }

    /// Overrides the category (choices default to `Waveform`).
    pub fn with_category(mut self, category: ParameterCategory) -> Self {
        self.category = category;
        self
    }

    /// Returns true if the backend can ramp this parameter over time.
    pub fn is_automatable(&self) -> bool {
        matches!(self.binding, ParamBinding::AudioParam(_))
    }

    /// Clamps a value to this parameter's valid range.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Returns the label for a discrete value, if this is a choice.
    pub fn label(&self, value: f32) -> Option<&'static str> {
        self.labels.get(value.round().max(0.0) as usize).copied()
    }

    /// Creates the per-node parameter holding the default value.
    pub fn instantiate(&self) -> Parameter {
        Parameter {
            id: self.id.to_string(),
            name: self.name.to_string(),
            category: self.category,
            value: self.default,
            min: self.min,
            max: self.max,
            default: self.default,
            automatable: self.is_automatable(),
            discrete: !self.labels.is_empty(),
        }
    }
}

/// A parameter value on a node in the graph model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: String,
    pub name: String,
    pub category: ParameterCategory,
    /// Current value, always within `[min, max]`.
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub automatable: bool,
    /// Only whole values are meaningful (choice index).
    #[serde(default)]
    pub discrete: bool,
}

impl Parameter {
    /// Clamps a value to this parameter's inclusive range.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Clamps a value and, for discrete parameters, rounds it to the
    /// nearest choice.
    pub fn constrain(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        if self.discrete {
            value.round()
        } else {
            value
        }
    }

    /// Returns true if the value is still the default.
    pub fn is_default(&self) -> bool {
        (self.value - self.default).abs() < f32::EPSILON
    }
}
