//! Backend Commands and Events
//!
//! Defines the messages that flow between the control thread and the render
//! side of the headless backend. All types here are Send + 'static.

use super::backend::{UnitHandle, UnitKind, Wire};

/// Commands sent from the control thread to the render side.
/// These are applied at the start of the next render block.
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Configure the render side before the first block.
    Open {
        sample_rate: u32,
        buffer_size: usize,
    },

    /// Create a unit under a handle chosen by the control side.
    CreateUnit {
        unit: UnitHandle,
        kind: UnitKind,
    },

    /// Destroy a unit and every wire touching it.
    DestroyUnit {
        unit: UnitHandle,
    },

    /// Add a wire.
    Connect(Wire),

    /// Remove a wire.
    Disconnect(Wire),

    /// Approach a new parameter value once the render clock reaches `at`.
    ScheduleValue {
        unit: UnitHandle,
        param: &'static str,
        value: f32,
        /// Start time in seconds on the render clock.
        at: f64,
        /// Exponential time constant in seconds.
        time_constant: f64,
    },

    /// Set a discrete property immediately.
    SetProperty {
        unit: UnitHandle,
        property: &'static str,
        value: f32,
    },

    /// Replace a shaping curve.
    SetCurve {
        unit: UnitHandle,
        curve: Vec<f32>,
    },

    /// Start a source unit.
    StartUnit {
        unit: UnitHandle,
        at: f64,
    },

    /// Stop a source unit.
    StopUnit {
        unit: UnitHandle,
        at: f64,
    },

    /// Start or stop rendering.
    SetRunning(bool),

    /// Release everything; the render side ignores later commands.
    Close,
}

/// Events sent from the render side back to the control thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderEvent {
    /// Rendering started.
    Started,

    /// Rendering stopped.
    Stopped,

    /// The render side released its units.
    Closed,

    /// A scheduled value became active.
    ValueApplied {
        unit: UnitHandle,
        param: &'static str,
        value: f32,
    },

    /// A command referenced a unit the render side does not know.
    UnknownUnit(UnitHandle),
}
