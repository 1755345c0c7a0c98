//! The seam between the graph engine and the host audio backend.
//!
//! The backend owns the native processing units and the real-time render
//! thread. The engine only creates and destroys units, wires them together
//! and writes their controls; it never touches samples.

use std::fmt;

use thiserror::Error;

/// Opaque handle to a backend processing unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitHandle(pub u64);

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit{}", self.0)
    }
}

/// The native processing primitives a node can be realized with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Oscillator,
    Noise,
    BiquadFilter,
    Gain,
    Delay,
    Convolver,
    WaveShaper,
    Compressor,
    StereoPanner,
    Lfo,
    Envelope,
}

impl UnitKind {
    /// Returns true for units that produce signal and must be started.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            UnitKind::Oscillator | UnitKind::Noise | UnitKind::Lfo
        )
    }

    /// Returns a human-readable name for the unit kind.
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::Oscillator => "oscillator",
            UnitKind::Noise => "noise",
            UnitKind::BiquadFilter => "biquad",
            UnitKind::Gain => "gain",
            UnitKind::Delay => "delay",
            UnitKind::Convolver => "convolver",
            UnitKind::WaveShaper => "waveshaper",
            UnitKind::Compressor => "compressor",
            UnitKind::StereoPanner => "panner",
            UnitKind::Lfo => "lfo",
            UnitKind::Envelope => "envelope",
        }
    }
}

/// Where a wire lands on its destination unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WireTarget {
    /// Numbered signal input.
    Input(usize),
    /// Modulation of a named automatable parameter.
    Param(&'static str),
}

/// A backend connection from one unit output to a unit input or parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wire {
    pub from: UnitHandle,
    pub output: usize,
    pub to: UnitHandle,
    pub target: WireTarget,
}

impl Wire {
    /// Creates a wire into a numbered input.
    pub fn to_input(from: UnitHandle, output: usize, to: UnitHandle, input: usize) -> Self {
        Self {
            from,
            output,
            to,
            target: WireTarget::Input(input),
        }
    }

    /// Creates a wire modulating a parameter.
    pub fn to_param(from: UnitHandle, output: usize, to: UnitHandle, param: &'static str) -> Self {
        Self {
            from,
            output,
            to,
            target: WireTarget::Param(param),
        }
    }

    /// Returns true if either end is the given unit.
    pub fn touches(&self, unit: UnitHandle) -> bool {
        self.from == unit || self.to == unit
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            WireTarget::Input(i) => write!(f, "{}:{} -> {}:{}", self.from, self.output, self.to, i),
            WireTarget::Param(p) => write!(f, "{}:{} -> {}.{}", self.from, self.output, self.to, p),
        }
    }
}

/// Failures reported by a backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend is not running")]
    NotReady,

    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitHandle),

    #[error("Wire is not connected: {0}")]
    NotConnected(Wire),

    #[error("Unit {0} is already stopped")]
    AlreadyStopped(UnitHandle),

    #[error("Render command queue is full")]
    QueueFull,

    #[error("Backend refused the operation: {0}")]
    Refused(String),

    #[error("Backend is closed")]
    Closed,
}

/// Backend lifecycle as seen by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendStatus {
    /// Not yet initialized.
    Idle,
    Suspended,
    Running,
    /// Released; no further calls are accepted.
    Closed,
}

/// A host audio backend.
///
/// Implementations are driven from the single control thread. `initialize`
/// and `resume` return once the backend has confirmed the new state; every
/// other call is expected to return promptly while rendering continues.
pub trait AudioBackend {
    /// Opens the backend at the given rate and block size, suspended.
    fn initialize(&mut self, sample_rate: u32, buffer_size: usize) -> Result<(), BackendError>;

    /// Starts rendering.
    fn resume(&mut self) -> Result<(), BackendError>;

    /// Pauses rendering, keeping every unit alive.
    fn suspend(&mut self) -> Result<(), BackendError>;

    /// Releases the backend; no further calls are accepted.
    fn close(&mut self) -> Result<(), BackendError>;

    fn status(&self) -> BackendStatus;

    /// Backend clock in seconds, used to timestamp scheduled writes.
    fn current_time(&self) -> f64;

    /// The final sink that the output node feeds.
    fn destination(&self) -> UnitHandle;

    fn create_unit(&mut self, kind: UnitKind) -> Result<UnitHandle, BackendError>;

    /// Destroys a unit and every wire touching it.
    fn destroy_unit(&mut self, unit: UnitHandle) -> Result<(), BackendError>;

    fn connect(&mut self, wire: Wire) -> Result<(), BackendError>;

    /// Removes a wire. Fails with `NotConnected` if it does not exist.
    fn disconnect(&mut self, wire: Wire) -> Result<(), BackendError>;

    /// Moves a parameter toward `value` starting at time `at`, approaching
    /// exponentially with the given time constant in seconds.
    fn schedule_value(
        &mut self,
        unit: UnitHandle,
        param: &'static str,
        value: f32,
        at: f64,
        time_constant: f64,
    ) -> Result<(), BackendError>;

    /// Sets a discrete unit property such as a waveform.
    fn set_property(
        &mut self,
        unit: UnitHandle,
        property: &'static str,
        value: f32,
    ) -> Result<(), BackendError>;

    /// Replaces a unit's shaping curve.
    fn set_curve(&mut self, unit: UnitHandle, curve: &[f32]) -> Result<(), BackendError>;

    fn start_unit(&mut self, unit: UnitHandle, at: f64) -> Result<(), BackendError>;

    /// Stops a source unit. Fails with `AlreadyStopped` if it is not running.
    fn stop_unit(&mut self, unit: UnitHandle, at: f64) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kinds() {
        assert!(UnitKind::Oscillator.is_source());
        assert!(UnitKind::Lfo.is_source());
        assert!(!UnitKind::Gain.is_source());
        assert!(!UnitKind::Envelope.is_source());
    }

    #[test]
    fn test_wire_display() {
        let wire = Wire::to_param(UnitHandle(3), 0, UnitHandle(4), "frequency");
        assert_eq!(wire.to_string(), "unit3:0 -> unit4.frequency");
        assert!(wire.touches(UnitHandle(4)));
        assert!(!wire.touches(UnitHandle(5)));
    }

    #[test]
    fn test_wires_order_by_endpoints() {
        let a = Wire::to_input(UnitHandle(1), 0, UnitHandle(2), 0);
        let b = Wire::to_input(UnitHandle(1), 0, UnitHandle(3), 0);
        assert!(a < b);
    }
}
