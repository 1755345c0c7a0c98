//! Headless reference backend.
//!
//! `HeadlessBackend` implements [`AudioBackend`] without an audio device. It
//! keeps a control-side mirror of every unit and wire, so tests and the CLI
//! can inspect exactly what the engine asked for, and it can forward every
//! call over an rtrb ring to a [`RenderHandle`] that plays the role of the
//! real-time render thread.
//!
//! Individual operations can be made to fail on demand to exercise the
//! engine's divergence handling.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::backend::{
    AudioBackend, BackendError, BackendStatus, UnitHandle, UnitKind, Wire,
};
use super::channels::{BackendChannels, ControlHandle, RenderEndpoint};
use super::commands::{BackendCommand, RenderEvent};

/// Difference below which a ramping value snaps to its target.
const SETTLE_EPSILON: f32 = 1e-4;

/// Handle of the implicit destination unit.
const DESTINATION: UnitHandle = UnitHandle(0);

/// Backend operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateUnit,
    DestroyUnit,
    Connect,
    Disconnect,
    ScheduleValue,
    SetProperty,
    SetCurve,
    StartUnit,
    StopUnit,
    Resume,
}

/// Control-side record of a unit.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitMirror {
    pub kind: UnitKind,
    /// Whether the unit has been started and not stopped.
    pub running: bool,
    /// Last scheduled target per parameter.
    pub params: HashMap<&'static str, f32>,
    pub properties: HashMap<&'static str, f32>,
    pub curve: Vec<f32>,
}

impl UnitMirror {
    fn new(kind: UnitKind) -> Self {
        Self {
            kind,
            running: false,
            params: HashMap::new(),
            properties: HashMap::new(),
            curve: Vec::new(),
        }
    }
}

/// Frames rendered so far, shared between the backend and its render side.
#[derive(Clone, Debug, Default)]
struct RenderClock(Arc<AtomicU64>);

impl RenderClock {
    fn frames(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn advance(&self, frames: u64) {
        self.0.fetch_add(frames, Ordering::AcqRel);
    }
}

/// An [`AudioBackend`] with no audio device behind it.
pub struct HeadlessBackend {
    status: BackendStatus,
    sample_rate: u32,
    buffer_size: usize,
    next_unit: u64,
    units: HashMap<UnitHandle, UnitMirror>,
    wires: BTreeSet<Wire>,
    clock: RenderClock,
    link: Option<ControlHandle>,
    faults: HashSet<Fault>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Creates a backend with no render side.
    pub fn new() -> Self {
        Self {
            status: BackendStatus::Idle,
            sample_rate: 44100,
            buffer_size: 512,
            next_unit: 1,
            units: HashMap::new(),
            wires: BTreeSet::new(),
            clock: RenderClock::default(),
            link: None,
            faults: HashSet::new(),
        }
    }

    /// Creates a backend forwarding every call to a render handle.
    ///
    /// The handle can be moved to another thread.
    pub fn with_render(channels: BackendChannels) -> (Self, RenderHandle) {
        let (control, endpoint) = channels.split();
        let mut backend = Self::new();
        backend.link = Some(control);
        let render = RenderHandle::new(endpoint, backend.clock.clone());
        (backend, render)
    }

    /// Makes an operation fail until cleared.
    pub fn inject_fault(&mut self, fault: Fault) {
        self.faults.insert(fault);
    }

    /// Makes an operation succeed again.
    pub fn clear_fault(&mut self, fault: Fault) {
        self.faults.remove(&fault);
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Advances the clock without a render side.
    pub fn advance(&mut self, seconds: f64) {
        let frames = (seconds * f64::from(self.sample_rate)).round().max(0.0) as u64;
        self.clock.advance(frames);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the mirror of a unit.
    pub fn unit(&self, unit: UnitHandle) -> Option<&UnitMirror> {
        self.units.get(&unit)
    }

    /// Number of live units, the destination excluded.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Returns the active wire set.
    pub fn wires(&self) -> &BTreeSet<Wire> {
        &self.wires
    }

    pub fn is_wired(&self, wire: &Wire) -> bool {
        self.wires.contains(wire)
    }

    /// Drains events reported by the render side.
    pub fn drain_events(&mut self) -> Vec<RenderEvent> {
        match self.link.as_mut() {
            Some(link) => link.drain_events().collect(),
            None => Vec::new(),
        }
    }

    fn check(&self, fault: Fault) -> Result<(), BackendError> {
        match self.status {
            BackendStatus::Idle => return Err(BackendError::NotReady),
            BackendStatus::Closed => return Err(BackendError::Closed),
            BackendStatus::Suspended | BackendStatus::Running => {}
        }
        if self.faults.contains(&fault) {
            return Err(BackendError::Refused(format!("{fault:?} rejected")));
        }
        Ok(())
    }

    fn check_unit(&self, unit: UnitHandle) -> Result<(), BackendError> {
        if unit == DESTINATION || self.units.contains_key(&unit) {
            Ok(())
        } else {
            Err(BackendError::UnknownUnit(unit))
        }
    }

    fn mirror_mut(&mut self, unit: UnitHandle) -> Result<&mut UnitMirror, BackendError> {
        self.units
            .get_mut(&unit)
            .ok_or(BackendError::UnknownUnit(unit))
    }

    /// Forwards a command to the render side, if there is one.
    fn forward(&mut self, command: BackendCommand) -> Result<(), BackendError> {
        match self.link.as_mut() {
            Some(link) => link
                .send_command(command)
                .map_err(|_| BackendError::QueueFull),
            None => Ok(()),
        }
    }
}

impl AudioBackend for HeadlessBackend {
    fn initialize(&mut self, sample_rate: u32, buffer_size: usize) -> Result<(), BackendError> {
        match self.status {
            BackendStatus::Closed => return Err(BackendError::Closed),
            BackendStatus::Idle => {}
            BackendStatus::Suspended | BackendStatus::Running => return Ok(()),
        }
        self.forward(BackendCommand::Open {
            sample_rate,
            buffer_size,
        })?;
        self.sample_rate = sample_rate;
        self.buffer_size = buffer_size;
        self.status = BackendStatus::Suspended;
        tracing::debug!("headless backend opened at {} Hz, {} frames", sample_rate, buffer_size);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), BackendError> {
        self.check(Fault::Resume)?;
        if self.status == BackendStatus::Running {
            return Ok(());
        }
        self.forward(BackendCommand::SetRunning(true))?;
        self.status = BackendStatus::Running;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), BackendError> {
        match self.status {
            BackendStatus::Idle => return Err(BackendError::NotReady),
            BackendStatus::Closed => return Err(BackendError::Closed),
            BackendStatus::Suspended => return Ok(()),
            BackendStatus::Running => {}
        }
        self.forward(BackendCommand::SetRunning(false))?;
        self.status = BackendStatus::Suspended;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if self.status == BackendStatus::Closed {
            return Ok(());
        }
        // Best effort; a full queue must not keep the backend open.
        if self.forward(BackendCommand::Close).is_err() {
            tracing::warn!("render queue full while closing headless backend");
        }
        self.units.clear();
        self.wires.clear();
        self.status = BackendStatus::Closed;
        Ok(())
    }

    fn status(&self) -> BackendStatus {
        self.status
    }

    fn current_time(&self) -> f64 {
        self.clock.frames() as f64 / f64::from(self.sample_rate)
    }

    fn destination(&self) -> UnitHandle {
        DESTINATION
    }

    fn create_unit(&mut self, kind: UnitKind) -> Result<UnitHandle, BackendError> {
        self.check(Fault::CreateUnit)?;
        let unit = UnitHandle(self.next_unit);
        self.forward(BackendCommand::CreateUnit { unit, kind })?;
        self.next_unit += 1;
        self.units.insert(unit, UnitMirror::new(kind));
        Ok(unit)
    }

    fn destroy_unit(&mut self, unit: UnitHandle) -> Result<(), BackendError> {
        self.check(Fault::DestroyUnit)?;
        if !self.units.contains_key(&unit) {
            return Err(BackendError::UnknownUnit(unit));
        }
        self.forward(BackendCommand::DestroyUnit { unit })?;
        self.units.remove(&unit);
        self.wires.retain(|w| !w.touches(unit));
        Ok(())
    }

    fn connect(&mut self, wire: Wire) -> Result<(), BackendError> {
        self.check(Fault::Connect)?;
        self.check_unit(wire.from)?;
        self.check_unit(wire.to)?;
        if self.wires.contains(&wire) {
            return Ok(());
        }
        self.forward(BackendCommand::Connect(wire))?;
        self.wires.insert(wire);
        Ok(())
    }

    fn disconnect(&mut self, wire: Wire) -> Result<(), BackendError> {
        self.check(Fault::Disconnect)?;
        if !self.wires.contains(&wire) {
            return Err(BackendError::NotConnected(wire));
        }
        self.forward(BackendCommand::Disconnect(wire))?;
        self.wires.remove(&wire);
        Ok(())
    }

    fn schedule_value(
        &mut self,
        unit: UnitHandle,
        param: &'static str,
        value: f32,
        at: f64,
        time_constant: f64,
    ) -> Result<(), BackendError> {
        self.check(Fault::ScheduleValue)?;
        self.mirror_mut(unit)?;
        self.forward(BackendCommand::ScheduleValue {
            unit,
            param,
            value,
            at,
            time_constant,
        })?;
        self.mirror_mut(unit)?.params.insert(param, value);
        Ok(())
    }

    fn set_property(
        &mut self,
        unit: UnitHandle,
        property: &'static str,
        value: f32,
    ) -> Result<(), BackendError> {
        self.check(Fault::SetProperty)?;
        self.mirror_mut(unit)?;
        self.forward(BackendCommand::SetProperty {
            unit,
            property,
            value,
        })?;
        self.mirror_mut(unit)?.properties.insert(property, value);
        Ok(())
    }

    fn set_curve(&mut self, unit: UnitHandle, curve: &[f32]) -> Result<(), BackendError> {
        self.check(Fault::SetCurve)?;
        self.mirror_mut(unit)?;
        self.forward(BackendCommand::SetCurve {
            unit,
            curve: curve.to_vec(),
        })?;
        let mirror = self.mirror_mut(unit)?;
        mirror.curve.clear();
        mirror.curve.extend_from_slice(curve);
        Ok(())
    }

    fn start_unit(&mut self, unit: UnitHandle, at: f64) -> Result<(), BackendError> {
        self.check(Fault::StartUnit)?;
        self.mirror_mut(unit)?;
        self.forward(BackendCommand::StartUnit { unit, at })?;
        self.mirror_mut(unit)?.running = true;
        Ok(())
    }

    fn stop_unit(&mut self, unit: UnitHandle, at: f64) -> Result<(), BackendError> {
        self.check(Fault::StopUnit)?;
        if !self.mirror_mut(unit)?.running {
            return Err(BackendError::AlreadyStopped(unit));
        }
        self.forward(BackendCommand::StopUnit { unit, at })?;
        self.mirror_mut(unit)?.running = false;
        Ok(())
    }
}

/// A parameter as seen by the render side.
#[derive(Clone, Copy, Debug)]
struct RenderParam {
    current: f32,
    target: f32,
    time_constant: f64,
}

impl RenderParam {
    fn at(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            time_constant: 0.0,
        }
    }

    /// Advances the exponential approach by `dt` seconds.
    fn step(&mut self, dt: f64) {
        if self.current == self.target {
            return;
        }
        if self.time_constant <= 0.0 {
            self.current = self.target;
            return;
        }
        let decay = (-dt / self.time_constant).exp() as f32;
        self.current = self.target + (self.current - self.target) * decay;
        if (self.current - self.target).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
    }
}

#[derive(Clone, Debug)]
struct RenderUnit {
    kind: UnitKind,
    running: bool,
    params: HashMap<&'static str, RenderParam>,
    properties: HashMap<&'static str, f32>,
    curve: Vec<f32>,
}

#[derive(Clone, Copy, Debug)]
struct PendingValue {
    unit: UnitHandle,
    param: &'static str,
    value: f32,
    at: f64,
    time_constant: f64,
}

/// The render side of a [`HeadlessBackend`].
///
/// Each call to [`render`](Self::render) applies queued commands, advances
/// the shared clock by one block when running and moves every parameter
/// toward its scheduled target.
pub struct RenderHandle {
    endpoint: RenderEndpoint,
    clock: RenderClock,
    sample_rate: f64,
    running: bool,
    closed: bool,
    units: HashMap<UnitHandle, RenderUnit>,
    wires: BTreeSet<Wire>,
    pending: Vec<PendingValue>,
}

impl RenderHandle {
    fn new(endpoint: RenderEndpoint, clock: RenderClock) -> Self {
        Self {
            endpoint,
            clock,
            sample_rate: 44100.0,
            running: false,
            closed: false,
            units: HashMap::new(),
            wires: BTreeSet::new(),
            pending: Vec::new(),
        }
    }

    /// Render clock in seconds.
    pub fn time(&self) -> f64 {
        self.clock.frames() as f64 / self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    pub fn is_wired(&self, wire: &Wire) -> bool {
        self.wires.contains(wire)
    }

    /// Returns true if the unit exists and is started.
    pub fn is_unit_running(&self, unit: UnitHandle) -> bool {
        self.units.get(&unit).is_some_and(|u| u.running)
    }

    /// Current (possibly ramping) value of a unit parameter.
    pub fn param_value(&self, unit: UnitHandle, param: &str) -> Option<f32> {
        self.units
            .get(&unit)?
            .params
            .get(param)
            .map(|p| p.current)
    }

    pub fn property(&self, unit: UnitHandle, property: &str) -> Option<f32> {
        self.units.get(&unit)?.properties.get(property).copied()
    }

    pub fn curve_len(&self, unit: UnitHandle) -> Option<usize> {
        self.units.get(&unit).map(|u| u.curve.len())
    }

    pub fn unit_kind(&self, unit: UnitHandle) -> Option<UnitKind> {
        self.units.get(&unit).map(|u| u.kind)
    }

    /// Renders one block of `frames` frames.
    pub fn render(&mut self, frames: usize) {
        let mut commands = Vec::with_capacity(self.endpoint.commands_pending());
        self.endpoint.process_commands(|cmd| commands.push(cmd));
        for command in commands {
            self.apply(command);
        }

        if !self.running || self.closed {
            return;
        }

        self.clock.advance(frames as u64);
        let now = self.time();
        let dt = frames as f64 / self.sample_rate;

        let mut index = 0;
        while index < self.pending.len() {
            if self.pending[index].at > now {
                index += 1;
                continue;
            }
            let due = self.pending.swap_remove(index);
            if let Some(unit) = self.units.get_mut(&due.unit) {
                let param = unit
                    .params
                    .entry(due.param)
                    .or_insert_with(|| RenderParam::at(due.value));
                param.target = due.value;
                param.time_constant = due.time_constant;
                self.endpoint.send_event_lossy(RenderEvent::ValueApplied {
                    unit: due.unit,
                    param: due.param,
                    value: due.value,
                });
            }
        }

        for unit in self.units.values_mut() {
            for param in unit.params.values_mut() {
                param.step(dt);
            }
        }
    }

    fn apply(&mut self, command: BackendCommand) {
        if self.closed {
            return;
        }
        match command {
            BackendCommand::Open { sample_rate, .. } => {
                self.sample_rate = f64::from(sample_rate);
            }
            BackendCommand::CreateUnit { unit, kind } => {
                self.units.insert(
                    unit,
                    RenderUnit {
                        kind,
                        running: false,
                        params: HashMap::new(),
                        properties: HashMap::new(),
                        curve: Vec::new(),
                    },
                );
            }
            BackendCommand::DestroyUnit { unit } => {
                self.units.remove(&unit);
                self.wires.retain(|w| !w.touches(unit));
                self.pending.retain(|p| p.unit != unit);
            }
            BackendCommand::Connect(wire) => {
                self.wires.insert(wire);
            }
            BackendCommand::Disconnect(wire) => {
                self.wires.remove(&wire);
            }
            BackendCommand::ScheduleValue {
                unit,
                param,
                value,
                at,
                time_constant,
            } => {
                let Some(render_unit) = self.units.get_mut(&unit) else {
                    self.endpoint.send_event_lossy(RenderEvent::UnknownUnit(unit));
                    return;
                };
                // The first write to a parameter sets it outright.
                if !render_unit.params.contains_key(param) {
                    render_unit.params.insert(param, RenderParam::at(value));
                    return;
                }
                self.pending.push(PendingValue {
                    unit,
                    param,
                    value,
                    at,
                    time_constant,
                });
            }
            BackendCommand::SetProperty {
                unit,
                property,
                value,
            } => match self.units.get_mut(&unit) {
                Some(u) => {
                    u.properties.insert(property, value);
                }
                None => self.endpoint.send_event_lossy(RenderEvent::UnknownUnit(unit)),
            },
            BackendCommand::SetCurve { unit, curve } => match self.units.get_mut(&unit) {
                Some(u) => u.curve = curve,
                None => self.endpoint.send_event_lossy(RenderEvent::UnknownUnit(unit)),
            },
            BackendCommand::StartUnit { unit, .. } => match self.units.get_mut(&unit) {
                Some(u) => u.running = true,
                None => self.endpoint.send_event_lossy(RenderEvent::UnknownUnit(unit)),
            },
            BackendCommand::StopUnit { unit, .. } => {
                if let Some(u) = self.units.get_mut(&unit) {
                    u.running = false;
                }
            }
            BackendCommand::SetRunning(running) => {
                if running != self.running {
                    self.running = running;
                    let event = if running {
                        RenderEvent::Started
                    } else {
                        RenderEvent::Stopped
                    };
                    self.endpoint.send_event_lossy(event);
                }
            }
            BackendCommand::Close => {
                self.units.clear();
                self.wires.clear();
                self.pending.clear();
                self.running = false;
                self.closed = true;
                self.endpoint.send_event_lossy(RenderEvent::Closed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ready() -> HeadlessBackend {
        let mut backend = HeadlessBackend::new();
        backend.initialize(48000, 256).unwrap();
        backend
    }

    fn linked() -> (HeadlessBackend, RenderHandle) {
        let (mut backend, mut render) = HeadlessBackend::with_render(BackendChannels::new(64, 64));
        backend.initialize(48000, 256).unwrap();
        backend.resume().unwrap();
        render.render(0);
        (backend, render)
    }

    #[test]
    fn test_calls_before_initialize_fail() {
        let mut backend = HeadlessBackend::new();
        assert_eq!(
            backend.create_unit(UnitKind::Gain).unwrap_err(),
            BackendError::NotReady
        );
    }

    #[test]
    fn test_lifecycle() {
        let mut backend = ready();
        assert_eq!(backend.status(), BackendStatus::Suspended);
        backend.resume().unwrap();
        assert_eq!(backend.status(), BackendStatus::Running);
        backend.suspend().unwrap();
        assert_eq!(backend.status(), BackendStatus::Suspended);
        backend.close().unwrap();
        assert_eq!(backend.status(), BackendStatus::Closed);
        assert_eq!(backend.resume().unwrap_err(), BackendError::Closed);
    }

    #[test]
    fn test_units_and_wires() {
        let mut backend = ready();
        let osc = backend.create_unit(UnitKind::Oscillator).unwrap();
        let gain = backend.create_unit(UnitKind::Gain).unwrap();
        let a = Wire::to_input(osc, 0, gain, 0);
        let b = Wire::to_input(gain, 0, backend.destination(), 0);
        backend.connect(a).unwrap();
        backend.connect(b).unwrap();
        assert_eq!(backend.wires().len(), 2);

        backend.destroy_unit(gain).unwrap();
        assert!(backend.wires().is_empty());
        assert_eq!(backend.unit_count(), 1);
        assert_eq!(backend.disconnect(a).unwrap_err(), BackendError::NotConnected(a));
    }

    #[test]
    fn test_connect_unknown_unit() {
        let mut backend = ready();
        let osc = backend.create_unit(UnitKind::Oscillator).unwrap();
        let wire = Wire::to_input(osc, 0, UnitHandle(42), 0);
        assert_eq!(
            backend.connect(wire).unwrap_err(),
            BackendError::UnknownUnit(UnitHandle(42))
        );
    }

    #[test]
    fn test_stop_twice() {
        let mut backend = ready();
        let osc = backend.create_unit(UnitKind::Oscillator).unwrap();
        backend.start_unit(osc, 0.0).unwrap();
        backend.stop_unit(osc, 0.0).unwrap();
        assert_eq!(
            backend.stop_unit(osc, 0.0).unwrap_err(),
            BackendError::AlreadyStopped(osc)
        );
    }

    #[test]
    fn test_injected_fault() {
        let mut backend = ready();
        let osc = backend.create_unit(UnitKind::Oscillator).unwrap();
        backend.inject_fault(Fault::Connect);
        let wire = Wire::to_input(osc, 0, backend.destination(), 0);
        assert!(matches!(backend.connect(wire), Err(BackendError::Refused(_))));
        assert!(backend.wires().is_empty());

        backend.clear_fault(Fault::Connect);
        backend.connect(wire).unwrap();
        assert!(backend.is_wired(&wire));
    }

    #[test]
    fn test_clock_advances() {
        let mut backend = ready();
        assert_eq!(backend.current_time(), 0.0);
        backend.advance(0.5);
        assert_relative_eq!(backend.current_time(), 0.5);
    }

    #[test]
    fn test_render_mirrors_topology() {
        let (mut backend, mut render) = linked();
        let osc = backend.create_unit(UnitKind::Oscillator).unwrap();
        backend.start_unit(osc, 0.0).unwrap();
        let wire = Wire::to_input(osc, 0, backend.destination(), 0);
        backend.connect(wire).unwrap();

        render.render(256);
        assert!(render.is_running());
        assert_eq!(render.unit_count(), 1);
        assert!(render.is_wired(&wire));
        assert!(render.is_unit_running(osc));
        assert_eq!(render.unit_kind(osc), Some(UnitKind::Oscillator));
        assert!(backend.drain_events().contains(&RenderEvent::Started));
    }

    #[test]
    fn test_scheduled_value_waits_for_timestamp() {
        let (mut backend, mut render) = linked();
        let osc = backend.create_unit(UnitKind::Oscillator).unwrap();
        backend.schedule_value(osc, "frequency", 440.0, 0.0, 0.01).unwrap();
        backend.schedule_value(osc, "frequency", 880.0, 0.5, 0.01).unwrap();

        // 0.25 s
        for _ in 0..47 {
            render.render(256);
        }
        assert_eq!(render.param_value(osc, "frequency"), Some(440.0));

        // past 0.5 s plus many time constants
        for _ in 0..200 {
            render.render(256);
        }
        assert!(render.time() > 0.5);
        assert_eq!(render.param_value(osc, "frequency"), Some(880.0));
    }

    #[test]
    fn test_scheduled_value_ramps() {
        let (mut backend, mut render) = linked();
        let gain = backend.create_unit(UnitKind::Gain).unwrap();
        backend.schedule_value(gain, "gain", 0.0, 0.0, 0.01).unwrap();
        render.render(256);

        let now = backend.current_time();
        backend.schedule_value(gain, "gain", 1.0, now, 0.01).unwrap();
        render.render(48);

        // One millisecond into a 10 ms approach.
        let value = render.param_value(gain, "gain").unwrap();
        assert!(value > 0.0 && value < 0.5, "value {value}");
    }

    #[test]
    fn test_paused_render_does_not_advance() {
        let (mut backend, mut render) = linked();
        backend.suspend().unwrap();
        render.render(256);
        render.render(256);
        assert_eq!(render.time(), 0.0);
        assert!(!render.is_running());
    }

    #[test]
    fn test_close_clears_render_side() {
        let (mut backend, mut render) = linked();
        backend.create_unit(UnitKind::Noise).unwrap();
        render.render(256);
        backend.close().unwrap();
        render.render(256);
        assert_eq!(render.unit_count(), 0);
        assert!(backend.drain_events().contains(&RenderEvent::Closed));
    }

    #[test]
    fn test_queue_full_is_reported() {
        let (mut backend, _render) = HeadlessBackend::with_render(BackendChannels::new(2, 1));
        backend.initialize(44100, 128).unwrap();
        backend.create_unit(UnitKind::Gain).unwrap();
        assert_eq!(
            backend.create_unit(UnitKind::Gain).unwrap_err(),
            BackendError::QueueFull
        );
        assert_eq!(backend.unit_count(), 1);
    }

    #[test]
    fn test_curve_and_property() {
        let (mut backend, mut render) = linked();
        let shaper = backend.create_unit(UnitKind::WaveShaper).unwrap();
        backend.set_curve(shaper, &[0.0; 16]).unwrap();
        backend.set_property(shaper, "oversample", 2.0).unwrap();
        render.render(256);
        assert_eq!(render.curve_len(shaper), Some(16));
        assert_eq!(render.property(shaper, "oversample"), Some(2.0));
        assert_eq!(backend.unit(shaper).unwrap().curve.len(), 16);
    }
}
