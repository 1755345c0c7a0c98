//! Binding between the graph model and backend units.
//!
//! The adapter owns the backend and mirrors the model onto it: one unit per
//! node, one wire per (bypass-resolved) connection. The model is always the
//! source of truth. A backend call that fails is logged, recorded as
//! divergence, and never rolls the model back; `reconcile` retries whatever
//! is still outstanding.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::dsp::{PortBinding, PortKind};
use crate::error::{GraphError, Result};
use crate::graph::{GraphModel, Node, NodeId, NodeTemplate, NodeTemplateRegistry, NodeType};

use super::backend::{AudioBackend, BackendError, UnitHandle, UnitKind, Wire, WireTarget};
use super::buffer_pool::BufferPool;
use super::parameters::{CapabilityMap, ControlContext, Dispatch, ParameterController};

/// A node's live backend unit.
#[derive(Debug)]
pub struct NodeInstance {
    pub node: NodeId,
    pub unit: UnitHandle,
    pub kind: UnitKind,
    /// Parameter id to backend setter.
    pub capabilities: CapabilityMap,
    /// Input port id to where wires into it land.
    inputs: HashMap<&'static str, WireTarget>,
    /// Output port id to unit output index.
    outputs: HashMap<&'static str, usize>,
}

impl NodeInstance {
    fn new(node: NodeId, unit: UnitHandle, template: &NodeTemplate) -> Self {
        let inputs = template
            .inputs
            .iter()
            .filter_map(|port| match port.binding {
                PortBinding::Input(index) => Some((port.id, WireTarget::Input(index))),
                PortBinding::Param(param) => Some((port.id, WireTarget::Param(param))),
                PortBinding::Output(_) => None,
            })
            .collect();
        let outputs = template
            .outputs
            .iter()
            .filter_map(|port| match port.binding {
                PortBinding::Output(index) => Some((port.id, index)),
                _ => None,
            })
            .collect();

        Self {
            node,
            unit,
            kind: template.unit_kind,
            capabilities: CapabilityMap::for_template(unit, template),
            inputs,
            outputs,
        }
    }
}

/// Identifier of a sounding voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

/// A transient oscillator cloned from an Oscillator node.
///
/// Its wiring mirrors the node's outgoing wires and follows them on every
/// sync.
#[derive(Clone, Debug)]
struct Voice {
    id: VoiceId,
    node: NodeId,
    unit: UnitHandle,
    /// Wires the backend is believed to have.
    active: BTreeSet<Wire>,
    /// Wires the node's current routing calls for.
    desired: BTreeSet<Wire>,
}

/// Where the backend differs from what the model asks for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendDivergence {
    /// Nodes whose unit could not be created.
    pub missing_units: Vec<NodeId>,
    /// Units that could not be destroyed.
    pub orphaned_units: Vec<UnitHandle>,
    /// Wires the model needs that the backend refused.
    pub missing_wires: Vec<Wire>,
    /// Wires the backend still has that the model no longer needs.
    pub stale_wires: Vec<Wire>,
    /// Parameter writes the backend refused, as (node, parameter id).
    pub failed_writes: Vec<(NodeId, String)>,
}

impl BackendDivergence {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of outstanding differences.
    pub fn len(&self) -> usize {
        self.missing_units.len()
            + self.orphaned_units.len()
            + self.missing_wires.len()
            + self.stale_wires.len()
            + self.failed_writes.len()
    }
}

/// Mirrors a [`GraphModel`] onto an [`AudioBackend`].
pub struct AudioBackendAdapter<B: AudioBackend> {
    backend: B,
    pool: BufferPool,
    /// Ramp time constant for scheduled writes, in seconds.
    time_constant: f64,
    instances: BTreeMap<NodeId, NodeInstance>,
    /// Wires the backend is believed to have.
    active: BTreeSet<Wire>,
    /// Wires the model asked for at the last sync.
    desired: BTreeSet<Wire>,
    missing_units: BTreeSet<NodeId>,
    orphans: BTreeSet<UnitHandle>,
    failed_writes: BTreeSet<(NodeId, String)>,
    voices: Vec<Voice>,
    next_voice: u64,
}

impl<B: AudioBackend> AudioBackendAdapter<B> {
    /// Creates an adapter around a backend.
    pub fn new(backend: B, pool: BufferPool, time_constant: f64) -> Self {
        Self {
            backend,
            pool,
            time_constant,
            instances: BTreeMap::new(),
            active: BTreeSet::new(),
            desired: BTreeSet::new(),
            missing_units: BTreeSet::new(),
            orphans: BTreeSet::new(),
            failed_writes: BTreeSet::new(),
            voices: Vec::new(),
            next_voice: 1,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    /// Returns the live instance of a node.
    pub fn instance(&self, node: NodeId) -> Option<&NodeInstance> {
        self.instances.get(&node)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Wires the backend is believed to have.
    pub fn active_wires(&self) -> &BTreeSet<Wire> {
        &self.active
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Creates the backend unit for a node and applies its parameters.
    ///
    /// An existing instance for the node is released first. Failure to
    /// create the unit is recorded and retried by `reconcile`.
    pub fn instantiate(&mut self, node: &Node, template: &NodeTemplate) {
        if self.instances.contains_key(&node.id) {
            self.release(node.id);
        }

        let unit = match self.backend.create_unit(template.unit_kind) {
            Ok(unit) => unit,
            Err(err) => {
                tracing::warn!("could not create {} unit for node {}: {}", template.unit_kind.name(), node.id, err);
                self.missing_units.insert(node.id);
                return;
            }
        };
        self.missing_units.remove(&node.id);

        if template.unit_kind.is_source() {
            let now = self.backend.current_time();
            if let Err(err) = self.backend.start_unit(unit, now) {
                tracing::warn!("could not start {} for node {}: {}", unit, node.id, err);
            }
        }

        self.instances
            .insert(node.id, NodeInstance::new(node.id, unit, template));
        for param in &node.parameters {
            self.send_value(node.id, &param.id, param.value);
        }

        tracing::debug!("instantiated node {} ({}) as {}", node.id, node.node_type, unit);
    }

    /// Destroys a node's unit. Its wires go with it.
    pub fn release(&mut self, node: NodeId) {
        let stale: Vec<VoiceId> = self
            .voices
            .iter()
            .filter(|v| v.node == node)
            .map(|v| v.id)
            .collect();
        for voice in stale {
            self.stop_voice(voice);
        }

        self.missing_units.remove(&node);
        self.failed_writes.retain(|(n, _)| *n != node);

        let Some(instance) = self.instances.remove(&node) else {
            return;
        };
        match self.backend.destroy_unit(instance.unit) {
            Ok(()) => {
                self.active.retain(|w| !w.touches(instance.unit));
                for voice in &mut self.voices {
                    voice.active.retain(|w| !w.touches(instance.unit));
                }
                tracing::debug!("released node {} ({})", node, instance.unit);
            }
            Err(err) => {
                tracing::warn!("could not destroy {} for node {}: {}", instance.unit, node, err);
                self.orphans.insert(instance.unit);
            }
        }
        self.desired.retain(|w| !w.touches(instance.unit));
    }

    /// Releases every instance and voice.
    pub fn release_all(&mut self) {
        self.stop_all_voices();
        let nodes: Vec<NodeId> = self.instances.keys().copied().collect();
        for node in nodes {
            self.release(node);
        }
        self.missing_units.clear();
    }

    /// Moves the backend from `previous` to `model` without touching what
    /// both share.
    ///
    /// Units of nodes that are gone are released, new nodes are
    /// instantiated, surviving nodes only receive the parameter values that
    /// changed, and wires are diffed. Voices on surviving nodes keep sounding.
    pub fn restore(&mut self, previous: &GraphModel, model: &GraphModel, registry: &NodeTemplateRegistry) {
        let gone: Vec<NodeId> = self
            .instances
            .keys()
            .copied()
            .filter(|id| !model.contains_node(*id))
            .collect();
        for id in gone {
            self.release(id);
        }

        for node in model.nodes() {
            if !self.instances.contains_key(&node.id) {
                match registry.get_template(node.node_type) {
                    Ok(template) => self.instantiate(node, template),
                    Err(err) => tracing::warn!("no template for node {}: {}", node.id, err),
                }
                continue;
            }

            let before = previous.find_node(node.id);
            for param in &node.parameters {
                let unchanged = before
                    .and_then(|n| n.parameter(&param.id))
                    .is_some_and(|p| p.value == param.value);
                if !unchanged {
                    self.send_value(node.id, &param.id, param.value);
                }
            }
        }

        self.sync_wires(model);
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Clamps and stores a parameter value, then schedules it on the node's
    /// unit if the node is live. Returns the stored value.
    pub fn write_parameter(&mut self, node: &mut Node, parameter_id: &str, value: f32) -> Result<f32> {
        let capabilities = self.instances.get(&node.id).map(|i| &i.capabilities);
        let mut ctx = ControlContext::new(&mut self.backend, &mut self.pool, self.time_constant);
        let write = ParameterController::set_parameter(node, parameter_id, value, capabilities, &mut ctx)?;
        self.note_dispatch(node.id, parameter_id, &write.dispatch);
        Ok(write.applied)
    }

    /// Sends a value already stored in the model to the node's unit.
    fn send_value(&mut self, node: NodeId, parameter: &str, value: f32) -> Dispatch {
        let Some(instance) = self.instances.get(&node) else {
            return Dispatch::Detached;
        };
        let mut ctx = ControlContext::new(&mut self.backend, &mut self.pool, self.time_constant);
        let dispatch = match instance.capabilities.apply(parameter, &mut ctx, value) {
            None => Dispatch::Detached,
            Some(Ok(())) => Dispatch::Sent,
            Some(Err(err)) => {
                tracing::warn!("parameter write {}.{} = {} refused by backend: {}", node, parameter, value, err);
                Dispatch::Failed(err)
            }
        };
        self.note_dispatch(node, parameter, &dispatch);
        dispatch
    }

    fn note_dispatch(&mut self, node: NodeId, parameter: &str, dispatch: &Dispatch) {
        match dispatch {
            Dispatch::Failed(_) => {
                self.failed_writes.insert((node, parameter.to_string()));
            }
            Dispatch::Sent => {
                self.failed_writes.remove(&(node, parameter.to_string()));
            }
            Dispatch::Detached => {}
        }
    }

    // ========================================================================
    // Wires
    // ========================================================================

    /// Computes the backend wires the model calls for.
    ///
    /// A bypassed node drops out of the audio path: whatever feeds its audio
    /// inputs is wired straight to whatever its audio outputs feed, through
    /// any number of bypassed nodes. The output node is never bypassed.
    pub fn desired_wires(&self, model: &GraphModel) -> BTreeSet<Wire> {
        let mut wires = BTreeSet::new();

        if let Some(instance) = model.output_node().and_then(|n| self.instances.get(&n.id)) {
            wires.insert(Wire::to_input(instance.unit, 0, self.backend.destination(), 0));
        }

        for conn in model.connections() {
            let (Some(target_node), Some(target)) = (
                model.find_node(conn.target_node),
                self.instances.get(&conn.target_node),
            ) else {
                continue;
            };
            let Some(&landing) = target.inputs.get(conn.target_port.as_str()) else {
                continue;
            };
            if passes_through(target_node) && is_audio_input(target_node, &conn.target_port) {
                continue;
            }

            let mut visited = HashSet::new();
            for (unit, output) in self.resolve_sources(model, conn.source_node, &conn.source_port, &mut visited) {
                wires.insert(Wire {
                    from: unit,
                    output,
                    to: target.unit,
                    target: landing,
                });
            }
        }

        wires
    }

    /// Units and outputs that effectively drive a node's output port.
    fn resolve_sources(
        &self,
        model: &GraphModel,
        node_id: NodeId,
        port: &str,
        visited: &mut HashSet<NodeId>,
    ) -> Vec<(UnitHandle, usize)> {
        let Some(node) = model.find_node(node_id) else {
            return Vec::new();
        };

        if !passes_through(node) {
            return self
                .instances
                .get(&node_id)
                .and_then(|i| i.outputs.get(port).map(|&output| (i.unit, output)))
                .into_iter()
                .collect();
        }

        let audio_out = node.output(port).is_some_and(|p| p.kind == PortKind::Audio);
        if !audio_out || !visited.insert(node_id) {
            return Vec::new();
        }

        let mut sources = Vec::new();
        for upstream in model.connections() {
            if upstream.target_node == node_id && is_audio_input(node, &upstream.target_port) {
                sources.extend(self.resolve_sources(
                    model,
                    upstream.source_node,
                    &upstream.source_port,
                    visited,
                ));
            }
        }
        sources
    }

    /// Brings the backend's wires in line with the model, voices included.
    ///
    /// Only the difference between the active and desired wire sets is sent
    /// to the backend.
    pub fn sync_wires(&mut self, model: &GraphModel) {
        self.desired = self.desired_wires(model);
        apply_wire_diff(&mut self.backend, &mut self.active, &self.desired);

        for index in 0..self.voices.len() {
            let desired = self.voice_wires(self.voices[index].node, self.voices[index].unit);
            let voice = &mut self.voices[index];
            voice.desired = desired;
            apply_wire_diff(&mut self.backend, &mut voice.active, &voice.desired);
        }
    }

    /// The node's outgoing wires, re-sourced from a voice unit.
    fn voice_wires(&self, node: NodeId, unit: UnitHandle) -> BTreeSet<Wire> {
        let Some(source) = self.instances.get(&node).map(|i| i.unit) else {
            return BTreeSet::new();
        };
        self.desired
            .iter()
            .filter(|w| w.from == source)
            .map(|w| Wire { from: unit, ..*w })
            .collect()
    }

    // ========================================================================
    // Divergence
    // ========================================================================

    /// Reports every known difference between model and backend.
    pub fn divergence(&self) -> BackendDivergence {
        let mut missing_wires: Vec<Wire> = self.desired.difference(&self.active).copied().collect();
        let mut stale_wires: Vec<Wire> = self.active.difference(&self.desired).copied().collect();
        for voice in &self.voices {
            missing_wires.extend(voice.desired.difference(&voice.active).copied());
            stale_wires.extend(voice.active.difference(&voice.desired).copied());
        }

        BackendDivergence {
            missing_units: self.missing_units.iter().copied().collect(),
            orphaned_units: self.orphans.iter().copied().collect(),
            missing_wires,
            stale_wires,
            failed_writes: self.failed_writes.iter().cloned().collect(),
        }
    }

    /// Retries every outstanding backend operation and returns what is left.
    pub fn reconcile(&mut self, model: &GraphModel, registry: &NodeTemplateRegistry) -> BackendDivergence {
        let orphans: Vec<UnitHandle> = self.orphans.iter().copied().collect();
        for unit in orphans {
            if self.backend.destroy_unit(unit).is_ok() {
                self.orphans.remove(&unit);
                self.active.retain(|w| !w.touches(unit));
            }
        }

        let missing: Vec<NodeId> = self.missing_units.iter().copied().collect();
        for id in missing {
            match model.find_node(id) {
                Some(node) => match registry.get_template(node.node_type) {
                    Ok(template) => self.instantiate(node, template),
                    Err(err) => tracing::warn!("no template for node {}: {}", id, err),
                },
                None => {
                    self.missing_units.remove(&id);
                }
            }
        }

        let failed: Vec<(NodeId, String)> = self.failed_writes.iter().cloned().collect();
        for (id, parameter) in failed {
            let value = model
                .find_node(id)
                .and_then(|n| n.parameter(&parameter))
                .map(|p| p.value);
            match value {
                Some(value) => {
                    self.send_value(id, &parameter, value);
                }
                None => {
                    self.failed_writes.remove(&(id, parameter));
                }
            }
        }

        self.sync_wires(model);

        let remaining = self.divergence();
        if remaining.is_empty() {
            tracing::info!("backend reconciled with graph model");
        } else {
            tracing::warn!("{} backend difference(s) remain after reconcile", remaining.len());
        }
        remaining
    }

    // ========================================================================
    // Voices
    // ========================================================================

    /// Starts a transient oscillator with an Oscillator node's settings,
    /// wired wherever the node's output goes. The voice's wiring then follows
    /// the node's on every sync.
    pub fn start_voice(&mut self, model: &GraphModel, node_id: NodeId, frequency: f32) -> Result<VoiceId> {
        let node = model
            .find_node(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        if node.node_type != NodeType::Oscillator {
            return Err(GraphError::NotAnOscillator(node_id));
        }
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(GraphError::InvalidParameterValue {
                parameter: "frequency".to_string(),
                value: frequency,
            });
        }

        let unit = self.backend.create_unit(UnitKind::Oscillator)?;
        let now = self.backend.current_time();

        // The voice takes the node's waveform and detune, at its own pitch.
        for param in &node.parameters {
            let result = match param.id.as_str() {
                "waveform" => self.backend.set_property(unit, "type", param.value),
                "detune" => self.backend.schedule_value(unit, "detune", param.value, now, 0.0),
                _ => Ok(()),
            };
            if let Err(err) = result {
                tracing::warn!("voice setting {} refused: {}", param.id, err);
            }
        }
        if let Err(err) = self.backend.schedule_value(unit, "frequency", frequency, now, 0.0) {
            tracing::warn!("voice frequency refused: {}", err);
        }

        let id = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.voices.push(Voice {
            id,
            node: node_id,
            unit,
            active: BTreeSet::new(),
            desired: BTreeSet::new(),
        });
        self.sync_wires(model);

        if let Err(err) = self.backend.start_unit(unit, now) {
            tracing::warn!("could not start voice {}: {}", unit, err);
        }

        tracing::debug!("voice {:?} started on node {} at {} Hz", id, node_id, frequency);
        Ok(id)
    }

    /// Stops, disconnects and destroys a voice. Returns false if it was not
    /// sounding.
    pub fn stop_voice(&mut self, id: VoiceId) -> bool {
        let Some(index) = self.voices.iter().position(|v| v.id == id) else {
            return false;
        };
        let voice = self.voices.swap_remove(index);
        let now = self.backend.current_time();

        match self.backend.stop_unit(voice.unit, now) {
            Ok(()) => {}
            Err(BackendError::AlreadyStopped(_)) => {
                tracing::debug!("voice {:?} was already stopped", id);
            }
            Err(err) => tracing::warn!("could not stop voice {:?}: {}", id, err),
        }
        for wire in &voice.active {
            if let Err(err) = self.backend.disconnect(*wire) {
                tracing::debug!("voice wire {} already gone: {}", wire, err);
            }
        }
        if let Err(err) = self.backend.destroy_unit(voice.unit) {
            tracing::warn!("could not destroy voice {:?}: {}", id, err);
        }
        true
    }

    /// Stops every voice. Returns how many were sounding.
    pub fn stop_all_voices(&mut self) -> usize {
        let ids: Vec<VoiceId> = self.voices.iter().map(|v| v.id).collect();
        for id in &ids {
            self.stop_voice(*id);
        }
        ids.len()
    }
}

/// Sends the difference between two wire sets to the backend and updates
/// `active` with whatever it accepted.
fn apply_wire_diff<B: AudioBackend>(backend: &mut B, active: &mut BTreeSet<Wire>, desired: &BTreeSet<Wire>) {
    let remove: Vec<Wire> = active.difference(desired).copied().collect();
    let add: Vec<Wire> = desired.difference(active).copied().collect();

    for wire in remove {
        match backend.disconnect(wire) {
            Ok(()) => {
                active.remove(&wire);
            }
            Err(BackendError::NotConnected(_)) => {
                tracing::warn!("backend had already dropped wire {}", wire);
                active.remove(&wire);
            }
            Err(err) => tracing::warn!("could not disconnect {}: {}", wire, err),
        }
    }

    for wire in add {
        match backend.connect(wire) {
            Ok(()) => {
                active.insert(wire);
            }
            Err(err) => tracing::warn!("could not connect {}: {}", wire, err),
        }
    }
}

/// True for nodes whose audio passes around them.
fn passes_through(node: &Node) -> bool {
    node.bypass && !node.is_output()
}

fn is_audio_input(node: &Node, port: &str) -> bool {
    node.input(port).is_some_and(|p| p.kind == PortKind::Audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::headless::{Fault, HeadlessBackend};
    use crate::graph::{Connection, ConnectionId, Position};

    struct Fixture {
        adapter: AudioBackendAdapter<HeadlessBackend>,
        model: GraphModel,
        registry: NodeTemplateRegistry,
        next_conn: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let mut backend = HeadlessBackend::new();
            backend.initialize(44100, 512).unwrap();
            let mut fixture = Self {
                adapter: AudioBackendAdapter::new(backend, BufferPool::default(), 0.01),
                model: GraphModel::new(),
                registry: NodeTemplateRegistry::builtin(),
                next_conn: 1,
            };
            fixture.add(1, NodeType::Output);
            fixture
        }

        fn add(&mut self, id: u64, node_type: NodeType) -> NodeId {
            let template = self.registry.get_template(node_type).unwrap();
            let node = Node::from_template(NodeId(id), template, Position::default());
            self.adapter.instantiate(&node, template);
            self.model.add_node(node);
            NodeId(id)
        }

        fn wire(&mut self, from: u64, from_port: &str, to: u64, to_port: &str) {
            let conn = Connection::new(
                ConnectionId(self.next_conn),
                NodeId(from),
                from_port,
                NodeId(to),
                to_port,
            );
            self.next_conn += 1;
            self.model.add_connection(conn).unwrap();
            self.adapter.sync_wires(&self.model);
        }

        fn unit(&self, id: u64) -> UnitHandle {
            self.adapter.instance(NodeId(id)).unwrap().unit
        }

        fn dest(&self) -> UnitHandle {
            self.adapter.backend().destination()
        }
    }

    #[test]
    fn test_instantiate_applies_parameters() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        let unit = f.unit(2);
        let mirror = f.adapter.backend().unit(unit).unwrap();
        assert_eq!(mirror.kind, UnitKind::Oscillator);
        assert!(mirror.running);
        assert_eq!(mirror.params.get("frequency"), Some(&440.0));
        assert_eq!(mirror.properties.get("type"), Some(&0.0));
    }

    #[test]
    fn test_output_is_wired_to_destination() {
        let mut f = Fixture::new();
        f.adapter.sync_wires(&f.model);
        let wire = Wire::to_input(f.unit(1), 0, f.dest(), 0);
        assert!(f.adapter.backend().is_wired(&wire));
    }

    #[test]
    fn test_connections_become_wires() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.add(3, NodeType::Lfo);
        f.wire(2, "out", 1, "in");
        f.wire(3, "out", 2, "frequency");

        let backend = f.adapter.backend();
        assert!(backend.is_wired(&Wire::to_input(f.unit(2), 0, f.unit(1), 0)));
        assert!(backend.is_wired(&Wire::to_param(f.unit(3), 0, f.unit(2), "frequency")));
        assert_eq!(backend.wires().len(), 3);
    }

    #[test]
    fn test_sync_only_sends_difference() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.wire(2, "out", 1, "in");
        let before = f.adapter.backend().wires().clone();

        // Removing the connection in the model drops exactly that wire.
        f.model.remove_connection(ConnectionId(1)).unwrap();
        f.adapter.sync_wires(&f.model);
        let after = f.adapter.backend().wires();
        assert_eq!(before.len() - 1, after.len());
        assert!(f.adapter.divergence().is_empty());
    }

    #[test]
    fn test_bypass_routes_around_node() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.add(3, NodeType::Filter);
        f.add(4, NodeType::Delay);
        f.wire(2, "out", 3, "in");
        f.wire(3, "out", 4, "in");
        f.wire(4, "out", 1, "in");

        f.model.find_node_mut(NodeId(3)).unwrap().bypass = true;
        f.model.find_node_mut(NodeId(4)).unwrap().bypass = true;
        f.adapter.sync_wires(&f.model);

        let wires = f.adapter.backend().wires();
        assert!(wires.contains(&Wire::to_input(f.unit(2), 0, f.unit(1), 0)));
        assert!(!wires.iter().any(|w| w.touches(f.unit(3))));
        assert!(!wires.iter().any(|w| w.touches(f.unit(4))));

        f.model.find_node_mut(NodeId(3)).unwrap().bypass = false;
        f.model.find_node_mut(NodeId(4)).unwrap().bypass = false;
        f.adapter.sync_wires(&f.model);
        assert_eq!(f.adapter.backend().wires().len(), 4);
    }

    #[test]
    fn test_bypassed_feedback_loop_terminates() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Delay);
        f.add(3, NodeType::Gain);
        f.wire(2, "out", 3, "in");
        f.wire(3, "out", 2, "in");
        f.wire(3, "out", 1, "in");
        f.model.find_node_mut(NodeId(2)).unwrap().bypass = true;
        f.model.find_node_mut(NodeId(3)).unwrap().bypass = true;
        f.adapter.sync_wires(&f.model);
        assert_eq!(f.adapter.backend().wires().len(), 1);
    }

    #[test]
    fn test_release_removes_unit_and_wires() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Noise);
        f.wire(2, "out", 1, "in");
        let unit = f.unit(2);
        f.adapter.release(NodeId(2));

        assert!(f.adapter.instance(NodeId(2)).is_none());
        assert!(f.adapter.backend().unit(unit).is_none());
        assert!(!f.adapter.active_wires().iter().any(|w| w.touches(unit)));
    }

    #[test]
    fn test_refused_connect_is_divergence() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.adapter.sync_wires(&f.model);
        f.adapter.backend_mut().inject_fault(Fault::Connect);
        f.wire(2, "out", 1, "in");

        let divergence = f.adapter.divergence();
        assert_eq!(
            divergence.missing_wires,
            vec![Wire::to_input(f.unit(2), 0, f.unit(1), 0)]
        );

        // Still diverged until explicitly reconciled.
        f.adapter.backend_mut().clear_fault(Fault::Connect);
        assert_eq!(f.adapter.divergence().len(), 1);
        let remaining = f.adapter.reconcile(&f.model, &f.registry);
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_refused_disconnect_leaves_stale_wire() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.wire(2, "out", 1, "in");
        f.adapter.backend_mut().inject_fault(Fault::Disconnect);
        f.model.remove_connection(ConnectionId(1)).unwrap();
        f.adapter.sync_wires(&f.model);

        assert_eq!(f.adapter.divergence().stale_wires.len(), 1);
        f.adapter.backend_mut().clear_faults();
        assert!(f.adapter.reconcile(&f.model, &f.registry).is_empty());
    }

    #[test]
    fn test_failed_create_is_retried() {
        let mut f = Fixture::new();
        f.adapter.backend_mut().inject_fault(Fault::CreateUnit);
        f.add(2, NodeType::Filter);
        assert_eq!(f.adapter.divergence().missing_units, vec![NodeId(2)]);

        f.adapter.backend_mut().clear_faults();
        f.adapter.reconcile(&f.model, &f.registry);
        assert!(f.adapter.instance(NodeId(2)).is_some());
    }

    #[test]
    fn test_failed_write_is_retried() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Gain);
        f.adapter.backend_mut().inject_fault(Fault::ScheduleValue);
        let mut node = f.model.find_node(NodeId(2)).unwrap().clone();
        let applied = f.adapter.write_parameter(&mut node, "gain", 1.5).unwrap();
        assert_eq!(applied, 1.5);
        *f.model.find_node_mut(NodeId(2)).unwrap() = node;

        assert_eq!(
            f.adapter.divergence().failed_writes,
            vec![(NodeId(2), "gain".to_string())]
        );
        f.adapter.backend_mut().clear_faults();
        assert!(f.adapter.reconcile(&f.model, &f.registry).is_empty());
        let unit = f.unit(2);
        assert_eq!(f.adapter.backend().unit(unit).unwrap().params.get("gain"), Some(&1.5));
    }

    #[test]
    fn test_voices_follow_oscillator_wiring() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.add(3, NodeType::Filter);
        f.wire(2, "out", 3, "in");

        let voice = f.adapter.start_voice(&f.model, NodeId(2), 220.0).unwrap();
        assert_eq!(f.adapter.voice_count(), 1);
        let units_with_voice = f.adapter.backend().unit_count();
        let filter = f.unit(3);
        assert_eq!(
            f.adapter.backend().wires().iter().filter(|w| w.to == filter).count(),
            2
        );

        assert!(f.adapter.stop_voice(voice));
        assert!(!f.adapter.stop_voice(voice));
        assert_eq!(f.adapter.backend().unit_count(), units_with_voice - 1);
        assert_eq!(
            f.adapter.backend().wires().iter().filter(|w| w.to == filter).count(),
            1
        );
    }

    #[test]
    fn test_voice_wires_follow_rewiring() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.add(3, NodeType::Filter);
        f.wire(2, "out", 3, "in");
        f.wire(3, "out", 1, "in");
        f.adapter.start_voice(&f.model, NodeId(2), 220.0).unwrap();
        let (osc, filter, out) = (f.unit(2), f.unit(3), f.unit(1));
        let into = |f: &Fixture, unit: UnitHandle| {
            f.adapter
                .backend()
                .wires()
                .iter()
                .filter(|w| w.to == unit && w.from != osc)
                .count()
        };
        assert_eq!(into(&f, filter), 1);

        // Bypassing the filter moves the voice straight to the output.
        f.model.find_node_mut(NodeId(3)).unwrap().bypass = true;
        f.adapter.sync_wires(&f.model);
        assert_eq!(into(&f, filter), 0);
        assert_eq!(into(&f, out), 1);

        // Dropping the connection silences it.
        f.model.remove_connection(ConnectionId(1)).unwrap();
        f.adapter.sync_wires(&f.model);
        assert_eq!(into(&f, out), 0);
        assert!(f.adapter.divergence().is_empty());
    }

    #[test]
    fn test_refused_voice_wire_is_divergence() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.wire(2, "out", 1, "in");
        f.adapter.backend_mut().inject_fault(Fault::Connect);
        f.adapter.start_voice(&f.model, NodeId(2), 220.0).unwrap();
        assert_eq!(f.adapter.divergence().missing_wires.len(), 1);

        f.adapter.backend_mut().clear_faults();
        assert!(f.adapter.reconcile(&f.model, &f.registry).is_empty());
        assert_eq!(f.adapter.backend().wires().len(), 3);
    }

    #[test]
    fn test_voice_requires_oscillator() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Noise);
        assert_eq!(
            f.adapter.start_voice(&f.model, NodeId(2), 220.0).unwrap_err(),
            GraphError::NotAnOscillator(NodeId(2))
        );
        assert_eq!(
            f.adapter.start_voice(&f.model, NodeId(9), 220.0).unwrap_err(),
            GraphError::NodeNotFound(NodeId(9))
        );
    }

    #[test]
    fn test_stop_all_voices_tolerates_stopped_units() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.adapter.start_voice(&f.model, NodeId(2), 220.0).unwrap();
        f.adapter.start_voice(&f.model, NodeId(2), 330.0).unwrap();
        f.adapter.backend_mut().inject_fault(Fault::StopUnit);

        assert_eq!(f.adapter.stop_all_voices(), 2);
        assert_eq!(f.adapter.voice_count(), 0);
    }

    #[test]
    fn test_restore_only_touches_differences() {
        let mut f = Fixture::new();
        f.add(2, NodeType::Oscillator);
        f.wire(2, "out", 1, "in");
        let before = f.model.clone();
        let osc = f.unit(2);
        f.adapter.start_voice(&f.model, NodeId(2), 220.0).unwrap();

        // Later state: a gain node added and the oscillator retuned.
        let mut after = before.clone();
        let template = f.registry.get_template(NodeType::Gain).unwrap();
        after.add_node(Node::from_template(NodeId(3), template, Position::default()));
        after.find_node_mut(NodeId(2)).unwrap().parameter_mut("frequency").unwrap().value = 880.0;

        f.adapter.restore(&before, &after, &f.registry);
        assert_eq!(f.unit(2), osc);
        assert_eq!(f.adapter.instance_count(), 3);
        assert_eq!(f.adapter.voice_count(), 1);
        assert_eq!(f.adapter.backend().unit(osc).unwrap().params.get("frequency"), Some(&880.0));

        // And back again.
        f.adapter.restore(&after, &before, &f.registry);
        assert_eq!(f.unit(2), osc);
        assert!(f.adapter.instance(NodeId(3)).is_none());
        assert_eq!(f.adapter.backend().unit(osc).unwrap().params.get("frequency"), Some(&440.0));
        assert_eq!(f.adapter.voice_count(), 1);
        assert!(f.adapter.divergence().is_empty());
    }
}
