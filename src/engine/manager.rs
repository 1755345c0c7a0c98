//! Graph Manager
//!
//! The public face of the engine. A `GraphManager` owns the graph model, the
//! undo history and the backend adapter, and runs the engine lifecycle:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready <-> {Playing, Paused} -> Disposed
//! ```
//!
//! Graph edits are accepted only while Ready, Playing or Paused. Each edit is
//! validated against the model first; a rejected edit leaves the graph
//! untouched. Accepted edits are recorded in history before they are applied
//! and then mirrored onto the backend, where failures are logged and tracked
//! as divergence instead of being surfaced.

use std::collections::HashMap;
use std::fmt;

use crate::config::EngineConfig;
use crate::error::{CapacityKind, GraphError, Result};
use crate::graph::{
    validate_connection, Connection, ConnectionId, GraphModel, HistoryManager, Node, NodeCategory,
    NodeId, NodeTemplate, NodeTemplateRegistry, NodeType, Position, ProcessingOrder,
    ProcessingOrderResolver,
};
use crate::persistence::{GraphExport, NodeRecord, GRAPH_FORMAT_VERSION};

use super::adapter::{AudioBackendAdapter, BackendDivergence, VoiceId};
use super::backend::AudioBackend;
use super::buffer_pool::{BufferPool, BufferPoolStats};
use super::parameters::ParameterController;

/// Lifecycle state of a [`GraphManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Playing,
    Paused,
    Disposed,
}

impl EngineState {
    /// Returns true in the states that accept graph edits.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Playing | EngineState::Paused)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Playing => "playing",
            EngineState::Paused => "paused",
            EngineState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Read-only copy of the graph for display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl GraphView {
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// What an import loaded and what it had to leave out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportReport {
    pub nodes_imported: usize,
    pub connections_imported: usize,
    /// Record ids of nodes that were not loaded.
    pub skipped_nodes: Vec<u64>,
    pub skipped_connections: usize,
    /// Parameter values that named no parameter on their node.
    pub skipped_parameters: usize,
}

impl ImportReport {
    /// Returns true if nothing was skipped.
    pub fn is_clean(&self) -> bool {
        self.skipped_nodes.is_empty() && self.skipped_connections == 0 && self.skipped_parameters == 0
    }
}

/// The engine façade.
pub struct GraphManager<B: AudioBackend> {
    config: EngineConfig,
    registry: NodeTemplateRegistry,
    model: GraphModel,
    history: HistoryManager,
    adapter: AudioBackendAdapter<B>,
    state: EngineState,
    next_node_id: u64,
    next_connection_id: u64,
}

impl<B: AudioBackend> GraphManager<B> {
    /// Creates an uninitialized manager around a backend.
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self::with_registry(backend, config, NodeTemplateRegistry::builtin())
    }

    /// Creates a manager with a custom template registry.
    pub fn with_registry(backend: B, config: EngineConfig, registry: NodeTemplateRegistry) -> Self {
        let pool = BufferPool::new(config.buffer_pool_depth);
        let adapter = AudioBackendAdapter::new(backend, pool, config.smoothing_seconds());
        Self {
            history: HistoryManager::new(config.history_limit),
            config,
            registry,
            model: GraphModel::new(),
            adapter,
            state: EngineState::Uninitialized,
            next_node_id: 1,
            next_connection_id: 1,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeTemplateRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        self.adapter.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.adapter.backend_mut()
    }

    pub fn adapter(&self) -> &AudioBackendAdapter<B> {
        &self.adapter
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(GraphError::NotInitialized(self.state))
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validates the configuration, opens the backend and creates the
    /// output node.
    ///
    /// Returns once the backend has accepted the configuration. Calling it
    /// again while initialized does nothing.
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            EngineState::Uninitialized => {}
            EngineState::Ready | EngineState::Playing | EngineState::Paused => return Ok(()),
            state @ (EngineState::Initializing | EngineState::Disposed) => {
                return Err(GraphError::InvalidTransition {
                    state,
                    action: "initialize",
                });
            }
        }

        self.config
            .validate()
            .map_err(|err| GraphError::InvalidConfig(err.to_string()))?;

        self.state = EngineState::Initializing;
        let (sample_rate, buffer_size) = (self.config.sample_rate, self.config.buffer_size);
        if let Err(err) = self.adapter.backend_mut().initialize(sample_rate, buffer_size) {
            tracing::warn!("backend failed to initialize: {}", err);
            self.state = EngineState::Uninitialized;
            return Err(err.into());
        }

        self.state = EngineState::Ready;
        self.ensure_output_node()?;
        tracing::info!("engine ready at {} Hz, {} frames per block", sample_rate, buffer_size);
        Ok(())
    }

    /// Creates the output node if the graph has none. Not recorded in history.
    fn ensure_output_node(&mut self) -> Result<()> {
        if self.model.output_node().is_some() {
            return Ok(());
        }
        let template = self.registry.get_template(NodeType::Output)?;
        if self.model.node_count() >= self.config.max_nodes {
            return Err(GraphError::CapacityExceeded {
                kind: CapacityKind::Nodes,
                limit: self.config.max_nodes,
            });
        }
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let node = Node::from_template(id, template, Position::default());
        self.adapter.instantiate(&node, template);
        self.model.add_node(node);
        self.adapter.sync_wires(&self.model);
        tracing::debug!("created output node {}", id);
        Ok(())
    }

    /// Resumes backend rendering. A paused engine goes back to playing.
    pub fn resume(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.adapter.backend_mut().resume()?;
        if self.state == EngineState::Paused {
            self.state = EngineState::Playing;
        }
        Ok(())
    }

    /// Starts playback.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.state == EngineState::Playing {
            return Ok(());
        }
        self.adapter.backend_mut().resume()?;
        self.state = EngineState::Playing;
        tracing::info!("playback started");
        Ok(())
    }

    /// Pauses playback, keeping voices and graph as they are.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            EngineState::Playing => {}
            EngineState::Paused => return Ok(()),
            state => {
                return Err(GraphError::InvalidTransition {
                    state,
                    action: "pause",
                });
            }
        }
        if let Err(err) = self.adapter.backend_mut().suspend() {
            tracing::warn!("backend refused to suspend: {}", err);
        }
        self.state = EngineState::Paused;
        tracing::info!("playback paused");
        Ok(())
    }

    /// Stops playback: every voice is stopped and destroyed, then the
    /// backend is suspended. Returns how many voices were sounding.
    pub fn stop(&mut self) -> Result<usize> {
        self.ensure_active()?;
        let voices = self.adapter.stop_all_voices();
        if let Err(err) = self.adapter.backend_mut().suspend() {
            tracing::warn!("backend refused to suspend: {}", err);
        }
        self.state = EngineState::Ready;
        tracing::info!("playback stopped ({} voice(s) released)", voices);
        Ok(voices)
    }

    /// Releases every backend resource. The manager cannot be used again.
    pub fn dispose(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        self.adapter.release_all();
        if let Err(err) = self.adapter.backend_mut().close() {
            tracing::warn!("backend failed to close cleanly: {}", err);
        }
        self.adapter.pool_mut().clear();
        self.history.clear();
        self.state = EngineState::Disposed;
        tracing::info!("engine disposed");
    }

    // ========================================================================
    // Graph edits
    // ========================================================================

    /// Adds a node of the given type with its template defaults.
    pub fn create_node(&mut self, node_type: NodeType, position: Position) -> Result<NodeId> {
        self.ensure_active()?;
        if node_type == NodeType::Output && self.model.output_node().is_some() {
            return Err(GraphError::OutputNodeExists);
        }
        let template = self.registry.get_template(node_type)?;
        if self.model.node_count() >= self.config.max_nodes {
            return Err(GraphError::CapacityExceeded {
                kind: CapacityKind::Nodes,
                limit: self.config.max_nodes,
            });
        }

        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        let node = Node::from_template(id, template, position);

        self.history.push(&self.model, format!("Add {}", template.name));
        self.adapter.instantiate(&node, template);
        self.model.add_node(node);
        tracing::debug!("created {} node {}", node_type, id);
        Ok(id)
    }

    /// Removes a node and every connection touching it.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        self.ensure_active()?;
        let node = self.model.find_node(id).ok_or(GraphError::NodeNotFound(id))?;
        if node.is_output() {
            return Err(GraphError::ProtectedNodeDeletion(id));
        }

        let description = format!("Delete {}", node.name);
        self.history.push(&self.model, description);
        let (_, removed) = self.model.remove_node(id)?;
        self.adapter.release(id);
        self.adapter.sync_wires(&self.model);
        tracing::debug!("deleted node {} and {} connection(s)", id, removed.len());
        Ok(())
    }

    /// Connects an output port to an input port.
    pub fn connect(
        &mut self,
        source_node: NodeId,
        source_port: &str,
        target_node: NodeId,
        target_port: &str,
    ) -> Result<ConnectionId> {
        self.ensure_active()?;
        validate_connection(&self.model, source_node, source_port, target_node, target_port)?;
        if self.model.connection_count() >= self.config.max_connections {
            return Err(GraphError::CapacityExceeded {
                kind: CapacityKind::Connections,
                limit: self.config.max_connections,
            });
        }

        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        self.history.push(&self.model, "Connect");
        self.model.add_connection(Connection::new(
            id,
            source_node,
            source_port,
            target_node,
            target_port,
        ))?;
        self.adapter.sync_wires(&self.model);
        tracing::debug!(
            "connected {}.{} -> {}.{} as {}",
            source_node,
            source_port,
            target_node,
            target_port,
            id
        );
        Ok(id)
    }

    /// Removes a connection.
    pub fn disconnect(&mut self, id: ConnectionId) -> Result<()> {
        self.ensure_active()?;
        if self.model.find_connection(id).is_none() {
            return Err(GraphError::ConnectionNotFound(id));
        }

        self.history.push(&self.model, "Disconnect");
        self.model.remove_connection(id)?;
        self.adapter.sync_wires(&self.model);
        tracing::debug!("removed connection {}", id);
        Ok(())
    }

    /// Sets a parameter, clamped to its range. Returns the stored value.
    ///
    /// Consecutive writes to the same parameter share one undo step.
    pub fn set_parameter(&mut self, node_id: NodeId, parameter_id: &str, value: f32) -> Result<f32> {
        self.ensure_active()?;
        let node = self
            .model
            .find_node(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        if node.parameter(parameter_id).is_none() {
            return Err(GraphError::ParameterNotFound {
                node: node_id,
                parameter: parameter_id.to_string(),
            });
        }
        if !value.is_finite() {
            return Err(GraphError::InvalidParameterValue {
                parameter: parameter_id.to_string(),
                value,
            });
        }

        let description = format!("Set {} {}", node.name, parameter_id);
        self.history
            .push_coalesced(format!("{node_id}.{parameter_id}"), &self.model, description);

        let node = self
            .model
            .find_node_mut(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        self.adapter.write_parameter(node, parameter_id, value)
    }

    /// Moves a node in the editor. Not recorded in history.
    pub fn move_node(&mut self, id: NodeId, position: Position) -> Result<()> {
        self.ensure_active()?;
        let node = self.model.find_node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.position = position;
        Ok(())
    }

    /// Routes audio around a node, or back through it.
    ///
    /// The output node always stays in the path; bypassing it does nothing.
    pub fn set_bypass(&mut self, id: NodeId, bypass: bool) -> Result<()> {
        self.ensure_active()?;
        let node = self.model.find_node(id).ok_or(GraphError::NodeNotFound(id))?;
        if node.is_output() {
            tracing::debug!("ignoring bypass on output node {}", id);
            return Ok(());
        }
        if node.bypass == bypass {
            return Ok(());
        }

        let verb = if bypass { "Bypass" } else { "Enable" };
        let description = format!("{} {}", verb, node.name);
        self.history.push(&self.model, description);
        if let Some(node) = self.model.find_node_mut(id) {
            node.bypass = bypass;
        }
        self.adapter.sync_wires(&self.model);
        tracing::debug!("node {} bypass = {}", id, bypass);
        Ok(())
    }

    /// Changes a node's display name.
    pub fn rename_node(&mut self, id: NodeId, name: impl Into<String>) -> Result<()> {
        self.ensure_active()?;
        let name = name.into();
        let node = self.model.find_node(id).ok_or(GraphError::NodeNotFound(id))?;
        if node.name == name {
            return Ok(());
        }

        let description = format!("Rename {}", node.name);
        self.history.push(&self.model, description);
        if let Some(node) = self.model.find_node_mut(id) {
            node.name = name;
        }
        Ok(())
    }

    /// Removes every node except the output node.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.history.push(&self.model, "Clear graph");
        let removed = self.remove_all_but_output();
        self.adapter.sync_wires(&self.model);
        tracing::debug!("cleared {} node(s)", removed);
        Ok(())
    }

    fn remove_all_but_output(&mut self) -> usize {
        let doomed: Vec<NodeId> = self
            .model
            .nodes()
            .iter()
            .filter(|n| !n.is_output())
            .map(|n| n.id)
            .collect();
        for id in &doomed {
            if self.model.remove_node(*id).is_ok() {
                self.adapter.release(*id);
            }
        }
        doomed.len()
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Restores the state before the last edit. Returns false if there was
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        self.ensure_active()?;
        let Some(model) = self.history.undo(&self.model) else {
            return Ok(false);
        };
        self.restore(model);
        Ok(true)
    }

    /// Re-applies the last undone edit. Returns false if there was nothing
    /// to redo.
    pub fn redo(&mut self) -> Result<bool> {
        self.ensure_active()?;
        let Some(model) = self.history.redo(&self.model) else {
            return Ok(false);
        };
        self.restore(model);
        Ok(true)
    }

    fn restore(&mut self, model: GraphModel) {
        let previous = std::mem::replace(&mut self.model, model);
        self.adapter.restore(&previous, &self.model, &self.registry);
        tracing::debug!(
            "restored graph with {} node(s), {} connection(s)",
            self.model.node_count(),
            self.model.connection_count()
        );
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns a copy of the current nodes and connections.
    pub fn graph(&self) -> GraphView {
        GraphView {
            nodes: self.model.nodes().to_vec(),
            connections: self.model.connections().to_vec(),
        }
    }

    /// Direct read access to the live model.
    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    /// Id of the output node, once initialized.
    pub fn output_node_id(&self) -> Option<NodeId> {
        self.model.output_node().map(|n| n.id)
    }

    /// Resolves the current processing order.
    pub fn processing_order(&self) -> ProcessingOrder {
        ProcessingOrderResolver::resolve(&self.model)
    }

    pub fn node_template(&self, node_type: NodeType) -> Result<&NodeTemplate> {
        self.registry.get_template(node_type)
    }

    pub fn node_templates_by_category(&self, category: NodeCategory) -> Vec<&NodeTemplate> {
        self.registry.templates_by_category(category)
    }

    // ========================================================================
    // Import / export
    // ========================================================================

    /// Captures the graph and engine settings.
    pub fn export_graph(&self) -> GraphExport {
        GraphExport::from_model(
            &self.model,
            self.config.sample_rate,
            self.config.buffer_size,
            self.state == EngineState::Playing,
        )
    }

    /// Replaces the graph with an exported one, as a single undo step.
    ///
    /// Nodes of unknown type, parameters the node does not have and
    /// connections that do not resolve are skipped with a warning; the rest
    /// is loaded. The exported output node's settings are applied to the
    /// existing output node. Node and connection ids are reassigned.
    pub fn import_graph(&mut self, export: &GraphExport) -> Result<ImportReport> {
        self.ensure_active()?;
        if !export.is_compatible() {
            return Err(GraphError::IncompatibleGraphVersion {
                found: export.version,
                expected: GRAPH_FORMAT_VERSION,
            });
        }
        if export.sample_rate != self.config.sample_rate {
            tracing::warn!(
                "importing graph made at {} Hz into engine running at {} Hz",
                export.sample_rate,
                self.config.sample_rate
            );
        }

        self.history.push(&self.model, "Import graph");
        self.remove_all_but_output();

        let mut report = ImportReport::default();
        let mut ids: HashMap<u64, NodeId> = HashMap::new();
        let output = self.model.output_node().map(|n| n.id);

        for record in &export.nodes {
            if ids.contains_key(&record.id) {
                tracing::warn!("skipping node with duplicate id {}", record.id);
                report.skipped_nodes.push(record.id);
                continue;
            }
            let template = match self.registry.parse_type(&record.node_type) {
                Ok(template) => template,
                Err(err) => {
                    tracing::warn!("skipping node {}: {}", record.id, err);
                    report.skipped_nodes.push(record.id);
                    continue;
                }
            };

            if template.node_type == NodeType::Output {
                let target = output.filter(|out| !ids.values().any(|id| id == out));
                let Some(out) = target else {
                    tracing::warn!("skipping extra output node {}", record.id);
                    report.skipped_nodes.push(record.id);
                    continue;
                };
                if let Some(node) = self.model.find_node_mut(out) {
                    report.skipped_parameters += apply_layout(node, record);
                    for param in &record.parameters {
                        if node.parameter(&param.id).is_some() {
                            if let Err(err) = self.adapter.write_parameter(node, &param.id, param.value) {
                                tracing::warn!("skipping output parameter {}: {}", param.id, err);
                                report.skipped_parameters += 1;
                            }
                        }
                    }
                }
                ids.insert(record.id, out);
                report.nodes_imported += 1;
                continue;
            }

            if self.model.node_count() >= self.config.max_nodes {
                tracing::warn!("skipping node {}: node limit of {} reached", record.id, self.config.max_nodes);
                report.skipped_nodes.push(record.id);
                continue;
            }

            let id = NodeId(self.next_node_id);
            self.next_node_id += 1;
            let mut node = Node::from_template(id, template, record.position);
            report.skipped_parameters += apply_layout(&mut node, record);
            for param in &record.parameters {
                if node.parameter(&param.id).is_some() {
                    if let Err(err) = ParameterController::store(&mut node, &param.id, param.value) {
                        tracing::warn!("skipping parameter {} on node {}: {}", param.id, record.id, err);
                        report.skipped_parameters += 1;
                    }
                }
            }

            self.adapter.instantiate(&node, template);
            self.model.add_node(node);
            ids.insert(record.id, id);
            report.nodes_imported += 1;
        }

        for record in &export.connections {
            let (Some(&source), Some(&target)) = (ids.get(&record.source_node), ids.get(&record.target_node)) else {
                tracing::warn!(
                    "skipping connection {} -> {}: node not imported",
                    record.source_node,
                    record.target_node
                );
                report.skipped_connections += 1;
                continue;
            };
            if self.model.connection_count() >= self.config.max_connections {
                tracing::warn!("skipping connection: limit of {} reached", self.config.max_connections);
                report.skipped_connections += 1;
                continue;
            }

            let connection = Connection::new(
                ConnectionId(self.next_connection_id),
                source,
                record.source_port.as_str(),
                target,
                record.target_port.as_str(),
            );
            match self.model.add_connection(connection) {
                Ok(()) => {
                    self.next_connection_id += 1;
                    report.connections_imported += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        "skipping connection {}.{} -> {}.{}: {}",
                        record.source_node,
                        record.source_port,
                        record.target_node,
                        record.target_port,
                        err
                    );
                    report.skipped_connections += 1;
                }
            }
        }

        self.adapter.sync_wires(&self.model);
        tracing::info!(
            "imported {} node(s) and {} connection(s), skipped {} node(s) and {} connection(s)",
            report.nodes_imported,
            report.connections_imported,
            report.skipped_nodes.len(),
            report.skipped_connections
        );
        Ok(report)
    }

    // ========================================================================
    // Backend
    // ========================================================================

    /// Differences between the model and the backend left by failed calls.
    pub fn backend_divergence(&self) -> BackendDivergence {
        self.adapter.divergence()
    }

    /// Retries outstanding backend calls. Returns what still differs.
    pub fn reconcile_backend(&mut self) -> BackendDivergence {
        self.adapter.reconcile(&self.model, &self.registry)
    }

    pub fn buffer_stats(&self) -> BufferPoolStats {
        self.adapter.pool().stats()
    }

    /// Borrows a zeroed scratch buffer from the pool.
    pub fn acquire_buffer(&mut self, size: usize) -> Vec<f32> {
        self.adapter.pool_mut().acquire(size)
    }

    pub fn release_buffer(&mut self, buffer: Vec<f32>) {
        self.adapter.pool_mut().release(buffer);
    }

    // ========================================================================
    // Voices
    // ========================================================================

    /// Starts a voice on an Oscillator node at the given pitch.
    pub fn note_on(&mut self, node: NodeId, frequency: f32) -> Result<VoiceId> {
        self.ensure_active()?;
        self.adapter.start_voice(&self.model, node, frequency)
    }

    /// Stops a voice. Returns false if it was not sounding.
    pub fn note_off(&mut self, voice: VoiceId) -> bool {
        self.adapter.stop_voice(voice)
    }

    pub fn stop_all_voices(&mut self) -> usize {
        self.adapter.stop_all_voices()
    }
}

/// Copies name, position and bypass (never onto the output node) from a
/// record. Returns how many of the
/// record's parameters the node does not have.
fn apply_layout(node: &mut Node, record: &NodeRecord) -> usize {
    if let Some(name) = &record.name {
        node.name = name.clone();
    }
    node.position = record.position;
    node.bypass = record.bypass && !node.is_output();

    record
        .parameters
        .iter()
        .filter(|p| node.parameter(&p.id).is_none())
        .inspect(|p| tracing::warn!("skipping unknown parameter {} on {} node", p.id, node.node_type))
        .count()
}

impl<B: AudioBackend> Drop for GraphManager<B> {
    fn drop(&mut self) {
        if self.state != EngineState::Uninitialized {
            self.dispose();
        }
    }
}
