//! Modular Graph Library
//!
//! Audio processing graph engine: a node/port/connection model, a manager
//! that mirrors it onto a host audio backend, parameter control, a scratch
//! buffer pool, processing-order resolution and undo/redo history.

pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod graph;
pub mod persistence;

pub use config::{ConfigError, EngineConfig};
pub use engine::{AudioBackend, EngineState, GraphManager, GraphView, HeadlessBackend, ImportReport};
pub use error::{CapacityKind, GraphError, Result};
pub use graph::{NodeCategory, NodeId, NodeType, Position};
pub use persistence::GraphExport;
