//! Engine module
//!
//! Binds the graph model to a host audio backend.
//! Handles the backend seam, unit lifecycle, parameter dispatch, buffer
//! management, voices and the engine state machine.

pub mod adapter;
pub mod backend;
pub mod buffer_pool;
pub mod channels;
pub mod commands;
pub mod headless;
pub mod manager;
pub mod parameters;

pub use adapter::{AudioBackendAdapter, BackendDivergence, NodeInstance, VoiceId};
pub use backend::{
    AudioBackend, BackendError, BackendStatus, UnitHandle, UnitKind, Wire, WireTarget,
};
pub use buffer_pool::{BufferPool, BufferPoolStats};
pub use channels::{
    BackendChannels, ControlHandle, RenderEndpoint, DEFAULT_COMMAND_BUFFER_SIZE,
    DEFAULT_EVENT_BUFFER_SIZE,
};
pub use commands::{BackendCommand, RenderEvent};
pub use headless::{Fault, HeadlessBackend, RenderHandle, UnitMirror};
pub use manager::{EngineState, GraphManager, GraphView, ImportReport};
pub use parameters::{
    distortion_curve, CapabilityMap, ControlContext, Dispatch, ParameterController,
    ParameterWrite, CURVE_LENGTH,
};
