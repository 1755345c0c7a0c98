//! DSP module
//!
//! Port and parameter definitions shared by node templates and the graph model.

pub mod parameter;
pub mod port;

pub use parameter::{ParamBinding, Parameter, ParameterCategory, ParameterDefinition};
pub use port::{Port, PortBinding, PortDefinition, PortDirection, PortKind};
