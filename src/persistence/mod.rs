//! Persistence module
//!
//! Graph export/import format using serde and JSON.

pub mod patch;

pub use patch::{
    load_from_file, save_to_file, ConnectionRecord, GraphExport, NodeRecord, ParameterRecord,
    PatchError, GRAPH_FORMAT_VERSION,
};
