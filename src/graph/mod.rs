//! Graph module
//!
//! The backend-independent side of the engine: the node/connection model,
//! node templates, connection validation, processing order and undo history.

pub mod history;
pub mod model;
pub mod order;
pub mod templates;
pub mod validation;

pub use history::{HistoryManager, HistorySnapshot};
pub use model::{Connection, ConnectionId, GraphModel, Node, NodeId, Position};
pub use order::{ProcessingOrder, ProcessingOrderResolver};
pub use templates::{builtin_template, NodeCategory, NodeTemplate, NodeTemplateRegistry, NodeType};
pub use validation::{kinds_compatible, validate_connection};
