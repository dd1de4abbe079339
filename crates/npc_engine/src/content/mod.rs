mod compiler;
mod database;
mod discovery;
mod types;

pub use compiler::{compile_agent_defs, ContentCompileError, ContentErrorCode, SourceLocation};
pub use database::{AgentDef, AgentDefDatabase};
pub use types::{ContentDiscoveryError, ContentRequest};
