pub mod cypher;
pub mod executor;
pub mod idempotency;
pub mod memory;
pub mod render;
pub mod script;
pub mod statement;

pub use executor::{
    GraphEndpoint, GraphEndpointError, HttpGraphExecutor, RoutingGraphExecutor, MEMORY_SCHEME,
};
pub use idempotency::{validate_idempotent, IdempotencyError};
pub use memory::{ExecutionStats, InMemoryGraphStore, MemoryGraphError, MemoryGraphRegistry};
pub use render::render_merge_script;
pub use script::GraphScript;
