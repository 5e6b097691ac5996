//! Proxy bootstrap.
//!
//! Turns a raw configuration into published schema and transaction contexts
//! and starts the listener on top of them.

pub mod context;
pub mod decorator;
pub mod orchestrator;
pub mod schema;
pub mod telemetry;
pub mod transaction;

pub use context::{ContextSnapshot, ProxyContext};
pub use decorator::ContextDecorator;
pub use orchestrator::{BootstrapOrchestrator, Collaborators};
pub use schema::{SchemaContext, SchemaContextBuilder, SchemaContexts};
pub use telemetry::{QueryTracing, TracingIntegration};
pub use transaction::{TransactionBuildError, TransactionContextBuilder, TransactionContexts};
