//! Listener layer for the database proxy.
//!
//! The listener is started last, once the proxy context is published. The
//! default listener is an HTTP admin endpoint exposing the published context.

pub mod http;

pub use http::AdminHttpListener;

use crate::bootstrap::ProxyContext;
use crate::error::ProxyResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Network front end started once boot has published its context.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Start listening and serve until shutdown.
    async fn start(&self, port: u16, context: Arc<ProxyContext>) -> ProxyResult<()>;

    /// Get the name of this listener for logging.
    fn name(&self) -> &'static str;
}
