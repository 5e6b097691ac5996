//! Statement tracing integration.

use crate::error::ProxyResult;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Turns on per-statement tracing when `proxy-opentracing-enabled` is set.
pub trait TracingIntegration: Send + Sync {
    fn enable(&self) -> ProxyResult<()>;

    fn is_enabled(&self) -> bool;
}

/// Flag-backed tracing switch.
#[derive(Debug, Default)]
pub struct QueryTracing {
    enabled: AtomicBool,
}

impl QueryTracing {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TracingIntegration for QueryTracing {
    fn enable(&self) -> ProxyResult<()> {
        if !self.enabled.swap(true, Ordering::AcqRel) {
            info!(stage = "tracing", "Statement tracing enabled");
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}
