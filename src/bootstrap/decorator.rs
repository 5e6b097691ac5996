//! Hooks for wrapping contexts before they are published.

use super::{SchemaContexts, TransactionContexts};
use crate::error::ProxyResult;

/// Rewrites contexts between building and publishing.
///
/// Decorators run in registration order. A failing decorator aborts boot.
pub trait ContextDecorator: Send + Sync {
    fn name(&self) -> &str;

    fn decorate_schema_contexts(&self, contexts: SchemaContexts) -> ProxyResult<SchemaContexts> {
        Ok(contexts)
    }

    fn decorate_transaction_contexts(
        &self,
        contexts: TransactionContexts,
    ) -> ProxyResult<TransactionContexts> {
        Ok(contexts)
    }
}

pub(crate) fn decorate_schema_contexts(
    decorators: &[std::sync::Arc<dyn ContextDecorator>],
    mut contexts: SchemaContexts,
) -> ProxyResult<SchemaContexts> {
    for decorator in decorators {
        tracing::debug!(decorator = %decorator.name(), "Decorating schema contexts");
        contexts = decorator.decorate_schema_contexts(contexts)?;
    }
    Ok(contexts)
}

pub(crate) fn decorate_transaction_contexts(
    decorators: &[std::sync::Arc<dyn ContextDecorator>],
    mut contexts: TransactionContexts,
) -> ProxyResult<TransactionContexts> {
    for decorator in decorators {
        tracing::debug!(decorator = %decorator.name(), "Decorating transaction contexts");
        contexts = decorator.decorate_transaction_contexts(contexts)?;
    }
    Ok(contexts)
}
