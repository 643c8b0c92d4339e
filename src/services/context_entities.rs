//! Context entity reload hook.

use async_trait::async_trait;

/// Reloads host-side context entities (brokers, insured parties, linked
/// policies) after operations configured with `reload_with_operations`.
///
/// Implemented by the embedding host; the core only decides *when* to call.
#[async_trait]
pub trait ContextEntityLoader: Send + Sync {
    async fn load_context_entities(&self) -> anyhow::Result<()>;
}
