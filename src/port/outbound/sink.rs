//! Tick sink port.

use async_trait::async_trait;

use crate::domain::TickEvent;
use crate::error::Result;

/// Downstream consumer of scored quote updates.
///
/// Publishing must be cheap; the tracker awaits it on the push path.
#[async_trait]
pub trait TickSink: Send + Sync {
    async fn publish(&self, event: TickEvent) -> Result<()>;
}
