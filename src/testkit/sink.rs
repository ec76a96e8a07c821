//! Recording [`TickSink`] for assertions on published ticks.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Symbol, TickEvent};
use crate::error::Result;
use crate::port::TickSink;

/// Keeps every published tick in publication order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TickEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TickEvent> {
        self.events.lock().clone()
    }

    /// Ticks published for `symbol`.
    pub fn events_for(&self, symbol: &Symbol) -> Vec<TickEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| &event.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl TickSink for RecordingSink {
    async fn publish(&self, event: TickEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
