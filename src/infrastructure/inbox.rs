//! Bounded, coalescing queue between provider push callbacks and the tracker.
//!
//! Quotes are coalesced by symbol: a newer quote replaces a queued one for the
//! same symbol in place. When the quote backlog reaches capacity the oldest
//! symbol's quote is dropped and counted. Lifecycle events are never coalesced
//! or dropped and are delivered ahead of queued quotes.
//!
//! Sending never blocks and never awaits.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::domain::Symbol;
use crate::port::ProviderEvent;

/// Counters exposed for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxStats {
    /// Events currently queued.
    pub depth: usize,
    /// Quotes replaced in place by a newer quote for the same symbol.
    pub coalesced: u64,
    /// Quotes discarded because the queue was full.
    pub dropped: u64,
}

#[derive(Default)]
struct Queue {
    control: VecDeque<ProviderEvent>,
    order: VecDeque<Symbol>,
    quotes: HashMap<Symbol, ProviderEvent>,
}

struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
    coalesced: AtomicU64,
    dropped: AtomicU64,
}

/// Create a connected sender/receiver pair holding at most `capacity` quotes.
#[must_use]
pub fn inbox(capacity: usize) -> (InboxSender, InboxReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(Queue::default()),
        notify: Notify::new(),
        capacity: capacity.max(1),
        closed: AtomicBool::new(false),
        coalesced: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });
    (
        InboxSender {
            shared: Arc::clone(&shared),
        },
        InboxReceiver { shared },
    )
}

/// Producer half, handed to the live provider.
#[derive(Clone)]
pub struct InboxSender {
    shared: Arc<Shared>,
}

impl InboxSender {
    /// Enqueue an event. Returns `false` if the inbox is closed.
    pub fn send(&self, event: ProviderEvent) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }

        {
            let mut queue = self.shared.queue.lock();
            match event {
                ProviderEvent::Quote { ref symbol, .. } => {
                    let symbol = symbol.clone();
                    if let Some(slot) = queue.quotes.get_mut(&symbol) {
                        *slot = event;
                        self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
                    } else {
                        if queue.quotes.len() >= self.shared.capacity {
                            if let Some(oldest) = queue.order.pop_front() {
                                queue.quotes.remove(&oldest);
                                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                                trace!(symbol = %oldest, "Inbox full, dropped oldest quote");
                            }
                        }
                        queue.order.push_back(symbol.clone());
                        queue.quotes.insert(symbol, event);
                    }
                }
                other => queue.control.push_back(other),
            }
        }

        self.shared.notify.notify_one();
        true
    }

    /// Shut the inbox from the producer side. The receiver drains what is
    /// already queued, then returns `None`.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Whether the inbox has been shut.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> InboxStats {
        stats(&self.shared)
    }
}

impl std::fmt::Debug for InboxSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxSender")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Consumer half, owned by the live tracker.
pub struct InboxReceiver {
    shared: Arc<Shared>,
}

impl InboxReceiver {
    /// Wait for the next event. Returns `None` once closed and drained.
    pub async fn recv(&self) -> Option<ProviderEvent> {
        loop {
            let notified = self.shared.notify.notified();
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Take the next event without waiting.
    pub fn try_recv(&self) -> Option<ProviderEvent> {
        let mut queue = self.shared.queue.lock();
        if let Some(event) = queue.control.pop_front() {
            return Some(event);
        }
        while let Some(symbol) = queue.order.pop_front() {
            if let Some(event) = queue.quotes.remove(&symbol) {
                return Some(event);
            }
        }
        None
    }

    /// Stop accepting events and wake the consumer.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    #[must_use]
    pub fn stats(&self) -> InboxStats {
        stats(&self.shared)
    }
}

fn stats(shared: &Shared) -> InboxStats {
    let depth = {
        let queue = shared.queue.lock();
        queue.control.len() + queue.quotes.len()
    };
    InboxStats {
        depth,
        coalesced: shared.coalesced.load(Ordering::Relaxed),
        dropped: shared.dropped.load(Ordering::Relaxed),
    }
}
