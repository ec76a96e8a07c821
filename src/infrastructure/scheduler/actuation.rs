//! Executing a reconcile plan against the live provider.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::application::subscription::{ActuationOutcome, OutcomeKind, ReconcilePlan};
use crate::domain::Symbol;
use crate::error::ProviderError;
use crate::port::LiveProvider;

#[derive(Debug, Clone, Copy)]
enum Call {
    Subscribe,
    Unsubscribe,
}

/// Issues provider calls with bounded concurrency, each under a deadline.
pub(crate) struct Actuator {
    live: Arc<dyn LiveProvider>,
    deadline: Duration,
    concurrency: usize,
}

impl Actuator {
    pub(crate) fn new(live: Arc<dyn LiveProvider>, deadline: Duration, concurrency: usize) -> Self {
        Self {
            live,
            deadline,
            concurrency: concurrency.max(1),
        }
    }

    /// Run every call the plan owes. Unsubscribes are issued first.
    ///
    /// Results come back in completion order, tagged with the plan's epoch.
    pub(crate) async fn execute(&self, plan: &ReconcilePlan) -> Vec<ActuationOutcome> {
        if plan.is_idle() {
            return Vec::new();
        }
        debug!(
            subscribe = plan.subscribe.len(),
            unsubscribe = plan.unsubscribe.len(),
            "Actuating plan"
        );

        let calls = plan
            .unsubscribe
            .iter()
            .map(|symbol| (Call::Unsubscribe, symbol.clone()))
            .chain(plan.subscribe.iter().map(|symbol| (Call::Subscribe, symbol.clone())));

        stream::iter(calls)
            .map(|(call, symbol)| self.call(call, symbol, plan.epoch))
            .buffer_unordered(self.concurrency)
            .boxed()
            .collect()
            .await
    }

    async fn call(&self, call: Call, symbol: Symbol, epoch: u64) -> ActuationOutcome {
        let after_ms = self.deadline.as_millis() as u64;
        let kind = match call {
            Call::Subscribe => {
                let result = timeout(self.deadline, self.live.subscribe(&symbol))
                    .await
                    .unwrap_or(Err(ProviderError::Timeout {
                        operation: "subscribe",
                        after_ms,
                    }));
                OutcomeKind::Subscribe(result)
            }
            Call::Unsubscribe => {
                let result = timeout(self.deadline, self.live.unsubscribe(&symbol))
                    .await
                    .unwrap_or(Err(ProviderError::Timeout {
                        operation: "unsubscribe",
                        after_ms,
                    }));
                OutcomeKind::Unsubscribe(result)
            }
        };
        trace!(symbol = %symbol, outcome = ?kind, "Provider call finished");
        ActuationOutcome { symbol, kind, epoch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SubscribeAck;
    use crate::testkit::provider::{LiveCall, ScriptedLiveProvider};

    fn plan(subscribe: &[&str], unsubscribe: &[&str]) -> ReconcilePlan {
        ReconcilePlan {
            subscribe: subscribe.iter().map(|s| Symbol::from(*s)).collect(),
            unsubscribe: unsubscribe.iter().map(|s| Symbol::from(*s)).collect(),
            epoch: 3,
            ..ReconcilePlan::default()
        }
    }

    #[tokio::test]
    async fn unsubscribes_are_issued_before_subscribes() {
        let live = Arc::new(ScriptedLiveProvider::new());
        let actuator = Actuator::new(live.clone(), Duration::from_secs(1), 1);

        let outcomes = actuator.execute(&plan(&["A"], &["B"])).await;

        assert_eq!(
            live.calls(),
            vec![
                LiveCall::Unsubscribe(Symbol::from("B")),
                LiveCall::Subscribe(Symbol::from("A")),
            ]
        );
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.epoch == 3));
        assert!(outcomes.contains(&ActuationOutcome {
            symbol: Symbol::from("A"),
            kind: OutcomeKind::Subscribe(Ok(SubscribeAck::Confirmed)),
            epoch: 3,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_becomes_timeout() {
        let live = Arc::new(ScriptedLiveProvider::new().with_call_delay(Duration::from_secs(10)));
        let actuator = Actuator::new(live, Duration::from_millis(500), 4);

        let outcomes = actuator.execute(&plan(&["A"], &[])).await;
        assert_eq!(
            outcomes[0].kind,
            OutcomeKind::Subscribe(Err(ProviderError::Timeout {
                operation: "subscribe",
                after_ms: 500
            }))
        );
    }

    #[tokio::test]
    async fn idle_plan_makes_no_calls() {
        let live = Arc::new(ScriptedLiveProvider::new());
        let actuator = Actuator::new(live.clone(), Duration::from_secs(1), 4);
        assert!(actuator.execute(&ReconcilePlan::default()).await.is_empty());
        assert!(live.calls().is_empty());
    }
}
