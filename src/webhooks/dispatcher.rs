// Event fan-out
//
// Matches an event against a registry snapshot and starts one delivery chain
// per matching subscription. Dispatch returns as soon as the chains are
// spawned; their outcomes only show up in the delivery log.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics;
use crate::webhooks::delivery::{DeliveryAttemptWorker, DeliveryContext};
use crate::webhooks::error::{WebhookError, WebhookResult};
use crate::webhooks::registry::WebhookRegistry;

/// Result of a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    /// Number of delivery chains started
    pub matched: usize,
}

struct ChainGroup {
    subscription_id: String,
    token: CancellationToken,
    active: usize,
}

/// Chain groups keyed by generation
///
/// `live` points at the group new chains for a subscription join. Cancelling
/// detaches the group from `live`; it stays in `groups` until its last chain
/// finishes.
#[derive(Default)]
struct ChainTable {
    groups: HashMap<u64, ChainGroup>,
    live: HashMap<String, u64>,
}

impl ChainTable {
    fn active(&self) -> usize {
        self.groups.values().map(|g| g.active).sum()
    }
}

/// Starts and tracks delivery chains
#[derive(Clone)]
pub struct EventDispatcher {
    registry: WebhookRegistry,
    context: DeliveryContext,
    chains: Arc<Mutex<ChainTable>>,
    next_generation: Arc<AtomicU64>,
    idle: Arc<Notify>,
}

impl EventDispatcher {
    pub fn new(registry: WebhookRegistry, context: DeliveryContext) -> Self {
        Self {
            registry,
            context,
            chains: Arc::new(Mutex::new(ChainTable::default())),
            next_generation: Arc::new(AtomicU64::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Deliver an event to every subscription that lists its type
    ///
    /// Subscriptions are matched against a snapshot taken here; later
    /// registry changes do not affect chains already started.
    pub async fn dispatch(&self, event_type: &str, payload: Value) -> WebhookResult<DispatchReceipt> {
        if event_type.is_empty() {
            return Err(WebhookError::invalid("eventType is required"));
        }
        if payload.is_null() {
            return Err(WebhookError::invalid("payload is required"));
        }

        let payload = Arc::new(payload);
        let targets: Vec<_> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.handles_event(event_type))
            .collect();

        metrics::EVENTS_DISPATCHED_TOTAL.inc();
        info!(event_type, matched = targets.len(), "Dispatching event");

        let matched = targets.len();
        for subscription in targets {
            let (generation, token) = self.register_chain(&subscription.id).await;
            let worker = DeliveryAttemptWorker::new(
                subscription.clone(),
                event_type.to_string(),
                Arc::clone(&payload),
                self.context.clone(),
                token,
            );

            let dispatcher = self.clone();
            let id = subscription.id;
            tokio::spawn(async move {
                let state = worker.run().await;
                debug!(subscription_id = %id, ?state, "Delivery chain finished");
                dispatcher.deregister_chain(generation).await;
            });
        }

        Ok(DispatchReceipt { matched })
    }

    /// Cancel every pending or scheduled chain for a subscription
    ///
    /// Attempts already on the wire finish and are logged, and they still
    /// count as active until they do. Returns the number of chains that were
    /// signalled.
    pub async fn cancel_deliveries(&self, subscription_id: &str) -> usize {
        let mut chains = self.chains.lock().await;
        let Some(generation) = chains.live.remove(subscription_id) else {
            return 0;
        };
        match chains.groups.get(&generation) {
            Some(group) => {
                group.token.cancel();
                info!(
                    subscription_id,
                    chains = group.active,
                    "Cancelled pending deliveries"
                );
                group.active
            }
            None => 0,
        }
    }

    /// Number of chains that have not reached a terminal state
    pub async fn active_chains(&self) -> usize {
        self.chains.lock().await.active()
    }

    /// Wait until no chain is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active_chains().await == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn register_chain(&self, subscription_id: &str) -> (u64, CancellationToken) {
        let mut chains = self.chains.lock().await;
        let ChainTable { groups, live } = &mut *chains;

        let generation = *live
            .entry(subscription_id.to_string())
            .or_insert_with(|| self.next_generation.fetch_add(1, Ordering::Relaxed));
        let group = groups.entry(generation).or_insert_with(|| ChainGroup {
            subscription_id: subscription_id.to_string(),
            token: CancellationToken::new(),
            active: 0,
        });
        group.active += 1;
        (generation, group.token.child_token())
    }

    async fn deregister_chain(&self, generation: u64) {
        let mut chains = self.chains.lock().await;
        let drained = match chains.groups.get_mut(&generation) {
            Some(group) => {
                group.active = group.active.saturating_sub(1);
                (group.active == 0).then(|| group.subscription_id.clone())
            }
            None => None,
        };
        if let Some(subscription_id) = drained {
            chains.groups.remove(&generation);
            if chains.live.get(&subscription_id) == Some(&generation) {
                chains.live.remove(&subscription_id);
            }
        }
        let remaining = chains.active();
        drop(chains);

        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }
}
