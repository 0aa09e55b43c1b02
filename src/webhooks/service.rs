//! Webhook Service
//!
//! Bundles the registry, the delivery log and the dispatcher behind the
//! operations the API layer exposes.

use serde_json::Value;
use std::sync::Arc;

use crate::webhooks::delivery::{DeliveryContext, DeliveryTransport};
use crate::webhooks::dispatcher::{DispatchReceipt, EventDispatcher};
use crate::webhooks::error::WebhookResult;
use crate::webhooks::log::{DeliveryLog, DeliveryLogEntry};
use crate::webhooks::registry::{
    Subscription, SubscriptionRequest, SubscriptionSummary, UpdatedSubscription, WebhookRegistry,
};
use crate::webhooks::retry::RetryConfig;

/// Webhook relay entry point
#[derive(Clone)]
pub struct WebhookService {
    registry: WebhookRegistry,
    log: DeliveryLog,
    dispatcher: EventDispatcher,
}

impl WebhookService {
    /// Create a service with an empty registry and log
    pub fn new(transport: Arc<dyn DeliveryTransport>, retry: RetryConfig) -> Self {
        let registry = WebhookRegistry::new();
        let log = DeliveryLog::new();
        let dispatcher = EventDispatcher::new(
            registry.clone(),
            DeliveryContext {
                transport,
                log: log.clone(),
                retry,
            },
        );

        Self {
            registry,
            log,
            dispatcher,
        }
    }

    pub async fn register(&self, request: SubscriptionRequest) -> WebhookResult<Subscription> {
        self.registry.register(request).await
    }

    pub async fn list(&self) -> Vec<SubscriptionSummary> {
        self.registry.list().await
    }

    pub async fn subscription_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn update(
        &self,
        id: &str,
        request: SubscriptionRequest,
    ) -> WebhookResult<UpdatedSubscription> {
        self.registry.update(id, request).await
    }

    /// Remove a subscription
    ///
    /// Chains already started keep running; see [`Self::cancel_deliveries`].
    pub async fn remove(&self, id: &str) -> WebhookResult<()> {
        self.registry.remove(id).await
    }

    pub async fn dispatch(&self, event_type: &str, payload: Value) -> WebhookResult<DispatchReceipt> {
        self.dispatcher.dispatch(event_type, payload).await
    }

    /// Delivery history for a subscription, including deleted ones
    pub async fn deliveries(&self, id: &str) -> Vec<DeliveryLogEntry> {
        self.log.query(id).await
    }

    pub async fn cancel_deliveries(&self, id: &str) -> usize {
        self.dispatcher.cancel_deliveries(id).await
    }

    /// Wait for every running delivery chain to finish
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await
    }

    pub async fn active_chains(&self) -> usize {
        self.dispatcher.active_chains().await
    }
}
