// Webhook subscription registry
//
// Owns the id -> subscription map. All mutation goes through the operations
// below; readers get cloned snapshots, never references into the map.

use prometheus::IntGauge;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::metrics;
use crate::webhooks::error::{WebhookError, WebhookResult};

/// A registered subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Registry-generated id
    pub id: String,
    /// Destination endpoint
    pub url: String,
    /// Event types this subscription receives (never empty)
    pub event_types: BTreeSet<String>,
    /// HMAC key; empty disables signing
    pub secret: String,
}

impl Subscription {
    /// Check if this subscription should receive an event
    pub fn handles_event(&self, event_type: &str) -> bool {
        self.event_types.contains(event_type)
    }

    /// Public view without the secret
    pub fn summary(&self) -> SubscriptionSummary {
        SubscriptionSummary {
            id: self.id.clone(),
            url: self.url.clone(),
            event_types: self.event_types.clone(),
        }
    }
}

/// Subscription as returned by register and list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub id: String,
    pub url: String,
    pub event_types: BTreeSet<String>,
}

/// Result of an update: `{id, url, secret}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedSubscription {
    pub id: String,
    pub url: String,
    pub secret: String,
}

/// Caller-supplied subscription fields, validated by the registry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub url: Option<String>,
    #[serde(alias = "events")]
    pub event_types: Option<Vec<String>>,
    pub secret: Option<String>,
}

impl SubscriptionRequest {
    pub fn new(url: &str, event_types: &[&str], secret: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            event_types: Some(event_types.iter().map(|s| s.to_string()).collect()),
            secret: Some(secret.to_string()),
        }
    }
}

struct StoredSubscription {
    seq: u64,
    subscription: Subscription,
}

/// In-memory subscription registry
///
/// Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct WebhookRegistry {
    subscriptions: Arc<RwLock<HashMap<String, StoredSubscription>>>,
    next_seq: Arc<AtomicU64>,
    size_gauge: IntGauge,
}

impl Default for WebhookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookRegistry {
    /// Create an empty registry reporting to the process-wide gauge
    pub fn new() -> Self {
        Self::with_size_gauge(metrics::REGISTERED_SUBSCRIPTIONS.clone())
    }

    /// Create an empty registry whose size is mirrored into `gauge`
    ///
    /// The gauge is written while the map is still locked.
    pub fn with_size_gauge(gauge: IntGauge) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            next_seq: Arc::new(AtomicU64::new(0)),
            size_gauge: gauge,
        }
    }

    /// Register a new subscription
    ///
    /// Requires a non-empty url, at least one event type and a non-empty secret.
    pub async fn register(&self, request: SubscriptionRequest) -> WebhookResult<Subscription> {
        let url = validate_url(request.url.as_deref())?;
        let event_types = validate_event_types(request.event_types)?;
        let secret = match request.secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => return Err(WebhookError::invalid("secret is required")),
        };

        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            url,
            event_types,
            secret,
        };

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(
            subscription.id.clone(),
            StoredSubscription {
                seq,
                subscription: subscription.clone(),
            },
        );
        self.size_gauge.set(subscriptions.len() as i64);

        info!(
            subscription_id = %subscription.id,
            url = %subscription.url,
            event_types = ?subscription.event_types,
            "Registered webhook"
        );
        Ok(subscription)
    }

    /// List subscriptions in registration order, without secrets
    pub async fn list(&self) -> Vec<SubscriptionSummary> {
        self.ordered()
            .await
            .iter()
            .map(Subscription::summary)
            .collect()
    }

    /// Replace url, event types and secret of an existing subscription
    ///
    /// The secret may be empty here, which turns signing off for the
    /// subscription.
    pub async fn update(
        &self,
        id: &str,
        request: SubscriptionRequest,
    ) -> WebhookResult<UpdatedSubscription> {
        let mut subscriptions = self.subscriptions.write().await;
        let stored = subscriptions
            .get_mut(id)
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;

        let url = validate_url(request.url.as_deref())?;
        let event_types = validate_event_types(request.event_types)?;
        let secret = request.secret.unwrap_or_default();

        stored.subscription = Subscription {
            id: id.to_string(),
            url,
            event_types,
            secret,
        };

        let updated = &stored.subscription;
        info!(
            subscription_id = %id,
            url = %updated.url,
            signing = !updated.secret.is_empty(),
            "Updated webhook"
        );
        Ok(UpdatedSubscription {
            id: updated.id.clone(),
            url: updated.url.clone(),
            secret: updated.secret.clone(),
        })
    }

    /// Delete a subscription
    ///
    /// Deleting an id that is already gone is an error, not a no-op.
    pub async fn remove(&self, id: &str) -> WebhookResult<()> {
        let mut subscriptions = self.subscriptions.write().await;
        match subscriptions.remove(id) {
            Some(_) => {
                self.size_gauge.set(subscriptions.len() as i64);
                info!(subscription_id = %id, "Removed webhook");
                Ok(())
            }
            None => Err(WebhookError::NotFound(id.to_string())),
        }
    }

    /// Get a subscription by id, secret included
    pub async fn get(&self, id: &str) -> Option<Subscription> {
        let subscriptions = self.subscriptions.read().await;
        subscriptions.get(id).map(|s| s.subscription.clone())
    }

    /// Full copy of every subscription, used by the dispatcher at fan-out time
    pub async fn snapshot(&self) -> Vec<Subscription> {
        self.ordered().await
    }

    /// Number of registered subscriptions
    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn ordered(&self) -> Vec<Subscription> {
        let subscriptions = self.subscriptions.read().await;
        let mut stored: Vec<&StoredSubscription> = subscriptions.values().collect();
        stored.sort_by_key(|s| s.seq);
        debug!("Registry snapshot with {} subscriptions", stored.len());
        stored.into_iter().map(|s| s.subscription.clone()).collect()
    }
}

fn validate_url(url: Option<&str>) -> WebhookResult<String> {
    let url = match url {
        Some(url) if !url.trim().is_empty() => url.trim(),
        _ => return Err(WebhookError::invalid("url is required")),
    };

    let parsed =
        Url::parse(url).map_err(|e| WebhookError::invalid(format!("url is not valid: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(WebhookError::invalid(format!(
            "url scheme must be http or https, got {}",
            other
        ))),
    }
}

fn validate_event_types(event_types: Option<Vec<String>>) -> WebhookResult<BTreeSet<String>> {
    let event_types = event_types.unwrap_or_default();
    if event_types.is_empty() {
        return Err(WebhookError::invalid("eventTypes must be a non-empty list"));
    }
    if event_types.iter().any(|t| t.trim().is_empty()) {
        return Err(WebhookError::invalid("eventTypes must not contain blank entries"));
    }
    Ok(event_types.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn request() -> SubscriptionRequest {
        SubscriptionRequest::new("https://ex.com/hook", &["order.created"], "s3cr3t")
    }

    #[tokio::test]
    async fn test_register_returns_stored_fields() {
        let registry = WebhookRegistry::new();
        let sub = registry.register(request()).await.unwrap();

        assert!(!sub.id.is_empty());
        assert_eq!(sub.url, "https://ex.com/hook");
        assert!(sub.handles_event("order.created"));
        assert_eq!(registry.get(&sub.id).await, Some(sub));
    }

    #[tokio::test]
    async fn test_register_ids_are_unique() {
        let registry = WebhookRegistry::new();
        let mut ids = HashSet::new();
        for _ in 0..100 {
            let sub = registry.register(request()).await.unwrap();
            assert!(ids.insert(sub.id));
        }
        assert_eq!(registry.len().await, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_size_gauge_tracks_concurrent_changes() {
        let gauge = IntGauge::new("test_registry_size", "registry size").unwrap();
        let registry = WebhookRegistry::with_size_gauge(gauge.clone());

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.register(request()).await.unwrap() })
            })
            .collect();
        let mut subs = Vec::new();
        for handle in handles {
            subs.push(handle.await.unwrap());
        }
        assert_eq!(gauge.get(), 50);

        let handles: Vec<_> = subs
            .into_iter()
            .take(20)
            .map(|sub| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.remove(&sub.id).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(gauge.get(), 30);
        assert_eq!(registry.len().await as i64, gauge.get());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_input() {
        let registry = WebhookRegistry::new();

        let cases = vec![
            SubscriptionRequest { url: None, ..request() },
            SubscriptionRequest { url: Some(String::new()), ..request() },
            SubscriptionRequest { url: Some("not a url".to_string()), ..request() },
            SubscriptionRequest { url: Some("ftp://ex.com/hook".to_string()), ..request() },
            SubscriptionRequest { event_types: None, ..request() },
            SubscriptionRequest { event_types: Some(vec![]), ..request() },
            SubscriptionRequest { event_types: Some(vec![" ".to_string()]), ..request() },
            SubscriptionRequest { secret: None, ..request() },
            SubscriptionRequest { secret: Some(String::new()), ..request() },
        ];

        for case in cases {
            let err = registry.register(case.clone()).await.unwrap_err();
            assert!(matches!(err, WebhookError::InvalidInput(_)), "{:?}", case);
        }
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_event_types_collapse_duplicates() {
        let registry = WebhookRegistry::new();
        let sub = registry
            .register(SubscriptionRequest::new(
                "https://ex.com/hook",
                &["b", "a", "b"],
                "s",
            ))
            .await
            .unwrap();
        let types: Vec<&String> = sub.event_types.iter().collect();
        assert_eq!(types, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_hides_secrets_and_keeps_order() {
        let registry = WebhookRegistry::new();
        let first = registry.register(request()).await.unwrap();
        let second = registry
            .register(SubscriptionRequest::new("https://ex.com/2", &["a"], "s"))
            .await
            .unwrap();

        let list = registry.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, first.id);
        assert_eq!(list[1].id, second.id);

        let json = serde_json::to_value(&list).unwrap();
        assert!(json[0].get("secret").is_none());
        assert_eq!(json[0]["eventTypes"][0], "order.created");
    }

    #[tokio::test]
    async fn test_list_after_registrations_and_deletions() {
        let registry = WebhookRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(registry.register(request()).await.unwrap().id);
        }
        registry.remove(&ids[1]).await.unwrap();
        registry.remove(&ids[3]).await.unwrap();

        let list = registry.list().await;
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|s| s.id != ids[1] && s.id != ids[3]));
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let registry = WebhookRegistry::new();
        let sub = registry.register(request()).await.unwrap();

        let updated = registry
            .update(
                &sub.id,
                SubscriptionRequest::new("https://ex.com/new", &["order.paid"], "rotated"),
            )
            .await
            .unwrap();
        assert_eq!(updated.id, sub.id);
        assert_eq!(updated.url, "https://ex.com/new");
        assert_eq!(updated.secret, "rotated");

        let stored = registry.get(&sub.id).await.unwrap();
        assert!(stored.handles_event("order.paid"));
        assert!(!stored.handles_event("order.created"));
    }

    #[tokio::test]
    async fn test_update_allows_empty_secret() {
        let registry = WebhookRegistry::new();
        let sub = registry.register(request()).await.unwrap();

        let updated = registry
            .update(
                &sub.id,
                SubscriptionRequest { secret: None, ..request() },
            )
            .await
            .unwrap();
        assert_eq!(updated.secret, "");
    }

    #[tokio::test]
    async fn test_update_errors() {
        let registry = WebhookRegistry::new();
        let err = registry.update("missing", request()).await.unwrap_err();
        assert_eq!(err, WebhookError::NotFound("missing".to_string()));

        let sub = registry.register(request()).await.unwrap();
        let err = registry
            .update(
                &sub.id,
                SubscriptionRequest { event_types: Some(vec![]), ..request() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidInput(_)));

        // Failed update leaves the record untouched
        assert_eq!(registry.get(&sub.id).await, Some(sub));
    }

    #[tokio::test]
    async fn test_remove_twice_is_not_found() {
        let registry = WebhookRegistry::new();
        let sub = registry.register(request()).await.unwrap();

        registry.remove(&sub.id).await.unwrap();
        assert!(registry.get(&sub.id).await.is_none());
        assert_eq!(
            registry.remove(&sub.id).await,
            Err(WebhookError::NotFound(sub.id.clone()))
        );
    }
}
