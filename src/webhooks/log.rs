// Per-subscription delivery audit log
//
// Append-only record of every delivery attempt, keyed by subscription id.
// Entries outlive the subscription they belong to and are never evicted.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::webhooks::error::DeliveryFailure;

/// Outcome of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failed,
}

/// One delivery attempt as recorded in the log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub status: AttemptStatus,
    /// `None` when no HTTP response was received; rendered as "N/A"
    #[serde(serialize_with = "serialize_status_code")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryLogEntry {
    /// Entry for a 2xx response
    pub fn success(event_type: &str, status_code: u16) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            status: AttemptStatus::Success,
            status_code: Some(status_code),
            error: None,
        }
    }

    /// Entry for a non-2xx response or a transport error
    pub fn failed(event_type: &str, failure: &DeliveryFailure) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            status: AttemptStatus::Failed,
            status_code: failure.status_code,
            error: Some(failure.message.clone()),
        }
    }
}

fn serialize_status_code<S: Serializer>(code: &Option<u16>, s: S) -> Result<S::Ok, S::Error> {
    match code {
        Some(code) => s.serialize_u16(*code),
        None => s.serialize_str("N/A"),
    }
}

/// Delivery log store
///
/// Cheap to clone; clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLog {
    entries: Arc<RwLock<HashMap<String, Vec<DeliveryLogEntry>>>>,
}

impl DeliveryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for a subscription, creating its log on first use
    pub async fn append(&self, subscription_id: &str, entry: DeliveryLogEntry) {
        let mut entries = self.entries.write().await;
        entries
            .entry(subscription_id.to_string())
            .or_default()
            .push(entry);
    }

    /// All entries for a subscription in append order
    ///
    /// Unknown ids yield an empty list; the log does not consult the registry.
    pub async fn query(&self, subscription_id: &str) -> Vec<DeliveryLogEntry> {
        let entries = self.entries.read().await;
        entries.get(subscription_id).cloned().unwrap_or_default()
    }

    /// Number of entries recorded for a subscription
    pub async fn len_for(&self, subscription_id: &str) -> usize {
        let entries = self.entries.read().await;
        entries.get(subscription_id).map(Vec::len).unwrap_or(0)
    }
}
