// Webhook delivery worker
//
// One worker drives one delivery chain: sign, send, log, and on failure wait
// out the backoff and try again until the retry budget is spent. Every
// attempt produces exactly one log entry.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::webhooks::error::DeliveryFailure;
use crate::webhooks::log::{DeliveryLog, DeliveryLogEntry};
use crate::webhooks::registry::Subscription;
use crate::webhooks::retry::{calculate_retry_delay, RetryConfig, RetryDecision};
use crate::webhooks::signing::{
    canonical_json, sign_bytes, signature_header_value, EVENT_TYPE_HEADER, SIGNATURE_HEADER,
};

/// A fully prepared outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub event_type: String,
    /// Canonical JSON payload
    pub body: Vec<u8>,
    /// `sha256=<hex>`, absent when the subscription has no secret
    pub signature: Option<String>,
}

/// Sends prepared requests to subscriber endpoints
///
/// `Ok` carries the status of any HTTP response, successful or not. `Err`
/// means no response was received at all.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<u16, DeliveryFailure>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hookrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<u16, DeliveryFailure> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .header(EVENT_TYPE_HEADER, &request.event_type);

        if let Some(signature) = &request.signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }

        match builder.body(request.body.clone()).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) => Err(DeliveryFailure::transport(e.to_string())),
        }
    }
}

/// Delivery chain state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// About to make this attempt
    Pending { attempt: u32 },
    /// Last attempt failed; `next_attempt` starts after `delay`
    RetryScheduled { next_attempt: u32, delay: Duration },
    /// Endpoint accepted the delivery on this attempt
    Success { attempt: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
    /// Chain was cancelled before this attempt started
    Cancelled { attempt: u32 },
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Success { .. }
                | DeliveryState::Exhausted { .. }
                | DeliveryState::Cancelled { .. }
        )
    }
}

/// Everything a worker needs besides the subscription and event
#[derive(Clone)]
pub struct DeliveryContext {
    pub transport: Arc<dyn DeliveryTransport>,
    pub log: DeliveryLog,
    pub retry: RetryConfig,
}

/// Drives a single delivery chain
pub struct DeliveryAttemptWorker {
    subscription: Subscription,
    event_type: String,
    payload: Arc<Value>,
    context: DeliveryContext,
    cancel: CancellationToken,
}

impl DeliveryAttemptWorker {
    pub fn new(
        subscription: Subscription,
        event_type: String,
        payload: Arc<Value>,
        context: DeliveryContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            subscription,
            event_type,
            payload,
            context,
            cancel,
        }
    }

    /// Build the request for an attempt
    ///
    /// Called once per attempt; the signature is recomputed every time.
    pub fn prepare_request(&self) -> OutboundRequest {
        let body = canonical_json(&self.payload);
        let signature = if self.subscription.secret.is_empty() {
            None
        } else {
            Some(signature_header_value(&sign_bytes(
                &body,
                &self.subscription.secret,
            )))
        };

        OutboundRequest {
            url: self.subscription.url.clone(),
            event_type: self.event_type.clone(),
            body,
            signature,
        }
    }

    /// Make one attempt, record it, and decide the next state
    pub async fn attempt(&self, attempt: u32) -> DeliveryState {
        let id = &self.subscription.id;
        let request = self.prepare_request();

        debug!(
            subscription_id = %id,
            event_type = %self.event_type,
            attempt,
            "Webhook delivery attempt"
        );

        let failure = match self.context.transport.send(&request).await {
            Ok(status) if (200..300).contains(&status) => {
                self.context
                    .log
                    .append(id, DeliveryLogEntry::success(&self.event_type, status))
                    .await;
                metrics::DELIVERY_ATTEMPTS_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                info!(
                    subscription_id = %id,
                    event_type = %self.event_type,
                    attempt,
                    status_code = status,
                    "Webhook delivered"
                );
                return DeliveryState::Success { attempt };
            }
            Ok(status) => DeliveryFailure::status(status),
            Err(failure) => failure,
        };

        self.context
            .log
            .append(id, DeliveryLogEntry::failed(&self.event_type, &failure))
            .await;
        metrics::DELIVERY_ATTEMPTS_TOTAL
            .with_label_values(&["failed"])
            .inc();
        warn!(
            subscription_id = %id,
            event_type = %self.event_type,
            attempt,
            status_code = ?failure.status_code,
            error = %failure.message,
            "Webhook delivery attempt failed"
        );

        match calculate_retry_delay(attempt, &self.context.retry) {
            RetryDecision::Retry(delay) => DeliveryState::RetryScheduled {
                next_attempt: attempt + 1,
                delay,
            },
            RetryDecision::GiveUp => DeliveryState::Exhausted { attempts: attempt },
        }
    }

    /// Run the chain to a terminal state
    pub async fn run(self) -> DeliveryState {
        let mut state = DeliveryState::Pending { attempt: 1 };

        loop {
            state = match state {
                DeliveryState::Pending { attempt } => {
                    if self.cancel.is_cancelled() {
                        DeliveryState::Cancelled { attempt }
                    } else {
                        self.attempt(attempt).await
                    }
                }
                DeliveryState::RetryScheduled {
                    next_attempt,
                    delay,
                } => {
                    debug!(
                        subscription_id = %self.subscription.id,
                        next_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retry scheduled"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => DeliveryState::Cancelled { attempt: next_attempt },
                        _ = tokio::time::sleep(delay) => DeliveryState::Pending { attempt: next_attempt },
                    }
                }
                terminal => {
                    self.finish(terminal);
                    return terminal;
                }
            };
        }
    }

    fn finish(&self, state: DeliveryState) {
        let outcome = match state {
            DeliveryState::Success { .. } => "success",
            DeliveryState::Exhausted { attempts } => {
                warn!(
                    subscription_id = %self.subscription.id,
                    event_type = %self.event_type,
                    attempts,
                    "Webhook delivery exhausted retries"
                );
                "exhausted"
            }
            DeliveryState::Cancelled { attempt } => {
                info!(
                    subscription_id = %self.subscription.id,
                    event_type = %self.event_type,
                    attempt,
                    "Webhook delivery cancelled"
                );
                "cancelled"
            }
            _ => return,
        };
        metrics::DELIVERY_CHAINS_TOTAL
            .with_label_values(&[outcome])
            .inc();
    }
}
