// Webhook relay core
//
// Handles:
// - Subscription registration and management
// - Event fan-out to matching subscriptions
// - Signed delivery with exponential backoff retries
// - Per-subscription delivery history

pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod log;
pub mod registry;
pub mod retry;
pub mod service;
pub mod signing;

pub use delivery::{DeliveryAttemptWorker, DeliveryState, DeliveryTransport, HttpTransport, OutboundRequest};
pub use dispatcher::{DispatchReceipt, EventDispatcher};
pub use error::{DeliveryFailure, WebhookError, WebhookResult};
pub use log::{AttemptStatus, DeliveryLog, DeliveryLogEntry};
pub use registry::{Subscription, SubscriptionRequest, SubscriptionSummary, UpdatedSubscription, WebhookRegistry};
pub use retry::{calculate_retry_delay, RetryConfig, RetryDecision};
pub use service::WebhookService;
