//! hookrelay
//!
//! Webhook delivery engine: subscribers register an endpoint for a set of
//! event types, submitted events fan out to every matching subscriber as
//! HMAC-signed HTTP POSTs, failed deliveries are retried with exponential
//! backoff, and every attempt is recorded in a per-subscription log.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod webhooks;
