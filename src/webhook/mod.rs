//! Webhook Dispatcher — signed, at-least-once delivery with backoff.

mod dispatcher;
mod signature;

pub use dispatcher::{DeliveryReport, WebhookDispatcher};
pub use signature::{canonical_bytes, sign, verify};
