//! Typed view of verified Stripe webhook events.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Event types with a dedicated handler. Everything else is `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    PaymentIntentSucceeded,
    Unknown(String),
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::Unknown(s) => s,
        }
    }
}

/// Envelope as sent on the wire; only the parts we read.
#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: Value,
}

/// A verified event. `payload` is the event's `data.object`.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_id: String,
    pub kind: EventKind,
    pub payload: Value,
}

impl WebhookEvent {
    /// Only call on bytes whose signature has already been checked.
    pub(crate) fn from_verified_bytes(bytes: &[u8]) -> AppResult<Self> {
        let raw: RawEvent = serde_json::from_slice(bytes).map_err(|_| AppError::InvalidPayload)?;
        Ok(Self {
            event_id: raw.id,
            kind: EventKind::parse(&raw.event_type),
            payload: raw.data.object,
        })
    }
}

/// Fields of a Stripe subscription object kept in sync locally.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
}
