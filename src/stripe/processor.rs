//! Routing of verified events to their handlers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::error::AppResult;
use crate::stripe::events::{EventKind, PaymentIntent, Subscription, WebhookEvent};

/// Keeps local subscription state in line with Stripe.
#[async_trait]
pub trait SubscriptionSync: Send + Sync {
    async fn sync(&self, event_id: &str, subscription: &Subscription) -> AppResult<()>;
}

#[async_trait]
pub trait PaymentHandler: Send + Sync {
    async fn payment_succeeded(&self, event_id: &str, intent: &PaymentIntent) -> AppResult<()>;
}

/// Records the payment in the log only; orders are not tracked here.
pub struct LoggingPaymentHandler;

#[async_trait]
impl PaymentHandler for LoggingPaymentHandler {
    async fn payment_succeeded(&self, event_id: &str, intent: &PaymentIntent) -> AppResult<()> {
        info!(
            event_id,
            payment_intent = %intent.id,
            amount = intent.amount,
            currency = %intent.currency,
            customer = ?intent.customer,
            "payment intent succeeded"
        );
        Ok(())
    }
}

/// What a dispatch call did with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    SubscriptionSynced,
    PaymentHandled,
    /// Unknown event type.
    Ignored,
    /// Known type, but `data.object` has a shape we do not read.
    PayloadNotHandled,
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    subscriptions: Arc<dyn SubscriptionSync>,
    payments: Arc<dyn PaymentHandler>,
}

impl WebhookDispatcher {
    pub fn new(subscriptions: Arc<dyn SubscriptionSync>, payments: Arc<dyn PaymentHandler>) -> Self {
        Self {
            subscriptions,
            payments,
        }
    }

    /// Runs at most one handler, once. Unknown kinds are acknowledged.
    #[instrument(skip_all, fields(event_id = %event.event_id, event_type = %event.kind.as_str()))]
    pub async fn dispatch(&self, event: &WebhookEvent) -> AppResult<Dispatched> {
        match &event.kind {
            EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated => {
                // Verified events are always acknowledged; a redelivery would
                // carry the same shape.
                let subscription: Subscription = match serde_json::from_value(event.payload.clone()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "subscription payload shape not handled");
                        return Ok(Dispatched::PayloadNotHandled);
                    }
                };
                info!(subscription_id = %subscription.id, "processing subscription event");
                self.subscriptions.sync(&event.event_id, &subscription).await?;
                Ok(Dispatched::SubscriptionSynced)
            }
            EventKind::PaymentIntentSucceeded => {
                let intent: PaymentIntent = match serde_json::from_value(event.payload.clone()) {
                    Ok(i) => i,
                    Err(e) => {
                        warn!(error = %e, "payment intent payload shape not handled");
                        return Ok(Dispatched::PayloadNotHandled);
                    }
                };
                self.payments.payment_succeeded(&event.event_id, &intent).await?;
                Ok(Dispatched::PaymentHandled)
            }
            EventKind::Unknown(kind) => {
                warn!(event_type = %kind, "unhandled event type");
                Ok(Dispatched::Ignored)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Records every call so tests can count side effects.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub subscriptions: Mutex<Vec<String>>,
        pub payments: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl SubscriptionSync for RecordingHandler {
        async fn sync(&self, _event_id: &str, subscription: &Subscription) -> AppResult<()> {
            self.subscriptions.lock().unwrap().push(subscription.id.clone());
            if self.fail {
                return Err(AppError::Store("unavailable".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PaymentHandler for RecordingHandler {
        async fn payment_succeeded(&self, _event_id: &str, intent: &PaymentIntent) -> AppResult<()> {
            self.payments.lock().unwrap().push(intent.id.clone());
            Ok(())
        }
    }

    pub fn dispatcher(handler: &Arc<RecordingHandler>) -> WebhookDispatcher {
        WebhookDispatcher::new(handler.clone(), handler.clone())
    }
}
