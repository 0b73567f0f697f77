use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::stripe::{events::Subscription, processor::SubscriptionSync};

#[derive(Clone)]
pub struct PgSubscriptionStore {
    db: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriptionSync for PgSubscriptionStore {
    /// Upsert by Stripe subscription id.
    async fn sync(&self, event_id: &str, subscription: &Subscription) -> AppResult<()> {
        let period_end = match subscription.current_period_end {
            Some(ts) => match OffsetDateTime::from_unix_timestamp(ts) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(error = %e, ts, "current_period_end out of range");
                    None
                }
            },
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (stripe_subscription_id, stripe_customer_id, status,
                 current_period_end, cancel_at_period_end, last_event_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                last_event_id = EXCLUDED.last_event_id,
                updated_at = now()
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.customer)
        .bind(&subscription.status)
        .bind(period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(event_id)
        .execute(&self.db)
        .await?;

        debug!(subscription_id = %subscription.id, status = %subscription.status, "subscription synced");
        Ok(())
    }
}
