use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider-side state of a payment intent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String, // provider's id, e.g. pi_123
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub reference: Option<String>,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Unknown payment intent: {0}")]
    UnknownIntent(String),
    #[error("Payment gateway failure: {0}")]
    Gateway(String),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create a payment intent with the provider
    async fn create_intent(&self, order_id: Uuid, amount_cents: i64, currency: &str) -> PaymentResult<PaymentIntent>;

    /// Retrieve intent status
    async fn get_intent(&self, intent_id: &str) -> PaymentResult<PaymentIntent>;

    /// Charge the intent with a client-side payment token
    async fn process_payment(&self, intent: &PaymentIntent, payment_token: &str) -> PaymentResult<IntentStatus>;
}

pub fn intent_id_for(order_id: Uuid) -> String {
    format!("pi_{}", order_id.simple())
}

pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>) -> Self {
        Self { adapter }
    }

    /// Initialize a payment intent for an order
    pub async fn initialize_payment(&self, order_id: Uuid, amount_cents: i64, currency: &str) -> PaymentResult<PaymentIntent> {
        self.adapter.create_intent(order_id, amount_cents, currency).await
    }

    /// Re-read an intent after a provider notification
    pub async fn process_status_update(&self, intent_id: &str) -> PaymentResult<PaymentIntent> {
        self.adapter.get_intent(intent_id).await
    }

    pub async fn process_payment(&self, intent: &PaymentIntent, payment_token: &str) -> PaymentResult<IntentStatus> {
        let status = self.adapter.process_payment(intent, payment_token).await?;
        tracing::info!("Payment for order {} finished with {:?}", intent.order_id, status);
        Ok(status)
    }
}

/// In-process stand-in for a card processor.
///
/// Tokens: `tok_decline` is refused, `tok_pending` stays processing,
/// `tok_gateway_error` simulates an outage; anything else succeeds.
#[derive(Default)]
pub struct MockPaymentAdapter {
    intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PaymentResult<std::sync::MutexGuard<'_, HashMap<String, PaymentIntent>>> {
        self.intents.lock().map_err(|_| PaymentError::Gateway("mock ledger poisoned".into()))
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn create_intent(&self, order_id: Uuid, amount_cents: i64, currency: &str) -> PaymentResult<PaymentIntent> {
        let intent = PaymentIntent {
            id: intent_id_for(order_id),
            order_id,
            amount_cents,
            currency: currency.to_string(),
            status: IntentStatus::RequiresPaymentMethod,
            reference: None,
            client_secret: Some(format!("{}_secret", intent_id_for(order_id))),
            created_at: Utc::now(),
        };
        self.lock()?.insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> PaymentResult<PaymentIntent> {
        self.lock()?
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownIntent(intent_id.to_string()))
    }

    async fn process_payment(&self, intent: &PaymentIntent, payment_token: &str) -> PaymentResult<IntentStatus> {
        let status = match payment_token {
            "tok_gateway_error" => return Err(PaymentError::Gateway("simulated gateway outage".into())),
            "tok_decline" => IntentStatus::Failed,
            "tok_pending" => IntentStatus::Processing,
            _ => IntentStatus::Succeeded,
        };

        let mut intents = self.lock()?;
        let stored = intents.entry(intent.id.clone()).or_insert_with(|| intent.clone());
        stored.status = status;
        if status == IntentStatus::Succeeded {
            stored.reference = Some(format!("ch_{}", Uuid::new_v4().simple()));
        }
        Ok(status)
    }
}

impl MockPaymentAdapter {
    /// Settle an intent out of band, as a provider webhook would report it.
    pub fn settle(&self, intent_id: &str, status: IntentStatus) -> PaymentResult<()> {
        let mut intents = self.lock()?;
        let intent = intents
            .get_mut(intent_id)
            .ok_or_else(|| PaymentError::UnknownIntent(intent_id.to_string()))?;
        intent.status = status;
        if status == IntentStatus::Succeeded && intent.reference.is_none() {
            intent.reference = Some(format!("ch_{}", Uuid::new_v4().simple()));
        }
        Ok(())
    }
}
