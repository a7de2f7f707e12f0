use async_trait::async_trait;

use artiverse_shared::models::events::{ANALYTICS_TOPIC, ORDERS_TOPIC};
use artiverse_shared::{AnalyticsEvent, GalleryEvent};

use crate::CoreResult;

/// Outbound event bus
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()>;
}

/// Used when no broker is configured
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, topic: &str, key: &str, _payload: &str) -> CoreResult<()> {
        tracing::debug!("Event bus disabled, dropping {}/{}", topic, key);
        Ok(())
    }
}

pub async fn publish_gallery_event(publisher: &dyn EventPublisher, event: &GalleryEvent) -> CoreResult<()> {
    let payload = serde_json::to_string(event)?;
    publisher.publish(ORDERS_TOPIC, &event.order_id().to_string(), &payload).await
}

pub async fn publish_analytics_event(publisher: &dyn EventPublisher, event: &AnalyticsEvent) -> CoreResult<()> {
    let payload = serde_json::to_string(event)?;
    publisher.publish(ANALYTICS_TOPIC, &event.session_id, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()> {
            self.sent.lock().unwrap().push((topic.into(), key.into(), payload.into()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_gallery_event_goes_to_orders_topic() {
        use artiverse_shared::models::events::OrderPaidEvent;
        let order_id = uuid::Uuid::new_v4();
        let recorder = Recorder::default();
        let event = GalleryEvent::OrderPaid(OrderPaidEvent {
            order_id,
            order_number: "AG-1".into(),
            total_cents: 100,
            payment_reference: None,
            timestamp: 0,
        });

        publish_gallery_event(&recorder, &event).await.unwrap();
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].0, ORDERS_TOPIC);
        assert_eq!(sent[0].1, order_id.to_string());
        assert!(sent[0].2.contains("\"type\":\"order_paid\""));
    }

    #[tokio::test]
    async fn test_noop_publisher() {
        assert!(NoopPublisher.publish("t", "k", "{}").await.is_ok());
    }
}
