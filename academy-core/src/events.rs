use async_trait::async_trait;
use tracing::warn;
use academy_shared::models::events::DomainEvent;

/// Outbound event bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Publish and log on failure; events are notifications, never part of the
/// write that triggered them.
pub async fn publish_or_log(publisher: &dyn EventPublisher, event: DomainEvent) {
    if let Err(e) = publisher.publish(&event).await {
        warn!("Failed to publish {} event: {}", event.topic(), e);
    }
}
