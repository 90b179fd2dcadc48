use async_trait::async_trait;
use academy_core::events::EventPublisher;
use academy_shared::models::events::DomainEvent;

use crate::redis_repo::RedisClient;

/// Publishes domain events on Redis channels named after their topic.
#[derive(Clone)]
pub struct RedisEventPublisher {
    redis: RedisClient,
}

impl RedisEventPublisher {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        self.redis.publish(event.topic(), &payload).await?;
        Ok(())
    }
}

#[cfg(feature = "kafka")]
pub use kafka::EventProducer;

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::{error, info};

    #[derive(Clone)]
    pub struct EventProducer {
        producer: FutureProducer,
    }

    impl EventProducer {
        pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self { producer })
        }

        pub async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
            let record = FutureRecord::to(topic).key(key).payload(payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!(
                        "Sent message to {}/{}: partition {} offset {}",
                        topic, key, delivery.partition, delivery.offset
                    );
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", topic, e);
                    Err(e)
                }
            }
        }
    }

    #[async_trait]
    impl EventPublisher for EventProducer {
        async fn publish(&self, event: &DomainEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let payload = serde_json::to_string(event)?;
            self.send(event.topic(), &event.key(), &payload).await?;
            Ok(())
        }
    }
}
