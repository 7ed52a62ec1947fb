use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Message;
use std::time::Duration;
use tokio::sync::mpsc;

use super::transport::{ChannelError, ChannelMessage, ChannelTransport, SUBSCRIPTION_BUFFER};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Redpanda Channel
// ============================================================================
//
// Kafka topic names cannot contain '/', so `command/vm_001` travels as
// `command.vm_001` and is mapped back on consumption. Publishes go through a
// circuit breaker; subscriptions run one consumer task each.
//
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaChannel {
    producer: FutureProducer,
    brokers: String,
    group_id: String,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaChannel {
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, ChannelError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| ChannelError::Unavailable(format!("producer init failed: {}", e)))?;

        let breaker_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
            group_id: group_id.to_string(),
            circuit_breaker: CircuitBreaker::new("redpanda", breaker_config),
        })
    }

    fn consumer(&self) -> Result<StreamConsumer, ChannelError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| ChannelError::Unavailable(format!("consumer init failed: {}", e)))
    }
}

#[async_trait]
impl ChannelTransport for RedpandaChannel {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), ChannelError> {
        let broker_topic = to_broker_topic(topic);

        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&broker_topic).key(key).payload(payload);
                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(topic = %broker_topic, key = %key, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %broker_topic, "Circuit breaker open - Redpanda unavailable");
                Err(ChannelError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %broker_topic, "Failed to publish to Redpanda");
                Err(classify_kafka_error(e))
            }
        }
    }

    async fn subscribe(&self, topics: &[String]) -> Result<mpsc::Receiver<ChannelMessage>, ChannelError> {
        let consumer = self.consumer()?;
        let broker_topics: Vec<String> = topics.iter().map(|t| to_broker_topic(t)).collect();
        let topic_refs: Vec<&str> = broker_topics.iter().map(String::as_str).collect();

        consumer
            .subscribe(&topic_refs)
            .map_err(|e| ChannelError::Unavailable(format!("subscribe failed: {}", e)))?;

        tracing::info!(topics = ?broker_topics, group_id = %self.group_id, "Subscribed to Redpanda");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                let message = match consumer.recv().await {
                    Ok(m) => ChannelMessage {
                        topic: from_broker_topic(m.topic()),
                        key: m.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                        payload: m.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Redpanda consumer error");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                };

                if tx.send(message).await.is_err() {
                    tracing::info!("Redpanda subscription dropped, stopping consumer");
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    fn name(&self) -> &'static str {
        "redpanda"
    }
}

pub fn to_broker_topic(topic: &str) -> String {
    topic.replacen('/', ".", 1)
}

pub fn from_broker_topic(topic: &str) -> String {
    topic.replacen('.', "/", 1)
}

/// Errors the broker will keep returning for the same message are permanent
fn classify_kafka_error(err: KafkaError) -> ChannelError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageSizeTooLarge)
        | Some(RDKafkaErrorCode::InvalidMessage)
        | Some(RDKafkaErrorCode::InvalidTopic)
        | Some(RDKafkaErrorCode::TopicAuthorizationFailed) => ChannelError::Rejected(err.to_string()),
        _ => ChannelError::Unavailable(err.to_string()),
    }
}
