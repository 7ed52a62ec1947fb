use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

use super::transport::{ChannelError, ChannelMessage, ChannelTransport, SUBSCRIPTION_BUFFER};

// ============================================================================
// In-process Channel
// ============================================================================
//
// Broadcast bus for tests and the single-binary demo. The most recent
// published messages are also kept in a bounded log so tests can assert on
// what went out. Outages can be simulated with `set_offline` or
// `fail_next_publishes`.
//
// ============================================================================

const BUS_CAPACITY: usize = 1024;
/// Oldest entries are evicted once the publish log is full
const PUBLISHED_LOG_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct InProcessChannel {
    bus: broadcast::Sender<ChannelMessage>,
    published: Arc<Mutex<VecDeque<ChannelMessage>>>,
    offline: Arc<AtomicBool>,
    failures_to_inject: Arc<AtomicU32>,
}

impl Default for InProcessChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessChannel {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            bus,
            published: Arc::new(Mutex::new(VecDeque::with_capacity(PUBLISHED_LOG_CAPACITY))),
            offline: Arc::new(AtomicBool::new(false)),
            failures_to_inject: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `count` publishes fail with `Unavailable`
    pub fn fail_next_publishes(&self, count: u32) {
        self.failures_to_inject.store(count, Ordering::SeqCst);
    }

    /// Retained messages published to `topic`, oldest first
    pub async fn published_on(&self, topic: &str) -> Vec<ChannelMessage> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChannelTransport for InProcessChannel {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), ChannelError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable("in-process channel offline".to_string()));
        }
        if self.take_injected_failure() {
            return Err(ChannelError::Unavailable("injected publish failure".to_string()));
        }

        let message = ChannelMessage {
            topic: topic.to_string(),
            key: Some(key.to_string()),
            payload: payload.to_vec(),
        };
        {
            let mut published = self.published.lock().await;
            if published.len() == PUBLISHED_LOG_CAPACITY {
                published.pop_front();
            }
            published.push_back(message.clone());
        }

        // No subscribers yet is not an error for a pub/sub bus
        let _ = self.bus.send(message);
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<mpsc::Receiver<ChannelMessage>, ChannelError> {
        let mut bus_rx = self.bus.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let topics = topics.to_vec();

        tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(message) => {
                        if !topics.contains(&message.topic) {
                            continue;
                        }
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "In-process subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "in_process"
    }
}
