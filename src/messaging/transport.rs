use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::utils::{CircuitState, IsTransient};

// ============================================================================
// Channel Transport - publish/subscribe seam
// ============================================================================
//
// Neither ordering nor exactly-once delivery is promised. Consumers must treat
// every message as possibly late or repeated.
//
// ============================================================================

/// Capacity of the per-subscription delivery queue
pub const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    #[error("Channel circuit breaker is open")]
    CircuitOpen,

    #[error("Message rejected by channel: {0}")]
    Rejected(String),

    #[error("Channel closed")]
    Closed,
}

impl IsTransient for ChannelError {
    fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Unavailable(_) | ChannelError::CircuitOpen)
    }
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), ChannelError>;

    /// Start delivering messages from `topics`; dropping the receiver ends it
    async fn subscribe(&self, topics: &[String]) -> Result<mpsc::Receiver<ChannelMessage>, ChannelError>;

    async fn circuit_state(&self) -> CircuitState {
        CircuitState::Closed
    }

    fn name(&self) -> &'static str;
}
