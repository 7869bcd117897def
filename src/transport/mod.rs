#![forbid(unsafe_code)]

// Transport boundary - the pub/sub channel abstraction the harness drives

pub mod protocol;
pub mod ws;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to establish channel {channel:?}: {source}")]
    Connect {
        channel: String,
        #[source]
        source: anyhow::Error,
    },
    /// The remote peer never acknowledged an emitted operation. Surfacing
    /// this instead of hanging keeps sample pairings from stalling forever.
    #[error("no acknowledgement for {event:?} within {timeout_ms}ms")]
    AckTimeout { event: String, timeout_ms: u64 },
    #[error("channel closed before acknowledgement for {event:?}")]
    ChannelClosed { event: String },
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Inbound push delivered on a channel.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

/// One established logical channel (the admin channel or a per-debate room).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Emits `event` with `payload` and waits for the single acknowledgement
    /// the remote peer returns, bounded by the transport's ack timeout.
    async fn request(&self, event: &str, payload: Value) -> Result<Value, TransportError>;

    async fn close(&self);
}

/// An established channel plus the receiving end of its inbound event queue.
pub struct ChannelHandle {
    pub channel: Arc<dyn Channel>,
    pub events: mpsc::UnboundedReceiver<Event>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the named logical channel, returning once the connection is
    /// established.
    async fn connect(
        &self,
        channel_id: &str,
        query: &[(&str, String)],
    ) -> Result<ChannelHandle, TransportError>;
}
