#![forbid(unsafe_code)]

// WebSocket transport - one socket per logical channel, JSON frame envelope

use crate::transport::protocol::Frame;
use crate::transport::{Channel, ChannelHandle, Event, Transport, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Connects logical channels over one WebSocket each, mounted under the
/// configured path: `{url}{path}/{channel_id}?k=v`.
pub struct WsTransport {
    base_url: String,
    path: String,
    ack_timeout: Duration,
}

impl WsTransport {
    pub fn new(base_url: String, path: String, ack_timeout: Duration) -> Self {
        Self {
            base_url,
            path,
            ack_timeout,
        }
    }

    fn channel_url(&self, channel_id: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}{}/{}", self.base_url, self.path, channel_id);
        if !query.is_empty() {
            let encoded: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            url.push('?');
            url.push_str(&encoded.join("&"));
        }
        url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        channel_id: &str,
        query: &[(&str, String)],
    ) -> Result<ChannelHandle, TransportError> {
        let url = self.channel_url(channel_id, query);
        let (stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    channel: channel_id.to_string(),
                    source: e.into(),
                })?;
        debug!("channel {channel_id} established");

        let (sink, read) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(write_loop(sink, outbound_rx));
        tokio::spawn(read_loop(
            read,
            pending.clone(),
            events_tx,
            channel_id.to_string(),
        ));

        let channel = WsChannel {
            outbound: outbound_tx,
            pending,
            next_id: AtomicU64::new(1),
            ack_timeout: self.ack_timeout,
        };
        Ok(ChannelHandle {
            channel: Arc::new(channel),
            events: events_rx,
        })
    }
}

struct WsChannel {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingAcks,
    next_id: AtomicU64,
    ack_timeout: Duration,
}

#[async_trait]
impl Channel for WsChannel {
    async fn request(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::Request {
            id,
            event: event.to_string(),
            payload,
        };
        let text = serde_json::to_string(&frame)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.insert(id, ack_tx);
        }

        if self.outbound.send(Message::Text(text.into())).is_err() {
            self.forget(id);
            return Err(TransportError::ChannelClosed {
                event: event.to_string(),
            });
        }

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(TransportError::ChannelClosed {
                event: event.to_string(),
            }),
            Err(_) => {
                self.forget(id);
                Err(TransportError::AckTimeout {
                    event: event.to_string(),
                    timeout_ms: self.ack_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }
}

impl WsChannel {
    fn forget(&self, id: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.remove(&id);
    }
}

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        Message,
    >,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
}

async fn read_loop(
    mut read: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
    pending: PendingAcks,
    events: mpsc::UnboundedSender<Event>,
    channel_id: String,
) {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                Ok(Frame::Ack { id, payload }) => {
                    let waiter = {
                        let mut pending =
                            pending.lock().unwrap_or_else(PoisonError::into_inner);
                        pending.remove(&id)
                    };
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(payload);
                        }
                        // timed-out request, or a peer acking twice
                        None => debug!("{channel_id}: dropping unexpected ack {id}"),
                    }
                }
                Ok(Frame::Event { event, payload }) => {
                    if events.send(Event {
                        name: event,
                        payload,
                    })
                    .is_err()
                    {
                        break;
                    }
                }
                Ok(Frame::Request { id, .. }) => {
                    warn!("{channel_id}: peer sent a request frame (id {id}), ignoring");
                }
                Err(e) => warn!("{channel_id}: failed to parse frame: {e}"),
            },
            Ok(Message::Close(_)) => {
                debug!("{channel_id}: server closed the channel");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("{channel_id}: websocket error: {e}");
                break;
            }
        }
    }
}
