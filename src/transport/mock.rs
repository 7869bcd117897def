#![forbid(unsafe_code)]

// In-memory transport with a fake debate server, for exercising the harness
// without a network.

use crate::transport::protocol::{
    AnswerQuestion, NewQuestion, QuestionAnswered, ADMIN_CHANNEL, EVT_ANSWER_QUESTION,
    EVT_NEW_DEBATE, EVT_NEW_QUESTION, EVT_QUESTION_ANSWERED,
};
use crate::transport::{Channel, ChannelHandle, Event, Transport, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct DebateRoom {
    question_counter: u64,
    clients: Vec<mpsc::UnboundedSender<Event>>,
}

struct State {
    next_debate_id: AtomicU64,
    id_step: u64,
    debates: Mutex<HashMap<u64, DebateRoom>>,
    admins: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
    closed_channels: AtomicU64,
}

/// Fake remote side of the protocol. Debate ids are assigned sequentially
/// (`first_id`, `first_id + step`, ...); a step above one produces the
/// non-contiguous id sets the registry has to tolerate.
pub struct MockServer {
    state: Arc<State>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::with_ids(1, 1)
    }

    pub fn with_ids(first_id: u64, id_step: u64) -> Self {
        Self {
            state: Arc::new(State {
                next_debate_id: AtomicU64::new(first_id),
                id_step: id_step.max(1),
                debates: Mutex::new(HashMap::new()),
                admins: Mutex::new(Vec::new()),
                closed_channels: AtomicU64::new(0),
            }),
        }
    }

    pub fn closed_channels(&self) -> u64 {
        self.state.closed_channels.load(Ordering::Relaxed)
    }

    pub fn clients_in_debate(&self, debate_id: u64) -> usize {
        self.state
            .debates
            .lock()
            .unwrap()
            .get(&debate_id)
            .map(|room| room.clients.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn connect(
        &self,
        channel_id: &str,
        _query: &[(&str, String)],
    ) -> Result<ChannelHandle, TransportError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if channel_id == ADMIN_CHANNEL {
            self.state.admins.lock().unwrap().push(events_tx);
            return Ok(ChannelHandle {
                channel: Arc::new(MockChannel {
                    state: self.state.clone(),
                    debate_id: None,
                }),
                events: events_rx,
            });
        }

        let debate_id: u64 = channel_id
            .strip_prefix("debate-")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TransportError::Malformed(format!("bad channel id {channel_id:?}")))?;
        let mut debates = self.state.debates.lock().unwrap();
        let room = debates.get_mut(&debate_id).ok_or_else(|| TransportError::Connect {
            channel: channel_id.to_string(),
            source: anyhow::anyhow!("debate {debate_id} does not exist"),
        })?;
        room.clients.push(events_tx);
        Ok(ChannelHandle {
            channel: Arc::new(MockChannel {
                state: self.state.clone(),
                debate_id: Some(debate_id),
            }),
            events: events_rx,
        })
    }
}

struct MockChannel {
    state: Arc<State>,
    /// `None` for the admin channel.
    debate_id: Option<u64>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn request(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
        match (self.debate_id, event) {
            (None, EVT_NEW_DEBATE) => {
                let id = self
                    .state
                    .next_debate_id
                    .fetch_add(self.state.id_step, Ordering::Relaxed);
                self.state
                    .debates
                    .lock()
                    .unwrap()
                    .insert(id, DebateRoom::default());
                Ok(json!({ "debateId": id }))
            }
            (None, EVT_NEW_QUESTION) => {
                let question: NewQuestion = serde_json::from_value(payload)
                    .map_err(|e| TransportError::Malformed(e.to_string()))?;
                let (question_id, clients) = {
                    let mut debates = self.state.debates.lock().unwrap();
                    let room = debates.get_mut(&question.debate_id).ok_or_else(|| {
                        TransportError::Malformed(format!(
                            "newQuestion for unknown debate {}",
                            question.debate_id
                        ))
                    })?;
                    room.question_counter += 1;
                    (room.question_counter, room.clients.clone())
                };
                // fan out before acking so clients can answer promptly
                let push = json!({ "id": question_id, "answers": question.answers });
                for client in clients {
                    let _ = client.send(Event {
                        name: EVT_NEW_QUESTION.to_string(),
                        payload: push.clone(),
                    });
                }
                Ok(json!({}))
            }
            (Some(debate_id), EVT_ANSWER_QUESTION) => {
                let answer: AnswerQuestion = serde_json::from_value(payload)
                    .map_err(|e| TransportError::Malformed(e.to_string()))?;
                let answered = QuestionAnswered {
                    debate_id,
                    question_id: answer.question_id,
                };
                let payload = serde_json::to_value(&answered)
                    .map_err(|e| TransportError::Malformed(e.to_string()))?;
                for admin in self.state.admins.lock().unwrap().iter() {
                    let _ = admin.send(Event {
                        name: EVT_QUESTION_ANSWERED.to_string(),
                        payload: payload.clone(),
                    });
                }
                Ok(json!({}))
            }
            (_, other) => Err(TransportError::Malformed(format!(
                "unsupported event {other:?} on this channel"
            ))),
        }
    }

    async fn close(&self) {
        self.state.closed_channels.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_debate_acks_with_assigned_id() {
        let server = MockServer::with_ids(10, 5);
        let admin = server.connect(ADMIN_CHANNEL, &[]).await.unwrap();
        let first = admin
            .channel
            .request(EVT_NEW_DEBATE, json!({"title": "t", "description": "d"}))
            .await
            .unwrap();
        let second = admin
            .channel
            .request(EVT_NEW_DEBATE, json!({"title": "t", "description": "d"}))
            .await
            .unwrap();
        assert_eq!(first["debateId"], 10);
        assert_eq!(second["debateId"], 15);
    }

    #[tokio::test]
    async fn question_fans_out_and_answer_reaches_admin() {
        let server = MockServer::new();
        let mut admin = server.connect(ADMIN_CHANNEL, &[]).await.unwrap();
        admin
            .channel
            .request(EVT_NEW_DEBATE, json!({"title": "t", "description": "d"}))
            .await
            .unwrap();

        let mut client = server.connect("debate-1", &[]).await.unwrap();
        assert_eq!(server.clients_in_debate(1), 1);
        admin
            .channel
            .request(
                EVT_NEW_QUESTION,
                json!({"debateId": 1, "title": "q", "answers": ["a", "b"]}),
            )
            .await
            .unwrap();

        let pushed = client.events.recv().await.unwrap();
        assert_eq!(pushed.name, EVT_NEW_QUESTION);
        assert_eq!(pushed.payload["id"], 1);

        client
            .channel
            .request(EVT_ANSWER_QUESTION, json!({"questionId": 1, "answerId": 0}))
            .await
            .unwrap();
        let answered = admin.events.recv().await.unwrap();
        assert_eq!(answered.name, EVT_QUESTION_ANSWERED);
        assert_eq!(answered.payload["debateId"], 1);
        assert_eq!(answered.payload["questionId"], 1);
    }

    #[tokio::test]
    async fn connecting_to_missing_debate_fails() {
        let server = MockServer::new();
        let result = server.connect("debate-99", &[]).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
