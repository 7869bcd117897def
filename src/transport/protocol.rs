#![forbid(unsafe_code)]

// Wire protocol - frame envelope and message payloads for the debate service

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ADMIN_CHANNEL: &str = "admin";

pub const EVT_NEW_DEBATE: &str = "newDebate";
pub const EVT_NEW_QUESTION: &str = "newQuestion";
pub const EVT_ANSWER_QUESTION: &str = "answerQuestion";
pub const EVT_QUESTION_ANSWERED: &str = "questionAnswered";

/// Channel id for the room carrying one debate's traffic.
pub fn debate_channel(debate_id: u64) -> String {
    format!("debate-{debate_id}")
}

/// Envelope for everything crossing a channel. Requests carry a correlation
/// id the remote peer echoes in exactly one `Ack`; pushes arrive as `Event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    #[serde(rename_all = "camelCase")]
    Request { id: u64, event: String, payload: Value },
    #[serde(rename_all = "camelCase")]
    Ack { id: u64, payload: Value },
    #[serde(rename_all = "camelCase")]
    Event { event: String, payload: Value },
}

/// Admin -> server: create a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDebate {
    pub title: String,
    pub description: String,
}

/// Ack payload for `newDebate`; the id is assigned by the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateCreated {
    pub debate_id: u64,
}

/// Admin -> server: publish a question to a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub debate_id: u64,
    pub title: String,
    pub answers: Vec<String>,
}

/// Server -> debate clients: a question to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPush {
    pub id: u64,
    pub answers: Vec<String>,
}

/// Client -> server: answer a pushed question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerQuestion {
    pub question_id: u64,
    pub answer_id: u64,
}

/// Server -> admin: some client answered a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswered {
    pub debate_id: u64,
    pub question_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_frame_wire_shape() {
        let frame = Frame::Request {
            id: 7,
            event: EVT_NEW_DEBATE.to_string(),
            payload: json!({"title": "Debate0", "description": "d"}),
        };
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["type"], "request");
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["event"], "newDebate");
    }

    #[test]
    fn ack_frame_round_trips() {
        let text = r#"{"type":"ack","id":3,"payload":{"debateId":12}}"#;
        let frame: Frame = serde_json::from_str(text).unwrap();
        match frame {
            Frame::Ack { id, payload } => {
                assert_eq!(id, 3);
                let created: DebateCreated = serde_json::from_value(payload).unwrap();
                assert_eq!(created.debate_id, 12);
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn payloads_use_camel_case_keys() {
        let wire = serde_json::to_value(NewQuestion {
            debate_id: 4,
            title: "q".to_string(),
            answers: vec!["a".to_string()],
        })
        .unwrap();
        assert!(wire.get("debateId").is_some());

        let wire = serde_json::to_value(AnswerQuestion {
            question_id: 1,
            answer_id: 0,
        })
        .unwrap();
        assert!(wire.get("questionId").is_some());
        assert!(wire.get("answerId").is_some());
    }
}
