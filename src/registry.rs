#![forbid(unsafe_code)]

// Entity Registry - live debates and client connections for one run

use crate::payload;
use crate::perf::{IntervalRecorder, MEASURE_CREATE_DEBATE};
use crate::transport::protocol::{DebateCreated, NewDebate, EVT_NEW_DEBATE};
use crate::transport::Channel;
use anyhow::Context;
use futures_util::future::try_join_all;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// One live logical debate. The id is assigned by the remote side; the
/// question counter only ever increases, and its increment result is the
/// next question's identifier.
#[derive(Debug)]
pub struct Debate {
    pub debate_id: u64,
    /// Connection ids of the clients currently subscribed, in join order.
    pub clients: Vec<u64>,
    question_counter: u64,
}

impl Debate {
    pub fn new(debate_id: u64) -> Self {
        Self {
            debate_id,
            clients: Vec::new(),
            question_counter: 0,
        }
    }

    pub fn next_question_id(&mut self) -> u64 {
        self.question_counter += 1;
        self.question_counter
    }

    pub fn questions_issued(&self) -> u64 {
        self.question_counter
    }
}

/// A simulated participant bound to one debate for its whole life.
pub struct Connection {
    pub connection_id: u64,
    pub debate_id: u64,
    pub channel: Arc<dyn Channel>,
}

/// Set of live debates and client connections; picks targets for new
/// operations and drives bulk teardown.
#[derive(Default)]
pub struct Registry {
    debates: BTreeMap<u64, Debate>,
    connections: Vec<Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_debates(&mut self, debates: BTreeMap<u64, Debate>) {
        self.debates.extend(debates);
    }

    pub fn debate_ids(&self) -> Vec<u64> {
        self.debates.keys().copied().collect()
    }

    pub fn debate_mut(&mut self, debate_id: u64) -> Option<&mut Debate> {
        self.debates.get_mut(&debate_id)
    }

    /// Picks a debate by sampling uniformly over the numeric id range
    /// `[min(id), max(id)]`. Remote-assigned ids can be non-contiguous, so a
    /// sampled value with no debate behind it resolves to the nearest
    /// existing id instead of producing a dead target.
    pub fn pick_debate<R: Rng>(&self, rng: &mut R) -> Option<u64> {
        let first = *self.debates.keys().next()?;
        let last = *self.debates.keys().next_back()?;
        let candidate = rng.gen_range(first..=last);
        if self.debates.contains_key(&candidate) {
            return Some(candidate);
        }
        let above = self.debates.range(candidate..).next().map(|(id, _)| *id);
        let below = self.debates.range(..candidate).next_back().map(|(id, _)| *id);
        match (below, above) {
            (Some(b), Some(a)) => {
                if candidate - b <= a - candidate {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }

    /// Appends the connection to its debate's client list and to the global
    /// connection list.
    pub fn register_connection(
        &mut self,
        connection_id: u64,
        debate_id: u64,
        channel: Arc<dyn Channel>,
    ) {
        match self.debates.get_mut(&debate_id) {
            Some(debate) => debate.clients.push(connection_id),
            None => warn!("connection {connection_id} registered against unknown debate {debate_id}"),
        }
        self.connections.push(Connection {
            connection_id,
            debate_id,
            channel,
        });
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Every live client channel, for teardown.
    pub fn channels(&self) -> Vec<Arc<dyn Channel>> {
        self.connections.iter().map(|c| c.channel.clone()).collect()
    }
}

/// Issues `count` concurrent create-debate requests on the admin channel,
/// each measured as a create-debate sample, and waits for every
/// acknowledgement. Any failed or timed-out ack fails the whole call; there
/// is no partial-success path.
pub async fn create_debates(
    admin: &dyn Channel,
    recorder: &IntervalRecorder,
    count: usize,
) -> anyhow::Result<BTreeMap<u64, Debate>> {
    let requests = (0..count).map(|i| async move {
        let start_mark = format!("newDebate send {i}");
        let end_mark = format!("newDebate ack {i}");
        recorder.mark(&start_mark)?;

        let request = NewDebate {
            title: format!("Debate{i}"),
            description: payload::sentence(4),
        };
        let payload = serde_json::to_value(&request)?;
        let ack = match admin.request(EVT_NEW_DEBATE, payload).await {
            Ok(ack) => ack,
            Err(e) => {
                recorder.discard(&start_mark);
                return Err(e).with_context(|| format!("creating debate {i}"));
            }
        };

        recorder.mark(&end_mark)?;
        recorder.measure(MEASURE_CREATE_DEBATE, &start_mark, &end_mark)?;

        let created: DebateCreated = serde_json::from_value(ack)
            .with_context(|| format!("newDebate ack for debate {i}"))?;
        Ok::<Debate, anyhow::Error>(Debate::new(created.debate_id))
    });

    let debates = try_join_all(requests).await?;
    Ok(debates
        .into_iter()
        .map(|debate| (debate.debate_id, debate))
        .collect())
}
