#![forbid(unsafe_code)]

// Population Ramp Controller - grows the simulated client population on a
// fixed cadence and drives per-tick reporting

use crate::config::HarnessConfig;
use crate::payload;
use crate::perf::{
    IntervalRecorder, SampleLog, MEASURE_ANSWER_QUESTION, MEASURE_CONNECT_CLIENT,
    MEASURE_SEND_QUESTION,
};
use crate::registry::Registry;
use crate::report::{export_csv, Reporter, WindowReport};
use crate::transport::protocol::{
    debate_channel, AnswerQuestion, NewQuestion, QuestionAnswered, QuestionPush,
    EVT_ANSWER_QUESTION, EVT_NEW_QUESTION, EVT_QUESTION_ANSWERED,
};
use crate::transport::{Channel, Event, Transport};
use futures_util::future::join_all;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampState {
    Idle,
    Ramping,
    Draining,
    Done,
}

/// Failure and progress counters kept outside the sample stream. A failed
/// operation is never retried within a tick; it is counted here and its
/// half-finished sample pairing discarded.
#[derive(Default)]
pub struct RunCounters {
    pub failed_connections: AtomicU64,
    pub ack_failures: AtomicU64,
    pub questions_answered: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Final accounting for one harness run.
#[derive(Debug)]
pub struct RunSummary {
    pub windows: Vec<WindowReport>,
    pub final_report: WindowReport,
    pub completed_ticks: u32,
    pub final_state: RampState,
    pub connections: usize,
    pub failed_connections: u64,
    pub ack_failures: u64,
    pub questions_answered: u64,
    /// Marks still unpaired at run end: acknowledgements that never arrived.
    pub stalled_pairings: usize,
}

pub struct RampController {
    config: HarnessConfig,
    transport: Arc<dyn Transport>,
    admin: Arc<dyn Channel>,
    registry: Arc<Mutex<Registry>>,
    recorder: Arc<IntervalRecorder>,
    log: Arc<SampleLog>,
    reporter: Reporter,
    counters: Arc<RunCounters>,
    state: RampState,
    next_connection_id: u64,
}

impl RampController {
    pub fn new(
        config: HarnessConfig,
        transport: Arc<dyn Transport>,
        admin: Arc<dyn Channel>,
        registry: Arc<Mutex<Registry>>,
        recorder: Arc<IntervalRecorder>,
        log: Arc<SampleLog>,
        counters: Arc<RunCounters>,
    ) -> Self {
        Self {
            config,
            transport,
            admin,
            registry,
            recorder,
            log,
            reporter: Reporter::new(),
            counters,
            state: RampState::Idle,
            // externally visible identity, assigned sequentially here
            next_connection_id: 1000,
        }
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    /// Runs the whole ramp: `tick_count` fixed-period ticks, one final
    /// full-history report, then teardown of every connection.
    ///
    /// Each tick's batch is awaited as a whole before its report, so one
    /// slow peer delays that tick's boundary. If batch work overruns the
    /// period the next tick fires immediately; overlap is a known pressure
    /// point under load and deliberately not prevented.
    pub async fn run(mut self) -> anyhow::Result<RunSummary> {
        self.state = RampState::Ramping;
        // tokio's interval panics on a zero period
        let period = self.config.tick_period.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        // the first interval tick completes immediately
        interval.tick().await;

        let mut windows = Vec::with_capacity(self.config.tick_count as usize);
        let mut completed_ticks = 0u32;
        for tick in 1..=self.config.tick_count {
            interval.tick().await;
            windows.push(self.run_tick(tick).await);
            completed_ticks = tick;
        }

        self.state = RampState::Draining;
        info!("Results:");
        let final_report = self.reporter.window_report(&self.log, Duration::ZERO);
        final_report.print();
        let exported = export_csv(&self.log, &self.config.export_dir)?;
        info!("wrote {} CSV file(s) to {}", exported.len(), self.config.export_dir.display());

        let (channels, connections) = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            (registry.channels(), registry.connection_count())
        };
        for channel in channels {
            channel.close().await;
        }
        self.admin.close().await;
        self.state = RampState::Done;

        Ok(RunSummary {
            windows,
            final_report,
            completed_ticks,
            final_state: self.state,
            connections,
            failed_connections: self.counters.failed_connections.load(Ordering::Relaxed),
            ack_failures: self.counters.ack_failures.load(Ordering::Relaxed),
            questions_answered: self.counters.questions_answered.load(Ordering::Relaxed),
            stalled_pairings: self.recorder.pending_marks(),
        })
    }

    async fn run_tick(&mut self, tick: u32) -> WindowReport {
        let cutoff = self.recorder.elapsed();
        info!(
            "tick {tick}: adding {} clients, issuing questions",
            self.config.clients_per_tick
        );

        self.connect_clients().await;
        self.send_questions().await;

        // let in-flight answer round trips land inside the window
        if !self.config.settle.is_zero() {
            tokio::time::sleep(self.config.settle).await;
        }

        let report = self.reporter.window_report(&self.log, cutoff);
        info!(
            "Report {tick}: samples from {:.0} ms to {:.0} ms into the run",
            cutoff.as_secs_f64() * 1_000.0,
            self.recorder.elapsed().as_secs_f64() * 1_000.0,
        );
        report.print();
        report
    }

    /// Connects one fixed-size batch of clients, each bound to a randomly
    /// picked debate, and waits for the whole batch to establish.
    async fn connect_clients(&mut self) {
        let mut attempts = Vec::with_capacity(self.config.clients_per_tick);
        for _ in 0..self.config.clients_per_tick {
            let connection_id = self.next_connection_id;
            self.next_connection_id += 1;

            let debate_id = {
                let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
                registry.pick_debate(&mut rand::thread_rng())
            };
            let Some(debate_id) = debate_id else {
                warn!("no debates registered, skipping client {connection_id}");
                continue;
            };

            let start_mark = format!("connect {connection_id}");
            if let Err(e) = self.recorder.mark(&start_mark) {
                warn!("client {connection_id}: {e}");
                continue;
            }

            let transport = self.transport.clone();
            let recorder = self.recorder.clone();
            let registry = self.registry.clone();
            let counters = self.counters.clone();
            attempts.push(async move {
                let query = [("uuid", connection_id.to_string())];
                match transport.connect(&debate_channel(debate_id), &query).await {
                    Ok(handle) => {
                        let end_mark = format!("connected {connection_id}");
                        let measured = recorder
                            .mark(&end_mark)
                            .and_then(|_| {
                                recorder.measure(MEASURE_CONNECT_CLIENT, &start_mark, &end_mark)
                            });
                        if let Err(e) = measured {
                            warn!("client {connection_id}: {e}");
                        }
                        {
                            let mut registry =
                                registry.lock().unwrap_or_else(PoisonError::into_inner);
                            registry.register_connection(
                                connection_id,
                                debate_id,
                                handle.channel.clone(),
                            );
                        }
                        tokio::spawn(client_answer_loop(
                            handle.events,
                            handle.channel,
                            recorder,
                            counters,
                            connection_id,
                        ));
                    }
                    Err(e) => {
                        warn!("client {connection_id}: connect failed: {e}");
                        counters.failed_connections.fetch_add(1, Ordering::Relaxed);
                        recorder.discard(&start_mark);
                    }
                }
            });
        }
        join_all(attempts).await;
    }

    /// Issues a bounded batch of new questions across all current debates
    /// and waits for every acknowledgement.
    async fn send_questions(&mut self) {
        // question ids are assigned under the registry lock so each debate's
        // counter stays strictly increasing
        let mut planned: Vec<(u64, u64)> = Vec::new();
        {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let mut rng = rand::thread_rng();
            for debate_id in registry.debate_ids() {
                let count = rng.gen_range(self.config.min_questions..=self.config.max_questions);
                for _ in 0..count {
                    if let Some(debate) = registry.debate_mut(debate_id) {
                        planned.push((debate_id, debate.next_question_id()));
                    }
                }
            }
        }

        let sends = planned.into_iter().map(|(debate_id, question_id)| {
            let admin = self.admin.clone();
            let recorder = self.recorder.clone();
            let counters = self.counters.clone();
            async move {
                let start_mark = format!("question send {debate_id}:{question_id}");
                let end_mark = format!("question ack {debate_id}:{question_id}");
                if let Err(e) = recorder.mark(&start_mark) {
                    warn!("question {debate_id}:{question_id}: {e}");
                    return;
                }

                let request = NewQuestion {
                    debate_id,
                    title: format!("Question{question_id}"),
                    answers: payload::answers(2, 5),
                };
                let payload = match serde_json::to_value(&request) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("question {debate_id}:{question_id}: {e}");
                        recorder.discard(&start_mark);
                        return;
                    }
                };

                match admin.request(EVT_NEW_QUESTION, payload).await {
                    Ok(_) => {
                        let measured = recorder.mark(&end_mark).and_then(|_| {
                            recorder.measure(MEASURE_SEND_QUESTION, &start_mark, &end_mark)
                        });
                        if let Err(e) = measured {
                            warn!("question {debate_id}:{question_id}: {e}");
                        }
                    }
                    Err(e) => {
                        warn!("question {debate_id}:{question_id}: {e}");
                        counters.ack_failures.fetch_add(1, Ordering::Relaxed);
                        recorder.discard(&start_mark);
                    }
                }
            }
        });
        join_all(sends).await;
    }
}

/// Per-client event loop: answer every pushed question, measuring the
/// answer round trip.
async fn client_answer_loop(
    mut events: mpsc::UnboundedReceiver<Event>,
    channel: Arc<dyn Channel>,
    recorder: Arc<IntervalRecorder>,
    counters: Arc<RunCounters>,
    connection_id: u64,
) {
    while let Some(event) = events.recv().await {
        if event.name != EVT_NEW_QUESTION {
            debug!("client {connection_id}: ignoring {:?}", event.name);
            continue;
        }
        let question: QuestionPush = match serde_json::from_value(event.payload) {
            Ok(question) => question,
            Err(e) => {
                warn!("client {connection_id}: bad newQuestion payload: {e}");
                continue;
            }
        };

        let start_mark = format!("answer {connection_id}:{}", question.id);
        let end_mark = format!("answered {connection_id}:{}", question.id);
        if let Err(e) = recorder.mark(&start_mark) {
            warn!("client {connection_id}: {e}");
            continue;
        }

        let last_option = question.answers.len().saturating_sub(1) as u64;
        let answer = AnswerQuestion {
            question_id: question.id,
            answer_id: payload::integer_between(0, last_option),
        };
        let payload = match serde_json::to_value(&answer) {
            Ok(value) => value,
            Err(e) => {
                warn!("client {connection_id}: {e}");
                recorder.discard(&start_mark);
                continue;
            }
        };

        match channel.request(EVT_ANSWER_QUESTION, payload).await {
            Ok(_) => {
                let measured = recorder.mark(&end_mark).and_then(|_| {
                    recorder.measure(MEASURE_ANSWER_QUESTION, &start_mark, &end_mark)
                });
                if let Err(e) = measured {
                    warn!("client {connection_id}: {e}");
                }
            }
            Err(e) => {
                warn!("client {connection_id}: answer failed: {e}");
                counters.ack_failures.fetch_add(1, Ordering::Relaxed);
                recorder.discard(&start_mark);
            }
        }
    }
    debug!("client {connection_id}: event stream ended");
}

/// Consumes the admin channel's inbound events for the life of the run,
/// counting answered questions.
pub fn spawn_admin_listener(
    mut events: mpsc::UnboundedReceiver<Event>,
    counters: Arc<RunCounters>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.name != EVT_QUESTION_ANSWERED {
                debug!("admin: ignoring {:?}", event.name);
                continue;
            }
            match serde_json::from_value::<QuestionAnswered>(event.payload) {
                Ok(answered) => {
                    counters.questions_answered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "debate {} question {} answered",
                        answered.debate_id, answered.question_id
                    );
                }
                Err(e) => warn!("admin: bad questionAnswered payload: {e}"),
            }
        }
    })
}
