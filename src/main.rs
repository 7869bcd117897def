#![forbid(unsafe_code)]

use anyhow::Result;
use debate_stress::config::HarnessConfig;
use debate_stress::perf::{IntervalRecorder, SampleLog};
use debate_stress::ramp::{spawn_admin_listener, RampController, RunCounters, RunSummary};
use debate_stress::registry::{create_debates, Registry};
use debate_stress::transport::protocol::ADMIN_CHANNEL;
use debate_stress::transport::ws::WsTransport;
use debate_stress::transport::Transport;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debate_stress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = HarnessConfig::from_env();
    info!("debate-stress - starting run against {}", config.server_url);
    info!(
        "debates: {}, questions/debate/tick: [{}, {}], clients/tick: {}, ticks: {} every {:?}",
        config.debate_count,
        config.min_questions,
        config.max_questions,
        config.clients_per_tick,
        config.tick_count,
        config.tick_period,
    );

    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(
        config.server_url.clone(),
        config.socket_path.clone(),
        config.ack_timeout,
    ));

    let admin_query = [
        ("username", config.admin_username.clone()),
        ("password", config.admin_password.clone()),
    ];
    let admin = transport.connect(ADMIN_CHANNEL, &admin_query).await?;
    info!("admin channel established");

    let log = Arc::new(SampleLog::new());
    let recorder = Arc::new(IntervalRecorder::new(log.clone()));
    let counters = Arc::new(RunCounters::new());
    let _admin_task = spawn_admin_listener(admin.events, counters.clone());

    info!("Creating debates...");
    let debates = create_debates(admin.channel.as_ref(), &recorder, config.debate_count).await?;
    info!("{} debates created", debates.len());

    let mut registry = Registry::new();
    registry.insert_debates(debates);
    let registry = Arc::new(Mutex::new(registry));

    let controller = RampController::new(
        config,
        transport,
        admin.channel,
        registry,
        recorder,
        log,
        counters,
    );

    tokio::select! {
        result = controller.run() => match result {
            Ok(summary) => log_summary(&summary),
            Err(e) => error!("run failed: {e:#}"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, abandoning run");
        }
    }

    info!("Execution terminated.");
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    info!(
        "run complete: {} ticks, {} connections, {} questions answered",
        summary.completed_ticks, summary.connections, summary.questions_answered,
    );
    if summary.failed_connections > 0 || summary.ack_failures > 0 {
        error!(
            "failures: {} connections, {} unacknowledged operations",
            summary.failed_connections, summary.ack_failures,
        );
    }
    if summary.stalled_pairings > 0 {
        error!(
            "{} sample pairings never resolved (lost acknowledgements)",
            summary.stalled_pairings
        );
    }
}
