use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use lightcycle_arena::{Intent, IntentSender, Session, SessionEvent, SimConfig};

/// Seconds between status lines
const STATUS_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Lightcycle arena v{}", env!("CARGO_PKG_VERSION"));

    let config = SimConfig::load_or_default();
    let tick_rate = config.runtime.tick_rate.max(1);
    let dt = 1.0 / tick_rate as f32;

    let mut session = Session::with_default_backend(config);
    let stdin_task = tokio::spawn(read_commands(session.intent_sender()));
    session.start();

    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Tick loop started at {} Hz (commands: l, r, o, q)", tick_rate);

    let status_every = u64::from(tick_rate) * STATUS_INTERVAL_SECS;
    let simulation = async {
        loop {
            ticker.tick().await;
            for event in session.advance(dt) {
                match event {
                    SessionEvent::SessionEnded(summary) => return Some(summary),
                    other => debug!(?other, "Session event"),
                }
            }

            let game = session.game();
            if game.tick % status_every == 0 {
                let state = session.state();
                let stats = session.brain().stats();
                info!(
                    survival = state.survival_time,
                    score = state.score,
                    combo = state.combo_multiplier,
                    bots = game.alive_bot_count(),
                    samples = game.total_samples(),
                    decisions = stats.evaluations,
                    panics = stats.panics,
                    stale = stats.stale_responses,
                    "Status"
                );
            }
        }
    };

    let summary = tokio::select! {
        summary = simulation => summary,
        _ = stdin_task => {
            info!("Quit requested");
            None
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown signal received");
            None
        }
    };

    let summary = summary.unwrap_or_else(|| session.summary());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!("Session stopped");

    Ok(())
}

/// Feed stdin commands into the session's intent queue. Returns on `q`;
/// a closed stdin leaves the session running.
async fn read_commands(sender: IntentSender) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let intent = match line.trim() {
            "l" | "left" => Intent::TurnLeft,
            "r" | "right" => Intent::TurnRight,
            "o" | "overload" => Intent::Overload,
            "q" | "quit" => return,
            "" => continue,
            other => {
                warn!("Unknown command '{}'", other);
                continue;
            }
        };
        if let Err(e) = sender.try_send(intent) {
            warn!("Dropped {:?}: {}", intent, e);
        }
    }
    debug!("Stdin closed");
    std::future::pending::<()>().await;
}
