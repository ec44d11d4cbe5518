use race_server::config::SimConfig;
use race_server::net::start_websocket_server;
use race_server::race::RaceSession;
use race_server::state::SharedGameState;

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "race_server=info".into()))
        .init();

    let config = match SimConfig::from_args_and_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let race = match RaceSession::from_config(&config) {
        Ok(race) => race,
        Err(err) => {
            tracing::error!(%err, "failed to build track");
            std::process::exit(1);
        }
    };

    tracing::info!(
        ai = config.ai_drivers,
        laps = config.laps,
        tick_hz = config.tick_hz,
        "starting race server"
    );

    let state = Arc::new(Mutex::new(SharedGameState::new()));
    let race = Arc::new(Mutex::new(race));

    // WebSocket server
    let server_state = Arc::clone(&state);
    let server_race = Arc::clone(&race);
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        if let Err(err) = start_websocket_server(bind_addr, server_state, server_race).await {
            tracing::error!(%err, "websocket server stopped");
        }
    });

    // Ticker paces the loop; each frame steps by the measured wall-clock delta
    let mut ticker = interval(Duration::from_secs_f32(config.frame_time()));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    loop {
        ticker.tick().await;

        let now = Instant::now();
        let dt = config.frame_delta(now.duration_since(last_frame).as_secs_f32());
        last_frame = now;
        if dt > config.frame_time() * 2.0 {
            tracing::debug!(dt, "slow frame");
        }

        let snapshot = {
            let mut race = race.lock().await;
            race.step(dt);
            race.snapshot()
        };

        state.lock().await.broadcast_snapshot(&snapshot);
    }
}
