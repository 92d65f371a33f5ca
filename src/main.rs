use std::time::Duration;

use tracing::{error, info, warn};

mod app;
mod auth;
mod clock;
mod config;
mod error;
mod forms;
mod mailer;
mod recruiters;
mod registration;
mod state;
mod storage;
mod users;

#[cfg(test)]
mod testing;

use crate::registration::gc::RegistrationGc;
use crate::state::AppState;

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userapi=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Runs both sweeps on a fixed interval; failures are logged and retried next tick.
fn spawn_sweeper(gc: RegistrationGc, every_minutes: u64) {
    if every_minutes == 0 {
        info!("periodic registration sweep disabled");
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(every_minutes * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = gc.sweep_expired_registrations().await {
                error!(error = ?e, "expired registration sweep failed");
            }
            if let Err(e) = gc.sweep_orphaned_temp_files().await {
                error!(error = ?e, "orphaned temp file sweep failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let state = AppState::init().await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&state.db).await {
        warn!(error = %e, "migrations failed; continuing");
    }

    if let Some(admin) = &state.config.admin {
        if let Err(e) = users::services::ensure_admin(state.users.as_ref(), admin).await {
            error!(error = %e, "admin bootstrap failed");
        }
    }

    spawn_sweeper(
        state.gc.clone(),
        state.config.registration.sweep_interval_minutes,
    );

    app::serve(app::build_app(state)).await
}
