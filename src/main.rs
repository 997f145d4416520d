use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use slotbook::catalog;
use slotbook::config::Config;
use slotbook::engine::Engine;
use slotbook::notify::NotifyHub;
use slotbook::rollover;
use slotbook::scheduler::RefreshScheduler;
use slotbook::shell;
use slotbook::store::{MemoryStore, ReservationStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    slotbook::observability::init(config.metrics_port)?;

    let instruments = match &config.instruments_path {
        Some(path) => catalog::load_instruments(path)?,
        None => catalog::default_instruments(),
    };

    info!("slotbook starting");
    info!("  user: {} ({})", config.user.display_name, config.user.user_id);
    info!("  instruments: {}", instruments.len());
    info!(
        "  refresh: every {}s, {} retries",
        config.refresh.interval.as_secs(),
        config.refresh.max_retries
    );
    info!("  rollover: daily at {:02}:00", config.rollover_hour);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let store: Arc<dyn ReservationStore> = Arc::new(MemoryStore::new());
    let notify = Arc::new(NotifyHub::new());
    let engine = Engine::spawn(store.clone(), config.user.clone(), &instruments, notify);
    let scheduler = RefreshScheduler::spawn(engine.clone(), config.refresh.clone());

    let cancel = CancellationToken::new();
    let rollover_task = tokio::spawn(rollover::run_rollover(store, config.rollover_hour, cancel.clone()));

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
    };
    shell::run(engine, instruments, shutdown).await?;

    scheduler.stop().await;
    cancel.cancel();
    let _ = rollover_task.await;
    info!("slotbook stopped");
    Ok(())
}
