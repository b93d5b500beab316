use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use hipsd::config::EngineConfig;
use hipsd::engine::{self, HipsEngine};
use hipsd::monitor::IntervalMonitor;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("hipsd starting");

    let config = EngineConfig::default_path()
        .filter(|p| p.exists())
        .and_then(|p| EngineConfig::load_from_file(p).ok())
        .unwrap_or_default();

    let hips = Arc::new(HipsEngine::new(config));

    if let Err(err) = hips.initialize() {
        error!(%err, "failed to initialize HIPS engine");
        return Err(err.into());
    }

    let heartbeat = Box::new(IntervalMonitor::new(
        "heartbeat",
        Duration::from_secs(5),
        hips.dispatcher.clone(),
    ));
    hips.register_monitor(heartbeat);

    if let Err(err) = hips.start() {
        error!(%err, "failed to start HIPS engine");
        return Err(err.into());
    }

    engine::set_global_handle(Arc::downgrade(&hips));
    let stop_handle = hips.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        if let Some(engine) = engine::global_handle() {
            let _ = engine.shutdown();
        } else {
            let _ = stop_handle.shutdown();
        }
        std::process::exit(0);
    })?;

    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
