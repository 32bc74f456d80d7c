/**
 * KOMORIUTA KERNEL - Point d'entrée du serveur
 *
 * RÔLE : Bootstrap : config, store, boucle de monitoring, écoute MQTT
 * optionnelle, API HTTP.
 */

use anyhow::{Context, Result};
use komoriuta_kernel::config::{api_key_from_env, load_config};
use komoriuta_kernel::health::HealthTracker;
use komoriuta_kernel::http::{self, AppState};
use komoriuta_kernel::{
    mqtt, Clock, EventSink, HeartbeatIngest, JsonMachineStore, MachineStore, Monitor, PowerService, SystemClock,
    TracingSink,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    let store: Arc<dyn MachineStore> = Arc::new(
        JsonMachineStore::open(&cfg.store.path)
            .with_context(|| format!("failed to open machine store {}", cfg.store.path.display()))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);

    let health_tracker = HealthTracker::new();
    let ingest = HeartbeatIngest::new(store.clone(), clock.clone());
    let power = PowerService::new(store.clone(), Arc::new(cfg.wol.waker()), clock.clone());

    let monitor = Arc::new(
        Monitor::new(store.clone(), sink, clock.clone()).with_period(Duration::from_secs(cfg.monitor.tick_seconds)),
    );
    monitor.clone().start();

    if let Some(mqtt_conf) = cfg.mqtt.clone() {
        mqtt::spawn_mqtt_listener(mqtt_conf, ingest.clone(), health_tracker.clone());
    }

    let api_key = api_key_from_env();
    if api_key.is_none() {
        tracing::warn!("KOMORIUTA_API_KEY not set - only /health is reachable");
    }

    let app = http::build_router(AppState {
        store,
        clock,
        ingest,
        power,
        monitor,
        health_tracker,
        api_key,
    });

    let listener = TcpListener::bind(cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    tracing::info!(addr = %cfg.http.bind, "listening");
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
