use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::heartbeat::{HeartbeatIngest, HeartbeatReport};
use crate::store::StoreError;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::{self, JoinHandle};

pub const HEARTBEAT_TOPIC: &str = "komoriuta/machines/heartbeat@v1";

/// Décode un payload heartbeat et l'ingère ; les erreurs sont journalisées, jamais propagées
pub fn handle_heartbeat_payload(ingest: &HeartbeatIngest, payload: &[u8]) {
    let report = match serde_json::from_slice::<HeartbeatReport>(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, payload = %String::from_utf8_lossy(payload), "invalid heartbeat JSON");
            return;
        }
    };

    match ingest.ingest_report(&report) {
        Ok(_) => {}
        Err(StoreError::NotFound(_)) => {
            tracing::warn!(machine_uuid = %report.machine_uuid, "heartbeat from unknown machine");
        }
        Err(e) => {
            tracing::error!(machine_uuid = %report.machine_uuid, error = %e, "heartbeat ingest failed");
        }
    }
}

pub fn spawn_mqtt_listener(conf: MqttConf, ingest: HeartbeatIngest, health: HealthTracker) -> JoinHandle<()> {
    task::spawn(async move {
        let mut opts = MqttOptions::new("komoriuta-kernel", &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        health.mark_mqtt_connecting();

        if let Err(e) = client.subscribe(HEARTBEAT_TOPIC, QoS::AtLeastOnce).await {
            tracing::error!(error = ?e, "MQTT subscribe failed");
            return;
        }
        tracing::info!(host = %conf.host, port = conf.port, topic = HEARTBEAT_TOPIC, "MQTT heartbeat listener started");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => health.mark_mqtt_connected(),
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == HEARTBEAT_TOPIC => {
                    let ingest = ingest.clone();
                    // l'ingestion persiste sur disque
                    let handled = task::spawn_blocking(move || handle_heartbeat_payload(&ingest, &p.payload)).await;
                    if let Err(e) = handled {
                        tracing::error!(error = %e, "heartbeat handler failed");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = ?e, "MQTT error, retrying");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}
