//! Événements d'observabilité émis par la boucle de monitoring.

use crate::models::{CurrentStatus, HeartbeatState, MachineRecord, PowerState};
use serde::Serialize;
use uuid::Uuid;

/// Un événement par machine et par tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorEvent {
    pub machine_id: u64,
    pub machine_uuid: Uuid,
    pub machine_name: String,
    pub power_state: PowerState,
    pub previous_heartbeat_state: HeartbeatState,
    pub heartbeat_state: HeartbeatState,
    pub status: CurrentStatus,
}

impl MonitorEvent {
    pub fn new(record: &MachineRecord, status: CurrentStatus) -> Self {
        Self {
            machine_id: record.id,
            machine_uuid: record.uuid,
            machine_name: record.name.clone(),
            power_state: record.power_state,
            previous_heartbeat_state: record.previous_heartbeat_state,
            heartbeat_state: record.heartbeat_state,
            status,
        }
    }
}

/// Destination des événements : fire-and-forget, ne doit ni bloquer ni échouer
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &MonitorEvent);
}

/// Journalise chaque événement via tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &MonitorEvent) {
        match event.status {
            CurrentStatus::Error => tracing::warn!(
                kind = "heartbeat_watch",
                machine_id = event.machine_id,
                machine_uuid = %event.machine_uuid,
                machine_name = %event.machine_name,
                power_state = %event.power_state,
                previous_heartbeat_state = %event.previous_heartbeat_state,
                heartbeat_state = %event.heartbeat_state,
                status = %event.status,
                "inconsistent machine state"
            ),
            _ => tracing::info!(
                kind = "heartbeat_watch",
                machine_id = event.machine_id,
                machine_uuid = %event.machine_uuid,
                machine_name = %event.machine_name,
                power_state = %event.power_state,
                previous_heartbeat_state = %event.previous_heartbeat_state,
                heartbeat_state = %event.heartbeat_state,
                status = %event.status,
                "machine status"
            ),
        }
    }
}
