/*!
Fixtures machines

Construit des enregistrements dans un état précis (alimentation,
historique de heartbeats) en passant par les opérations du store,
comme le ferait le kernel en production.
*/

use komoriuta_kernel::{HeartbeatState, MachineRecord, MachineStore, NewMachine, PowerState, StoreError};
use time::{Duration, OffsetDateTime};

/// Builder fluide pour une machine de test
#[derive(Debug, Clone)]
pub struct MachineBuilder {
    name: String,
    mac_address: String,
    heartbeat_interval_seconds: u32,
    power_state: Option<(PowerState, OffsetDateTime)>,
    heartbeats: Vec<(HeartbeatState, OffsetDateTime)>,
}

impl MachineBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mac_address: "02:00:00:00:00:01".to_string(),
            heartbeat_interval_seconds: 60,
            power_state: None,
            heartbeats: Vec::new(),
        }
    }

    pub fn mac(mut self, mac: &str) -> Self {
        self.mac_address = mac.to_string();
        self
    }

    pub fn interval(mut self, seconds: u32) -> Self {
        self.heartbeat_interval_seconds = seconds;
        self
    }

    /// Power state commandé à `at`
    pub fn powered(mut self, state: PowerState, at: OffsetDateTime) -> Self {
        self.power_state = Some((state, at));
        self
    }

    /// Heartbeat reçu à `at` ; l'ordre des appels est l'ordre de réception
    pub fn heartbeat(mut self, state: HeartbeatState, at: OffsetDateTime) -> Self {
        self.heartbeats.push((state, at));
        self
    }

    /// Deux heartbeats consécutifs, `gap` avant puis à `at`
    pub fn heartbeats(self, previous: HeartbeatState, current: HeartbeatState, at: OffsetDateTime, gap: Duration) -> Self {
        self.heartbeat(previous, at - gap).heartbeat(current, at)
    }

    pub fn new_machine(&self) -> NewMachine {
        NewMachine {
            name: self.name.clone(),
            mac_address: self.mac_address.clone(),
            heartbeat_interval_seconds: Some(self.heartbeat_interval_seconds),
        }
    }

    /// Enregistre la machine puis rejoue alimentation et heartbeats
    pub fn register(self, store: &dyn MachineStore, created_at: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        let mut record = store.register(self.new_machine(), created_at)?;
        if let Some((state, at)) = self.power_state {
            record = store.update_power_state(record.id, state, at)?;
        }
        for (state, at) in self.heartbeats {
            record = store.ingest_heartbeat(record.id, state, at)?;
        }
        Ok(record)
    }
}
