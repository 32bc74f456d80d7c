/**
 * HEARTBEAT INGEST - Enregistrement des rapports de vie des agents
 *
 * RÔLE : Point d'entrée unique des heartbeats, quel que soit le transport
 * (HTTP ou MQTT). Décale l'état courant dans l'état précédent puis écrase,
 * sans valider la légalité de la séquence.
 */

use crate::clock::Clock;
use crate::models::{HeartbeatState, PowerState};
use crate::store::{MachineStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Rapport de vie envoyé par un agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub machine_uuid: Uuid,
    pub state: HeartbeatState,
}

/// Réponse à l'agent : l'état d'alimentation commandé.
/// C'est ainsi qu'un agent apprend qu'on lui demande de s'arrêter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub machine_id: u64,
    pub power_state: PowerState,
}

#[derive(Clone)]
pub struct HeartbeatIngest {
    store: Arc<dyn MachineStore>,
    clock: Arc<dyn Clock>,
}

impl HeartbeatIngest {
    pub fn new(store: Arc<dyn MachineStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn ingest(&self, machine_uuid: Uuid, state: HeartbeatState) -> Result<HeartbeatAck, StoreError> {
        let machine = self.store.find_by_uuid(machine_uuid)?;
        let record = self.store.ingest_heartbeat(machine.id, state, self.clock.now())?;

        tracing::debug!(
            machine_id = record.id,
            previous = %record.previous_heartbeat_state,
            current = %record.heartbeat_state,
            "heartbeat ingested"
        );

        Ok(HeartbeatAck {
            machine_id: record.id,
            power_state: record.power_state,
        })
    }

    pub fn ingest_report(&self, report: &HeartbeatReport) -> Result<HeartbeatAck, StoreError> {
        self.ingest(report.machine_uuid, report.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::NewMachine;
    use crate::store::JsonMachineStore;

    fn setup() -> (Arc<JsonMachineStore>, HeartbeatIngest, Uuid) {
        let store = Arc::new(JsonMachineStore::in_memory());
        let machine = store
            .register(
                NewMachine {
                    name: "desk".into(),
                    mac_address: "01-23-45-67-89-ab".into(),
                    heartbeat_interval_seconds: Some(10),
                },
                time::OffsetDateTime::now_utc(),
            )
            .unwrap();
        let ingest = HeartbeatIngest::new(store.clone(), Arc::new(SystemClock));
        (store, ingest, machine.uuid)
    }

    #[test]
    fn test_previous_tracks_prior_ingest() {
        let (store, ingest, uuid) = setup();
        let sequence = [
            HeartbeatState::Launched,
            HeartbeatState::On,
            HeartbeatState::On,
            HeartbeatState::Stopping,
            HeartbeatState::None,
        ];

        for (n, state) in sequence.iter().enumerate() {
            ingest.ingest(uuid, *state).unwrap();
            let rec = store.find_by_uuid(uuid).unwrap();
            assert_eq!(rec.heartbeat_state, *state);
            if n >= 1 {
                assert_eq!(rec.previous_heartbeat_state, sequence[n - 1]);
            } else {
                assert_eq!(rec.previous_heartbeat_state, HeartbeatState::None);
            }
            assert!(rec.last_heartbeat_at.is_some());
        }
    }

    #[test]
    fn test_ack_carries_power_state() {
        let (store, ingest, uuid) = setup();
        let id = store.find_by_uuid(uuid).unwrap().id;
        store
            .update_power_state(id, PowerState::On, time::OffsetDateTime::now_utc())
            .unwrap();

        let ack = ingest
            .ingest_report(&HeartbeatReport { machine_uuid: uuid, state: HeartbeatState::On })
            .unwrap();
        assert_eq!(ack, HeartbeatAck { machine_id: id, power_state: PowerState::On });
    }

    #[test]
    fn test_unknown_agent() {
        let (_store, ingest, _) = setup();
        let err = ingest.ingest(Uuid::new_v4(), HeartbeatState::On).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
