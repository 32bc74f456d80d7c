//! Émission des commandes d'alimentation.
//!
//! ON : magic packet d'abord, puis enregistrement de l'état commandé.
//! OFF : enregistrement seul ; l'agent l'apprend dans l'accusé de son
//! prochain heartbeat et s'arrête de lui-même.

use crate::clock::Clock;
use crate::models::{MachineRecord, PowerState};
use crate::store::{MachineStore, StoreError};
use crate::wol::{WolError, Waker};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("wake-on-lan failed: {0}")]
    Wake(#[from] WolError),
}

#[derive(Clone)]
pub struct PowerService {
    store: Arc<dyn MachineStore>,
    waker: Arc<dyn Waker>,
    clock: Arc<dyn Clock>,
}

impl PowerService {
    pub fn new(store: Arc<dyn MachineStore>, waker: Arc<dyn Waker>, clock: Arc<dyn Clock>) -> Self {
        Self { store, waker, clock }
    }

    pub fn set_power(&self, id: u64, state: PowerState) -> Result<MachineRecord, PowerError> {
        let machine = self.store.get(id)?;

        // échec d'émission => l'enregistrement reste intact
        if state == PowerState::On {
            self.waker.wake(&machine.mac_address)?;
        }

        let record = self.store.update_power_state(id, state, self.clock.now())?;
        tracing::info!(machine_id = id, name = %record.name, power_state = %state, "power command issued");
        Ok(record)
    }
}
