/**
 * MONITOR - Boucle de réconciliation périodique
 *
 * RÔLE : Matérialise le statut courant de chaque machine à intervalle fixe
 * et réécrit l'état d'alimentation pour les statuts SyncedON / SyncedOFF.
 *
 * FONCTIONNEMENT (un tick) :
 * 1. Snapshot de toutes les machines depuis le store
 * 2. Classement de chaque machine contre le snapshot + émission d'un événement
 * 3. Application des write-backs seulement après avoir tout classé ;
 *    chaque écriture est conditionnée à l'enregistrement du snapshot, un
 *    heartbeat ou une commande arrivé entre-temps l'annule
 *
 * Un échec d'écriture sur une machine n'interrompt pas le tick ; la machine
 * est reprise au tick suivant. Les ticks ne se chevauchent jamais.
 */

use crate::clock::Clock;
use crate::events::{EventSink, MonitorEvent};
use crate::models::{CurrentStatus, PowerState};
use crate::status::classify;
use crate::store::{MachineStore, StoreError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Période fixe de la boucle ; doit rester sous le plus petit délai de vivacité
pub const MONITOR_TICK_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBack {
    pub machine_id: u64,
    pub status: CurrentStatus,
    pub power_state: PowerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBackFailure {
    pub machine_id: u64,
    pub error: String,
}

/// Bilan d'un tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub classified: usize,
    pub status_counts: BTreeMap<CurrentStatus, usize>,
    pub written_back: Vec<WriteBack>,
    /// Write-backs abandonnés : l'enregistrement a changé depuis le snapshot
    pub superseded: Vec<WriteBack>,
    pub failures: Vec<WriteBackFailure>,
}

impl TickReport {
    fn new(at: OffsetDateTime) -> Self {
        Self {
            at,
            classified: 0,
            status_counts: BTreeMap::new(),
            written_back: Vec::new(),
            superseded: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn count(&self, status: CurrentStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }
}

pub struct Monitor {
    store: Arc<dyn MachineStore>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    period: Duration,
    last_report: Mutex<Option<TickReport>>,
}

impl Monitor {
    pub fn new(store: Arc<dyn MachineStore>, sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            sink,
            clock,
            period: MONITOR_TICK_PERIOD,
            last_report: Mutex::new(None),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Dernier bilan de tick réussi
    pub fn last_report(&self) -> Option<TickReport> {
        self.last_report.lock().clone()
    }

    /// Exécute un tick complet : classer tout, puis réécrire
    pub fn tick(&self) -> Result<TickReport, StoreError> {
        let machines = self.store.fetch_all()?;
        let now = self.clock.now();
        let mut report = TickReport::new(now);
        let mut pending = Vec::new();

        // Phase 1 : classement sur le snapshot, aucune écriture
        for machine in &machines {
            let status = classify(machine, now);
            self.sink.emit(&MonitorEvent::new(machine, status));

            report.classified += 1;
            *report.status_counts.entry(status).or_insert(0) += 1;

            if let Some(target) = status.write_back() {
                // déjà dans l'état cible : rien à corriger
                if machine.power_state != target {
                    let write = WriteBack {
                        machine_id: machine.id,
                        status,
                        power_state: target,
                    };
                    pending.push((machine, write));
                }
            }
        }

        // Phase 2 : write-backs, un échec n'arrête pas les autres
        for (snapshot, write) in pending {
            match self.store.sync_power_state(snapshot, write.power_state, now) {
                Ok(None) => {
                    tracing::debug!(machine_id = write.machine_id, "record changed since snapshot, write-back dropped");
                    report.superseded.push(write);
                }
                Ok(Some(_)) => {
                    tracing::info!(
                        machine_id = write.machine_id,
                        status = %write.status,
                        power_state = %write.power_state,
                        "power state synced from heartbeat evidence"
                    );
                    report.written_back.push(write);
                }
                Err(e) => {
                    tracing::warn!(machine_id = write.machine_id, error = %e, "write-back failed, retrying next tick");
                    report.failures.push(WriteBackFailure {
                        machine_id: write.machine_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        *self.last_report.lock() = Some(report.clone());
        Ok(report)
    }

    /// Démarre la boucle périodique ; s'arrête avec le runtime
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tracing::info!(period_secs = self.period.as_secs_f64(), "heartbeat monitoring started");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            // un tick trop long retarde le suivant au lieu de rattraper
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                // le store persiste sur disque : hors des workers async
                let monitor = Arc::clone(&self);
                let outcome = match tokio::task::spawn_blocking(move || monitor.tick()).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(error = %e, "monitor tick panicked");
                        continue;
                    }
                };

                match outcome {
                    Ok(report) => tracing::debug!(
                        classified = report.classified,
                        written_back = report.written_back.len(),
                        failures = report.failures.len(),
                        "monitor tick complete"
                    ),
                    Err(e) => tracing::warn!(error = %e, "monitor tick failed to fetch machines"),
                }
            }
        })
    }
}
