/**
 * STATUS CLASSIFIER - Calcul du statut courant d'une machine
 *
 * RÔLE : Fonction pure (record, now) -> CurrentStatus. Réconcilie l'état
 * d'alimentation commandé avec les preuves de vie rapportées par l'agent.
 *
 * FONCTIONNEMENT :
 * 1. Aucun heartbeat jamais reçu => Applying
 * 2. Heartbeat plus vieux que 3 x intervalle => état effectif NONE
 *    (surcharge au classement uniquement, l'enregistrement n'est pas modifié)
 * 3. Table de transition sur (power, prev, cur) ; deux cellules dépendent
 *    d'un délai de 5 minutes et sont résolues contre le contexte temporel
 *
 * Totale et sans erreur : toute combinaison non résolue donne `Error`.
 */

use crate::models::{CurrentStatus, HeartbeatState, MachineRecord, PowerState};
use time::{Duration, OffsetDateTime};

/// Un heartbeat est périmé au-delà de intervalle x 3
pub const LIVENESS_TIMEOUT_MULTIPLIER: i64 = 3;
/// Silence au-delà duquel la machine est considérée éteinte (confirmé)
pub const SYNCED_OFF_TIMEOUT: Duration = Duration::minutes(5);
/// Délai au-delà duquel un arrêt d'agent prolongé est considéré terminé
pub const STARTING_TIMEOUT: Duration = Duration::minutes(5);

/// Cellule de la table de transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Fixed(CurrentStatus),
    /// SyncedOFF si le silence dépasse SYNCED_OFF_TIMEOUT, sinon Lost
    SyncedOffOrLost,
    /// SyncedOFF si le dernier changement d'alimentation dépasse STARTING_TIMEOUT, sinon Starting
    SyncedOffOrStarting,
}

/// Contexte temporel nécessaire pour résoudre les cellules dépendantes du temps
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub now: OffsetDateTime,
    pub last_heartbeat_at: OffsetDateTime,
    pub last_power_changed_at: Option<OffsetDateTime>,
}

impl Cell {
    pub fn resolve(self, timing: &Timing) -> CurrentStatus {
        match self {
            Cell::Fixed(status) => status,
            Cell::SyncedOffOrLost => {
                if check_synced_off(timing.now, timing.last_heartbeat_at) {
                    CurrentStatus::SyncedOff
                } else {
                    CurrentStatus::Lost
                }
            }
            Cell::SyncedOffOrStarting => {
                if check_starting_timeout(timing.now, timing.last_power_changed_at) {
                    CurrentStatus::SyncedOff
                } else {
                    CurrentStatus::Starting
                }
            }
        }
    }
}

/// Calcule le statut courant d'une machine à l'instant `now`
pub fn classify(record: &MachineRecord, now: OffsetDateTime) -> CurrentStatus {
    let Some(last_heartbeat_at) = record.last_heartbeat_at else {
        return CurrentStatus::Applying;
    };

    let current = effective_heartbeat_state(record, last_heartbeat_at, now);
    let timing = Timing {
        now,
        last_heartbeat_at,
        last_power_changed_at: record.last_power_changed_at,
    };

    transition(record.power_state, record.previous_heartbeat_state, current).resolve(&timing)
}

/// Table de transition (power, prev -> cur)
pub fn transition(power: PowerState, prev: HeartbeatState, cur: HeartbeatState) -> Cell {
    use CurrentStatus as S;
    use HeartbeatState as H;
    use PowerState as P;

    match (power, prev, cur) {
        (P::On, H::Launched, H::Launched) => Cell::Fixed(S::Warning),
        (P::On, H::Launched | H::On | H::None, H::On) => Cell::Fixed(S::On),
        (P::On, H::On | H::None, H::Launched) => Cell::Fixed(S::On),
        (P::On, H::Launched | H::On, H::None) => Cell::SyncedOffOrLost,
        (P::On, H::Stopping, H::None) => Cell::SyncedOffOrStarting,

        (P::Off, H::Launched | H::On | H::Stopping, H::Launched) => Cell::Fixed(S::Warning),
        (P::Off, H::Launched | H::On, H::None) => Cell::SyncedOffOrLost,
        (P::Off, H::Stopping, H::None) => Cell::Fixed(S::Off),
        (P::Off, H::None, H::Launched) => Cell::Fixed(S::SyncedOn),
        (P::Off, _, H::Stopping) => Cell::Fixed(S::Stopping),

        // incohérent avec toute transition attendue ; sert aussi de repli
        _ => Cell::Fixed(S::Error),
    }
}

/// Délai de vivacité : intervalle déclaré x 3
pub fn liveness_timeout(record: &MachineRecord) -> Duration {
    Duration::seconds(i64::from(record.heartbeat_interval_seconds) * LIVENESS_TIMEOUT_MULTIPLIER)
}

/// Un âge négatif (horloge qui recule) n'est jamais périmé
pub fn is_stale(record: &MachineRecord, last_heartbeat_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    now - last_heartbeat_at > liveness_timeout(record)
}

pub fn effective_heartbeat_state(
    record: &MachineRecord,
    last_heartbeat_at: OffsetDateTime,
    now: OffsetDateTime,
) -> HeartbeatState {
    if is_stale(record, last_heartbeat_at, now) {
        HeartbeatState::None
    } else {
        record.heartbeat_state
    }
}

pub fn check_synced_off(now: OffsetDateTime, last_heartbeat_at: OffsetDateTime) -> bool {
    now - last_heartbeat_at > SYNCED_OFF_TIMEOUT
}

pub fn check_starting_timeout(now: OffsetDateTime, last_power_changed_at: Option<OffsetDateTime>) -> bool {
    match last_power_changed_at {
        Some(changed) => now - changed > STARTING_TIMEOUT,
        None => false,
    }
}
