/**
 * MODELS - Enregistrement machine et énumérations d'état
 *
 * RÔLE : État durable par machine lu et écrit par le moteur de réconciliation.
 * Deux signaux indépendants : l'état d'alimentation commandé (power) et le
 * dernier rapport de vie de l'agent (heartbeat).
 *
 * INVARIANTS :
 * - previous_heartbeat_state = valeur de heartbeat_state un ingest plus tôt
 * - last_heartbeat_at == None ssi aucun heartbeat n'a jamais été reçu
 * - tout changement de power_state met à jour last_power_changed_at
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Cadence de heartbeat par défaut déclarée à l'enregistrement (secondes)
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u32 = 60;

/// Dernier état d'alimentation commandé (pas forcément l'état physique réel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    #[default]
    Off,
    On,
}

impl PowerState {
    pub const ALL: [PowerState; 2] = [PowerState::On, PowerState::Off];
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::Off => f.write_str("OFF"),
            PowerState::On => f.write_str("ON"),
        }
    }
}

/// Phase de vie auto-déclarée par l'agent de la machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeartbeatState {
    #[default]
    None,
    Launched,
    On,
    Stopping,
}

impl HeartbeatState {
    pub const ALL: [HeartbeatState; 4] = [
        HeartbeatState::Launched,
        HeartbeatState::On,
        HeartbeatState::None,
        HeartbeatState::Stopping,
    ];
}

impl fmt::Display for HeartbeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeartbeatState::None => f.write_str("None"),
            HeartbeatState::Launched => f.write_str("Launched"),
            HeartbeatState::On => f.write_str("ON"),
            HeartbeatState::Stopping => f.write_str("Stopping"),
        }
    }
}

/// Statut courant dérivé, jamais stocké.
///
/// `SyncedOn`/`SyncedOff` sont des signaux transitoires : la vie observée
/// contredit l'état d'alimentation enregistré, la boucle de monitoring
/// corrige alors l'enregistrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CurrentStatus {
    Applying,
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
    Starting,
    Stopping,
    #[serde(rename = "SyncedON")]
    SyncedOn,
    #[serde(rename = "SyncedOFF")]
    SyncedOff,
    Lost,
    Warning,
    Error,
}

impl CurrentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrentStatus::Applying => "Applying",
            CurrentStatus::On => "ON",
            CurrentStatus::Off => "OFF",
            CurrentStatus::Starting => "Starting",
            CurrentStatus::Stopping => "Stopping",
            CurrentStatus::SyncedOn => "SyncedON",
            CurrentStatus::SyncedOff => "SyncedOFF",
            CurrentStatus::Lost => "Lost",
            CurrentStatus::Warning => "Warning",
            CurrentStatus::Error => "Error",
        }
    }

    /// État d'alimentation à réécrire pour les statuts de synchronisation
    pub fn write_back(&self) -> Option<PowerState> {
        match self {
            CurrentStatus::SyncedOn => Some(PowerState::On),
            CurrentStatus::SyncedOff => Some(PowerState::Off),
            _ => None,
        }
    }
}

impl fmt::Display for CurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enregistrement durable d'une machine suivie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub id: u64,
    pub uuid: Uuid,
    pub name: String,
    pub mac_address: String,
    pub power_state: PowerState,
    pub heartbeat_state: HeartbeatState,
    pub previous_heartbeat_state: HeartbeatState,
    pub heartbeat_interval_seconds: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_heartbeat_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_power_changed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MachineRecord {
    /// Nouvelle machine avec les valeurs par défaut du cycle de vie
    pub fn new(id: u64, uuid: Uuid, machine: NewMachine, now: OffsetDateTime) -> Self {
        Self {
            id,
            uuid,
            name: machine.name,
            mac_address: machine.mac_address,
            power_state: PowerState::Off,
            heartbeat_state: HeartbeatState::None,
            previous_heartbeat_state: HeartbeatState::None,
            heartbeat_interval_seconds: machine
                .heartbeat_interval_seconds
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECONDS),
            last_heartbeat_at: None,
            last_power_changed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Décale heartbeat_state dans previous_heartbeat_state puis écrase.
    /// Aucune validation de légalité : les séquences illégales ressortent
    /// en `Error` au classement.
    pub fn record_heartbeat(&mut self, state: HeartbeatState, at: OffsetDateTime) {
        self.previous_heartbeat_state = self.heartbeat_state;
        self.heartbeat_state = state;
        self.last_heartbeat_at = Some(at);
        self.updated_at = at;
    }

    pub fn set_power_state(&mut self, state: PowerState, at: OffsetDateTime) {
        self.power_state = state;
        self.last_power_changed_at = Some(at);
        self.updated_at = at;
    }

    pub fn apply_patch(&mut self, patch: MachinePatch, at: OffsetDateTime) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(mac) = patch.mac_address {
            self.mac_address = mac;
        }
        if let Some(interval) = patch.heartbeat_interval_seconds {
            self.heartbeat_interval_seconds = interval;
        }
        self.updated_at = at;
    }

    /// Mêmes entrées de classement (alimentation + heartbeats) que `other`
    pub fn same_evidence(&self, other: &MachineRecord) -> bool {
        self.power_state == other.power_state
            && self.heartbeat_state == other.heartbeat_state
            && self.previous_heartbeat_state == other.previous_heartbeat_state
            && self.last_heartbeat_at == other.last_heartbeat_at
            && self.last_power_changed_at == other.last_power_changed_at
            && self.heartbeat_interval_seconds == other.heartbeat_interval_seconds
    }
}

/// Données d'enregistrement d'une nouvelle machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMachine {
    pub name: String,
    pub mac_address: String,
    #[serde(default)]
    pub heartbeat_interval_seconds: Option<u32>,
}

impl NewMachine {
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)?;
        validate_mac(&self.mac_address)?;
        if let Some(interval) = self.heartbeat_interval_seconds {
            validate_interval(interval)?;
        }
        Ok(())
    }
}

/// Mise à jour partielle des données d'enregistrement.
/// Ne touche jamais aux champs power/heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachinePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub heartbeat_interval_seconds: Option<u32>,
}

impl MachinePatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(mac) = &self.mac_address {
            validate_mac(mac)?;
        }
        if let Some(interval) = self.heartbeat_interval_seconds {
            validate_interval(interval)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".into());
    }
    Ok(())
}

fn validate_mac(mac: &str) -> Result<(), String> {
    crate::wol::parse_mac(mac)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn validate_interval(interval: u32) -> Result<(), String> {
    if interval == 0 {
        return Err("heartbeat_interval_seconds must be >= 1".into());
    }
    Ok(())
}
