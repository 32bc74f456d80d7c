/**
 * MACHINE STORE - Persistance des enregistrements machines
 *
 * RÔLE :
 * Interface unique de lecture/écriture des MachineRecord, partagée entre
 * l'ingestion des heartbeats, les commandes d'alimentation et la boucle
 * de monitoring.
 *
 * FONCTIONNEMENT :
 * - MachineStore trait = opérations atomiques par groupe de champs
 * - JsonMachineStore = cache mémoire sous Mutex + fichier JSON optionnel
 * - Chaque mutation est appliquée sous le même verrou => pas de lecture
 *   déchirée, dernier écrivain gagnant entre commande et write-back
 * - Sauvegarde atomique : fichier temporaire puis rename
 */

use crate::models::{HeartbeatState, MachinePatch, MachineRecord, NewMachine, PowerState};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

/// Erreurs possibles lors des opérations sur le store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Machine not found: {0}")]
    NotFound(String),
    #[error("Invalid machine data: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Interface commune de persistance des machines.
/// Les implémentations garantissent l'atomicité de chaque mutation.
pub trait MachineStore: Send + Sync {
    /// Snapshot de toutes les machines, triées par id
    fn fetch_all(&self) -> Result<Vec<MachineRecord>, StoreError>;

    fn get(&self, id: u64) -> Result<MachineRecord, StoreError>;

    fn find_by_uuid(&self, uuid: Uuid) -> Result<MachineRecord, StoreError>;

    fn register(&self, machine: NewMachine, now: OffsetDateTime) -> Result<MachineRecord, StoreError>;

    fn update(&self, id: u64, patch: MachinePatch, now: OffsetDateTime) -> Result<MachineRecord, StoreError>;

    /// Change power_state et horodate last_power_changed_at
    fn update_power_state(&self, id: u64, state: PowerState, at: OffsetDateTime) -> Result<MachineRecord, StoreError>;

    /// Write-back du monitor : n'applique `state` que si l'enregistrement
    /// a encore les entrées de classement de `snapshot`. `Ok(None)` quand
    /// un heartbeat ou une commande est arrivé entre-temps.
    fn sync_power_state(
        &self,
        snapshot: &MachineRecord,
        state: PowerState,
        at: OffsetDateTime,
    ) -> Result<Option<MachineRecord>, StoreError>;

    /// Décale heartbeat_state -> previous_heartbeat_state, écrase, horodate
    fn ingest_heartbeat(&self, id: u64, state: HeartbeatState, at: OffsetDateTime) -> Result<MachineRecord, StoreError>;

    fn remove(&self, id: u64) -> Result<(), StoreError>;
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StoreFile {
    next_id: u64,
    machines: Vec<MachineRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    machines: BTreeMap<u64, MachineRecord>,
}

/// Store JSON : cache mémoire + fichier de persistance optionnel
pub struct JsonMachineStore {
    storage_path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl JsonMachineStore {
    /// Store sans fichier (tests, démo)
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            inner: Mutex::new(Inner { next_id: 1, machines: BTreeMap::new() }),
        }
    }

    /// Ouvre le fichier de stockage, le crée s'il n'existe pas
    pub fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let path = storage_path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            storage_path: Some(path.clone()),
            inner: Mutex::new(Inner { next_id: 1, machines: BTreeMap::new() }),
        };

        if path.exists() {
            store.load_from_disk(&path)?;
        } else {
            let inner = store.inner.lock();
            store.save(&inner)?;
        }

        tracing::info!(path = %path.display(), machines = store.inner.lock().machines.len(), "machine store opened");
        Ok(store)
    }

    fn load_from_disk(&self, path: &Path) -> Result<(), StoreError> {
        let content = std::fs::read_to_string(path)?;
        let file: StoreFile = if content.trim().is_empty() {
            StoreFile::default()
        } else {
            serde_json::from_str(&content)?
        };

        let machines: BTreeMap<u64, MachineRecord> =
            file.machines.into_iter().map(|m| (m.id, m)).collect();
        // next_id jamais en dessous du plus grand id connu
        let max_id = machines.keys().next_back().copied().unwrap_or(0);

        let mut inner = self.inner.lock();
        inner.next_id = file.next_id.max(max_id + 1);
        inner.machines = machines;
        Ok(())
    }

    /// Écrit l'état complet ; appelé avec le verrou tenu
    fn save(&self, inner: &Inner) -> Result<(), StoreError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let file = StoreFile {
            next_id: inner.next_id,
            machines: inner.machines.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    /// Applique une mutation sous verrou puis persiste
    fn mutate<F>(&self, id: u64, f: F) -> Result<MachineRecord, StoreError>
    where
        F: FnOnce(&mut MachineRecord),
    {
        self.mutate_if(id, |_| true, f)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Comme `mutate`, mais ne touche à rien si `guard` refuse l'état courant
    fn mutate_if<G, F>(&self, id: u64, guard: G, f: F) -> Result<Option<MachineRecord>, StoreError>
    where
        G: FnOnce(&MachineRecord) -> bool,
        F: FnOnce(&mut MachineRecord),
    {
        let mut inner = self.inner.lock();
        let record = inner
            .machines
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !guard(record) {
            return Ok(None);
        }
        let original = record.clone();
        f(record);
        let updated = record.clone();

        if let Err(e) = self.save(&inner) {
            inner.machines.insert(id, original);
            return Err(e);
        }
        Ok(Some(updated))
    }
}

impl MachineStore for JsonMachineStore {
    fn fetch_all(&self) -> Result<Vec<MachineRecord>, StoreError> {
        Ok(self.inner.lock().machines.values().cloned().collect())
    }

    fn get(&self, id: u64) -> Result<MachineRecord, StoreError> {
        self.inner
            .lock()
            .machines
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn find_by_uuid(&self, uuid: Uuid) -> Result<MachineRecord, StoreError> {
        self.inner
            .lock()
            .machines
            .values()
            .find(|m| m.uuid == uuid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(uuid.to_string()))
    }

    fn register(&self, machine: NewMachine, now: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        machine.validate().map_err(StoreError::Invalid)?;

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        let record = MachineRecord::new(id, Uuid::new_v4(), machine, now);
        inner.next_id += 1;
        inner.machines.insert(id, record.clone());

        if let Err(e) = self.save(&inner) {
            // pas de machine fantôme si la persistance échoue
            inner.machines.remove(&id);
            inner.next_id -= 1;
            return Err(e);
        }

        tracing::info!(machine_id = id, name = %record.name, uuid = %record.uuid, "machine registered");
        Ok(record)
    }

    fn update(&self, id: u64, patch: MachinePatch, now: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        patch.validate().map_err(StoreError::Invalid)?;
        self.mutate(id, |record| record.apply_patch(patch, now))
    }

    fn update_power_state(&self, id: u64, state: PowerState, at: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        self.mutate(id, |record| record.set_power_state(state, at))
    }

    fn sync_power_state(
        &self,
        snapshot: &MachineRecord,
        state: PowerState,
        at: OffsetDateTime,
    ) -> Result<Option<MachineRecord>, StoreError> {
        self.mutate_if(snapshot.id, |current| current.same_evidence(snapshot), |record| {
            record.set_power_state(state, at)
        })
    }

    fn ingest_heartbeat(&self, id: u64, state: HeartbeatState, at: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        self.mutate(id, |record| record.record_heartbeat(state, at))
    }

    fn remove(&self, id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(removed) = inner.machines.remove(&id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        if let Err(e) = self.save(&inner) {
            inner.machines.insert(id, removed);
            return Err(e);
        }
        tracing::info!(machine_id = id, "machine removed");
        Ok(())
    }
}
