/*!
Doubles de test pour les collaborateurs du kernel

Remplacent l'horloge système, la sortie d'observabilité, l'émetteur
Wake-on-LAN et le store. Tout est enregistré pour les assertions.
*/

use komoriuta_kernel::wol::{parse_mac, WolError, Waker};
use komoriuta_kernel::{
    Clock, CurrentStatus, EventSink, HeartbeatState, MachinePatch, MachineRecord, MachineStore, MonitorEvent,
    NewMachine, PowerState, StoreError,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Horloge avancée à la main par le test
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

/// Sink qui conserve tous les événements émis
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<MonitorEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().clone()
    }

    /// Statuts émis pour une machine, dans l'ordre des ticks
    pub fn statuses_for(&self, machine_id: u64) -> Vec<CurrentStatus> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.machine_id == machine_id)
            .map(|e| e.status)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &MonitorEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Émetteur Wake-on-LAN qui n'envoie rien sur le réseau
#[derive(Debug, Clone, Default)]
pub struct RecordingWaker {
    sent: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingWaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl Waker for RecordingWaker {
    fn wake(&self, mac: &str) -> Result<(), WolError> {
        parse_mac(mac)?;
        if *self.failing.lock() {
            return Err(WolError::SendFailed(std::net::Ipv4Addr::BROADCAST));
        }
        self.sent.lock().push(mac.to_string());
        Ok(())
    }
}

/// Heartbeat injecté juste après le prochain snapshot
type PendingHeartbeat = (u64, HeartbeatState, OffsetDateTime);

/// Store enveloppe : fait échouer les écritures de power_state
/// (ou le fetch complet) sur demande, peut glisser un heartbeat entre
/// le snapshot d'un tick et ses write-backs, délègue tout le reste
#[derive(Clone)]
pub struct FlakyStore {
    inner: Arc<dyn MachineStore>,
    failing_power_writes: Arc<Mutex<HashSet<u64>>>,
    failing_fetch: Arc<Mutex<bool>>,
    after_fetch: Arc<Mutex<Option<PendingHeartbeat>>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn MachineStore>) -> Self {
        Self {
            inner,
            failing_power_writes: Arc::new(Mutex::new(HashSet::new())),
            failing_fetch: Arc::new(Mutex::new(false)),
            after_fetch: Arc::new(Mutex::new(None)),
        }
    }

    /// Le prochain `fetch_all` rend son snapshot puis ingère ce heartbeat
    pub fn heartbeat_after_next_fetch(&self, id: u64, state: HeartbeatState, at: OffsetDateTime) {
        *self.after_fetch.lock() = Some((id, state, at));
    }

    pub fn fail_power_writes_for(&self, id: u64) {
        self.failing_power_writes.lock().insert(id);
    }

    pub fn heal(&self) {
        self.failing_power_writes.lock().clear();
        *self.failing_fetch.lock() = false;
    }

    pub fn fail_fetch(&self) {
        *self.failing_fetch.lock() = true;
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Io(std::io::Error::other(format!("injected {what} failure")))
    }
}

impl MachineStore for FlakyStore {
    fn fetch_all(&self) -> Result<Vec<MachineRecord>, StoreError> {
        if *self.failing_fetch.lock() {
            return Err(Self::injected("fetch"));
        }
        let snapshot = self.inner.fetch_all()?;
        let pending = self.after_fetch.lock().take();
        if let Some((id, state, at)) = pending {
            self.inner.ingest_heartbeat(id, state, at)?;
        }
        Ok(snapshot)
    }

    fn get(&self, id: u64) -> Result<MachineRecord, StoreError> {
        self.inner.get(id)
    }

    fn find_by_uuid(&self, uuid: Uuid) -> Result<MachineRecord, StoreError> {
        self.inner.find_by_uuid(uuid)
    }

    fn register(&self, machine: NewMachine, now: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        self.inner.register(machine, now)
    }

    fn update(&self, id: u64, patch: MachinePatch, now: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        self.inner.update(id, patch, now)
    }

    fn update_power_state(&self, id: u64, state: PowerState, at: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        if self.failing_power_writes.lock().contains(&id) {
            return Err(Self::injected("power write"));
        }
        self.inner.update_power_state(id, state, at)
    }

    fn sync_power_state(
        &self,
        snapshot: &MachineRecord,
        state: PowerState,
        at: OffsetDateTime,
    ) -> Result<Option<MachineRecord>, StoreError> {
        if self.failing_power_writes.lock().contains(&snapshot.id) {
            return Err(Self::injected("power write"));
        }
        self.inner.sync_power_state(snapshot, state, at)
    }

    fn ingest_heartbeat(&self, id: u64, state: HeartbeatState, at: OffsetDateTime) -> Result<MachineRecord, StoreError> {
        self.inner.ingest_heartbeat(id, state, at)
    }

    fn remove(&self, id: u64) -> Result<(), StoreError> {
        self.inner.remove(id)
    }
}
