/*!
Test Harness du kernel Komoriuta

Câble un kernel complet en mémoire :
- Store JSON en mémoire derrière un FlakyStore (pannes injectables)
- Horloge manuelle partagée par tous les composants
- Sink et émetteur WoL enregistreurs
- Monitor, ingestion heartbeat, service d'alimentation et état HTTP
*/

use crate::fixtures::MachineBuilder;
use crate::stubs::{FlakyStore, ManualClock, RecordingSink, RecordingWaker};
use komoriuta_kernel::health::HealthTracker;
use komoriuta_kernel::http::AppState;
use komoriuta_kernel::{
    HeartbeatIngest, JsonMachineStore, MachineRecord, MachineStore, Monitor, PowerService, StoreError, TickReport,
};
use std::sync::Arc;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub const TEST_API_KEY: &str = "test-key";

/// Instant de départ de toutes les horloges de test
pub const EPOCH: OffsetDateTime = datetime!(2024-01-01 12:00:00 UTC);

pub struct TestHarness {
    pub store: FlakyStore,
    pub clock: ManualClock,
    pub sink: RecordingSink,
    pub waker: RecordingWaker,
    pub monitor: Arc<Monitor>,
    pub ingest: HeartbeatIngest,
    pub power: PowerService,
    pub health_tracker: HealthTracker,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();

        let store = FlakyStore::new(Arc::new(JsonMachineStore::in_memory()));
        let clock = ManualClock::new(EPOCH);
        let sink = RecordingSink::new();
        let waker = RecordingWaker::new();

        let shared_store: Arc<dyn MachineStore> = Arc::new(store.clone());
        let shared_clock = Arc::new(clock.clone());

        Self {
            monitor: Arc::new(Monitor::new(shared_store.clone(), Arc::new(sink.clone()), shared_clock.clone())),
            ingest: HeartbeatIngest::new(shared_store.clone(), shared_clock.clone()),
            power: PowerService::new(shared_store, Arc::new(waker.clone()), shared_clock),
            health_tracker: HealthTracker::new(),
            store,
            clock,
            sink,
            waker,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        komoriuta_kernel::Clock::now(&self.clock)
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Enregistre une machine construite avec le builder, à l'instant courant
    pub fn add(&self, builder: MachineBuilder) -> Result<MachineRecord, StoreError> {
        builder.register(&self.store, self.now())
    }

    pub fn machine(&self, id: u64) -> Result<MachineRecord, StoreError> {
        self.store.get(id)
    }

    pub fn tick(&self) -> Result<TickReport, StoreError> {
        self.monitor.tick()
    }

    /// État HTTP protégé par TEST_API_KEY
    pub fn app_state(&self) -> AppState {
        self.app_state_with_key(Some(TEST_API_KEY.to_string()))
    }

    pub fn app_state_with_key(&self, api_key: Option<String>) -> AppState {
        AppState {
            store: Arc::new(self.store.clone()),
            clock: Arc::new(self.clock.clone()),
            ingest: self.ingest.clone(),
            power: self.power.clone(),
            monitor: self.monitor.clone(),
            health_tracker: self.health_tracker.clone(),
            api_key,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs de test (RUST_LOG) ; ignorer si déjà initialisé
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
