/*!
# Komoriuta DevKit - Doubles et utilitaires de test du kernel

Bibliothèque facilitant les tests du moteur de réconciliation avec:
- Horloge manuelle pour piloter les délais sans attendre
- Sink d'événements et émetteur Wake-on-LAN enregistreurs
- Store à pannes injectables (write-back qui échoue sur une machine)
- Builder d'enregistrements machines
- Harness complet câblant store, monitor, ingest et API HTTP
*/

pub mod fixtures;
pub mod stubs;
pub mod test_utils;

pub use fixtures::MachineBuilder;
pub use stubs::{FlakyStore, ManualClock, RecordingSink, RecordingWaker};
pub use test_utils::{init_tracing, TestHarness, EPOCH, TEST_API_KEY};
