/**
 * KOMORIUTA KERNEL - Suivi d'état des machines pilotées à distance
 *
 * RÔLE : Dérive un statut courant fiable pour chaque machine à partir de
 * deux signaux asynchrones : le dernier état d'alimentation commandé
 * (Wake-on-LAN / arrêt) et le dernier heartbeat de son agent.
 *
 * ARCHITECTURE :
 * - status  : classifieur pur (table de transition + délais)
 * - monitor : boucle périodique qui classe et corrige l'état d'alimentation
 * - heartbeat / power : entrées des deux signaux
 * - store   : persistance JSON des enregistrements
 * - http / mqtt : transports
 */

pub mod clock;
pub mod config;
pub mod events;
pub mod health;
pub mod heartbeat;
pub mod http;
pub mod models;
pub mod monitor;
pub mod mqtt;
pub mod power;
pub mod status;
pub mod store;
pub mod wol;

pub use clock::{Clock, SystemClock};
pub use events::{EventSink, MonitorEvent, TracingSink};
pub use heartbeat::{HeartbeatAck, HeartbeatIngest, HeartbeatReport};
pub use models::{CurrentStatus, HeartbeatState, MachinePatch, MachineRecord, NewMachine, PowerState};
pub use monitor::{Monitor, TickReport, MONITOR_TICK_PERIOD};
pub use power::{PowerError, PowerService};
pub use status::classify;
pub use store::{JsonMachineStore, MachineStore, StoreError};
