/**
 * API REST KOMORIUTA - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose la gestion des machines, les commandes d'alimentation et la
 * réception des heartbeats agents. Le statut courant est calculé à la
 * demande avec le classifieur, sans attendre le prochain tick.
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health
 * - Sans clé configurée, toute route protégée est refusée
 */

use crate::clock::Clock;
use crate::health::{HealthTracker, KernelHealth};
use crate::heartbeat::{HeartbeatAck, HeartbeatIngest};
use crate::models::{CurrentStatus, HeartbeatState, MachinePatch, MachineRecord, NewMachine, PowerState};
use crate::monitor::Monitor;
use crate::power::{PowerError, PowerService};
use crate::status::classify;
use crate::store::{MachineStore, StoreError};
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MachineStore>,
    pub clock: Arc<dyn Clock>,
    pub ingest: HeartbeatIngest,
    pub power: PowerService,
    pub monitor: Arc<Monitor>,
    pub health_tracker: HealthTracker,
    pub api_key: Option<String>,
}

/// Machine + statut courant calculé à l'instant de la requête
#[derive(Debug, Serialize, Deserialize)]
pub struct MachineView {
    #[serde(flatten)]
    pub machine: MachineRecord,
    pub current_status: CurrentStatus,
}

#[derive(Debug, Deserialize)]
struct PowerRequest {
    state: PowerState,
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    state: HeartbeatState,
}

fn to_view(app: &AppState, machine: MachineRecord) -> MachineView {
    let current_status = classify(&machine, app.clock.now());
    MachineView { machine, current_status }
}

fn store_status(e: StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        StoreError::Io(_) | StoreError::Serialization(_) => {
            tracing::error!(error = %e, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn power_status(e: PowerError) -> StatusCode {
    match e {
        PowerError::Store(e) => store_status(e),
        PowerError::Wake(e) => {
            tracing::error!(error = %e, "wake-on-lan failed");
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref() else {
        tracing::warn!("API key not configured - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        tracing::warn!(path = %req.uri().path(), "unauthorized API request");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/machines", get(list_machines).post(create_machine))
        .route("/machines/{id}", get(get_machine).patch(update_machine).delete(delete_machine))
        .route("/machines/{id}/power", post(set_power))
        .route("/agents/{uuid}/heartbeat", post(agent_heartbeat))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

/// Les appels store persistent sur disque sous verrou : pool bloquant
async fn blocking<T, F>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> Result<T, StatusCode> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "blocking task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Result<Json<KernelHealth>, StatusCode> {
    let health = blocking(move || Ok(app.health_tracker.get_health(app.store.as_ref(), &app.monitor))).await?;
    Ok(Json(health))
}

// GET /machines
async fn list_machines(State(app): State<AppState>) -> Result<Json<Vec<MachineView>>, StatusCode> {
    let store = app.store.clone();
    let machines = blocking(move || store.fetch_all().map_err(store_status)).await?;
    Ok(Json(machines.into_iter().map(|m| to_view(&app, m)).collect()))
}

// POST /machines
async fn create_machine(
    State(app): State<AppState>,
    Json(body): Json<NewMachine>,
) -> Result<(StatusCode, Json<MachineView>), StatusCode> {
    let (store, now) = (app.store.clone(), app.clock.now());
    let machine = blocking(move || store.register(body, now).map_err(store_status)).await?;
    Ok((StatusCode::CREATED, Json(to_view(&app, machine))))
}

// GET /machines/{id}
async fn get_machine(State(app): State<AppState>, Path(id): Path<u64>) -> Result<Json<MachineView>, StatusCode> {
    let store = app.store.clone();
    let machine = blocking(move || store.get(id).map_err(store_status)).await?;
    Ok(Json(to_view(&app, machine)))
}

// PATCH /machines/{id}
async fn update_machine(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<MachinePatch>,
) -> Result<Json<MachineView>, StatusCode> {
    let (store, now) = (app.store.clone(), app.clock.now());
    let machine = blocking(move || store.update(id, patch, now).map_err(store_status)).await?;
    Ok(Json(to_view(&app, machine)))
}

// DELETE /machines/{id}
async fn delete_machine(State(app): State<AppState>, Path(id): Path<u64>) -> Result<StatusCode, StatusCode> {
    blocking(move || app.store.remove(id).map_err(store_status)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /machines/{id}/power
async fn set_power(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<PowerRequest>,
) -> Result<Json<MachineView>, StatusCode> {
    let power = app.power.clone();
    // envoi UDP et écriture store bloquants
    let machine = blocking(move || power.set_power(id, body.state).map_err(power_status)).await?;
    Ok(Json(to_view(&app, machine)))
}

// POST /agents/{uuid}/heartbeat
async fn agent_heartbeat(
    State(app): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatAck>, StatusCode> {
    let ack = blocking(move || app.ingest.ingest(uuid, body.state).map_err(store_status)).await?;
    Ok(Json(ack))
}
