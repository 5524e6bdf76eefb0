// [apps/coordinator/src/handlers/nodes.rs]
/*!
 * =================================================================
 * APARATO: FLEET ADMINISTRATION SURFACE (V4.0)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: ADAPTADORES FINOS SOBRE DRENAJE, RESCATE Y AUDITORÍA
 * =================================================================
 */

use crate::state::AppState;
use aviary_domain_models::{NodeStatus, RecoveryTrigger};
use aviary_infra_db::DbError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, instrument};

pub struct FleetAdministrationHandler;

impl FleetAdministrationHandler {
    /// Endpoint: GET /api/v1/admin/nodes
    #[instrument(skip(application_state))]
    pub async fn handle_list_fleet(State(application_state): State<AppState>) -> Response {
        let full_catalog = [
            NodeStatus::Provisioning,
            NodeStatus::Active,
            NodeStatus::Draining,
            NodeStatus::Returning,
            NodeStatus::Offline,
            NodeStatus::Recovering,
            NodeStatus::Failed,
            NodeStatus::Degraded,
        ];

        match application_state.node_repository.list_by_status(&full_catalog).await {
            Ok(fleet_inventory) => (StatusCode::OK, Json(fleet_inventory)).into_response(),
            Err(inventory_fault) => {
                error!("❌ [FLEET_LIST_FAULT]: {}", inventory_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Endpoint: GET /api/v1/admin/nodes/{node_id}/transitions
    #[instrument(skip(application_state))]
    pub async fn handle_list_transitions(
        State(application_state): State<AppState>,
        Path(node_identifier): Path<String>,
    ) -> Response {
        match application_state.node_repository.list_transitions(&node_identifier).await {
            Ok(audit_trail) => (StatusCode::OK, Json(audit_trail)).into_response(),
            Err(audit_fault) => {
                error!("❌ [AUDIT_TRAIL_FAULT]: {}", audit_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Endpoint: POST /api/v1/admin/nodes/{node_id}/drain
    #[instrument(skip(application_state))]
    pub async fn handle_drain(
        State(application_state): State<AppState>,
        Path(node_identifier): Path<String>,
    ) -> Response {
        match application_state.drain_orchestrator.drain(&node_identifier).await {
            Ok(drain_report) => (
                StatusCode::OK,
                Json(json!({
                    "migrated": drain_report.migrated,
                    "failed": drain_report
                        .failed
                        .iter()
                        .map(|(bot_identifier, reason)| json!({ "bot": bot_identifier, "reason": reason }))
                        .collect::<Vec<_>>(),
                })),
            )
                .into_response(),
            Err(drain_fault) => classify_fleet_fault(drain_fault),
        }
    }

    /// Endpoint: POST /api/v1/admin/nodes/{node_id}/recover
    #[instrument(skip(application_state))]
    pub async fn handle_manual_recovery(
        State(application_state): State<AppState>,
        Path(node_identifier): Path<String>,
    ) -> Response {
        match application_state
            .recovery_orchestrator
            .trigger_recovery(&node_identifier, RecoveryTrigger::Manual)
            .await
        {
            Ok(recovery_report) => (StatusCode::OK, Json(recovery_report)).into_response(),
            Err(recovery_fault) => classify_fleet_fault(recovery_fault),
        }
    }

    /// Endpoint: POST /api/v1/admin/recovery/{event_id}/retry
    #[instrument(skip(application_state))]
    pub async fn handle_retry_waiting(
        State(application_state): State<AppState>,
        Path(event_identifier): Path<String>,
    ) -> Response {
        match application_state
            .recovery_orchestrator
            .retry_waiting(&event_identifier)
            .await
        {
            Ok(retry_report) => (StatusCode::OK, Json(retry_report)).into_response(),
            Err(retry_fault) => classify_fleet_fault(retry_fault),
        }
    }
}

/// Clasificación de fallos de flota hacia códigos HTTP.
fn classify_fleet_fault(fault: DbError) -> Response {
    match &fault {
        DbError::NodeNotFound(_) | DbError::RecoveryEventNotFound(_) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": fault.to_string() }))).into_response()
        }
        DbError::InvalidTransition(_) | DbError::ConcurrentTransition { .. } => {
            (StatusCode::CONFLICT, Json(json!({ "error": fault.to_string() }))).into_response()
        }
        _ => {
            error!("❌ [FLEET_ADMIN_FAULT]: {}", fault);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
