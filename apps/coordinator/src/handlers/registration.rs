// [apps/coordinator/src/handlers/registration.rs]
/*!
 * =================================================================
 * APARATO: REGISTRATION SURFACE (V4.0 - HANDSHAKE GATE)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: EMISIÓN DE TOKENS Y HANDSHAKE DE ALTA DE NODOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONE-SHOT SECRET: El handshake consume el token de un solo uso,
 *    forja el secreto del nodo y lo entrega UNA vez en claro; el
 *    Ledger solamente guarda la huella SHA-256.
 * 2. UPSERT RE-ENTRY: El re-registro de nodos conocidos exige el
 *    secreto vigente y delega en el registrar (metadatos o retorno).
 * =================================================================
 */

use crate::services::registrar::{hash_node_secret, RegistrationOutcome, RegistrationRequest};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct IssueTokenBody {
    pub user_id: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenListQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HandshakeBody {
    pub token: String,
    pub node_id: String,
    #[serde(default)]
    pub host: Option<String>,
    pub capacity_mb: i64,
    #[serde(default)]
    pub agent_version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReregisterBody {
    #[serde(default)]
    pub host: Option<String>,
    pub capacity_mb: i64,
    #[serde(default)]
    pub agent_version: Option<String>,
}

pub struct RegistrationHandler;

impl RegistrationHandler {
    /// Endpoint: POST /api/v1/admin/registration-tokens
    #[instrument(skip(application_state, body))]
    pub async fn handle_issue_token(
        State(application_state): State<AppState>,
        Json(body): Json<IssueTokenBody>,
    ) -> Response {
        match application_state
            .token_store
            .create(&body.user_id, body.label.as_deref())
            .await
        {
            Ok(issued_token) => (StatusCode::CREATED, Json(issued_token)).into_response(),
            Err(issue_fault) => {
                error!("❌ [TOKEN_ISSUE_FAULT]: {}", issue_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Endpoint: GET /api/v1/admin/registration-tokens?user_id=
    #[instrument(skip(application_state))]
    pub async fn handle_list_active_tokens(
        State(application_state): State<AppState>,
        Query(query): Query<TokenListQuery>,
    ) -> Response {
        match application_state.token_store.list_active(&query.user_id).await {
            Ok(active_tokens) => (StatusCode::OK, Json(active_tokens)).into_response(),
            Err(list_fault) => {
                error!("❌ [TOKEN_LIST_FAULT]: {}", list_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /**
     * Endpoint: POST /internal/nodes/register
     * Handshake de alta: consumo atómico del token, forja del secreto y
     * activación self-hosted a nombre del emisor del token.
     */
    #[instrument(skip(application_state, body))]
    pub async fn handle_registration_handshake(
        State(application_state): State<AppState>,
        Json(body): Json<HandshakeBody>,
    ) -> Response {
        // 1. CONSUMO DE UN SOLO USO
        let consumed_token = match application_state
            .token_store
            .consume(&body.token, &body.node_id)
            .await
        {
            Ok(Some(consumed)) => consumed,
            Ok(None) => {
                warn!("🚫 [HANDSHAKE_DENIED]: Node [{}] presented a void token.", body.node_id);
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "invalid or expired token" })),
                )
                    .into_response();
            }
            Err(consume_fault) => {
                error!("❌ [HANDSHAKE_FAULT]: {}", consume_fault);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        // 2. FORJA DEL SECRETO (una sola entrega en claro)
        let mut secret_entropy = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret_entropy);
        let node_secret_cleartext = hex::encode(secret_entropy);
        let node_secret_digest = hash_node_secret(&node_secret_cleartext);

        let registration_request = RegistrationRequest {
            node_id: body.node_id.clone(),
            host: body.host.clone(),
            capacity_mb: body.capacity_mb,
            agent_version: body.agent_version.clone(),
        };

        // 3. ALTA SELF-HOSTED A NOMBRE DEL EMISOR DEL TOKEN
        match application_state
            .registrar
            .register_self_hosted(
                &registration_request,
                &consumed_token.user_id,
                consumed_token.label.as_deref(),
                &node_secret_digest,
            )
            .await
        {
            Ok(activated_node) => {
                info!("🤝 [HANDSHAKE_SEALED]: Node [{}] active with fresh secret.", activated_node.id);
                (
                    StatusCode::CREATED,
                    Json(json!({
                        "node_id": activated_node.id,
                        "node_secret": node_secret_cleartext,
                        "status": activated_node.status,
                    })),
                )
                    .into_response()
            }
            Err(registration_fault) => {
                error!("❌ [HANDSHAKE_FAULT]: {}", registration_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /**
     * Endpoint: POST /internal/nodes/{node_id}/reregister
     * Re-registro de nodos conocidos autenticado con el secreto vigente.
     */
    #[instrument(skip(application_state, headers, body))]
    pub async fn handle_reregistration(
        State(application_state): State<AppState>,
        Path(node_identifier): Path<String>,
        headers: HeaderMap,
        Json(body): Json<ReregisterBody>,
    ) -> Response {
        // Guardia de secreto idéntico al del enlace WebSocket.
        let presented_secret = headers
            .get("authorization")
            .and_then(|header_value| header_value.to_str().ok())
            .and_then(|raw_header| raw_header.strip_prefix("Bearer "))
            .map(|secret| secret.to_string());

        let Some(presented_secret) = presented_secret else {
            return StatusCode::UNAUTHORIZED.into_response();
        };

        let known_node = match application_state.node_repository.try_get(&node_identifier).await {
            Ok(Some(node)) => node,
            Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
            Err(lookup_fault) => {
                error!("❌ [REREGISTER_FAULT]: {}", lookup_fault);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let secret_matches = known_node
            .node_secret_hash
            .as_deref()
            .map(|stored_hash| stored_hash == hash_node_secret(&presented_secret))
            .unwrap_or(false);

        if !secret_matches {
            return StatusCode::UNAUTHORIZED.into_response();
        }

        let registration_request = RegistrationRequest {
            node_id: node_identifier,
            host: body.host,
            capacity_mb: body.capacity_mb,
            agent_version: body.agent_version,
        };

        match application_state.registrar.register(&registration_request).await {
            Ok(outcome) => {
                let (node, disposition) = match &outcome {
                    RegistrationOutcome::FirstRegistration(node) => (node, "first_registration"),
                    RegistrationOutcome::Reregistration(node) => (node, "re_registration"),
                    RegistrationOutcome::MetadataRefreshed(node) => (node, "metadata_refreshed"),
                };
                (
                    StatusCode::OK,
                    Json(json!({
                        "node_id": node.id,
                        "status": node.status,
                        "disposition": disposition,
                    })),
                )
                    .into_response()
            }
            Err(registration_fault) => {
                error!("❌ [REREGISTER_FAULT]: {}", registration_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
