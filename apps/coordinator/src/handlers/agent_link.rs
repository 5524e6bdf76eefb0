// [apps/coordinator/src/handlers/agent_link.rs]
/*!
 * =================================================================
 * APARATO: AGENT LINK SOCKET (V7.0 - DUPLEX SOBERANO)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: ENLACE FULL-DUPLEX COORDINADOR <-> AGENTE DE NODO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SECRET GATE: La negociación exige 'Authorization: Bearer <secreto>';
 *    el servidor compara la huella SHA-256 contra 'node_secret_hash' y
 *    jamás persiste el texto claro.
 * 2. DUAL TASK ARCHITECTURE: Downstream (frames del bus + keep-alive) y
 *    Upstream (latidos, resultados, eventos de salud) con colapso
 *    controlado vía AbortHandles y desmontaje del registro de enlaces.
 * 3. COOPERATIVE FRAMES: Un frame entrante a la vez por socket; la
 *    ingesta pesada corre inline y el keep-alive vive en el Downstream.
 * =================================================================
 */

use crate::services::heartbeat::ingest_heartbeat;
use crate::services::registrar::hash_node_secret;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use aviary_domain_models::AgentFrame;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// Intervalo de keep-alive físico (Ping). Sintonizado para prevenir
/// cierres por inactividad en proxies de Capa 7.
const KEEPALIVE_INTERVAL_SECONDS: u64 = 25;

/**
 * Punto de entrada del enlace: GET /internal/nodes/{node_id}/ws.
 * Valida el secreto del nodo antes de la transición de protocolo.
 */
pub async fn establish_agent_link(
    websocket_upgrade: WebSocketUpgrade,
    Path(node_identifier): Path<String>,
    headers: HeaderMap,
    State(application_state): State<AppState>,
) -> impl IntoResponse {
    // 1. GUARDIA DE SECRETO (texto claro -> huella SHA-256)
    let Some(presented_secret) = extract_bearer_secret(&headers) else {
        warn!("🚫 [LINK_DENIED]: Node [{}] presented no bearer secret.", node_identifier);
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let known_node = match application_state.node_repository.try_get(&node_identifier).await {
        Ok(Some(node)) => node,
        Ok(None) => {
            warn!("🚫 [LINK_DENIED]: Unknown node [{}].", node_identifier);
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(lookup_fault) => {
            error!("❌ [LINK_LOOKUP_FAULT]: {}", lookup_fault);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let secret_matches = known_node
        .node_secret_hash
        .as_deref()
        .map(|stored_hash| stored_hash == hash_node_secret(&presented_secret))
        .unwrap_or(false);

    if !secret_matches {
        warn!("🚫 [LINK_DENIED]: Node [{}] secret digest mismatch.", node_identifier);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    debug!("🔌 [SOCKET_UPGRADE]: Negotiating protocol transition for node [{}]...", node_identifier);
    websocket_upgrade
        .on_upgrade(move |socket| handle_active_agent_link(socket, application_state, node_identifier))
        .into_response()
}

/// Orquestador soberano de la sesión del agente.
async fn handle_active_agent_link(socket: WebSocket, application_state: AppState, node_identifier: String) {
    let (mut socket_sender, mut socket_receiver) = socket.split();

    // Registro del enlace: el bus de comandos lo consulta en cada envío.
    let (mut outbound_frame_receiver, link_identity_sender) =
        application_state.link_registry.attach(&node_identifier);

    info!("⚡ [UPLINK_OPEN]: Agent link for node [{}] established.", node_identifier);

    // --- TAREA 1: DOWNSTREAM (Coordinador -> Agente) ---
    let downstream_node_context = node_identifier.clone();
    let mut downstream_transmission_task = tokio::spawn(async move {
        let mut keepalive_timer = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECONDS));

        loop {
            tokio::select! {
                // Brazo 1: Pulso de vida físico (Ping-Pong)
                _ = keepalive_timer.tick() => {
                    if socket_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                },

                // Brazo 2: Frames de comando del bus
                outbound_frame = outbound_frame_receiver.recv() => {
                    match outbound_frame {
                        Some(serialized_command) => {
                            if socket_sender.send(Message::Text(serialized_command)).await.is_err() {
                                warn!("⚠️ [UPLINK_SEVERED]: Node [{}] lost downstream strata.", downstream_node_context);
                                break;
                            }
                        },
                        None => break, // El registro desmontó este enlace.
                    }
                },
            }
        }
    });

    // --- TAREA 2: UPSTREAM (Agente -> Coordinador) ---
    let upstream_application_state = application_state.clone();
    let upstream_node_context = node_identifier.clone();
    let mut upstream_ingestion_task = tokio::spawn(async move {
        while let Some(network_read_result) = socket_receiver.next().await {
            match network_read_result {
                Ok(Message::Text(raw_frame_json)) => {
                    process_inbound_frame(&upstream_application_state, &upstream_node_context, &raw_frame_json)
                        .await;
                }
                Ok(Message::Close(_)) => {
                    debug!("🔌 [SOCKET_CLOSE]: Node [{}] sent termination signal.", upstream_node_context);
                    break;
                }
                Err(physical_layer_fault) => {
                    error!(
                        "❌ [UPLINK_FAULT]: Node [{}] network error: {}",
                        upstream_node_context, physical_layer_fault
                    );
                    break;
                }
                _ => {} // Binary y Pong se descartan en este estrato.
            }
        }
    });

    // --- COLAPSO CONTROLADO: el primer centinela que termina arrastra al otro ---
    tokio::select! {
        _ = (&mut downstream_transmission_task) => {
            upstream_ingestion_task.abort();
        },
        _ = (&mut upstream_ingestion_task) => {
            downstream_transmission_task.abort();
        },
    };

    application_state.link_registry.detach(&node_identifier, &link_identity_sender);
    info!("💀 [UPLINK_TERMINATED]: Node [{}] link resources released.", node_identifier);
}

/// Ruteo cooperativo de un frame entrante (uno a la vez por socket).
async fn process_inbound_frame(application_state: &AppState, node_identifier: &str, raw_frame_json: &str) {
    let parsed_frame: AgentFrame = match serde_json::from_str(raw_frame_json) {
        Ok(frame) => frame,
        Err(decode_fault) => {
            warn!("🗑️ [FRAME_REJECTED]: Node [{}] sent undecodable frame: {}", node_identifier, decode_fault);
            return;
        }
    };

    match &parsed_frame {
        AgentFrame::Heartbeat { node_id, .. } => {
            // El identificador del frame debe coincidir con el del enlace.
            if node_id != node_identifier {
                warn!(
                    "🎭 [FRAME_SPOOF]: Link [{}] carried heartbeat for [{}]. Discarded.",
                    node_identifier, node_id
                );
                return;
            }

            if let Err(ingestion_fault) = ingest_heartbeat(
                &application_state.node_repository,
                &application_state.bot_repository,
                &parsed_frame,
            )
            .await
            {
                error!("❌ [HEARTBEAT_FAULT]: Node [{}]: {}", node_identifier, ingestion_fault);
            }
        }

        AgentFrame::CommandResult { id, success, data, error, .. } => {
            application_state
                .command_bus
                .resolve_result(id, *success, data.clone(), error.clone());
        }

        AgentFrame::HealthEvent { container, event, message, .. } => {
            warn!(
                "🩹 [HEALTH_EVENT]: Node [{}] container [{}] {:?}: {}",
                node_identifier, container, event, message
            );
        }
    }
}

fn extract_bearer_secret(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|header_value| header_value.to_str().ok())
        .and_then(|raw_header| raw_header.strip_prefix("Bearer "))
        .map(|secret| secret.to_string())
}
