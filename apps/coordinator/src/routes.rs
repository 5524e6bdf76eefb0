// [apps/coordinator/src/routes.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN ROUTING MATRIX (V7.0 - CONTROL PLANE TOPOLOGY)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: COMPOSICIÓN DE LAS SUPERFICIES INTERNA Y ADMIN
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. INTERNAL STRATUM: Handshake de registro y enlace WebSocket de los
 *    agentes bajo /internal (autenticados por token o secreto).
 * 2. ADMIN STRATUM: Créditos, flota y tokens bajo /api/v1/admin con
 *    guardia perimetral de bearer.
 * =================================================================
 */

use crate::handlers::{
    agent_link, credits::CreditAdministrationHandler, nodes::FleetAdministrationHandler,
    registration::RegistrationHandler,
};
use crate::middleware::admin_guard;
use crate::state::AppState;
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

pub fn create_control_plane_router(application_shared_state: AppState) -> Router {
    // Escudo de Red: CORS para el Dashboard y herramientas de Ops
    let network_security_shield = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    // ESTRATO INTERNO: Agentes de nodo (handshake + enlace full-duplex)
    let internal_node_stratum = Router::new()
        .route("/register", post(RegistrationHandler::handle_registration_handshake))
        .route("/:node_id/reregister", post(RegistrationHandler::handle_reregistration))
        .route("/:node_id/ws", get(agent_link::establish_agent_link));

    // ESTRATO ADMIN: Ledger de créditos (contrato bit-exacto)
    let credit_stratum = Router::new()
        .route("/:tenant_id/grant", post(CreditAdministrationHandler::handle_grant))
        .route("/:tenant_id/refund", post(CreditAdministrationHandler::handle_refund))
        .route("/:tenant_id/correction", post(CreditAdministrationHandler::handle_correction))
        .route("/:tenant_id/balance", get(CreditAdministrationHandler::handle_get_balance))
        .route("/:tenant_id/transactions", get(CreditAdministrationHandler::handle_list_transactions))
        // Alias histórico del Dashboard
        .route("/:tenant_id/adjustments", get(CreditAdministrationHandler::handle_list_transactions));

    // ESTRATO ADMIN: Flota y tokens de registro
    let fleet_stratum = Router::new()
        .route("/nodes", get(FleetAdministrationHandler::handle_list_fleet))
        .route("/nodes/:node_id/transitions", get(FleetAdministrationHandler::handle_list_transitions))
        .route("/nodes/:node_id/drain", post(FleetAdministrationHandler::handle_drain))
        .route("/nodes/:node_id/recover", post(FleetAdministrationHandler::handle_manual_recovery))
        .route("/recovery/:event_id/retry", post(FleetAdministrationHandler::handle_retry_waiting))
        .route(
            "/registration-tokens",
            post(RegistrationHandler::handle_issue_token).get(RegistrationHandler::handle_list_active_tokens),
        );

    // COMPOSICIÓN GLOBAL (Root Topology)
    Router::new()
        .route("/health", get(|| async { "STATUS_OK" }))
        .nest("/internal/nodes", internal_node_stratum)
        .nest(
            "/api/v1/admin",
            Router::new()
                .nest("/credits", credit_stratum)
                .merge(fleet_stratum)
                .layer(middleware::from_fn_with_state(application_shared_state.clone(), admin_guard)),
        )
        .layer(network_security_shield)
        .with_state(application_shared_state)
}
