// [apps/coordinator/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: PERIMETER GUARDS (V3.0)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: GUARDIA DE AUTENTICACIÓN DE LA SUPERFICIE ADMIN
 * =================================================================
 */

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::warn;

/**
 * Guardia perimetral de la superficie administrativa.
 * Sin 'AVIARY_ADMIN_API_TOKEN' configurado, la superficie queda abierta
 * (entornos de desarrollo y proving grounds).
 */
pub async fn admin_guard(
    State(application_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected_token) = application_state.config.admin_api_token.clone() else {
        return Ok(next.run(request).await);
    };

    let presented_token = request
        .headers()
        .get("authorization")
        .and_then(|header_value| header_value.to_str().ok())
        .and_then(|raw_header| raw_header.strip_prefix("Bearer "))
        .map(|token| token.to_string());

    match presented_token {
        Some(token) if token == expected_token => Ok(next.run(request).await),
        _ => {
            warn!("⛔ [ADMIN_GUARD]: Request rejected (bearer mismatch).");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
