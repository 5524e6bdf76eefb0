// [apps/coordinator/src/handlers/credits.rs]
/*!
 * =================================================================
 * APARATO: ADMIN CREDIT SURFACE (V6.0 - BIT-EXACT CONTRACT)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: GRANT / REFUND / CORRECTION / BALANCE / HISTORIAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. MACHINE READABLE FAULTS: Todo rechazo viaja como JSON con 'error';
 *    el balance insuficiente adjunta 'current_balance' para la UI.
 * 2. CONTRACT DISCIPLINE: Cuerpo JSON inválido responde exactamente
 *    '{"error":"Invalid JSON body"}'; el historial respeta el tope de
 *    250 y el orden más-reciente-primero.
 * =================================================================
 */

use crate::state::AppState;
use aviary_domain_billing::{validate_adjustment, AdjustmentKind};
use aviary_domain_models::CreditTransactionType;
use aviary_infra_db::repositories::TransactionFilter;
use aviary_infra_db::DbError;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, instrument};

/// Actor por defecto cuando el guardia perimetral no adjunta identidad.
const UNATTRIBUTED_ADMIN: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct GrantBody {
    pub amount_cents: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub amount_cents: i64,
    pub reason: String,
    #[serde(default)]
    pub reference_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionBody {
    pub amount_cents: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub struct CreditAdministrationHandler;

impl CreditAdministrationHandler {
    /// Endpoint: POST /:tenant_id/grant
    #[instrument(skip(application_state, body))]
    pub async fn handle_grant(
        State(application_state): State<AppState>,
        Path(tenant_identifier): Path<String>,
        body: Result<Json<GrantBody>, JsonRejection>,
    ) -> Response {
        let Json(grant_request) = match body {
            Ok(parsed_body) => parsed_body,
            Err(_) => return invalid_json_body(),
        };

        if let Err(rule_violation) =
            validate_adjustment(AdjustmentKind::Grant, grant_request.amount_cents, &grant_request.reason)
        {
            return validation_rejection(rule_violation.to_string());
        }

        let grant_outcome = application_state
            .credit_repository
            .grant(
                &tenant_identifier,
                grant_request.amount_cents,
                &grant_request.reason,
                UNATTRIBUTED_ADMIN,
            )
            .await;

        seal_adjustment(grant_outcome)
    }

    /// Endpoint: POST /:tenant_id/refund
    #[instrument(skip(application_state, body))]
    pub async fn handle_refund(
        State(application_state): State<AppState>,
        Path(tenant_identifier): Path<String>,
        body: Result<Json<RefundBody>, JsonRejection>,
    ) -> Response {
        let Json(refund_request) = match body {
            Ok(parsed_body) => parsed_body,
            Err(_) => return invalid_json_body(),
        };

        if let Err(rule_violation) =
            validate_adjustment(AdjustmentKind::Refund, refund_request.amount_cents, &refund_request.reason)
        {
            return validation_rejection(rule_violation.to_string());
        }

        let refund_outcome = application_state
            .credit_repository
            .refund(
                &tenant_identifier,
                refund_request.amount_cents,
                &refund_request.reason,
                UNATTRIBUTED_ADMIN,
                refund_request.reference_ids.as_deref(),
            )
            .await;

        seal_adjustment(refund_outcome)
    }

    /// Endpoint: POST /:tenant_id/correction
    #[instrument(skip(application_state, body))]
    pub async fn handle_correction(
        State(application_state): State<AppState>,
        Path(tenant_identifier): Path<String>,
        body: Result<Json<CorrectionBody>, JsonRejection>,
    ) -> Response {
        let Json(correction_request) = match body {
            Ok(parsed_body) => parsed_body,
            Err(_) => return invalid_json_body(),
        };

        if let Err(rule_violation) = validate_adjustment(
            AdjustmentKind::Correction,
            correction_request.amount_cents,
            &correction_request.reason,
        ) {
            return validation_rejection(rule_violation.to_string());
        }

        let correction_outcome = application_state
            .credit_repository
            .correction(
                &tenant_identifier,
                correction_request.amount_cents,
                &correction_request.reason,
                UNATTRIBUTED_ADMIN,
            )
            .await;

        seal_adjustment(correction_outcome)
    }

    /// Endpoint: GET /:tenant_id/balance (cero para desconocidos)
    #[instrument(skip(application_state))]
    pub async fn handle_get_balance(
        State(application_state): State<AppState>,
        Path(tenant_identifier): Path<String>,
    ) -> Response {
        match application_state.credit_repository.balance(&tenant_identifier).await {
            Ok(balance_cents) => (
                StatusCode::OK,
                Json(json!({ "tenant": tenant_identifier, "balance_cents": balance_cents })),
            )
                .into_response(),
            Err(balance_fault) => {
                error!("❌ [BALANCE_FAULT]: {}", balance_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Endpoint: GET /:tenant_id/transactions (y alias /adjustments)
    #[instrument(skip(application_state, query))]
    pub async fn handle_list_transactions(
        State(application_state): State<AppState>,
        Path(tenant_identifier): Path<String>,
        Query(query): Query<HistoryQuery>,
    ) -> Response {
        let transaction_type = match &query.transaction_type {
            Some(raw_type) => match CreditTransactionType::parse(raw_type) {
                Some(parsed_type) => Some(parsed_type),
                None => return validation_rejection(format!("unknown transaction type '{raw_type}'")),
            },
            None => None,
        };

        let from = match parse_boundary(&query.from) {
            Ok(parsed) => parsed,
            Err(rejection) => return rejection,
        };
        let to = match parse_boundary(&query.to) {
            Ok(parsed) => parsed,
            Err(rejection) => return rejection,
        };

        let filter = TransactionFilter {
            transaction_type,
            from,
            to,
            limit: query.limit,
            offset: query.offset,
        };

        match application_state
            .credit_repository
            .list_transactions(&tenant_identifier, &filter)
            .await
        {
            Ok((entries, total)) => {
                (StatusCode::OK, Json(json!({ "entries": entries, "total": total }))).into_response()
            }
            Err(history_fault) => {
                error!("❌ [HISTORY_FAULT]: {}", history_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn parse_boundary(
    raw_boundary: &Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, Response> {
    match raw_boundary {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|parsed| Some(parsed.with_timezone(&chrono::Utc)))
            .map_err(|_| validation_rejection(format!("invalid timestamp boundary '{raw}'"))),
    }
}

fn seal_adjustment(outcome: Result<aviary_domain_models::CreditTransaction, DbError>) -> Response {
    match outcome {
        Ok(sealed_transaction) => (StatusCode::CREATED, Json(sealed_transaction)).into_response(),
        Err(DbError::InsufficientBalance { current_balance_cents }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "insufficient balance",
                "current_balance": current_balance_cents,
            })),
        )
            .into_response(),
        Err(adjustment_fault) => {
            error!("❌ [ADJUSTMENT_FAULT]: {}", adjustment_fault);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn invalid_json_body() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid JSON body" }))).into_response()
}

fn validation_rejection(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
