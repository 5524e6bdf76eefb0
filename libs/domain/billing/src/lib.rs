// [libs/domain/billing/src/lib.rs]
/*!
 * =================================================================
 * APARATO: BILLING GOVERNANCE ENGINE (V2.0 - LEDGER SOBERANO)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: GRAMÁTICA DE AJUSTES Y REGLAS DEL LEDGER
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. VALIDATION FIRST: Toda operación administrativa (grant, refund,
 *    correction) valida aquí antes de tocar el Ledger Táctico (L3).
 * 2. SIGN DISCIPLINE: El dominio fija el signo almacenado por tipo de
 *    ajuste; el repositorio jamás re-interpreta magnitudes.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 *
 * # Mathematical Proof (Running Sum Integrity):
 * Al forzar que 'grant' y 'refund' porten magnitudes estrictamente
 * positivas con signo decidido por tipo, la suma corrida del Ledger
 * permanece reconstruible desde los deltas sin tabla auxiliar.
 * =================================================================
 */

use aviary_domain_models::StorageTier;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use typeshare::typeshare;

/// Días de gracia entre la suspensión por balance cero y la destrucción.
pub const SUSPENSION_GRACE_DAYS: i64 = 30;

/// Coste diario de runtime por bot activo (centavos).
pub const BOT_RUNTIME_DAILY_COST_CENTS: i64 = 50;

/// Tope duro de paginación del historial de transacciones.
pub const TRANSACTION_LIST_LIMIT_CAP: u32 = 250;

/// Clasificación de los ajustes administrativos del Ledger.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Abono administrativo. Magnitud positiva, almacenado positivo.
    Grant,
    /// Reembolso al medio de pago. Magnitud positiva, almacenado negativo.
    Refund,
    /// Corrección contable firmada. Cero permitido.
    Correction,
}

/// Violación de las reglas de validación de ajustes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingRuleViolation {
    #[error("[L2_BILLING_FAULT]: AMOUNT_MUST_BE_POSITIVE -> got {0}")]
    NonPositiveAmount(i64),

    #[error("[L2_BILLING_FAULT]: AMOUNT_MUST_BE_INTEGER_CENTS")]
    NonIntegerAmount,

    #[error("[L2_BILLING_FAULT]: REASON_REQUIRED")]
    EmptyReason,
}

/// Valida un ajuste administrativo y retorna el delta FIRMADO que el
/// repositorio debe almacenar en 'amount_cents'.
///
/// Reglas por tipo:
/// - grant: amount > 0, razón no vacía. Almacenado positivo.
/// - refund: amount > 0, razón no vacía. Almacenado negativo (el guardia de
///   balance bajo cero vive en el repositorio, que conoce la suma corrida).
/// - correction: cualquier entero firmado, cero incluido; razón no vacía.
pub fn validate_adjustment(
    kind: AdjustmentKind,
    amount_cents: i64,
    reason: &str,
) -> Result<i64, BillingRuleViolation> {
    if reason.trim().is_empty() {
        return Err(BillingRuleViolation::EmptyReason);
    }

    match kind {
        AdjustmentKind::Grant => {
            if amount_cents <= 0 {
                return Err(BillingRuleViolation::NonPositiveAmount(amount_cents));
            }
            Ok(amount_cents)
        }
        AdjustmentKind::Refund => {
            if amount_cents <= 0 {
                return Err(BillingRuleViolation::NonPositiveAmount(amount_cents));
            }
            Ok(-amount_cents)
        }
        AdjustmentKind::Correction => Ok(amount_cents),
    }
}

/// Coste mensual del addon de almacenamiento por nivel (centavos).
/// 'standard' está incluido en el runtime base.
pub fn storage_tier_monthly_cost_cents(tier: StorageTier) -> i64 {
    match tier {
        StorageTier::Standard => 0,
        StorageTier::Plus => 500,
        StorageTier::Archive => 1500,
    }
}

/// Prorrateo diario del addon de almacenamiento para el cron de runtime.
pub fn storage_tier_daily_cost_cents(tier: StorageTier) -> i64 {
    storage_tier_monthly_cost_cents(tier) / 30
}
