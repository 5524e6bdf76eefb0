// [libs/domain/models/src/credit.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Clasificación semántica de un movimiento del Ledger de créditos.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    Purchase,
    Grant,
    Refund,
    Correction,
    AdapterUsage,
    BotRuntime,
    CommunityDividend,
    OnboardingLlm,
    Addon,
}

impl CreditTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTransactionType::Purchase => "purchase",
            CreditTransactionType::Grant => "grant",
            CreditTransactionType::Refund => "refund",
            CreditTransactionType::Correction => "correction",
            CreditTransactionType::AdapterUsage => "adapter_usage",
            CreditTransactionType::BotRuntime => "bot_runtime",
            CreditTransactionType::CommunityDividend => "community_dividend",
            CreditTransactionType::OnboardingLlm => "onboarding_llm",
            CreditTransactionType::Addon => "addon",
        }
    }

    pub fn parse(raw_type_label: &str) -> Option<Self> {
        match raw_type_label {
            "purchase" => Some(CreditTransactionType::Purchase),
            "grant" => Some(CreditTransactionType::Grant),
            "refund" => Some(CreditTransactionType::Refund),
            "correction" => Some(CreditTransactionType::Correction),
            "adapter_usage" => Some(CreditTransactionType::AdapterUsage),
            "bot_runtime" => Some(CreditTransactionType::BotRuntime),
            "community_dividend" => Some(CreditTransactionType::CommunityDividend),
            "onboarding_llm" => Some(CreditTransactionType::OnboardingLlm),
            "addon" => Some(CreditTransactionType::Addon),
            _ => None,
        }
    }
}

/// Fila inmutable del Ledger de créditos (append-only).
///
/// Invariantes:
/// - I1: la suma de 'amount_cents' de todo prefijo en orden de inserción
///   es igual al 'balance_after_cents' de la última fila del prefijo.
/// - I2: 'reference_id' es globalmente único cuando no es nulo. Es el único
///   mecanismo de idempotencia de las operaciones de crédito.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub tenant_id: String,
    /// Delta firmado en centavos. Débitos negativos, créditos positivos.
    pub amount_cents: i64,
    /// Suma corrida del inquilino inmediatamente después de esta fila.
    pub balance_after_cents: i64,
    pub transaction_type: CreditTransactionType,
    pub description: Option<String>,
    /// Llave de idempotencia global ('pi_<intent>', 'dividend:...').
    pub reference_id: Option<String>,
    pub funding_source: Option<String>,
    pub attributed_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caché desnormalizada del balance por inquilino.
/// Debe igualar la suma de 'amount_cents' del inquilino en todo momento
/// observable externamente.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditBalance {
    pub tenant_id: String,
    #[typeshare(serialized_as = "number")]
    pub balance_cents: i64,
    #[typeshare(serialized_as = "String")]
    pub last_updated: DateTime<Utc>,
}
