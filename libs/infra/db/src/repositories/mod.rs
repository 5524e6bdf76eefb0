// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX (V3.0)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO NOMINAL DE REPOSITORIOS DEL PLANO DE CONTROL
 * =================================================================
 */

pub mod bot;
pub mod credit;
pub mod node;
pub mod profile;
pub mod recovery;
pub mod snapshot;
pub mod tenant;
pub mod token;

pub use bot::BotRepository;
pub use credit::{CreditRepository, TransactionFilter};
pub use node::NodeRepository;
pub use profile::BotProfileRepository;
pub use recovery::RecoveryRepository;
pub use snapshot::SnapshotRepository;
pub use tenant::TenantStatusRepository;
pub use token::RegistrationTokenStore;

use crate::errors::DbError;
use chrono::{DateTime, Utc};

/// Decodifica una marca temporal RFC 3339 persistida.
pub(crate) fn parse_timestamp(raw_timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw_timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|fault| DbError::MappingError(format!("TIMESTAMP_DRIFT: {} -> {}", raw_timestamp, fault)))
}

/// Decodifica una marca temporal opcional (columna NULLABLE).
pub(crate) fn parse_optional_timestamp(
    raw_timestamp: Option<String>,
) -> Result<Option<DateTime<Utc>>, DbError> {
    match raw_timestamp {
        Some(raw) => parse_timestamp(&raw).map(Some),
        None => Ok(None),
    }
}
