// [libs/domain/models/src/token.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token de registro de un solo uso. El 'id' ES el token portador (UUID v4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    pub id: String,
    pub user_id: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    /// Nodo que consumió el token (fijado atómicamente en el consumo).
    pub node_id: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Resultado de la emisión de un token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Resultado del consumo atómico exitoso de un token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumedToken {
    pub user_id: String,
    pub label: Option<String>,
}
