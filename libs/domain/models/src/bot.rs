// [libs/domain/models/src/bot.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use typeshare::typeshare;

/// Estado de facturación de una carga de trabajo.
/// 'Destroyed' es terminal: la fila nunca regresa a otro estado.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingState {
    Active,
    Suspended,
    Destroyed,
}

impl BillingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingState::Active => "active",
            BillingState::Suspended => "suspended",
            BillingState::Destroyed => "destroyed",
        }
    }

    pub fn parse(raw_state_label: &str) -> Option<Self> {
        match raw_state_label {
            "active" => Some(BillingState::Active),
            "suspended" => Some(BillingState::Suspended),
            "destroyed" => Some(BillingState::Destroyed),
            _ => None,
        }
    }
}

/// Nivel de almacenamiento contratado para los snapshots del bot.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    Standard,
    Plus,
    Archive,
}

impl StorageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Standard => "standard",
            StorageTier::Plus => "plus",
            StorageTier::Archive => "archive",
        }
    }

    pub fn parse(raw_tier_label: &str) -> Option<Self> {
        match raw_tier_label {
            "standard" => Some(StorageTier::Standard),
            "plus" => Some(StorageTier::Plus),
            "archive" => Some(StorageTier::Archive),
            _ => None,
        }
    }
}

/// Asignación de una carga de trabajo de inquilino a un nodo.
///
/// 'suspended_at' fijado implica 'destroy_after = suspended_at + gracia'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInstance {
    /// Identidad de asignación (botId). Distinta del nombre del contenedor.
    pub id: String,
    pub tenant_id: String,
    /// Nombre del contenedor en el nodo agente.
    pub name: String,
    /// Nodo anfitrión actual. Nulo mientras espera colocación.
    pub node_id: Option<String>,
    pub billing_state: BillingState,
    pub suspended_at: Option<DateTime<Utc>>,
    pub destroy_after: Option<DateTime<Utc>>,
    pub storage_tier: StorageTier,
    pub created_at: DateTime<Utc>,
}

/// Configuración propiedad del inquilino usada para re-hidratar el bot
/// con la imagen y el entorno correctos durante la recuperación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    pub bot_id: String,
    /// Imagen OCI. Nula implica la imagen por defecto de la plataforma.
    pub image: Option<String>,
    /// Variables de entorno inyectadas al contenedor.
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub release_channel: Option<String>,
    pub update_policy: Option<String>,
    /// Configuración de descubrimiento serializada (JSON opaco para el núcleo).
    pub discovery_json: Option<String>,
}
