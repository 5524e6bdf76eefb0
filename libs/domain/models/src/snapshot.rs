// [libs/domain/models/src/snapshot.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origen de un snapshot en el catálogo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotType {
    #[serde(rename = "nightly")]
    Nightly,
    #[serde(rename = "on-demand")]
    OnDemand,
    #[serde(rename = "pre-restore")]
    PreRestore,
}

impl SnapshotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotType::Nightly => "nightly",
            SnapshotType::OnDemand => "on-demand",
            SnapshotType::PreRestore => "pre-restore",
        }
    }

    pub fn parse(raw_type_label: &str) -> Option<Self> {
        match raw_type_label {
            "nightly" => Some(SnapshotType::Nightly),
            "on-demand" => Some(SnapshotType::OnDemand),
            "pre-restore" => Some(SnapshotType::PreRestore),
            _ => None,
        }
    }
}

/// Registro de catálogo de un snapshot de inquilino.
///
/// Borrado suave: 'deleted_at' no nulo oculta la fila de listados y
/// conteos pero preserva el registro para auditoría.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub tenant: String,
    pub instance_id: String,
    pub user_id: Option<String>,
    pub snapshot_type: SnapshotType,
    /// Ruta en el almacén externo (S3/tarball). El I/O es colaborador externo.
    pub storage_path: String,
    pub size_bytes: i64,
    pub config_hash: Option<String>,
    /// Lista de plugins serializada (JSON opaco para el núcleo).
    pub plugins_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}
