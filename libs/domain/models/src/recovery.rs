// [libs/domain/models/src/recovery.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Origen del incidente que disparó la recuperación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTrigger {
    HeartbeatTimeout,
    Manual,
}

impl RecoveryTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryTrigger::HeartbeatTimeout => "heartbeat_timeout",
            RecoveryTrigger::Manual => "manual",
        }
    }

    pub fn parse(raw_trigger_label: &str) -> Option<Self> {
        match raw_trigger_label {
            "heartbeat_timeout" => Some(RecoveryTrigger::HeartbeatTimeout),
            "manual" => Some(RecoveryTrigger::Manual),
            _ => None,
        }
    }
}

/// Estado agregado del incidente de recuperación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryEventStatus {
    InProgress,
    /// Terminó con inquilinos en espera de capacidad.
    Partial,
    Completed,
}

impl RecoveryEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryEventStatus::InProgress => "in_progress",
            RecoveryEventStatus::Partial => "partial",
            RecoveryEventStatus::Completed => "completed",
        }
    }

    pub fn parse(raw_status_label: &str) -> Option<Self> {
        match raw_status_label {
            "in_progress" => Some(RecoveryEventStatus::InProgress),
            "partial" => Some(RecoveryEventStatus::Partial),
            "completed" => Some(RecoveryEventStatus::Completed),
            _ => None,
        }
    }
}

/// Estado terminal (o de espera) de un intento por inquilino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryItemStatus {
    Waiting,
    Recovered,
    Failed,
}

impl RecoveryItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryItemStatus::Waiting => "waiting",
            RecoveryItemStatus::Recovered => "recovered",
            RecoveryItemStatus::Failed => "failed",
        }
    }

    pub fn parse(raw_status_label: &str) -> Option<Self> {
        match raw_status_label {
            "waiting" => Some(RecoveryItemStatus::Waiting),
            "recovered" => Some(RecoveryItemStatus::Recovered),
            "failed" => Some(RecoveryItemStatus::Failed),
            _ => None,
        }
    }
}

/// Agregado por incidente: una fila por nodo muerto procesado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryEvent {
    pub id: String,
    pub node_id: String,
    pub trigger: RecoveryTrigger,
    pub status: RecoveryEventStatus,
    pub tenants_total: i64,
    pub tenants_recovered: i64,
    pub tenants_failed: i64,
    pub tenants_waiting: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub report_json: Option<String>,
}

/// Intento por inquilino dentro de un incidente.
/// Invariante: 'recovered' o 'failed' implican 'completed_at' no nulo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryItem {
    pub id: String,
    pub recovery_event_id: String,
    /// Nombre del contenedor del inquilino (identidad del item en reportes).
    pub tenant: String,
    pub source_node: String,
    pub target_node: Option<String>,
    /// Llave del snapshot en el almacén de respaldos.
    pub backup_key: String,
    pub status: RecoveryItemStatus,
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
}

/// Carga de trabajo asignada al nodo muerto, tal como la entrega el
/// repositorio (pre-ordenada por prioridad de plan del inquilino).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantAssignment {
    pub bot_id: String,
    pub tenant_id: String,
    /// Nombre del contenedor; base del cálculo de la llave de respaldo.
    pub container_name: String,
    /// Memoria estimada requerida para recolocar la carga (MB).
    pub estimated_mb: i64,
}

/// Entrada de éxito del reporte de recuperación.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredTenant {
    pub tenant: String,
    pub target: String,
}

/// Entrada de fallo del reporte.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTenant {
    pub tenant: String,
    pub reason: String,
}

/// Entrada de espera por falta de capacidad.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingTenant {
    pub tenant: String,
    pub reason: String,
}

/// Reporte acumulado de un incidente (o de un reintento de esperas).
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub recovered: Vec<RecoveredTenant>,
    pub failed: Vec<FailedTenant>,
    pub skipped: Vec<String>,
    pub waiting: Vec<WaitingTenant>,
}

impl RecoveryReport {
    /// Total de unidades clasificadas por el reporte.
    pub fn total(&self) -> usize {
        self.recovered.len() + self.failed.len() + self.skipped.len() + self.waiting.len()
    }
}
