// [libs/domain/notification/src/lib.rs]
/*!
 * =================================================================
 * APARATO: HERALD NOTIFICATION ENGINE (V2.0 - FLEET SOBERANO)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: GRAMÁTICA DE SEÑALES DE ALERTA ADMINISTRATIVAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CONTRACT SOVEREIGNTY: Define la gramática inmutable de las señales
 *    que viajan del Núcleo (L1) al webhook del operador y al Dashboard.
 * 2. STABLE KINDS: Cada evento porta un 'kind' de cable estable; los
 *    consumidores enrutan por ese discriminador, nunca por el payload.
 * 3. NOMINAL PURITY: Nomenclatura descriptiva absoluta.
 *
 * # Mathematical Proof (Signal Integrity):
 * La marca de tiempo RFC 3339 se captura en la construcción de la señal,
 * garantizando que el rastro forense del incidente sea reproducible en
 * la línea de tiempo aunque la entrega del webhook se difiera.
 * =================================================================
 */

use aviary_domain_models::NodeStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use typeshare::typeshare;

/// Clasificación semántica de la urgencia de la señal.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Señales administrativas emitidas por el núcleo de la flota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdminEvent {
    /// Incidente de recuperación cerrado (con o sin esperas).
    NodeRecoveryComplete {
        node_id: String,
        recovered: usize,
        failed: usize,
        waiting: usize,
    },
    /// Transición de estado auditada de un nodo.
    NodeStatusChange {
        node_id: String,
        from: NodeStatus,
        to: NodeStatus,
        reason: String,
    },
    /// La flota no tuvo capacidad para absorber 'affected' de 'total' unidades.
    CapacityOverflow {
        node_id: String,
        affected: usize,
        total: usize,
    },
    /// Items en espera superaron la ventana de reintento y fueron cerrados.
    WaitingTenantsExpired {
        recovery_event_id: String,
        tenants: Vec<String>,
    },
    /// Nodo GPU degradado tras N ciclos con todos los servicios caídos.
    GpuNodeDegraded {
        node_id: String,
        services_down: Vec<String>,
    },
    /// Nodo GPU declarado fallido tras agotar la ventana post-reinicio.
    GpuNodeFailed { node_id: String },
}

impl AdminEvent {
    /// Discriminador estable del cable. Los consumidores enrutan por esto.
    pub fn kind(&self) -> &'static str {
        match self {
            AdminEvent::NodeRecoveryComplete { .. } => "node_recovery_complete",
            AdminEvent::NodeStatusChange { .. } => "node_status_change",
            AdminEvent::CapacityOverflow { .. } => "capacity_overflow",
            AdminEvent::WaitingTenantsExpired { .. } => "waiting_tenants_expired",
            AdminEvent::GpuNodeDegraded { .. } => "gpu_node_degraded",
            AdminEvent::GpuNodeFailed { .. } => "gpu_node_failed",
        }
    }

    /// Urgencia para el ruteo cromático del Panóptico.
    pub fn severity(&self) -> AlertSeverity {
        match self {
            AdminEvent::NodeRecoveryComplete { waiting, failed, .. } => {
                if *waiting > 0 || *failed > 0 {
                    AlertSeverity::Warning
                } else {
                    AlertSeverity::Info
                }
            }
            AdminEvent::NodeStatusChange { to, .. } => match to {
                NodeStatus::Failed | NodeStatus::Offline => AlertSeverity::Warning,
                _ => AlertSeverity::Info,
            },
            AdminEvent::CapacityOverflow { .. } => AlertSeverity::Critical,
            AdminEvent::WaitingTenantsExpired { .. } => AlertSeverity::Critical,
            AdminEvent::GpuNodeDegraded { .. } => AlertSeverity::Warning,
            AdminEvent::GpuNodeFailed { .. } => AlertSeverity::Critical,
        }
    }
}

/// Sobre serializado entregado al webhook del operador.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEnvelope {
    pub kind: String,
    pub severity: AlertSeverity,
    pub emitted_at: DateTime<Utc>,
    pub payload: Value,
}

impl AlertEnvelope {
    /// Sella la señal con su discriminador, urgencia y marca temporal.
    pub fn seal(event: &AdminEvent) -> Self {
        Self {
            kind: event.kind().to_string(),
            severity: event.severity(),
            emitted_at: Utc::now(),
            payload: payload_of(event),
        }
    }
}

fn payload_of(event: &AdminEvent) -> Value {
    match event {
        AdminEvent::NodeRecoveryComplete { node_id, recovered, failed, waiting } => json!({
            "node_id": node_id,
            "recovered": recovered,
            "failed": failed,
            "waiting": waiting,
        }),
        AdminEvent::NodeStatusChange { node_id, from, to, reason } => json!({
            "node_id": node_id,
            "from": from.as_str(),
            "to": to.as_str(),
            "reason": reason,
        }),
        AdminEvent::CapacityOverflow { node_id, affected, total } => json!({
            "node_id": node_id,
            "affected": affected,
            "total": total,
        }),
        AdminEvent::WaitingTenantsExpired { recovery_event_id, tenants } => json!({
            "recovery_event_id": recovery_event_id,
            "tenants": tenants,
        }),
        AdminEvent::GpuNodeDegraded { node_id, services_down } => json!({
            "node_id": node_id,
            "services_down": services_down,
        }),
        AdminEvent::GpuNodeFailed { node_id } => json!({
            "node_id": node_id,
        }),
    }
}
