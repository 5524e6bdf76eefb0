// [libs/domain/models/src/node.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estados del ciclo de vida de un nodo de la flota.
/// El grafo de transiciones legales vive en 'aviary-domain-lifecycle'.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// El nodo fue registrado pero el agente aún no confirma capacidad.
    Provisioning,
    /// Operación nominal: acepta colocaciones y emite latidos.
    Active,
    /// Migración de inquilinos en curso antes del retiro.
    Draining,
    /// Nodo previamente caído que se re-registró y está re-hidratando.
    Returning,
    /// Fuera de servicio. Sin inquilinos asignables.
    Offline,
    /// Rescate de inquilinos en curso tras una muerte silenciosa.
    Recovering,
    /// Fallo terminal declarado. Requiere intervención manual.
    Failed,
    /// Servicios de inferencia caídos pero el agente responde.
    Degraded,
}

impl NodeStatus {
    /// Representación canónica persistida en la columna 'status'.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Provisioning => "provisioning",
            NodeStatus::Active => "active",
            NodeStatus::Draining => "draining",
            NodeStatus::Returning => "returning",
            NodeStatus::Offline => "offline",
            NodeStatus::Recovering => "recovering",
            NodeStatus::Failed => "failed",
            NodeStatus::Degraded => "degraded",
        }
    }

    /// Decodificación inversa desde la columna 'status'.
    pub fn parse(raw_status_label: &str) -> Option<Self> {
        match raw_status_label {
            "provisioning" => Some(NodeStatus::Provisioning),
            "active" => Some(NodeStatus::Active),
            "draining" => Some(NodeStatus::Draining),
            "returning" => Some(NodeStatus::Returning),
            "offline" => Some(NodeStatus::Offline),
            "recovering" => Some(NodeStatus::Recovering),
            "failed" => Some(NodeStatus::Failed),
            "degraded" => Some(NodeStatus::Degraded),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Entidad soberana de un nodo trabajador de la flota.
///
/// La mutación de 'status' ocurre exclusivamente a través del protocolo de
/// transición del repositorio de nodos (CAS + rastro de auditoría). El resto
/// de los campos son metadatos actualizables por registro y latidos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Identificador opaco del nodo (elegido por el agente al registrarse).
    pub id: String,

    /// Dirección alcanzable del host. Nula hasta el primer registro completo.
    pub host: Option<String>,

    /// Capacidad total de memoria asignable a contenedores (MB).
    pub capacity_mb: i64,

    /// Memoria reservada por los contenedores activos (MB).
    /// Invariante por convención: used_mb <= capacity_mb (no forzado en escritura).
    pub used_mb: i64,

    pub status: NodeStatus,

    /// Marca monótona (segundos epoch) del último latido recibido.
    pub last_heartbeat_at: i64,

    /// Versión del agente reportada en el último registro.
    pub agent_version: Option<String>,

    /// Propietario para nodos self-hosted.
    pub owner_user_id: Option<String>,

    /// Etiqueta humana opcional.
    pub label: Option<String>,

    /// SHA-256 hex del secreto compartido del nodo. Nunca el texto claro.
    pub node_secret_hash: Option<String>,

    /// Identificador de instancia en el proveedor de cómputo (droplet).
    /// Requerido por la escalada de reinicio del watchdog de inferencia.
    pub droplet_id: Option<String>,

    /// Inicio del drenaje en curso. Limpiado por 'draining -> active'.
    pub drain_started_at: Option<DateTime<Utc>>,
    pub drain_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Holgura de colocación disponible en el nodo (MB, nunca negativa).
    pub fn available_mb(&self) -> i64 {
        (self.capacity_mb - self.used_mb).max(0)
    }
}

/// Registro inmutable de auditoría: una fila por transición exitosa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTransition {
    pub id: String,
    pub node_id: String,
    pub from_status: NodeStatus,
    pub to_status: NodeStatus,
    /// Motivo legible ('heartbeat_timeout', 'first_registration', ...).
    pub reason: String,
    /// Actor que disparó la transición ('watchdog', 'admin:<user>', ...).
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
}
