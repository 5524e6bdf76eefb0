// [libs/domain/models/src/protocol.rs]
/*!
 * =================================================================
 * APARATO: AGENT WIRE PROTOCOL (V5.0 - BIT-PERFECT CONTRACT)
 * CLASIFICACIÓN: DOMAIN CONTRACT (ESTRATO L2)
 * RESPONSABILIDAD: GRAMÁTICA INMUTABLE DEL ENLACE COORDINADOR <-> AGENTE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CONTRACT SOVEREIGNTY: Todo frame JSON que viaja por el enlace
 *    WebSocket persistente se define aquí con renombres serde exactos.
 * 2. CLOSED ALLOWLIST: El catálogo de comandos es un enum cerrado; un
 *    tipo fuera de la lista no deserializa y jamás alcanza al agente.
 * 3. CORRELATION FIRST: Cada comando porta un UUID que el agente debe
 *    devolver intacto en su 'command_result'.
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Catálogo cerrado de comandos aceptados por los agentes de nodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "bot.start")]
    BotStart,
    #[serde(rename = "bot.stop")]
    BotStop,
    #[serde(rename = "bot.restart")]
    BotRestart,
    #[serde(rename = "bot.update")]
    BotUpdate,
    #[serde(rename = "bot.export")]
    BotExport,
    #[serde(rename = "bot.import")]
    BotImport,
    #[serde(rename = "bot.remove")]
    BotRemove,
    #[serde(rename = "bot.logs")]
    BotLogs,
    #[serde(rename = "bot.inspect")]
    BotInspect,
    #[serde(rename = "backup.upload")]
    BackupUpload,
    #[serde(rename = "backup.download")]
    BackupDownload,
    #[serde(rename = "backup.run-nightly")]
    BackupRunNightly,
    #[serde(rename = "backup.run-hot")]
    BackupRunHot,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::BotStart => "bot.start",
            CommandKind::BotStop => "bot.stop",
            CommandKind::BotRestart => "bot.restart",
            CommandKind::BotUpdate => "bot.update",
            CommandKind::BotExport => "bot.export",
            CommandKind::BotImport => "bot.import",
            CommandKind::BotRemove => "bot.remove",
            CommandKind::BotLogs => "bot.logs",
            CommandKind::BotInspect => "bot.inspect",
            CommandKind::BackupUpload => "backup.upload",
            CommandKind::BackupDownload => "backup.download",
            CommandKind::BackupRunNightly => "backup.run-nightly",
            CommandKind::BackupRunHot => "backup.run-hot",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Frame de comando (coordinador -> agente).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    /// UUID de correlación; el agente lo devuelve en su resultado.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub payload: Value,
}

/// Reporte por contenedor embebido en el latido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerReport {
    pub name: String,
    pub status: String,
    pub memory_mb: i64,
    pub uptime_s: i64,
}

/// Clasificación de eventos de salud espontáneos del agente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthEventKind {
    Died,
    OomKilled,
    Unhealthy,
    Restarted,
    DiskLow,
}

/// Frames entrantes (agente -> coordinador), discriminados por 'type'.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentFrame {
    #[serde(rename = "heartbeat")]
    Heartbeat {
        node_id: String,
        uptime_s: i64,
        memory_total_mb: i64,
        memory_used_mb: i64,
        disk_total_gb: i64,
        disk_used_gb: i64,
        /// Ausente implica cero contenedores activos (used_mb = 0).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        containers: Option<Vec<ContainerReport>>,
    },
    #[serde(rename = "command_result")]
    CommandResult {
        /// UUID de correlación del comando original.
        id: String,
        command: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "health_event")]
    HealthEvent {
        node_id: String,
        container: String,
        event: HealthEventKind,
        message: String,
        timestamp: String,
    },
}

impl AgentFrame {
    /// Memoria de contenedores agregada de un latido (MB).
    /// Para frames que no son latidos retorna None.
    pub fn aggregated_container_memory_mb(&self) -> Option<i64> {
        match self {
            AgentFrame::Heartbeat { containers, .. } => Some(
                containers
                    .as_ref()
                    .map(|reports| reports.iter().map(|report| report.memory_mb).sum())
                    .unwrap_or(0),
            ),
            _ => None,
        }
    }
}
