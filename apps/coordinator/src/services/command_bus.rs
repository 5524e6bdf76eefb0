// [apps/coordinator/src/services/command_bus.rs]
/*!
 * =================================================================
 * APARATO: COMMAND BUS (V6.0 - CORRELATION SOBERANO)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: REQUEST/RESPONSE CORRELACIONADO SOBRE ENLACES DUPLEX
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. UUID CORRELATION: Cada comando porta un UUID fresco; la entrada
 *    pendiente se inserta ANTES de escribir el frame y se evapora en
 *    la resolución o el timeout.
 * 2. NO GLOBAL ORDERING: El bus no serializa comandos hacia el mismo
 *    nodo; los llamadores que requieren orden encadenan sus envíos.
 * 3. FINE-GRAINED LOCKING: Un cerrojo exclusivo alrededor del mapa de
 *    pendientes basta; jamás se retiene a través de un await.
 *
 * # Mathematical Proof (Pending Map Hygiene):
 * Toda entrada insertada tiene exactamente un removedor: el frame de
 * resultado correlacionado, el timeout del emisor o el fallo de
 * escritura. El mapa no puede crecer sin límite mientras cada envío
 * termine por alguna de las tres vías.
 * =================================================================
 */

use crate::state::link_registry::NodeLinkRegistry;
use async_trait::async_trait;
use aviary_domain_models::{CommandFrame, CommandKind};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Timeout por defecto de un comando en vuelo.
pub const DEFAULT_COMMAND_TIMEOUT_SECONDS: u64 = 30;

/// Fallos del enlace de mando. 'NotConnected' y 'Timeout' se tratan
/// de forma idéntica por los agregadores (fallo por unidad).
#[derive(Debug, Clone, Error)]
pub enum CommandFault {
    #[error("node {node_id} not connected")]
    NotConnected { node_id: String },

    #[error("command {command} to node {node_id} timed out")]
    Timeout { node_id: String, command: CommandKind },

    /// El agente respondió con fallo; porta su mensaje de error
    /// (o "command failed" si el agente no lo adjuntó).
    #[error("{0}")]
    Rejected(String),
}

/// Costura de mando de los orquestadores. El bus real la implementa;
/// los proving grounds inyectan transportes sintéticos.
#[async_trait]
pub trait NodeCommander: Send + Sync {
    async fn dispatch(
        &self,
        node_identifier: &str,
        command: CommandKind,
        payload: Value,
    ) -> Result<Value, CommandFault>;
}

type PendingWaiter = oneshot::Sender<Result<Value, String>>;

/// Bus de comandos coordinador -> agentes sobre los enlaces vivos.
pub struct CommandBus {
    link_registry: Arc<NodeLinkRegistry>,
    pending_commands: Mutex<HashMap<String, PendingWaiter>>,
    command_timeout: Duration,
}

impl CommandBus {
    #[must_use]
    pub fn new(link_registry: Arc<NodeLinkRegistry>, command_timeout: Duration) -> Self {
        Self {
            link_registry,
            pending_commands: Mutex::new(HashMap::new()),
            command_timeout,
        }
    }

    /**
     * Resuelve un 'command_result' entrante contra su entrada pendiente.
     * Un resultado sin correlación vigente se descarta con rastro (el
     * emisor ya expiró por timeout o el frame está duplicado).
     */
    pub fn resolve_result(
        &self,
        correlation_identifier: &str,
        success: bool,
        data: Option<Value>,
        error: Option<String>,
    ) {
        let waiter = {
            let mut pending_guard = self
                .pending_commands
                .lock()
                .expect("FATAL: Pending command map lock poisoned.");
            pending_guard.remove(correlation_identifier)
        };

        match waiter {
            Some(resolution_channel) => {
                let outcome = if success {
                    Ok(data.unwrap_or(Value::Null))
                } else {
                    Err(error.unwrap_or_else(|| "command failed".to_string()))
                };
                // El receptor pudo expirar entre el remove y el send.
                let _ = resolution_channel.send(outcome);
            }
            None => {
                warn!(
                    "👻 [BUS_STRAY]: Uncorrelated command_result [{}] discarded.",
                    correlation_identifier
                );
            }
        }
    }

    /// Entradas en vuelo (instrumentación de los proving grounds).
    pub fn pending_count(&self) -> usize {
        self.pending_commands
            .lock()
            .expect("FATAL: Pending command map lock poisoned.")
            .len()
    }

    fn register_pending(&self, correlation_identifier: &str) -> oneshot::Receiver<Result<Value, String>> {
        let (resolution_sender, resolution_receiver) = oneshot::channel();
        self.pending_commands
            .lock()
            .expect("FATAL: Pending command map lock poisoned.")
            .insert(correlation_identifier.to_string(), resolution_sender);
        resolution_receiver
    }

    fn evict_pending(&self, correlation_identifier: &str) {
        self.pending_commands
            .lock()
            .expect("FATAL: Pending command map lock poisoned.")
            .remove(correlation_identifier);
    }
}

#[async_trait]
impl NodeCommander for CommandBus {
    #[instrument(skip(self, payload))]
    async fn dispatch(
        &self,
        node_identifier: &str,
        command: CommandKind,
        payload: Value,
    ) -> Result<Value, CommandFault> {
        // 1. LOOKUP EN EL MOMENTO DEL ENVÍO (jamás se retiene el socket)
        let frame_sender = self
            .link_registry
            .frame_sender(node_identifier)
            .ok_or_else(|| CommandFault::NotConnected {
                node_id: node_identifier.to_string(),
            })?;

        // 2. CORRELACIÓN FRESCA Y ENTRADA PENDIENTE ANTES DEL FRAME
        let correlation_identifier = Uuid::new_v4().to_string();
        let command_frame = CommandFrame {
            id: correlation_identifier.clone(),
            kind: command,
            payload,
        };

        let serialized_frame = serde_json::to_string(&command_frame)
            .map_err(|fault| CommandFault::Rejected(format!("frame serialization collapsed: {fault}")))?;

        let resolution_receiver = self.register_pending(&correlation_identifier);

        if frame_sender.send(serialized_frame).await.is_err() {
            // El socket colapsó entre el lookup y la escritura.
            self.evict_pending(&correlation_identifier);
            return Err(CommandFault::NotConnected {
                node_id: node_identifier.to_string(),
            });
        }

        debug!(
            "📡 [BUS_DISPATCH]: {} -> node [{}] ({})",
            command, node_identifier, correlation_identifier
        );

        // 3. ESPERA ACOTADA: resolución, rechazo o timeout
        match tokio::time::timeout(self.command_timeout, resolution_receiver).await {
            Ok(Ok(Ok(result_payload))) => Ok(result_payload),
            Ok(Ok(Err(agent_error_message))) => Err(CommandFault::Rejected(agent_error_message)),
            Ok(Err(_channel_collapsed)) => {
                self.evict_pending(&correlation_identifier);
                Err(CommandFault::NotConnected {
                    node_id: node_identifier.to_string(),
                })
            }
            Err(_deadline_elapsed) => {
                self.evict_pending(&correlation_identifier);
                Err(CommandFault::Timeout {
                    node_id: node_identifier.to_string(),
                    command,
                })
            }
        }
    }
}
