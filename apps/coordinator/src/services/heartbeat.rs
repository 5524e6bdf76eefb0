// [apps/coordinator/src/services/heartbeat.rs]
/*!
 * =================================================================
 * APARATO: HEARTBEAT WATCHDOG (V7.0 - SILENT DEATH SENTINEL)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: INGESTA DE LATIDOS Y DETECCIÓN DE MUERTE SILENCIOSA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. NON-BLOCKING SWEEPS: Cada rescate se lanza como tarea separada;
 *    una recuperación lenta jamás bloquea el siguiente barrido y los
 *    rescates de nodos distintos corren en paralelo, serializados
 *    únicamente por el guardia CAS del repositorio.
 * 2. SINGLE RETRY: Un 'ConcurrentTransition' se reintenta exactamente
 *    una vez; la segunda pérdida se registra y se cede al otro escritor.
 * 3. MissedTickBehavior::Skip evita la acumulación de barridos ante
 *    bloqueos temporales de I/O.
 * =================================================================
 */

use crate::services::recovery::RecoveryOrchestrator;
use aviary_domain_models::AgentFrame;
use aviary_infra_db::repositories::{BotRepository, NodeRepository};
use aviary_infra_db::DbError;
use aviary_domain_models::RecoveryTrigger;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/**
 * Ingesta de un latido: la memoria agregada de contenedores gobierna
 * 'used_mb' (ausencia de contenedores implica cero) y la telemetría
 * por contenedor refina la estimación de re-colocación de cada bot.
 */
#[instrument(skip(node_repository, bot_repository, frame))]
pub async fn ingest_heartbeat(
    node_repository: &NodeRepository,
    bot_repository: &BotRepository,
    frame: &AgentFrame,
) -> Result<(), DbError> {
    let AgentFrame::Heartbeat { node_id, containers, .. } = frame else {
        return Ok(());
    };

    let aggregated_memory_mb = frame.aggregated_container_memory_mb().unwrap_or(0);
    node_repository.update_heartbeat(node_id, aggregated_memory_mb).await?;

    if let Some(container_reports) = containers {
        for report in container_reports {
            bot_repository
                .update_container_memory(node_id, &report.name, report.memory_mb)
                .await?;
        }
    }

    debug!("🫀 [HEARTBEAT]: Node [{}] vitality ingested ({} MB).", node_id, aggregated_memory_mb);
    Ok(())
}

/// Centinela de muerte silenciosa: barre los nodos monitoreados y
/// dispara la recuperación de los que superan el umbral de silencio.
pub struct HeartbeatWatchdog {
    node_repository: Arc<NodeRepository>,
    recovery_orchestrator: Arc<RecoveryOrchestrator>,
    sweep_interval: Duration,
    dead_threshold_seconds: i64,
}

impl HeartbeatWatchdog {
    #[must_use]
    pub fn new(
        node_repository: Arc<NodeRepository>,
        recovery_orchestrator: Arc<RecoveryOrchestrator>,
        sweep_interval: Duration,
        dead_threshold_seconds: i64,
    ) -> Self {
        Self {
            node_repository,
            recovery_orchestrator,
            sweep_interval,
            dead_threshold_seconds,
        }
    }

    /// Inicia el bucle de vigilancia perpetua en el reactor de Tokio.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut surveillance_ticker = interval(self.sweep_interval);
            surveillance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "🩺 [WATCHDOG]: Silent-death sentinel active (threshold {}s).",
                self.dead_threshold_seconds
            );

            loop {
                surveillance_ticker.tick().await;
                if let Err(sweep_fault) = self.sweep_once().await {
                    // Fallo transitorio de I/O: se registra y se continúa.
                    error!("❌ [WATCHDOG_SWEEP_FAULT]: {}", sweep_fault);
                }
            }
        });
    }

    /// Un barrido: detecta silencios y lanza rescates desacoplados.
    pub async fn sweep_once(&self) -> Result<usize, DbError> {
        let silent_nodes = self
            .node_repository
            .stale_monitored_nodes(self.dead_threshold_seconds)
            .await?;

        for silent_node in &silent_nodes {
            warn!(
                "💀 [SILENT_DEATH]: Node [{}] exceeded heartbeat silence ({}). Launching rescue...",
                silent_node.id,
                silent_node.status.as_str()
            );

            let orchestrator = Arc::clone(&self.recovery_orchestrator);
            let dead_node_identifier = silent_node.id.clone();

            // Rescate desacoplado: el barrido no espera a la recuperación.
            tokio::spawn(async move {
                trigger_with_single_retry(&orchestrator, &dead_node_identifier).await;
            });
        }

        Ok(silent_nodes.len())
    }
}

/// Dispara la recuperación reintentando exactamente una vez ante una
/// carrera CAS perdida; toda otra falla se registra y se cede.
async fn trigger_with_single_retry(orchestrator: &RecoveryOrchestrator, dead_node_identifier: &str) {
    match orchestrator
        .trigger_recovery(dead_node_identifier, RecoveryTrigger::HeartbeatTimeout)
        .await
    {
        Ok(_) => {}
        Err(DbError::ConcurrentTransition { .. }) => {
            debug!("⚔️ [WATCHDOG_RACE]: Retrying rescue of [{}] once.", dead_node_identifier);
            if let Err(second_fault) = orchestrator
                .trigger_recovery(dead_node_identifier, RecoveryTrigger::HeartbeatTimeout)
                .await
            {
                warn!(
                    "🏳️ [WATCHDOG_YIELD]: Rescue of [{}] ceded to concurrent writer: {}",
                    dead_node_identifier, second_fault
                );
            }
        }
        Err(rescue_fault) => {
            error!("❌ [RESCUE_FAULT]: Node [{}] rescue collapsed: {}", dead_node_identifier, rescue_fault);
        }
    }
}
