// [apps/coordinator/src/services/drain.rs]
/*!
 * =================================================================
 * APARATO: DRAIN ORCHESTRATOR (V5.0 - GRACEFUL EXODUS)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: MIGRACIÓN ORDENADA DE INQUILINOS ANTES DEL RETIRO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DRAIN FIRST: La transición 'active -> draining' precede al primer
 *    intento de migración; los llamadores testean ese orden.
 * 2. PARTIAL SAFETY: Si alguna migración falla, el nodo permanece en
 *    'draining' y el Herald emite el desborde de capacidad; solamente
 *    un éxodo completo cierra con 'draining -> offline'.
 * 3. BOUNDED CONCURRENCY: Secuencial por defecto; la perilla de
 *    concurrencia acota las migraciones simultáneas.
 * =================================================================
 */

use crate::services::command_bus::NodeCommander;
use crate::services::notifier::AdminAlertSink;
use crate::services::recovery::backup_key_for;
use anyhow::anyhow;
use async_trait::async_trait;
use aviary_domain_notification::AdminEvent;
use aviary_domain_models::{CommandKind, NodeStatus, TenantAssignment};
use aviary_infra_db::repositories::{BotRepository, NodeRepository};
use aviary_infra_db::DbError;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Reporte del éxodo: identidades migradas y fallidas con su razón.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub migrated: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Costura del colaborador de migración por bot. El bus de comandos la
/// implementa de verdad; los proving grounds inyectan éxitos y fallos.
#[async_trait]
pub trait TenantMigrator: Send + Sync {
    /// Mueve la carga a un destino de mejor ajuste (excluyendo al nodo
    /// drenado) y retorna el identificador del destino.
    async fn migrate(&self, assignment: &TenantAssignment, source_node_id: &str) -> anyhow::Result<String>;
}

pub struct DrainOrchestrator {
    node_repository: Arc<NodeRepository>,
    bot_repository: Arc<BotRepository>,
    migrator: Arc<dyn TenantMigrator>,
    alert_sink: Arc<dyn AdminAlertSink>,
    /// Migraciones simultáneas. 1 = secuencial (default de diseño).
    migration_concurrency: usize,
}

impl DrainOrchestrator {
    #[must_use]
    pub fn new(
        node_repository: Arc<NodeRepository>,
        bot_repository: Arc<BotRepository>,
        migrator: Arc<dyn TenantMigrator>,
        alert_sink: Arc<dyn AdminAlertSink>,
        migration_concurrency: usize,
    ) -> Self {
        Self {
            node_repository,
            bot_repository,
            migrator,
            alert_sink,
            migration_concurrency: migration_concurrency.max(1),
        }
    }

    /**
     * Drena un nodo: transición auditada, migración por bot y cierre.
     *
     * # Errors:
     * - `DbError::InvalidTransition` / `DbError::ConcurrentTransition`
     *   de la arista 'active -> draining'; fatales para el nodo movido.
     */
    #[instrument(skip(self))]
    pub async fn drain(&self, node_identifier: &str) -> Result<DrainReport, DbError> {
        // 1. ARISTA DE ENTRADA (estrictamente antes de toda migración)
        self.node_repository
            .transition(node_identifier, NodeStatus::Draining, "admin_drain", "drain_orchestrator")
            .await?;
        self.node_repository.mark_drain_started(node_identifier, "admin_drain").await?;

        // 2. INVENTARIO DE CARGAS DEL NODO
        let assignments = self.bot_repository.list_assigned_tenants(node_identifier).await?;

        if assignments.is_empty() {
            // Sin inquilinos: retiro inmediato.
            self.node_repository
                .transition(node_identifier, NodeStatus::Offline, "drain_complete", "drain_orchestrator")
                .await?;
            self.emit_status_change(node_identifier, "drain_complete").await;
            return Ok(DrainReport::default());
        }

        info!(
            "🚚 [DRAIN]: Node [{}] exodus started ({} workloads, concurrency {}).",
            node_identifier,
            assignments.len(),
            self.migration_concurrency
        );

        // 3. MIGRACIÓN POR BOT CON CONCURRENCIA ACOTADA
        let total_workloads = assignments.len();
        let migration_outcomes: Vec<(String, anyhow::Result<String>)> = stream::iter(assignments)
            .map(|assignment| {
                let migrator = Arc::clone(&self.migrator);
                let source = node_identifier.to_string();
                async move {
                    let outcome = migrator.migrate(&assignment, &source).await;
                    (assignment.bot_id.clone(), outcome)
                }
            })
            .buffered(self.migration_concurrency)
            .collect()
            .await;

        let mut report = DrainReport::default();
        for (bot_identifier, outcome) in migration_outcomes {
            match outcome {
                Ok(target_node_id) => {
                    info!("📦 [DRAIN_UNIT]: Bot [{}] relocated to [{}].", bot_identifier, target_node_id);
                    report.migrated.push(bot_identifier);
                }
                Err(migration_fault) => {
                    error!("💥 [DRAIN_UNIT_FAULT]: Bot [{}] stranded: {}", bot_identifier, migration_fault);
                    report.failed.push((bot_identifier, migration_fault.to_string()));
                }
            }
        }

        // 4. CIERRE: éxodo completo retira el nodo; parcial lo deja drenando.
        if report.failed.is_empty() {
            self.node_repository
                .transition(node_identifier, NodeStatus::Offline, "drain_complete", "drain_orchestrator")
                .await?;
            self.emit_status_change(node_identifier, "drain_complete").await;
        } else {
            warn!(
                "🛑 [DRAIN_PARTIAL]: Node [{}] holds in draining ({}/{} stranded).",
                node_identifier,
                report.failed.len(),
                total_workloads
            );
            self.alert_sink
                .emit(AdminEvent::CapacityOverflow {
                    node_id: node_identifier.to_string(),
                    affected: report.failed.len(),
                    total: total_workloads,
                })
                .await;
        }

        Ok(report)
    }

    async fn emit_status_change(&self, node_identifier: &str, reason: &str) {
        self.alert_sink
            .emit(AdminEvent::NodeStatusChange {
                node_id: node_identifier.to_string(),
                from: NodeStatus::Draining,
                to: NodeStatus::Offline,
                reason: reason.to_string(),
            })
            .await;
    }
}

/**
 * Migrador real sobre el bus de comandos: exporta y sube el respaldo en
 * el origen, re-hidrata en el destino y re-asigna la contabilidad.
 * Los agentes implementan una sola ruta de re-hidratación, la misma que
 * usa la recuperación.
 */
pub struct CommandBusMigrator {
    node_repository: Arc<NodeRepository>,
    bot_repository: Arc<BotRepository>,
    commander: Arc<dyn NodeCommander>,
}

impl CommandBusMigrator {
    #[must_use]
    pub fn new(
        node_repository: Arc<NodeRepository>,
        bot_repository: Arc<BotRepository>,
        commander: Arc<dyn NodeCommander>,
    ) -> Self {
        Self {
            node_repository,
            bot_repository,
            commander,
        }
    }
}

#[async_trait]
impl TenantMigrator for CommandBusMigrator {
    async fn migrate(&self, assignment: &TenantAssignment, source_node_id: &str) -> anyhow::Result<String> {
        let backup_key = backup_key_for(&assignment.container_name);

        // 1. DESTINO DE MEJOR AJUSTE (excluyendo al nodo drenado)
        let target = self
            .node_repository
            .find_placement(assignment.estimated_mb, &[source_node_id])
            .await?
            .ok_or_else(|| anyhow!("no_capacity"))?;

        // 2. EXPORTACIÓN Y RESPALDO EN EL ORIGEN
        self.commander
            .dispatch(source_node_id, CommandKind::BotExport, json!({ "name": assignment.container_name }))
            .await?;
        self.commander
            .dispatch(source_node_id, CommandKind::BackupUpload, json!({ "filename": backup_key }))
            .await?;

        // 3. RE-HIDRATACIÓN EN EL DESTINO
        self.commander
            .dispatch(&target.node_id, CommandKind::BackupDownload, json!({ "filename": backup_key }))
            .await?;
        self.commander
            .dispatch(
                &target.node_id,
                CommandKind::BotImport,
                json!({ "name": assignment.container_name }),
            )
            .await?;
        self.commander
            .dispatch(&target.node_id, CommandKind::BotInspect, json!({ "name": assignment.container_name }))
            .await?;

        // 4. DESMONTAJE EN EL ORIGEN (best-effort: el nodo se retira igual)
        if let Err(removal_fault) = self
            .commander
            .dispatch(source_node_id, CommandKind::BotRemove, json!({ "name": assignment.container_name }))
            .await
        {
            warn!(
                "🧹 [MIGRATION_RESIDUE]: Source removal of [{}] failed: {}",
                assignment.container_name, removal_fault
            );
        }

        // 5. CONTABILIDAD DE ASIGNACIÓN Y CAPACIDAD
        self.bot_repository.reassign(&assignment.bot_id, &target.node_id).await?;
        self.node_repository
            .reserve_capacity(&target.node_id, assignment.estimated_mb)
            .await?;
        self.node_repository
            .reserve_capacity(source_node_id, -assignment.estimated_mb)
            .await?;

        Ok(target.node_id)
    }
}
