// [apps/coordinator/src/services/recovery.rs]
/*!
 * =================================================================
 * APARATO: FLEET RESURRECTION ORCHESTRATOR (V8.0 - TENANT STRATA)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: RESCATE POR INQUILINO DESDE SNAPSHOTS Y LEDGER DE
 *                  INCIDENTES CON SEMÁNTICA DE REINTENTO DE ESPERAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. AUDITED CORRIDOR: El nodo muerto recorre 'offline -> recovering ->
 *    offline' por la única ruta legal (CAS + rastro); toda arista
 *    ilegal aflora al llamador sin rescate parcial fantasma.
 * 2. TIER-AGNOSTIC ORDERING: El repositorio entrega los inquilinos
 *    pre-ordenados por prioridad de plan; este orquestador procesa en
 *    orden de recepción sin conocer los planes.
 * 3. PER-TENANT BLAST RADIUS: El fallo de un inquilino se clasifica y
 *    se continúa con el siguiente; la operación siempre cierra con un
 *    reporte y un incidente sellado.
 *
 * # Mathematical Proof (Report Completeness):
 * Cada asignación termina en exactamente una de las cuatro bandejas
 * del reporte (recovered, failed, skipped, waiting), por lo que
 * recovered + failed + waiting = total al sellar el incidente.
 * =================================================================
 */

use crate::services::command_bus::{CommandFault, NodeCommander};
use crate::services::notifier::AdminAlertSink;
use aviary_domain_notification::AdminEvent;
use aviary_domain_models::{
    CommandKind, FailedTenant, NodeStatus, RecoveredTenant, RecoveryEventStatus, RecoveryItemStatus,
    RecoveryReport, RecoveryTrigger, TenantAssignment, WaitingTenant,
};
use aviary_infra_db::repositories::{
    BotProfileRepository, BotRepository, NodeRepository, RecoveryRepository,
};
use aviary_infra_db::DbError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::DEFAULT_BOT_IMAGE;

/// Llave de respaldo derivada del nombre del contenedor del inquilino.
pub fn backup_key_for(container_name: &str) -> String {
    format!("{container_name}.tar.gz")
}

/// Desenlace interno de un intento de re-hidratación.
enum RehydrationOutcome {
    /// Colocado y re-hidratado en el nodo destino.
    Recovered { target_node_id: String },
    /// Sin capacidad en la flota superviviente.
    NoCapacity,
    /// El corredor de comandos colapsó (timeout, rechazo, desconexión).
    CommandCollapse { target_node_id: String, reason: String },
}

pub struct RecoveryOrchestrator {
    node_repository: Arc<NodeRepository>,
    bot_repository: Arc<BotRepository>,
    profile_repository: Arc<BotProfileRepository>,
    recovery_repository: Arc<RecoveryRepository>,
    commander: Arc<dyn NodeCommander>,
    alert_sink: Arc<dyn AdminAlertSink>,
}

impl RecoveryOrchestrator {
    #[must_use]
    pub fn new(
        node_repository: Arc<NodeRepository>,
        bot_repository: Arc<BotRepository>,
        profile_repository: Arc<BotProfileRepository>,
        recovery_repository: Arc<RecoveryRepository>,
        commander: Arc<dyn NodeCommander>,
        alert_sink: Arc<dyn AdminAlertSink>,
    ) -> Self {
        Self {
            node_repository,
            bot_repository,
            profile_repository,
            recovery_repository,
            commander,
            alert_sink,
        }
    }

    /**
     * Protocolo de rescate de un nodo muerto.
     *
     * # Errors:
     * - `DbError::InvalidTransition`: el corredor de estado es ilegal
     *   desde el estado vigente; aflora sin tocar inquilinos.
     * - `DbError::ConcurrentTransition`: otro escritor movió el nodo;
     *   el llamador reintenta a lo sumo una vez.
     */
    #[instrument(skip(self))]
    pub async fn trigger_recovery(
        &self,
        dead_node_identifier: &str,
        trigger: RecoveryTrigger,
    ) -> Result<RecoveryReport, DbError> {
        // 1. CORREDOR DE ENTRADA: * -> offline -> recovering
        self.node_repository
            .transition(dead_node_identifier, NodeStatus::Offline, trigger.as_str(), "recovery_orchestrator")
            .await?;
        self.node_repository
            .transition(dead_node_identifier, NodeStatus::Recovering, trigger.as_str(), "recovery_orchestrator")
            .await?;

        // 2. INQUILINOS PRE-ORDENADOS POR PRIORIDAD DE PLAN
        let assignments = self.bot_repository.list_assigned_tenants(dead_node_identifier).await?;

        // 3. APERTURA DEL INCIDENTE
        let incident = self
            .recovery_repository
            .create_event(dead_node_identifier, trigger, assignments.len() as i64)
            .await?;

        warn!(
            "🚑 [RESURRECTION]: Incident [{}] processing {} tenants off node [{}].",
            incident.id,
            assignments.len(),
            dead_node_identifier
        );

        // 4. RESCATE SECUENCIAL EN ORDEN DE RECEPCIÓN
        let mut report = RecoveryReport::default();
        for assignment in &assignments {
            self.recover_tenant(&incident.id, dead_node_identifier, assignment, &mut report)
                .await?;
        }

        // 5. CIERRE DEL CORREDOR Y SELLADO DEL INCIDENTE
        self.node_repository
            .transition(dead_node_identifier, NodeStatus::Offline, "recovery_complete", "recovery_orchestrator")
            .await?;

        let terminal_status = if report.waiting.is_empty() {
            RecoveryEventStatus::Completed
        } else {
            RecoveryEventStatus::Partial
        };

        let report_json = serde_json::to_string(&report)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        self.recovery_repository
            .finalize_event(
                &incident.id,
                report.recovered.len() as i64,
                report.failed.len() as i64,
                report.waiting.len() as i64,
                terminal_status,
                &report_json,
            )
            .await?;

        // 6. SEÑALES AL OPERADOR
        self.alert_sink
            .emit(AdminEvent::NodeRecoveryComplete {
                node_id: dead_node_identifier.to_string(),
                recovered: report.recovered.len(),
                failed: report.failed.len(),
                waiting: report.waiting.len(),
            })
            .await;

        if !report.waiting.is_empty() {
            self.alert_sink
                .emit(AdminEvent::CapacityOverflow {
                    node_id: dead_node_identifier.to_string(),
                    affected: report.waiting.len(),
                    total: assignments.len(),
                })
                .await;
        }

        info!(
            "🏁 [RESURRECTION]: Incident [{}] sealed as '{}' ({} ok / {} failed / {} waiting).",
            incident.id,
            terminal_status.as_str(),
            report.recovered.len(),
            report.failed.len(),
            report.waiting.len()
        );

        Ok(report)
    }

    /**
     * Rescate de un inquilino: colocación, descarga del respaldo,
     * re-importación con el perfil correcto e inspección post-condición.
     * Inserta el item del Ledger con su desenlace.
     */
    async fn recover_tenant(
        &self,
        incident_identifier: &str,
        dead_node_identifier: &str,
        assignment: &TenantAssignment,
        report: &mut RecoveryReport,
    ) -> Result<(), DbError> {
        let backup_key = backup_key_for(&assignment.container_name);

        match self.attempt_rehydration(dead_node_identifier, assignment, &backup_key).await? {
            RehydrationOutcome::Recovered { target_node_id } => {
                report.recovered.push(RecoveredTenant {
                    tenant: assignment.container_name.clone(),
                    target: target_node_id.clone(),
                });
                self.recovery_repository
                    .insert_item(
                        incident_identifier,
                        &assignment.container_name,
                        dead_node_identifier,
                        Some(&target_node_id),
                        &backup_key,
                        RecoveryItemStatus::Recovered,
                        None,
                        true,
                    )
                    .await?;
            }
            RehydrationOutcome::NoCapacity => {
                report.waiting.push(WaitingTenant {
                    tenant: assignment.container_name.clone(),
                    reason: "no_capacity".to_string(),
                });
                self.recovery_repository
                    .insert_item(
                        incident_identifier,
                        &assignment.container_name,
                        dead_node_identifier,
                        None,
                        &backup_key,
                        RecoveryItemStatus::Waiting,
                        Some("no_capacity"),
                        false,
                    )
                    .await?;
            }
            RehydrationOutcome::CommandCollapse { target_node_id, reason } => {
                error!(
                    "💥 [RESURRECTION_UNIT_FAULT]: Tenant [{}] collapsed on target [{}]: {}",
                    assignment.container_name, target_node_id, reason
                );
                report.failed.push(FailedTenant {
                    tenant: assignment.container_name.clone(),
                    reason: reason.clone(),
                });
                self.recovery_repository
                    .insert_item(
                        incident_identifier,
                        &assignment.container_name,
                        dead_node_identifier,
                        Some(&target_node_id),
                        &backup_key,
                        RecoveryItemStatus::Failed,
                        Some(&reason),
                        true,
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Núcleo compartido del rescate (alta inicial y reintento de esperas).
    async fn attempt_rehydration(
        &self,
        dead_node_identifier: &str,
        assignment: &TenantAssignment,
        backup_key: &str,
    ) -> Result<RehydrationOutcome, DbError> {
        // 1. COLOCACIÓN POR HOLGURA MÁXIMA, EXCLUYENDO AL CAÍDO
        let placement = self
            .node_repository
            .find_placement(assignment.estimated_mb, &[dead_node_identifier])
            .await?;

        let Some(target) = placement else {
            return Ok(RehydrationOutcome::NoCapacity);
        };

        // 2. PERFIL DEL INQUILINO (imagen y entorno de re-hidratación)
        let profile = self.profile_repository.get(&assignment.bot_id).await?;
        let (image, environment) = match &profile {
            Some(profile) => (
                profile.image.clone().unwrap_or_else(|| DEFAULT_BOT_IMAGE.to_string()),
                profile.env.clone(),
            ),
            None => (DEFAULT_BOT_IMAGE.to_string(), HashMap::new()),
        };

        // 3. CORREDOR DE COMANDOS SOBRE EL DESTINO
        let rehydration_sequence: [(CommandKind, serde_json::Value); 3] = [
            (CommandKind::BackupDownload, json!({ "filename": backup_key })),
            (
                CommandKind::BotImport,
                json!({
                    "name": assignment.container_name,
                    "image": image,
                    "env": environment,
                }),
            ),
            (CommandKind::BotInspect, json!({ "name": assignment.container_name })),
        ];

        for (command, payload) in rehydration_sequence {
            if let Err(command_fault) = self.commander.dispatch(&target.node_id, command, payload).await {
                return Ok(RehydrationOutcome::CommandCollapse {
                    target_node_id: target.node_id,
                    reason: classify_command_fault(&command_fault),
                });
            }
        }

        // 4. RE-ASIGNACIÓN Y CONTABILIDAD DE CAPACIDAD
        self.bot_repository.reassign(&assignment.bot_id, &target.node_id).await?;
        self.node_repository
            .reserve_capacity(&target.node_id, assignment.estimated_mb)
            .await?;

        Ok(RehydrationOutcome::Recovered {
            target_node_id: target.node_id,
        })
    }

    /**
     * Reintento de los items en espera de un incidente.
     *
     * Re-resuelve cada inquilino desde la lista autoritativa del nodo
     * origen; un intento que corre hasta el final sella el item como
     * 'recovered' o 'failed' y siempre incrementa 'retry_count'. Un
     * inquilino aún sin capacidad permanece en espera (contado) y los
     * contadores del incidente se actualizan por adición.
     */
    #[instrument(skip(self))]
    pub async fn retry_waiting(&self, incident_identifier: &str) -> Result<RecoveryReport, DbError> {
        let incident = self.recovery_repository.get_event(incident_identifier).await?;
        let waiting_items = self.recovery_repository.list_waiting_items(incident_identifier).await?;

        if waiting_items.is_empty() {
            return Ok(RecoveryReport::default());
        }

        // Lista autoritativa vigente del nodo origen
        let assignments = self.bot_repository.list_assigned_tenants(&incident.node_id).await?;
        let assignment_index: HashMap<&str, &TenantAssignment> = assignments
            .iter()
            .map(|assignment| (assignment.container_name.as_str(), assignment))
            .collect();

        let mut report = RecoveryReport::default();

        for waiting_item in &waiting_items {
            let Some(assignment) = assignment_index.get(waiting_item.tenant.as_str()) else {
                // El inquilino ya no existe en la lista autoritativa: el
                // item se sella como fallido y el reporte lo salta.
                report.skipped.push(waiting_item.tenant.clone());
                self.recovery_repository
                    .mark_item_outcome(
                        &waiting_item.id,
                        RecoveryItemStatus::Failed,
                        None,
                        Some("assignment_missing"),
                    )
                    .await?;
                continue;
            };

            match self
                .attempt_rehydration(&incident.node_id, assignment, &waiting_item.backup_key)
                .await?
            {
                RehydrationOutcome::Recovered { target_node_id } => {
                    report.recovered.push(RecoveredTenant {
                        tenant: assignment.container_name.clone(),
                        target: target_node_id.clone(),
                    });
                    self.recovery_repository
                        .mark_item_outcome(
                            &waiting_item.id,
                            RecoveryItemStatus::Recovered,
                            Some(&target_node_id),
                            None,
                        )
                        .await?;
                }
                RehydrationOutcome::NoCapacity => {
                    report.waiting.push(WaitingTenant {
                        tenant: assignment.container_name.clone(),
                        reason: "no_capacity".to_string(),
                    });
                    self.recovery_repository
                        .increment_item_retry(&waiting_item.id)
                        .await?;
                }
                RehydrationOutcome::CommandCollapse { target_node_id, reason } => {
                    report.failed.push(FailedTenant {
                        tenant: assignment.container_name.clone(),
                        reason: reason.clone(),
                    });
                    self.recovery_repository
                        .mark_item_outcome(
                            &waiting_item.id,
                            RecoveryItemStatus::Failed,
                            Some(&target_node_id),
                            Some(&reason),
                        )
                        .await?;
                }
            }
        }

        // Contadores por adición; 'skipped' cierra items sin sumar rescates.
        self.recovery_repository
            .apply_retry_outcome(
                incident_identifier,
                report.recovered.len() as i64,
                (report.failed.len() + report.skipped.len()) as i64,
                report.waiting.len() as i64,
            )
            .await?;

        info!(
            "♻️ [RETRY_WAITING]: Incident [{}] retry closed ({} ok / {} failed / {} still waiting).",
            incident_identifier,
            report.recovered.len(),
            report.failed.len(),
            report.waiting.len()
        );

        Ok(report)
    }
}

fn classify_command_fault(fault: &CommandFault) -> String {
    match fault {
        CommandFault::NotConnected { .. } => "not connected".to_string(),
        CommandFault::Timeout { command, .. } => format!("{command} timed out"),
        CommandFault::Rejected(agent_error) => agent_error.clone(),
    }
}
