// [tests/mirror/apps/coordinator/recovery_orchestration.test.rs]
/**
 * =================================================================
 * APARATO: RECOVERY ORCHESTRATION TEST (V4.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DEL RESCATE (CAPACIDAD, ESPERAS, REINTENTOS)
 * =================================================================
 */

use async_trait::async_trait;
use aviary_coordinator::services::command_bus::{CommandFault, NodeCommander};
use aviary_coordinator::services::notifier::AdminAlertSink;
use aviary_coordinator::services::recovery::RecoveryOrchestrator;
use aviary_domain_notification::AdminEvent;
use aviary_domain_models::{
    BotProfile, CommandKind, NodeStatus, RecoveryEventStatus, RecoveryTrigger,
};
use aviary_infra_db::repositories::{
    BotProfileRepository, BotRepository, NodeRepository, RecoveryRepository,
};
use aviary_infra_db::ControlPlaneDatabase;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Transporte guionado: registra cada despacho y falla a demanda.
struct ScriptedCommander {
    dispatched: Mutex<Vec<(String, CommandKind, Value)>>,
    failing_command: Option<CommandKind>,
}

#[async_trait]
impl NodeCommander for ScriptedCommander {
    async fn dispatch(
        &self,
        node_identifier: &str,
        command: CommandKind,
        payload: Value,
    ) -> Result<Value, CommandFault> {
        self.dispatched
            .lock()
            .expect("dispatch log lock")
            .push((node_identifier.to_string(), command, payload));

        if self.failing_command == Some(command) {
            return Err(CommandFault::Timeout {
                node_id: node_identifier.to_string(),
                command,
            });
        }
        Ok(json!({}))
    }
}

#[derive(Default)]
struct CapturingSink {
    captured_events: Mutex<Vec<AdminEvent>>,
}

#[async_trait]
impl AdminAlertSink for CapturingSink {
    async fn emit(&self, event: AdminEvent) {
        self.captured_events.lock().expect("sink lock").push(event);
    }
}

struct RecoveryProvingGrounds {
    node_repository: Arc<NodeRepository>,
    bot_repository: Arc<BotRepository>,
    profile_repository: Arc<BotProfileRepository>,
    recovery_repository: Arc<RecoveryRepository>,
    commander: Arc<ScriptedCommander>,
    sink: Arc<CapturingSink>,
    orchestrator: RecoveryOrchestrator,
}

async fn proving_grounds(database_name: &str, failing_command: Option<CommandKind>) -> RecoveryProvingGrounds {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Fleet ledger ignition failed");

    let node_repository = Arc::new(NodeRepository::new(client.clone()));
    let bot_repository = Arc::new(BotRepository::new(client.clone()));
    let profile_repository = Arc::new(BotProfileRepository::new(client.clone()));
    let recovery_repository = Arc::new(RecoveryRepository::new(client));
    let commander = Arc::new(ScriptedCommander {
        dispatched: Mutex::new(Vec::new()),
        failing_command,
    });
    let sink = Arc::new(CapturingSink::default());

    let orchestrator = RecoveryOrchestrator::new(
        Arc::clone(&node_repository),
        Arc::clone(&bot_repository),
        Arc::clone(&profile_repository),
        Arc::clone(&recovery_repository),
        commander.clone(),
        sink.clone(),
    );

    RecoveryProvingGrounds {
        node_repository,
        bot_repository,
        profile_repository,
        recovery_repository,
        commander,
        sink,
        orchestrator,
    }
}

async fn solidify_active_node(grounds: &RecoveryProvingGrounds, node_id: &str, capacity_mb: i64) {
    grounds
        .node_repository
        .insert_provisioning(node_id, Some(&format!("{node_id}.fleet.internal")), capacity_mb, None)
        .await
        .expect("insert");
    grounds
        .node_repository
        .transition(node_id, NodeStatus::Active, "first_registration", "registrar")
        .await
        .expect("activation");
}

async fn solidify_dead_tenant(grounds: &RecoveryProvingGrounds) {
    grounds.bot_repository.register_bot("bot-1", "tenant-1", "bot-1").await.expect("register");
    grounds.bot_repository.reassign("bot-1", "node-n").await.expect("assign");

    let mut environment = HashMap::new();
    environment.insert("TOKEN".to_string(), "s".to_string());
    grounds
        .profile_repository
        .upsert(&BotProfile {
            bot_id: "bot-1".to_string(),
            image: Some("img:v2".to_string()),
            env: environment,
            release_channel: None,
            update_policy: None,
            discovery_json: None,
        })
        .await
        .expect("profile");
}

/// Rescate con capacidad disponible.
#[tokio::test]
async fn certify_recovery_with_capacity() {
    println!("\n🚑 [PROVING_GROUNDS]: Auditing capacity rescue strata...");

    let grounds = proving_grounds("recovery_capacity", None).await;
    solidify_active_node(&grounds, "node-n", 2048).await;
    solidify_active_node(&grounds, "node-t", 1000).await;
    solidify_dead_tenant(&grounds).await;

    let report = grounds
        .orchestrator
        .trigger_recovery("node-n", RecoveryTrigger::HeartbeatTimeout)
        .await
        .expect("rescue failed");

    // Reporte: un rescatado hacia el destino
    assert_eq!(report.recovered.len(), 1);
    assert_eq!(report.recovered[0].tenant, "bot-1");
    assert_eq!(report.recovered[0].target, "node-t");
    assert!(report.failed.is_empty());
    assert!(report.waiting.is_empty());

    // Tres transiciones del corredor de rescate
    let audit_trail = grounds.node_repository.list_transitions("node-n").await.expect("audit");
    let rescue_edges: Vec<(NodeStatus, NodeStatus)> = audit_trail
        .iter()
        .skip(1) // provisioning->active del arranque
        .map(|row| (row.from_status, row.to_status))
        .collect();
    assert_eq!(
        rescue_edges,
        vec![
            (NodeStatus::Active, NodeStatus::Offline),
            (NodeStatus::Offline, NodeStatus::Recovering),
            (NodeStatus::Recovering, NodeStatus::Offline),
        ]
    );

    // Tres comandos hacia el destino, en orden y con el perfil correcto
    let dispatched = grounds.commander.dispatched.lock().expect("log").clone();
    assert_eq!(dispatched.len(), 3);
    assert!(dispatched.iter().all(|(node, _, _)| node == "node-t"));

    assert_eq!(dispatched[0].1, CommandKind::BackupDownload);
    assert_eq!(dispatched[0].2["filename"], "bot-1.tar.gz");

    assert_eq!(dispatched[1].1, CommandKind::BotImport);
    assert_eq!(dispatched[1].2["name"], "bot-1");
    assert_eq!(dispatched[1].2["image"], "img:v2");
    assert_eq!(dispatched[1].2["env"]["TOKEN"], "s");

    assert_eq!(dispatched[2].1, CommandKind::BotInspect);
    assert_eq!(dispatched[2].2["name"], "bot-1");

    // Contabilidad: re-asignación y reserva de capacidad
    let rescued_bot = grounds.bot_repository.get("bot-1").await.expect("get");
    assert_eq!(rescued_bot.node_id.as_deref(), Some("node-t"));
    let target_node = grounds.node_repository.get("node-t").await.expect("get");
    assert_eq!(target_node.used_mb, 100);

    // Incidente terminal con contadores coherentes
    let incidents = grounds.recovery_repository.open_events_with_waiting().await.expect("scan");
    assert!(incidents.is_empty());

    println!("   ✅ [SUCCESS]: Capacity rescue certified bit-perfect.");
}

/// Sin capacidad, el inquilino queda en espera.
#[tokio::test]
async fn certify_recovery_without_capacity_and_retry_closure() {
    println!("\n⏳ [PROVING_GROUNDS]: Auditing no-capacity waiting strata...");

    let grounds = proving_grounds("recovery_waiting", None).await;
    solidify_active_node(&grounds, "node-n", 2048).await;
    solidify_dead_tenant(&grounds).await;

    let report = grounds
        .orchestrator
        .trigger_recovery("node-n", RecoveryTrigger::HeartbeatTimeout)
        .await
        .expect("rescue failed");

    assert!(report.recovered.is_empty());
    assert_eq!(report.waiting.len(), 1);
    assert_eq!(report.waiting[0].tenant, "bot-1");
    assert_eq!(report.waiting[0].reason, "no_capacity");

    // Incidente parcial con la espera contada
    let open_incidents = grounds.recovery_repository.open_events_with_waiting().await.expect("scan");
    assert_eq!(open_incidents.len(), 1);
    let incident = &open_incidents[0];
    assert_eq!(incident.status, RecoveryEventStatus::Partial);
    assert_eq!(incident.tenants_waiting, 1);
    assert_eq!(
        incident.tenants_recovered + incident.tenants_failed + incident.tenants_waiting,
        incident.tenants_total,
        "Counter breach: counters do not sum to total"
    );

    // Herald: desborde (affected=1, total=1)
    let captured = grounds.sink.captured_events.lock().expect("sink").clone();
    assert!(captured.iter().any(|event| matches!(
        event,
        AdminEvent::CapacityOverflow { node_id, affected: 1, total: 1 } if node_id == "node-n"
    )));

    // --- REINTENTO: capacidad fresca cierra la espera ---
    solidify_active_node(&grounds, "node-fresh", 4096).await;

    let retry_report = grounds
        .orchestrator
        .retry_waiting(&incident.id)
        .await
        .expect("retry failed");
    assert_eq!(retry_report.recovered.len(), 1);
    assert_eq!(retry_report.recovered[0].target, "node-fresh");

    // Ningún item tocado permanece en espera
    let remaining_waiting = grounds
        .recovery_repository
        .list_waiting_items(&incident.id)
        .await
        .expect("scan");
    assert!(remaining_waiting.is_empty(), "Waiting closure breach: item stuck in waiting");

    let closed_incident = grounds.recovery_repository.get_event(&incident.id).await.expect("get");
    assert_eq!(closed_incident.status, RecoveryEventStatus::Completed);
    assert_eq!(closed_incident.tenants_recovered, 1);
    assert_eq!(closed_incident.tenants_waiting, 0);

    println!("   ✅ [SUCCESS]: Waiting closure certified.");
}

/// Colapso de comando: fallo por inquilino, jamás por incidente.
#[tokio::test]
async fn certify_command_collapse_is_tenant_scoped() {
    println!("\n💥 [PROVING_GROUNDS]: Auditing tenant-scoped failure strata...");

    let grounds = proving_grounds("recovery_fail", Some(CommandKind::BotImport)).await;
    solidify_active_node(&grounds, "node-n", 2048).await;
    solidify_active_node(&grounds, "node-t", 1000).await;
    solidify_dead_tenant(&grounds).await;

    let report = grounds
        .orchestrator
        .trigger_recovery("node-n", RecoveryTrigger::Manual)
        .await
        .expect("rescue must close with a report");

    assert!(report.recovered.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("timed out"));

    // El corredor cierra igual: recovering -> offline
    let closed_node = grounds.node_repository.get("node-n").await.expect("get");
    assert_eq!(closed_node.status, NodeStatus::Offline);

    // Item terminal con destino y razón sellados
    let incidents = grounds.recovery_repository.open_events_with_waiting().await.expect("scan");
    assert!(incidents.is_empty(), "a failed tenant is terminal, not waiting");

    println!("   ✅ [SUCCESS]: Tenant-scoped failure certified.");
}

/// El rescate de un item cuyo inquilino ya no existe se sella como fallo.
#[tokio::test]
async fn certify_retry_seals_missing_assignments() {
    let grounds = proving_grounds("recovery_missing", None).await;
    solidify_active_node(&grounds, "node-n", 2048).await;
    solidify_dead_tenant(&grounds).await;

    let _ = grounds
        .orchestrator
        .trigger_recovery("node-n", RecoveryTrigger::HeartbeatTimeout)
        .await
        .expect("rescue");

    let incident = grounds
        .recovery_repository
        .open_events_with_waiting()
        .await
        .expect("scan")
        .remove(0);

    // El inquilino desaparece de la lista autoritativa
    grounds.bot_repository.destroy_bot("bot-1").await.expect("destroy");

    let retry_report = grounds.orchestrator.retry_waiting(&incident.id).await.expect("retry");
    assert_eq!(retry_report.skipped, vec!["bot-1".to_string()]);

    // El item quedó sellado, no en espera
    let remaining_waiting = grounds
        .recovery_repository
        .list_waiting_items(&incident.id)
        .await
        .expect("scan");
    assert!(remaining_waiting.is_empty());

    let closed_incident = grounds.recovery_repository.get_event(&incident.id).await.expect("get");
    assert_eq!(closed_incident.status, RecoveryEventStatus::Completed);
}

/// El corredor ilegal aflora sin abrir incidente (nodo ya en rescate).
#[tokio::test]
async fn certify_illegal_corridor_surfaces() {
    let grounds = proving_grounds("recovery_illegal", None).await;
    grounds
        .node_repository
        .insert_provisioning("node-n", None, 2048, None)
        .await
        .expect("insert");

    // provisioning -> offline no pertenece al grafo
    assert!(grounds
        .orchestrator
        .trigger_recovery("node-n", RecoveryTrigger::Manual)
        .await
        .is_err());
}
