// [tests/mirror/libs/infra/db/node_lifecycle.test.rs]
/**
 * =================================================================
 * APARATO: NODE LIFECYCLE INTEGRITY TEST (V3.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DEL PROTOCOLO DE TRANSICIÓN AUDITADA
 * =================================================================
 */

use aviary_domain_lifecycle::is_valid_transition;
use aviary_domain_models::NodeStatus;
use aviary_infra_db::repositories::NodeRepository;
use aviary_infra_db::{ControlPlaneDatabase, DbError};

async fn proving_grounds(database_name: &str) -> NodeRepository {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Fleet ledger ignition failed");
    NodeRepository::new(client)
}

#[tokio::test]
async fn certify_registration_and_audited_activation() {
    println!("\n🐣 [PROVING_GROUNDS]: Auditing registration strata...");

    let fleet = proving_grounds("fleet_registration").await;

    let fresh_node = fleet
        .insert_provisioning("node-1", Some("node-1.fleet.internal"), 4096, Some("1.4.2"))
        .await
        .expect("insert failed");
    assert_eq!(fresh_node.status, NodeStatus::Provisioning);
    assert_eq!(fresh_node.available_mb(), 4096);

    let activated = fleet
        .transition("node-1", NodeStatus::Active, "first_registration", "registrar")
        .await
        .expect("activation failed");
    assert_eq!(activated.status, NodeStatus::Active);

    // Una fila de auditoría por transición exitosa
    let audit_trail = fleet.list_transitions("node-1").await.expect("audit trail");
    assert_eq!(audit_trail.len(), 1);
    assert_eq!(audit_trail[0].from_status, NodeStatus::Provisioning);
    assert_eq!(audit_trail[0].to_status, NodeStatus::Active);
    assert_eq!(audit_trail[0].reason, "first_registration");
    assert_eq!(audit_trail[0].triggered_by, "registrar");

    println!("   ✅ [SUCCESS]: Audited activation certified.");
}

/// Toda fila de auditoría satisface el grafo legal y la cadena está
/// linealizada: el origen de cada fila es el destino de la anterior.
#[tokio::test]
async fn certify_audit_trail_soundness_and_linearization() {
    println!("\n⛓️ [PROVING_GROUNDS]: Auditing audit-chain strata...");

    let fleet = proving_grounds("fleet_chain").await;
    fleet.insert_provisioning("node-2", None, 2048, None).await.expect("insert");

    // Corredor completo: provisioning -> active -> offline -> recovering -> offline -> returning -> active
    let corridor = [
        (NodeStatus::Active, "first_registration"),
        (NodeStatus::Offline, "heartbeat_timeout"),
        (NodeStatus::Recovering, "heartbeat_timeout"),
        (NodeStatus::Offline, "recovery_complete"),
        (NodeStatus::Returning, "re_registration"),
        (NodeStatus::Active, "rehydrated"),
    ];

    for (waypoint, reason) in corridor {
        fleet
            .transition("node-2", waypoint, reason, "proving_grounds")
            .await
            .expect("corridor transition failed");
    }

    let audit_trail = fleet.list_transitions("node-2").await.expect("audit trail");
    assert_eq!(audit_trail.len(), 6);

    // Cada arista registrada pertenece al grafo cerrado
    for transition_row in &audit_trail {
        assert!(
            is_valid_transition(transition_row.from_status, transition_row.to_status),
            "Graph breach: {} => {} escaped the graph",
            transition_row.from_status,
            transition_row.to_status
        );
    }

    // El 'from' de cada fila es el 'to' de la fila anterior
    for adjacent_pair in audit_trail.windows(2) {
        assert_eq!(
            adjacent_pair[0].to_status, adjacent_pair[1].from_status,
            "Linearization breach: audit chain is not linearized"
        );
    }

    println!("   ✅ [SUCCESS]: Audit chain certified over {} rows.", audit_trail.len());
}

#[tokio::test]
async fn certify_illegal_transition_is_rejected_without_residue() {
    let fleet = proving_grounds("fleet_illegal").await;
    fleet.insert_provisioning("node-3", None, 1024, None).await.expect("insert");

    // provisioning -> draining no pertenece al grafo
    let rejection = fleet
        .transition("node-3", NodeStatus::Draining, "mischief", "proving_grounds")
        .await
        .expect_err("illegal edge must be rejected");
    assert!(matches!(rejection, DbError::InvalidTransition(_)));

    // Sin fila de auditoría ni mutación de estado
    let untouched = fleet.get("node-3").await.expect("get");
    assert_eq!(untouched.status, NodeStatus::Provisioning);
    assert!(fleet.list_transitions("node-3").await.expect("audit").is_empty());
}

#[tokio::test]
async fn certify_unknown_node_surfaces_not_found() {
    let fleet = proving_grounds("fleet_void").await;

    let rejection = fleet
        .transition("ghost-node", NodeStatus::Active, "x", "proving_grounds")
        .await
        .expect_err("ghost node must surface NotFound");
    assert!(matches!(rejection, DbError::NodeNotFound(_)));

    let heartbeat_rejection = fleet.update_heartbeat("ghost-node", 0).await.expect_err("heartbeat");
    assert!(matches!(heartbeat_rejection, DbError::NodeNotFound(_)));
}

#[tokio::test]
async fn certify_heartbeat_updates_usage_and_staleness_sweep() {
    println!("\n🫀 [PROVING_GROUNDS]: Auditing heartbeat strata...");

    let fleet = proving_grounds("fleet_heartbeat").await;
    fleet.insert_provisioning("node-4", Some("node-4.fleet.internal"), 8192, None).await.expect("insert");
    fleet
        .transition("node-4", NodeStatus::Active, "first_registration", "registrar")
        .await
        .expect("activation");

    fleet.update_heartbeat("node-4", 450).await.expect("heartbeat");
    let refreshed = fleet.get("node-4").await.expect("get");
    assert_eq!(refreshed.used_mb, 450);
    assert!(refreshed.last_heartbeat_at > 0);

    // Con umbral holgado, el nodo recién latido no es obsoleto
    let silent_nodes = fleet.stale_monitored_nodes(90).await.expect("sweep");
    assert!(silent_nodes.iter().all(|node| node.id != "node-4"));

    // Con umbral negativo todo nodo monitoreado califica (poda del reloj)
    let all_stale = fleet.stale_monitored_nodes(-1).await.expect("sweep");
    assert!(all_stale.iter().any(|node| node.id == "node-4"));

    println!("   ✅ [SUCCESS]: Heartbeat strata certified.");
}

#[tokio::test]
async fn certify_drain_fields_cleared_on_reactivation() {
    let fleet = proving_grounds("fleet_drainfields").await;
    fleet.insert_provisioning("node-5", None, 2048, None).await.expect("insert");
    fleet
        .transition("node-5", NodeStatus::Active, "first_registration", "registrar")
        .await
        .expect("activation");

    fleet
        .transition("node-5", NodeStatus::Draining, "admin_drain", "drain_orchestrator")
        .await
        .expect("drain edge");
    fleet.mark_drain_started("node-5", "admin_drain").await.expect("drain bookkeeping");

    let draining = fleet.get("node-5").await.expect("get");
    assert!(draining.drain_started_at.is_some());
    assert_eq!(draining.drain_reason.as_deref(), Some("admin_drain"));

    // La arista draining -> active limpia la bitácora del drenaje
    let reactivated = fleet
        .transition("node-5", NodeStatus::Active, "drain_aborted", "admin")
        .await
        .expect("reactivation");
    assert!(reactivated.drain_started_at.is_none());
    assert!(reactivated.drain_reason.is_none());
}

#[tokio::test]
async fn certify_capacity_reservation_floor() {
    let fleet = proving_grounds("fleet_capacity").await;
    fleet.insert_provisioning("node-6", None, 1000, None).await.expect("insert");

    fleet.reserve_capacity("node-6", 300).await.expect("reserve");
    assert_eq!(fleet.get("node-6").await.expect("get").used_mb, 300);

    // La liberación jamás cruza bajo cero
    fleet.reserve_capacity("node-6", -900).await.expect("release");
    assert_eq!(fleet.get("node-6").await.expect("get").used_mb, 0);
}
