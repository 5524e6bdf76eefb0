// [tests/mirror/libs/infra/db/placement_engine.test.rs]
/**
 * =================================================================
 * APARATO: PLACEMENT ENGINE TEST (V2.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DEL SELECTOR POR HOLGURA MÁXIMA
 * =================================================================
 */

use aviary_domain_models::NodeStatus;
use aviary_infra_db::repositories::NodeRepository;
use aviary_infra_db::ControlPlaneDatabase;

async fn proving_grounds(database_name: &str) -> NodeRepository {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Fleet ledger ignition failed");
    NodeRepository::new(client)
}

async fn solidify_active_node(fleet: &NodeRepository, node_id: &str, capacity_mb: i64, used_mb: i64) {
    fleet
        .insert_provisioning(node_id, Some(&format!("{node_id}.fleet.internal")), capacity_mb, None)
        .await
        .expect("insert");
    fleet
        .transition(node_id, NodeStatus::Active, "first_registration", "registrar")
        .await
        .expect("activation");
    if used_mb > 0 {
        fleet.reserve_capacity(node_id, used_mb).await.expect("reserve");
    }
}

#[tokio::test]
async fn certify_maximum_slack_selection() {
    println!("\n📦 [PROVING_GROUNDS]: Auditing bin-packing strata...");

    let fleet = proving_grounds("placement_slack").await;
    solidify_active_node(&fleet, "node-small", 1000, 200).await; // holgura 800
    solidify_active_node(&fleet, "node-big", 8000, 2000).await; // holgura 6000
    solidify_active_node(&fleet, "node-mid", 4000, 1000).await; // holgura 3000

    let decision = fleet.find_placement(100, &[]).await.expect("query").expect("placement");
    assert_eq!(decision.node_id, "node-big");
    assert_eq!(decision.available_mb, 6000);

    println!("   ✅ [SUCCESS]: Biggest-bin selection certified.");
}

#[tokio::test]
async fn certify_exclusion_and_capacity_floor() {
    let fleet = proving_grounds("placement_exclusion").await;
    solidify_active_node(&fleet, "node-a", 2000, 0).await; // holgura 2000
    solidify_active_node(&fleet, "node-b", 1000, 500).await; // holgura 500

    // Excluyendo al ganador natural, el segundo absorbe
    let decision = fleet
        .find_placement(100, &["node-a"])
        .await
        .expect("query")
        .expect("placement");
    assert_eq!(decision.node_id, "node-b");

    // Nadie satisface la demanda: el selector retorna nulo
    let starved = fleet.find_placement(5000, &[]).await.expect("query");
    assert!(starved.is_none());
}

#[tokio::test]
async fn certify_only_active_nodes_are_candidates() {
    let fleet = proving_grounds("placement_status").await;

    // Nodo degradado con holgura gigante: jamás candidato
    solidify_active_node(&fleet, "node-sick", 16_000, 0).await;
    fleet
        .transition("node-sick", NodeStatus::Degraded, "inference_all_down", "inference_watchdog")
        .await
        .expect("degrade");

    // Nodo drenando: tampoco
    solidify_active_node(&fleet, "node-leaving", 16_000, 0).await;
    fleet
        .transition("node-leaving", NodeStatus::Draining, "admin_drain", "drain_orchestrator")
        .await
        .expect("drain");

    solidify_active_node(&fleet, "node-ok", 1000, 0).await;

    let decision = fleet.find_placement(100, &[]).await.expect("query").expect("placement");
    assert_eq!(decision.node_id, "node-ok");
}

#[tokio::test]
async fn certify_empty_fleet_yields_none() {
    let fleet = proving_grounds("placement_empty").await;
    assert!(fleet.find_placement(100, &[]).await.expect("query").is_none());
}
