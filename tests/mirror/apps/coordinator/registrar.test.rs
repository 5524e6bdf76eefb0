// [tests/mirror/apps/coordinator/registrar.test.rs]
/**
 * =================================================================
 * APARATO: NODE REGISTRAR TEST (V3.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DEL UPSERT DE REGISTRO Y CALLBACKS
 * =================================================================
 */

use aviary_coordinator::services::registrar::{
    hash_node_secret, NodeRegistrar, RegistrationOutcome, RegistrationRequest,
};
use aviary_domain_models::{NodeStatus, RecoveryItemStatus, RecoveryTrigger};
use aviary_infra_db::repositories::{NodeRepository, RecoveryRepository};
use aviary_infra_db::ControlPlaneDatabase;
use std::sync::{Arc, Mutex};

struct RegistrarProvingGrounds {
    node_repository: Arc<NodeRepository>,
    recovery_repository: Arc<RecoveryRepository>,
}

async fn proving_grounds(database_name: &str) -> RegistrarProvingGrounds {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Fleet ledger ignition failed");

    RegistrarProvingGrounds {
        node_repository: Arc::new(NodeRepository::new(client.clone())),
        recovery_repository: Arc::new(RecoveryRepository::new(client)),
    }
}

fn standard_request(node_id: &str) -> RegistrationRequest {
    RegistrationRequest {
        node_id: node_id.to_string(),
        host: Some(format!("{node_id}.fleet.internal")),
        capacity_mb: 4096,
        agent_version: Some("1.6.0".to_string()),
    }
}

#[tokio::test]
async fn certify_first_registration_activates_with_audit() {
    println!("\n🐣 [PROVING_GROUNDS]: Auditing first-registration strata...");

    let grounds = proving_grounds("registrar_first").await;
    let registrar = NodeRegistrar::new(
        Arc::clone(&grounds.node_repository),
        Arc::clone(&grounds.recovery_repository),
    );

    let outcome = registrar.register(&standard_request("node-new")).await.expect("register");

    match outcome {
        RegistrationOutcome::FirstRegistration(node) => {
            assert_eq!(node.status, NodeStatus::Active);
            assert_eq!(node.capacity_mb, 4096);
        }
        other => panic!("L4_REGISTRAR_FAULT: Wrong outcome: {other:?}"),
    }

    let audit_trail = grounds.node_repository.list_transitions("node-new").await.expect("audit");
    assert_eq!(audit_trail.len(), 1);
    assert_eq!(audit_trail[0].reason, "first_registration");

    println!("   ✅ [SUCCESS]: First registration certified.");
}

#[tokio::test]
async fn certify_returning_node_fires_callback() {
    println!("\n🔄 [PROVING_GROUNDS]: Auditing re-registration strata...");

    let grounds = proving_grounds("registrar_return").await;

    // Nodo conocido que murió: active -> offline
    grounds
        .node_repository
        .insert_provisioning("node-back", None, 2048, Some("1.0.0"))
        .await
        .expect("insert");
    grounds
        .node_repository
        .transition("node-back", NodeStatus::Active, "first_registration", "registrar")
        .await
        .expect("activation");
    grounds
        .node_repository
        .transition("node-back", NodeStatus::Offline, "heartbeat_timeout", "watchdog")
        .await
        .expect("death");

    let returned_nodes: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let callback_log = Arc::clone(&returned_nodes);

    let registrar = NodeRegistrar::new(
        Arc::clone(&grounds.node_repository),
        Arc::clone(&grounds.recovery_repository),
    )
    .with_on_returning(Arc::new(move |node| {
        callback_log.lock().expect("callback log").push(node.id.clone());
    }));

    let outcome = registrar.register(&standard_request("node-back")).await.expect("register");

    match outcome {
        RegistrationOutcome::Reregistration(node) => {
            assert_eq!(node.status, NodeStatus::Returning);
            // Metadatos frescos del re-registro
            assert_eq!(node.capacity_mb, 4096);
            assert_eq!(node.agent_version.as_deref(), Some("1.6.0"));
        }
        other => panic!("L4_REGISTRAR_FAULT: Wrong outcome: {other:?}"),
    }

    assert_eq!(returned_nodes.lock().expect("log").clone(), vec!["node-back".to_string()]);

    println!("   ✅ [SUCCESS]: Returning corridor certified.");
}

/// Un nodo 'failed' se escolta por aristas legales hasta 'returning'.
#[tokio::test]
async fn certify_failed_node_is_escorted_legally() {
    let grounds = proving_grounds("registrar_failedreturn").await;

    grounds
        .node_repository
        .insert_provisioning("node-phoenix", None, 2048, None)
        .await
        .expect("insert");
    for (waypoint, reason) in [
        (NodeStatus::Active, "first_registration"),
        (NodeStatus::Degraded, "inference_all_down"),
        (NodeStatus::Failed, "inference_reboot_exhausted"),
    ] {
        grounds
            .node_repository
            .transition("node-phoenix", waypoint, reason, "proving_grounds")
            .await
            .expect("corridor");
    }

    let registrar = NodeRegistrar::new(
        Arc::clone(&grounds.node_repository),
        Arc::clone(&grounds.recovery_repository),
    );

    let outcome = registrar.register(&standard_request("node-phoenix")).await.expect("register");
    assert!(matches!(outcome, RegistrationOutcome::Reregistration(_)));

    // La escolta recorre failed -> recovering -> offline -> returning
    let audit_trail = grounds.node_repository.list_transitions("node-phoenix").await.expect("audit");
    let escort_edges: Vec<(NodeStatus, NodeStatus)> = audit_trail
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|row| (row.from_status, row.to_status))
        .collect();
    assert_eq!(
        escort_edges,
        vec![
            (NodeStatus::Failed, NodeStatus::Recovering),
            (NodeStatus::Recovering, NodeStatus::Offline),
            (NodeStatus::Offline, NodeStatus::Returning),
        ]
    );
}

#[tokio::test]
async fn certify_healthy_node_only_refreshes_metadata() {
    let grounds = proving_grounds("registrar_healthy").await;

    grounds
        .node_repository
        .insert_provisioning("node-steady", None, 1024, Some("1.0.0"))
        .await
        .expect("insert");
    grounds
        .node_repository
        .transition("node-steady", NodeStatus::Active, "first_registration", "registrar")
        .await
        .expect("activation");

    let registrar = NodeRegistrar::new(
        Arc::clone(&grounds.node_repository),
        Arc::clone(&grounds.recovery_repository),
    );

    let outcome = registrar.register(&standard_request("node-steady")).await.expect("register");
    assert!(matches!(outcome, RegistrationOutcome::MetadataRefreshed(_)));

    // Sin transiciones nuevas: solamente la activación original
    let audit_trail = grounds.node_repository.list_transitions("node-steady").await.expect("audit");
    assert_eq!(audit_trail.len(), 1);

    let refreshed = grounds.node_repository.get("node-steady").await.expect("get");
    assert_eq!(refreshed.capacity_mb, 4096);
    assert_eq!(refreshed.agent_version.as_deref(), Some("1.6.0"));
}

/// Tras un registro, cada incidente abierto con esperas dispara el callback.
#[tokio::test]
async fn certify_retry_waiting_callback_fires_per_open_incident() {
    println!("\n♻️ [PROVING_GROUNDS]: Auditing retry-callback strata...");

    let grounds = proving_grounds("registrar_retrycb").await;

    // Incidente abierto con un item en espera
    let incident = grounds
        .recovery_repository
        .create_event("node-dead", RecoveryTrigger::HeartbeatTimeout, 1)
        .await
        .expect("incident");
    grounds
        .recovery_repository
        .insert_item(&incident.id, "bot-w-main", "node-dead", None, "bot-w-main.tar.gz",
            RecoveryItemStatus::Waiting, Some("no_capacity"), false)
        .await
        .expect("item");
    grounds
        .recovery_repository
        .finalize_event(&incident.id, 0, 0, 1, aviary_domain_models::RecoveryEventStatus::Partial, "{}")
        .await
        .expect("finalize");

    let retry_candidates: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let callback_log = Arc::clone(&retry_candidates);

    let registrar = NodeRegistrar::new(
        Arc::clone(&grounds.node_repository),
        Arc::clone(&grounds.recovery_repository),
    )
    .with_on_retry_waiting(Arc::new(move |incident| {
        callback_log.lock().expect("callback log").push(incident.id.clone());
    }));

    registrar.register(&standard_request("node-fresh")).await.expect("register");

    // El callback se disparó; el registrar NO reintentó por cuenta propia
    assert_eq!(retry_candidates.lock().expect("log").clone(), vec![incident.id.clone()]);
    let untouched_waiting = grounds
        .recovery_repository
        .list_waiting_items(&incident.id)
        .await
        .expect("scan");
    assert_eq!(untouched_waiting.len(), 1);

    println!("   ✅ [SUCCESS]: Retry callback discipline certified.");
}

#[tokio::test]
async fn certify_self_hosted_registration_stores_digest_only() {
    let grounds = proving_grounds("registrar_selfhosted").await;
    let registrar = NodeRegistrar::new(
        Arc::clone(&grounds.node_repository),
        Arc::clone(&grounds.recovery_repository),
    );

    let secret_cleartext = "super-secret-node-key";
    let secret_digest = hash_node_secret(secret_cleartext);

    let activated = registrar
        .register_self_hosted(
            &standard_request("node-home"),
            "user-42",
            Some("garage-rack"),
            &secret_digest,
        )
        .await
        .expect("self-hosted registration");

    assert_eq!(activated.status, NodeStatus::Active);
    assert_eq!(activated.owner_user_id.as_deref(), Some("user-42"));
    assert_eq!(activated.label.as_deref(), Some("garage-rack"));

    // Solamente la huella vive en el Ledger, jamás el texto claro
    assert_eq!(activated.node_secret_hash.as_deref(), Some(secret_digest.as_str()));
    assert_ne!(activated.node_secret_hash.as_deref(), Some(secret_cleartext));

    // La huella es determinista (64 hex de SHA-256)
    assert_eq!(secret_digest.len(), 64);
    assert_eq!(secret_digest, hash_node_secret(secret_cleartext));
}
