// [tests/mirror/apps/coordinator/maintenance_reaper.test.rs]
/**
 * =================================================================
 * APARATO: MAINTENANCE REAPER TEST (V2.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DE LA HIGIENE PERIÓDICA
 * =================================================================
 */

use async_trait::async_trait;
use aviary_coordinator::services::billing_gate::BotBillingGate;
use aviary_coordinator::services::maintenance::MaintenanceReaper;
use aviary_coordinator::services::notifier::AdminAlertSink;
use aviary_domain_notification::AdminEvent;
use aviary_domain_models::{BillingState, RecoveryEventStatus, RecoveryItemStatus, RecoveryTrigger};
use aviary_infra_db::repositories::{
    BotRepository, CreditRepository, RecoveryRepository, RegistrationTokenStore,
};
use aviary_infra_db::ControlPlaneDatabase;
use libsql::params;
use std::sync::{Arc, Mutex};
use std::time::Duration;

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

#[tokio::test]
async fn certify_full_hygiene_pass() {
    println!("\n💀 [PROVING_GROUNDS]: Auditing hygiene strata...");

    let client = ControlPlaneDatabase::connect("file:reaper_pass?mode=memory&cache=shared", None)
        .await
        .expect("Ledger ignition failed");

    let token_store = Arc::new(RegistrationTokenStore::new(client.clone()));
    let bot_repository = Arc::new(BotRepository::new(client.clone()));
    let credit_repository = Arc::new(CreditRepository::new(client.clone()));
    let recovery_repository = Arc::new(RecoveryRepository::new(client.clone()));
    let billing_gate = Arc::new(BotBillingGate::new(
        Arc::clone(&bot_repository),
        Arc::clone(&credit_repository),
    ));
    let sink = Arc::new(CapturingSink::default());

    // Ventana de espera nula: toda espera vigente califica para expirar
    let reaper = MaintenanceReaper::new(
        Arc::clone(&token_store),
        Arc::clone(&billing_gate),
        Arc::clone(&recovery_repository),
        sink.clone(),
        Duration::from_secs(0),
    );

    // 1. SETUP: token expirado sin usar
    let stale_token = token_store.create("user-1", None).await.expect("issue");
    let connection = client.get_connection().expect("connection");
    connection
        .execute(
            "UPDATE registration_tokens SET expires_at = ?2 WHERE id = ?1",
            params![
                stale_token.token.clone(),
                (chrono::Utc::now() - chrono::Duration::minutes(5)).to_rfc3339()
            ],
        )
        .await
        .expect("forced aging");

    // 2. SETUP: suspensión con gracia ya agotada
    bot_repository.register_bot("bot-doomed", "tenant-d", "doomed-main").await.expect("register");
    bot_repository
        .suspend_all_for_tenant("tenant-d", chrono::Utc::now() - chrono::Duration::days(1))
        .await
        .expect("suspend");

    // 3. SETUP: incidente con un inquilino varado en espera
    let incident = recovery_repository
        .create_event("node-dead", RecoveryTrigger::HeartbeatTimeout, 1)
        .await
        .expect("incident");
    let waiting_item = recovery_repository
        .insert_item(&incident.id, "bot-stuck-main", "node-dead", None, "bot-stuck-main.tar.gz",
            RecoveryItemStatus::Waiting, Some("no_capacity"), false)
        .await
        .expect("item");
    recovery_repository
        .finalize_event(&incident.id, 0, 0, 1, RecoveryEventStatus::Partial, "{}")
        .await
        .expect("finalize");

    // --- PASADA DE HIGIENE ---
    reaper.run_once().await.expect("hygiene pass");

    // El token expirado se purgó
    assert!(token_store.list_active("user-1").await.expect("listing").is_empty());
    let stale_replay = token_store.consume(&stale_token.token, "node-x").await.expect("consume");
    assert!(stale_replay.is_none());

    // La gracia agotada se destruyó
    let doomed = bot_repository.get("bot-doomed").await.expect("get");
    assert_eq!(doomed.billing_state, BillingState::Destroyed);

    // La espera vencida se selló como fallo con su razón
    let sealed_item = recovery_repository.get_item(&waiting_item.id).await.expect("item");
    assert_eq!(sealed_item.status, RecoveryItemStatus::Failed);
    assert_eq!(sealed_item.reason.as_deref(), Some("waiting_expired"));
    assert!(sealed_item.completed_at.is_some());

    // Contadores reconciliados: sin esperas, el incidente cierra
    let sealed_incident = recovery_repository.get_event(&incident.id).await.expect("event");
    assert_eq!(sealed_incident.tenants_waiting, 0);
    assert_eq!(sealed_incident.tenants_failed, 1);

    // El Herald anunció la expiración con los inquilinos afectados
    let captured = sink.captured_events.lock().expect("sink").clone();
    assert!(captured.iter().any(|event| matches!(
        event,
        AdminEvent::WaitingTenantsExpired { recovery_event_id, tenants }
            if recovery_event_id == &incident.id && tenants == &vec!["bot-stuck-main".to_string()]
    )));

    println!("   ✅ [SUCCESS]: Hygiene pass certified.");
}

#[tokio::test]
async fn certify_fresh_waiting_items_survive_the_reaper() {
    let client = ControlPlaneDatabase::connect("file:reaper_fresh?mode=memory&cache=shared", None)
        .await
        .expect("Ledger ignition failed");

    let token_store = Arc::new(RegistrationTokenStore::new(client.clone()));
    let bot_repository = Arc::new(BotRepository::new(client.clone()));
    let credit_repository = Arc::new(CreditRepository::new(client.clone()));
    let recovery_repository = Arc::new(RecoveryRepository::new(client));
    let billing_gate = Arc::new(BotBillingGate::new(bot_repository, Arc::clone(&credit_repository)));
    let sink = Arc::new(CapturingSink::default());

    // Ventana holgada: ninguna espera reciente expira
    let reaper = MaintenanceReaper::new(
        token_store,
        billing_gate,
        Arc::clone(&recovery_repository),
        sink.clone(),
        Duration::from_secs(24 * 3600),
    );

    let incident = recovery_repository
        .create_event("node-dead", RecoveryTrigger::Manual, 1)
        .await
        .expect("incident");
    recovery_repository
        .insert_item(&incident.id, "bot-young-main", "node-dead", None, "bot-young-main.tar.gz",
            RecoveryItemStatus::Waiting, Some("no_capacity"), false)
        .await
        .expect("item");

    reaper.run_once().await.expect("hygiene pass");

    // La espera joven sigue en pie y el Herald permanece en silencio
    let waiting = recovery_repository.list_waiting_items(&incident.id).await.expect("scan");
    assert_eq!(waiting.len(), 1);
    assert!(sink.captured_events.lock().expect("sink").is_empty());
}
