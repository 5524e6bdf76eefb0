// [tests/mirror/apps/coordinator/billing_gate.test.rs]
/**
 * =================================================================
 * APARATO: BILLING GATE CYCLE TEST (V3.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DE LA SIMETRÍA DE SUSPENSIÓN Y DEL CICLO DIARIO
 * =================================================================
 */

use aviary_coordinator::services::billing_gate::BotBillingGate;
use aviary_domain_models::{BillingState, StorageTier};
use aviary_infra_db::repositories::{BotRepository, CreditRepository, TransactionFilter};
use aviary_infra_db::ControlPlaneDatabase;
use std::sync::Arc;

struct GateProvingGrounds {
    bot_repository: Arc<BotRepository>,
    credit_repository: Arc<CreditRepository>,
    gate: BotBillingGate,
}

async fn proving_grounds(database_name: &str) -> GateProvingGrounds {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Ledger ignition failed");

    let bot_repository = Arc::new(BotRepository::new(client.clone()));
    let credit_repository = Arc::new(CreditRepository::new(client));
    let gate = BotBillingGate::new(Arc::clone(&bot_repository), Arc::clone(&credit_repository));

    GateProvingGrounds {
        bot_repository,
        credit_repository,
        gate,
    }
}

/// Suspensión + reactivación restauran el conjunto exacto.
#[tokio::test]
async fn certify_suspension_reactivation_symmetry() {
    println!("\n♻️ [PROVING_GROUNDS]: Auditing gate symmetry strata...");

    let grounds = proving_grounds("gate_cycle_symmetry").await;
    for bot_index in 1..=3 {
        grounds
            .gate
            .register_bot(&format!("bot-{bot_index}"), "tenant-p7", &format!("bot-{bot_index}-main"))
            .await
            .expect("register");
    }
    grounds.credit_repository.grant("tenant-p7", 1000, "seed", "admin").await.expect("grant");

    let mut suspended_ids = grounds.gate.suspend_all_for_tenant("tenant-p7").await.expect("suspend");
    assert_eq!(suspended_ids.len(), 3);

    // Con balance positivo, la reactivación restaura el conjunto exacto
    let mut reactivated_ids = grounds.gate.check_reactivation("tenant-p7").await.expect("reactivate");
    suspended_ids.sort();
    reactivated_ids.sort();
    assert_eq!(suspended_ids, reactivated_ids, "Symmetry breach: asymmetric sets");

    println!("   ✅ [SUCCESS]: Gate symmetry certified.");
}

/// Sin balance positivo, la reactivación es un no-op.
#[tokio::test]
async fn certify_reactivation_requires_positive_balance() {
    let grounds = proving_grounds("gate_cycle_balancegate").await;
    grounds.gate.register_bot("bot-1", "tenant-broke", "bot-1-main").await.expect("register");
    grounds.gate.suspend_all_for_tenant("tenant-broke").await.expect("suspend");

    // Balance cero: nada se reactiva
    let reactivated = grounds.gate.check_reactivation("tenant-broke").await.expect("probe");
    assert!(reactivated.is_empty());

    let still_suspended = grounds.bot_repository.get("bot-1").await.expect("get");
    assert_eq!(still_suspended.billing_state, BillingState::Suspended);
}

/// Ciclo diario: débito idempotente, cruce por cero y reactivación.
#[tokio::test]
async fn certify_daily_cycle_metering_and_zero_crossing() {
    println!("\n🧾 [PROVING_GROUNDS]: Auditing daily cycle strata...");

    let grounds = proving_grounds("gate_cycle_daily").await;

    // Inquilino solvente: dos bots, uno con addon de archivo
    grounds.gate.register_bot("bot-rich-1", "tenant-rich", "rich-1-main").await.expect("register");
    grounds.gate.register_bot("bot-rich-2", "tenant-rich", "rich-2-main").await.expect("register");
    grounds.gate.set_storage_tier("bot-rich-2", StorageTier::Archive).await.expect("tier");
    grounds.credit_repository.grant("tenant-rich", 10_000, "seed", "admin").await.expect("grant");

    // Inquilino al borde: un bot y casi sin créditos
    grounds.gate.register_bot("bot-poor", "tenant-poor", "poor-main").await.expect("register");
    grounds.credit_repository.grant("tenant-poor", 10, "seed", "admin").await.expect("grant");

    let first_cycle = grounds.gate.run_daily_cycle().await.expect("cycle");
    assert_eq!(first_cycle.tenants_charged, 2);

    // El solvente pagó runtime (2 x 50) + addon diario (1500/30 = 50)
    assert_eq!(grounds.credit_repository.balance("tenant-rich").await.expect("balance"), 10_000 - 100 - 50);

    // El insolvente cruzó cero: débito fire-and-forget + suspensión
    let poor_balance = grounds.credit_repository.balance("tenant-poor").await.expect("balance");
    assert_eq!(poor_balance, 10 - 50);
    assert!(first_cycle.tenants_suspended.contains(&"tenant-poor".to_string()));
    let poor_bot = grounds.bot_repository.get("bot-poor").await.expect("get");
    assert_eq!(poor_bot.billing_state, BillingState::Suspended);

    // IDEMPOTENCIA: repetir el ciclo el mismo día no duplica cargos
    let replay_cycle = grounds.gate.run_daily_cycle().await.expect("replay");
    assert_eq!(grounds.credit_repository.balance("tenant-rich").await.expect("balance"), 10_000 - 100 - 50);
    assert!(replay_cycle.tenants_reactivated.is_empty());

    // RESCATE: créditos frescos reactivan en el siguiente ciclo
    grounds.credit_repository.grant("tenant-poor", 5000, "top-up", "admin").await.expect("grant");
    let rescue_cycle = grounds.gate.run_daily_cycle().await.expect("rescue cycle");
    assert!(rescue_cycle.tenants_reactivated.contains(&"tenant-poor".to_string()));
    let revived_bot = grounds.bot_repository.get("bot-poor").await.expect("get");
    assert_eq!(revived_bot.billing_state, BillingState::Active);

    println!("   ✅ [SUCCESS]: Daily cycle certified.");
}

/// La tabla de costes de almacenamiento alimenta al cron diario.
#[tokio::test]
async fn certify_storage_tier_costs_projection() {
    let grounds = proving_grounds("gate_cycle_tiers").await;
    grounds.gate.register_bot("bot-std", "tenant-t", "std-main").await.expect("register");
    grounds.gate.register_bot("bot-arc", "tenant-t", "arc-main").await.expect("register");
    grounds.gate.set_storage_tier("bot-arc", StorageTier::Archive).await.expect("tier");

    let tier_costs = grounds.gate.get_storage_tier_costs_for_tenant("tenant-t").await.expect("costs");
    assert_eq!(tier_costs.len(), 2);

    let archive_cost = tier_costs
        .iter()
        .find(|(bot_identifier, _)| bot_identifier == "bot-arc")
        .map(|(_, monthly_cost)| *monthly_cost)
        .expect("archive bot");
    assert_eq!(archive_cost, 1500);

    // El historial del inquilino permanece vacío: costes != cargos
    let (entries, total) = grounds
        .credit_repository
        .list_transactions("tenant-t", &TransactionFilter::default())
        .await
        .expect("history");
    assert_eq!(total, 0);
    assert!(entries.is_empty());
}
