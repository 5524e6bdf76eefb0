// [tests/mirror/libs/infra/db/credit_ledger.test.rs]
/**
 * =================================================================
 * APARATO: CREDIT LEDGER INTEGRITY TEST (V3.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DE SUMA CORRIDA E IDEMPOTENCIA
 * =================================================================
 */

use aviary_domain_models::CreditTransactionType;
use aviary_infra_db::repositories::{CreditRepository, TransactionFilter};
use aviary_infra_db::{ControlPlaneDatabase, DbError};

async fn proving_grounds(database_name: &str) -> CreditRepository {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Ledger ignition failed");
    CreditRepository::new(client)
}

/// Grant, refund y rechazo por balance insuficiente.
#[tokio::test]
async fn certify_grant_refund_and_insufficient_balance() {
    println!("\n💳 [PROVING_GROUNDS]: Auditing grant/refund strata...");

    let ledger = proving_grounds("ledger_adjustments").await;

    // 1. GRANT: balance = 5000
    let grant_row = ledger.grant("t-1", 5000, "welcome", "admin").await.expect("grant failed");
    assert_eq!(grant_row.amount_cents, 5000);
    assert_eq!(grant_row.balance_after_cents, 5000);
    assert_eq!(ledger.balance("t-1").await.expect("balance"), 5000);

    // 2. REFUND: fila negativa con referencias serializadas
    let refund_row = ledger
        .refund("t-1", 2000, "complaint", "admin", Some(&["tx-1".to_string()]))
        .await
        .expect("refund failed");
    assert_eq!(refund_row.amount_cents, -2000);
    assert_eq!(refund_row.balance_after_cents, 3000);
    assert_eq!(refund_row.reference_id.as_deref(), Some("[\"tx-1\"]"));
    assert_eq!(ledger.balance("t-1").await.expect("balance"), 3000);

    // 3. REFUND EXCESIVO: rechazo portando el balance vigente
    let rejection = ledger
        .refund("t-1", 4000, "complaint", "admin", None)
        .await
        .expect_err("overdraft refund must be rejected");

    match rejection {
        DbError::InsufficientBalance { current_balance_cents } => {
            assert_eq!(current_balance_cents, 3000);
        }
        other => panic!("L3_LEDGER_FAULT: Wrong rejection kind: {other}"),
    }

    println!("   ✅ [SUCCESS]: Grant/refund strata certified bit-perfect.");
}

/// Idempotencia por referencia: repetir un crédito no duplica filas.
#[tokio::test]
async fn certify_reference_id_idempotency() {
    println!("\n🔁 [PROVING_GROUNDS]: Auditing reference idempotency strata...");

    let ledger = proving_grounds("ledger_idempotency").await;

    let first_seal = ledger
        .credit("t-1", 1000, CreditTransactionType::Purchase, Some("x"), Some("pi_abc"), None)
        .await
        .expect("first credit failed");

    let replay_seal = ledger
        .credit("t-1", 1000, CreditTransactionType::Purchase, Some("x"), Some("pi_abc"), None)
        .await
        .expect("replay must not fail");

    // La repetición retorna la fila previa sin alterar el balance
    assert_eq!(first_seal.id, replay_seal.id);
    assert_eq!(ledger.balance("t-1").await.expect("balance"), 1000);
    assert!(ledger.has_reference_id("pi_abc").await.expect("reference check"));
    assert!(!ledger.has_reference_id("pi_void").await.expect("reference check"));

    let (entries, total) = ledger
        .list_transactions("t-1", &TransactionFilter::default())
        .await
        .expect("history failed");
    assert_eq!(total, 1, "Idempotency breach: replay inserted a second row");
    assert_eq!(entries.len(), 1);

    println!("   ✅ [SUCCESS]: Idempotency certified (single row, stable balance).");
}

/// Suma corrida == balance_after más reciente == caché desnormalizada.
#[tokio::test]
async fn certify_running_sum_invariant() {
    println!("\n🧮 [PROVING_GROUNDS]: Auditing running-sum strata...");

    let ledger = proving_grounds("ledger_runningsum").await;

    ledger.grant("t-9", 10_000, "seed", "admin").await.expect("grant");
    ledger
        .debit("t-9", 700, CreditTransactionType::BotRuntime, "runtime", None, true, None)
        .await
        .expect("debit");
    ledger
        .debit("t-9", 300, CreditTransactionType::AdapterUsage, "usage", None, true, None)
        .await
        .expect("debit");
    ledger.correction("t-9", -500, "audit drift", "admin").await.expect("correction");

    let (entries, total) = ledger
        .list_transactions("t-9", &TransactionFilter::default())
        .await
        .expect("history failed");
    assert_eq!(total, 4);

    let amount_sum: i64 = entries.iter().map(|row| row.amount_cents).sum();
    let newest_balance = entries.first().expect("newest row").balance_after_cents;
    let cached_balance = ledger.balance("t-9").await.expect("balance");

    assert_eq!(amount_sum, 8500);
    assert_eq!(amount_sum, newest_balance, "Running-sum breach: sum != newest balance_after");
    assert_eq!(amount_sum, cached_balance, "Running-sum breach: sum != cached balance");

    println!("   ✅ [SUCCESS]: Running sum certified (sum {amount_sum}).");
}

/// Débito fire-and-forget: el medidor jamás se rechaza por balance.
#[tokio::test]
async fn certify_fire_and_forget_debit_tolerates_negative() {
    let ledger = proving_grounds("ledger_negative").await;

    ledger.grant("t-2", 100, "seed", "admin").await.expect("grant");
    ledger
        .debit("t-2", 900, CreditTransactionType::BotRuntime, "runtime", None, true, None)
        .await
        .expect("metering debit must tolerate negative balance");

    assert_eq!(ledger.balance("t-2").await.expect("balance"), -800);

    // Sin autorización, el mismo débito se rechaza
    let rejection = ledger
        .debit("t-2", 100, CreditTransactionType::AdapterUsage, "usage", None, false, None)
        .await
        .expect_err("unauthorized overdraft must fail");
    assert!(matches!(rejection, DbError::InsufficientBalance { .. }));
}

/// Reglas de corrección: cero permitido, negativa limitada por el balance.
#[tokio::test]
async fn certify_correction_rules() {
    let ledger = proving_grounds("ledger_correction").await;

    ledger.grant("t-3", 1000, "seed", "admin").await.expect("grant");

    let zero_row = ledger.correction("t-3", 0, "no-op audit", "admin").await.expect("zero correction");
    assert_eq!(zero_row.amount_cents, 0);
    assert_eq!(zero_row.balance_after_cents, 1000);

    let rejection = ledger
        .correction("t-3", -1500, "too deep", "admin")
        .await
        .expect_err("negative correction below zero must fail");
    assert!(matches!(rejection, DbError::InsufficientBalance { current_balance_cents: 1000 }));
}

/// Historial: más reciente primero, tope duro de 250, filtro por tipo.
#[tokio::test]
async fn certify_history_pagination_and_cap() {
    println!("\n📑 [PROVING_GROUNDS]: Auditing history pagination strata...");

    let ledger = proving_grounds("ledger_history").await;

    ledger.grant("t-4", 5000, "seed", "admin").await.expect("grant");
    for cycle_index in 0..5 {
        ledger
            .debit(
                "t-4",
                10,
                CreditTransactionType::BotRuntime,
                &format!("runtime cycle {cycle_index}"),
                None,
                true,
                None,
            )
            .await
            .expect("debit");
    }

    // El tope de 250 absorbe límites hostiles sin rechazo
    let greedy_filter = TransactionFilter {
        limit: Some(10_000),
        ..TransactionFilter::default()
    };
    let (entries, total) = ledger.list_transactions("t-4", &greedy_filter).await.expect("history");
    assert_eq!(total, 6);
    assert_eq!(entries.len(), 6);

    // Orden más-reciente-primero: la cabeza es el último débito
    assert_eq!(entries[0].transaction_type, CreditTransactionType::BotRuntime);
    assert_eq!(entries[5].transaction_type, CreditTransactionType::Grant);

    // Filtro por tipo
    let runtime_filter = TransactionFilter {
        transaction_type: Some(CreditTransactionType::BotRuntime),
        ..TransactionFilter::default()
    };
    let (runtime_entries, runtime_total) =
        ledger.list_transactions("t-4", &runtime_filter).await.expect("history");
    assert_eq!(runtime_total, 5);
    assert!(runtime_entries
        .iter()
        .all(|row| row.transaction_type == CreditTransactionType::BotRuntime));

    println!("   ✅ [SUCCESS]: History strata certified.");
}

/// Inquilino desconocido: balance cero e historial vacío.
#[tokio::test]
async fn certify_unknown_tenant_defaults() {
    let ledger = proving_grounds("ledger_unknown").await;

    assert_eq!(ledger.balance("ghost-tenant").await.expect("balance"), 0);

    let (entries, total) = ledger
        .list_transactions("ghost-tenant", &TransactionFilter::default())
        .await
        .expect("history");
    assert_eq!(total, 0);
    assert!(entries.is_empty());
}
