// [libs/domain/models/src/tests_serialization.rs]
/**
 * =================================================================
 * APARATO: MODELS INTEGRITY TEST (V3.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L2
 * RESPONSABILIDAD: CERTIFICACIÓN DE SERIALIZACIÓN DE ENTIDADES
 * =================================================================
 */

use aviary_domain_models::{
    BillingState, CommandKind, CreditTransactionType, NodeStatus, PlanTier, RecoveryReport,
    RecoveredTenant, SnapshotType, WaitingTenant,
};

#[test]
fn certify_node_status_wire_labels() {
    println!("\n🛰️  [PROVING_GROUNDS]: Auditing node status label strata...");

    let all_statuses = [
        NodeStatus::Provisioning,
        NodeStatus::Active,
        NodeStatus::Draining,
        NodeStatus::Returning,
        NodeStatus::Offline,
        NodeStatus::Recovering,
        NodeStatus::Failed,
        NodeStatus::Degraded,
    ];

    for status in all_statuses {
        // Paridad entre el label canónico y el rename de serde
        let serialized = serde_json::to_string(&status).expect("Status serialization failed");
        assert_eq!(serialized, format!("\"{}\"", status.as_str()));

        // Decodificación inversa bit-perfecta
        assert_eq!(NodeStatus::parse(status.as_str()), Some(status));
    }

    assert_eq!(NodeStatus::parse("ghost"), None);
    println!("   ✅ [SUCCESS]: 8 status labels certified bit-perfect.");
}

#[test]
fn certify_command_allowlist_labels() {
    println!("\n📡 [PROVING_GROUNDS]: Auditing command allowlist strata...");

    let expectations = [
        (CommandKind::BotStart, "bot.start"),
        (CommandKind::BotImport, "bot.import"),
        (CommandKind::BotInspect, "bot.inspect"),
        (CommandKind::BackupDownload, "backup.download"),
        (CommandKind::BackupRunNightly, "backup.run-nightly"),
        (CommandKind::BackupRunHot, "backup.run-hot"),
    ];

    for (kind, wire_label) in expectations {
        assert_eq!(kind.as_str(), wire_label);
        let serialized = serde_json::to_string(&kind).expect("Command serialization failed");
        assert_eq!(serialized, format!("\"{}\"", wire_label));
    }

    // Un comando fuera del catálogo cerrado jamás deserializa
    let rejection: Result<CommandKind, _> = serde_json::from_str("\"node.selfdestruct\"");
    assert!(rejection.is_err(), "Allowlist breach: unknown command accepted.");

    println!("   ✅ [SUCCESS]: Closed allowlist certified.");
}

#[test]
fn certify_ledger_and_billing_labels() {
    println!("\n💳 [PROVING_GROUNDS]: Auditing ledger label strata...");

    assert_eq!(CreditTransactionType::AdapterUsage.as_str(), "adapter_usage");
    assert_eq!(CreditTransactionType::BotRuntime.as_str(), "bot_runtime");
    assert_eq!(CreditTransactionType::CommunityDividend.as_str(), "community_dividend");
    assert_eq!(CreditTransactionType::OnboardingLlm.as_str(), "onboarding_llm");
    assert_eq!(
        CreditTransactionType::parse("correction"),
        Some(CreditTransactionType::Correction)
    );

    assert_eq!(BillingState::Suspended.as_str(), "suspended");
    assert_eq!(BillingState::parse("destroyed"), Some(BillingState::Destroyed));

    // Snapshot types usan guiones, no snake_case
    assert_eq!(SnapshotType::OnDemand.as_str(), "on-demand");
    assert_eq!(SnapshotType::PreRestore.as_str(), "pre-restore");
    assert_eq!(
        serde_json::to_string(&SnapshotType::OnDemand).expect("Snapshot serialization failed"),
        "\"on-demand\""
    );

    println!("   ✅ [SUCCESS]: Ledger and billing labels certified.");
}

#[test]
fn certify_plan_tier_priority_ordering() {
    println!("\n🏛️  [PROVING_GROUNDS]: Auditing plan tier priority strata...");

    assert!(PlanTier::Enterprise.priority() < PlanTier::Pro.priority());
    assert!(PlanTier::Pro.priority() < PlanTier::Starter.priority());
    assert!(PlanTier::Starter.priority() < PlanTier::Free.priority());

    println!("   ✅ [SUCCESS]: enterprise > pro > starter > free certified.");
}

#[test]
fn certify_recovery_report_shape() {
    println!("\n♻️  [PROVING_GROUNDS]: Auditing recovery report strata...");

    let mut report = RecoveryReport::default();
    report.recovered.push(RecoveredTenant {
        tenant: "bot-1".into(),
        target: "node-b".into(),
    });
    report.waiting.push(WaitingTenant {
        tenant: "bot-2".into(),
        reason: "no_capacity".into(),
    });

    assert_eq!(report.total(), 2);

    let serialized = serde_json::to_value(&report).expect("Report serialization failed");
    assert_eq!(serialized["recovered"][0]["tenant"], "bot-1");
    assert_eq!(serialized["waiting"][0]["reason"], "no_capacity");
    assert!(serialized["failed"].as_array().expect("failed array").is_empty());

    println!("   ✅ [SUCCESS]: Report shape certified bit-perfect.");
}
