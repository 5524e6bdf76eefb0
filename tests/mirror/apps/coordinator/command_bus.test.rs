// [tests/mirror/apps/coordinator/command_bus.test.rs]
/**
 * =================================================================
 * APARATO: COMMAND BUS CORRELATION TEST (V3.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DE CORRELACIÓN, TIMEOUT Y RECHAZO
 * =================================================================
 */

use aviary_coordinator::services::command_bus::{CommandBus, CommandFault, NodeCommander};
use aviary_coordinator::state::link_registry::NodeLinkRegistry;
use aviary_domain_models::{CommandFrame, CommandKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn certify_success_correlation_roundtrip() {
    println!("\n📡 [PROVING_GROUNDS]: Auditing correlation strata...");

    let link_registry = Arc::new(NodeLinkRegistry::new());
    let bus = Arc::new(CommandBus::new(Arc::clone(&link_registry), Duration::from_secs(5)));

    // Agente sintético: drena frames y responde con éxito correlacionado
    let mut outbound_frames = {
        let (receiver, _identity) = link_registry.attach("node-1");
        receiver
    };
    let agent_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        while let Some(serialized_frame) = outbound_frames.recv().await {
            let frame: CommandFrame = serde_json::from_str(&serialized_frame).expect("frame decode");
            assert_eq!(frame.kind, CommandKind::BotInspect);
            agent_bus.resolve_result(&frame.id, true, Some(json!({ "state": "running" })), None);
        }
    });

    let result_payload = bus
        .dispatch("node-1", CommandKind::BotInspect, json!({ "name": "bot-alpha" }))
        .await
        .expect("dispatch must resolve");

    assert_eq!(result_payload["state"], "running");
    assert_eq!(bus.pending_count(), 0, "pending entry must evaporate on resolution");

    println!("   ✅ [SUCCESS]: Correlation roundtrip certified.");
}

#[tokio::test]
async fn certify_agent_rejection_carries_error_string() {
    let link_registry = Arc::new(NodeLinkRegistry::new());
    let bus = Arc::new(CommandBus::new(Arc::clone(&link_registry), Duration::from_secs(5)));

    let mut outbound_frames = {
        let (receiver, _identity) = link_registry.attach("node-2");
        receiver
    };
    let agent_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        while let Some(serialized_frame) = outbound_frames.recv().await {
            let frame: CommandFrame = serde_json::from_str(&serialized_frame).expect("frame decode");
            agent_bus.resolve_result(&frame.id, false, None, Some("container not found".into()));
        }
    });

    let rejection = bus
        .dispatch("node-2", CommandKind::BotStop, json!({ "name": "ghost" }))
        .await
        .expect_err("agent failure must reject");

    match rejection {
        CommandFault::Rejected(agent_error) => assert_eq!(agent_error, "container not found"),
        other => panic!("L4_BUS_FAULT: Wrong fault kind: {other}"),
    }
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test]
async fn certify_missing_error_defaults_to_command_failed() {
    let link_registry = Arc::new(NodeLinkRegistry::new());
    let bus = Arc::new(CommandBus::new(Arc::clone(&link_registry), Duration::from_secs(5)));

    let mut outbound_frames = {
        let (receiver, _identity) = link_registry.attach("node-3");
        receiver
    };
    let agent_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        while let Some(serialized_frame) = outbound_frames.recv().await {
            let frame: CommandFrame = serde_json::from_str(&serialized_frame).expect("frame decode");
            // Fallo sin mensaje adjunto
            agent_bus.resolve_result(&frame.id, false, None, None);
        }
    });

    let rejection = bus
        .dispatch("node-3", CommandKind::BotRestart, json!({}))
        .await
        .expect_err("must reject");

    match rejection {
        CommandFault::Rejected(default_message) => assert_eq!(default_message, "command failed"),
        other => panic!("L4_BUS_FAULT: Wrong fault kind: {other}"),
    }
}

#[tokio::test]
async fn certify_timeout_evicts_pending_entry() {
    println!("\n⏱️ [PROVING_GROUNDS]: Auditing timeout strata...");

    let link_registry = Arc::new(NodeLinkRegistry::new());
    let bus = Arc::new(CommandBus::new(Arc::clone(&link_registry), Duration::from_millis(50)));

    // Agente mudo: retiene el receptor sin responder jamás
    let (_silent_receiver, _identity) = link_registry.attach("node-mute");

    let rejection = bus
        .dispatch("node-mute", CommandKind::BotLogs, json!({}))
        .await
        .expect_err("silence must time out");

    assert!(matches!(rejection, CommandFault::Timeout { .. }));
    assert!(rejection.to_string().contains("timed out"));
    assert_eq!(bus.pending_count(), 0, "timeout must evict the pending entry");

    // Un resultado tardío sin correlación vigente se descarta sin pánico
    bus.resolve_result("stale-correlation", true, None, None);

    println!("   ✅ [SUCCESS]: Timeout hygiene certified.");
}

#[tokio::test]
async fn certify_disconnected_node_is_rejected_immediately() {
    let link_registry = Arc::new(NodeLinkRegistry::new());
    let bus = CommandBus::new(link_registry, Duration::from_secs(5));

    let rejection = bus
        .dispatch("node-ghost", CommandKind::BotStart, json!({}))
        .await
        .expect_err("no link must reject");

    assert!(matches!(rejection, CommandFault::NotConnected { .. }));
    assert!(rejection.to_string().contains("not connected"));
    assert_eq!(bus.pending_count(), 0);
}
