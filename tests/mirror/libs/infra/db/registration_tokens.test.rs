// [tests/mirror/libs/infra/db/registration_tokens.test.rs]
/**
 * =================================================================
 * APARATO: REGISTRATION TOKEN TEST (V2.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DE UN SOLO USO Y EXPIRACIÓN
 * =================================================================
 */

use aviary_infra_db::repositories::RegistrationTokenStore;
use aviary_infra_db::ControlPlaneDatabase;
use libsql::params;

async fn proving_grounds(database_name: &str) -> (ControlPlaneDatabase, RegistrationTokenStore) {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Token vault ignition failed");
    (client.clone(), RegistrationTokenStore::new(client))
}

/// El consumo retorna no-nulo a lo sumo una vez.
#[tokio::test]
async fn certify_single_use_consumption() {
    println!("\n🎟️ [PROVING_GROUNDS]: Auditing single-use strata...");

    let (_client, vault) = proving_grounds("tokens_singleuse").await;

    let issued = vault.create("user-7", Some("garage-rack")).await.expect("issue failed");
    assert!(issued.expires_at > chrono::Utc::now());

    // Primer consumo: identidad del emisor
    let first_consumption = vault.consume(&issued.token, "node-77").await.expect("consume");
    let consumed = first_consumption.expect("first consumption must succeed");
    assert_eq!(consumed.user_id, "user-7");
    assert_eq!(consumed.label.as_deref(), Some("garage-rack"));

    // Todo consumo posterior retorna nulo
    let replay = vault.consume(&issued.token, "node-78").await.expect("consume");
    assert!(replay.is_none(), "Single-use breach: token consumed twice");

    // Un token fantasma también retorna nulo
    let ghost = vault.consume("ghost-token", "node-79").await.expect("consume");
    assert!(ghost.is_none());

    println!("   ✅ [SUCCESS]: Single-use certified.");
}

#[tokio::test]
async fn certify_expired_token_is_rejected_and_purged() {
    println!("\n⌛ [PROVING_GROUNDS]: Auditing expiration strata...");

    let (client, vault) = proving_grounds("tokens_expiry").await;

    let issued = vault.create("user-8", None).await.expect("issue failed");

    // Envejecimiento forzado del token en el Ledger
    let connection = client.get_connection().expect("connection");
    connection
        .execute(
            "UPDATE registration_tokens SET expires_at = ?2 WHERE id = ?1",
            params![
                issued.token.clone(),
                (chrono::Utc::now() - chrono::Duration::minutes(1)).to_rfc3339()
            ],
        )
        .await
        .expect("forced aging");

    let stale_consumption = vault.consume(&issued.token, "node-80").await.expect("consume");
    assert!(stale_consumption.is_none(), "expired token must be rejected");

    let purged = vault.purge_expired().await.expect("purge");
    assert_eq!(purged, 1);

    println!("   ✅ [SUCCESS]: Expiration strata certified.");
}

#[tokio::test]
async fn certify_active_listing_excludes_spent_and_foreign_tokens() {
    let (_client, vault) = proving_grounds("tokens_listing").await;

    let kept = vault.create("user-9", Some("kept")).await.expect("issue");
    let spent = vault.create("user-9", Some("spent")).await.expect("issue");
    vault.create("user-10", Some("foreign")).await.expect("issue");

    vault.consume(&spent.token, "node-90").await.expect("consume").expect("consumption");

    let active_tokens = vault.list_active("user-9").await.expect("listing");
    assert_eq!(active_tokens.len(), 1);
    assert_eq!(active_tokens[0].id, kept.token);
    assert!(!active_tokens[0].used);
}
