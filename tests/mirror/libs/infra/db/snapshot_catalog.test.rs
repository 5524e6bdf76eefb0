// [tests/mirror/libs/infra/db/snapshot_catalog.test.rs]
/**
 * =================================================================
 * APARATO: SNAPSHOT CATALOG TEST (V2.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DEL BORRADO SUAVE DEL CATÁLOGO
 * =================================================================
 */

use aviary_domain_models::SnapshotType;
use aviary_infra_db::repositories::SnapshotRepository;
use aviary_infra_db::ControlPlaneDatabase;

async fn proving_grounds(database_name: &str) -> SnapshotRepository {
    let client = ControlPlaneDatabase::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .expect("Snapshot catalog ignition failed");
    SnapshotRepository::new(client)
}

#[tokio::test]
async fn certify_soft_delete_hides_but_preserves() {
    println!("\n📼 [PROVING_GROUNDS]: Auditing soft-delete strata...");

    let catalog = proving_grounds("snapshots_softdelete").await;

    let nightly = catalog
        .record("tenant-a", "bot-1", Some("user-1"), SnapshotType::Nightly,
            "backups/bot-1-main.tar.gz", 10_485_760, Some("cfg-hash-1"), None, None)
        .await
        .expect("record");
    catalog
        .record("tenant-a", "bot-1", None, SnapshotType::OnDemand,
            "backups/bot-1-main-manual.tar.gz", 9_000_000, None, Some("[\"plugin-x\"]"), None)
        .await
        .expect("record");

    assert_eq!(catalog.count_for_tenant("tenant-a").await.expect("count"), 2);

    // Borrado suave: oculto de listados y conteos, registro preservado
    catalog.soft_delete(&nightly.id).await.expect("soft delete");

    assert_eq!(catalog.count_for_tenant("tenant-a").await.expect("count"), 1);
    let visible = catalog.list_for_tenant("tenant-a").await.expect("list");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].snapshot_type, SnapshotType::OnDemand);

    let preserved = catalog.get(&nightly.id).await.expect("the row must survive");
    assert!(preserved.deleted_at.is_some());

    // El doble borrado de la misma fila se rechaza
    assert!(catalog.soft_delete(&nightly.id).await.is_err());

    println!("   ✅ [SUCCESS]: Soft-delete strata certified.");
}

#[tokio::test]
async fn certify_catalog_isolation_between_tenants() {
    let catalog = proving_grounds("snapshots_isolation").await;

    catalog
        .record("tenant-a", "bot-1", None, SnapshotType::Nightly, "backups/a.tar.gz", 1, None, None, None)
        .await
        .expect("record");
    catalog
        .record("tenant-b", "bot-2", None, SnapshotType::PreRestore, "backups/b.tar.gz", 2, None, None, None)
        .await
        .expect("record");

    assert_eq!(catalog.count_for_tenant("tenant-a").await.expect("count"), 1);
    assert_eq!(catalog.count_for_tenant("tenant-b").await.expect("count"), 1);
    assert_eq!(catalog.count_for_tenant("ghost").await.expect("count"), 0);
}
