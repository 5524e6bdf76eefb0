// [libs/infra/db/src/schema.rs]
/**
 * =================================================================
 * APARATO: CONTROL PLANE DATABASE SCHEMA (V12.0 - FLEET STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. ONE-TO-ONE: Cada tabla corresponde a una entidad del dominio; las
 *    tablas append-only (node_transitions, credit_transactions,
 *    recovery_items) no tienen ruta de UPDATE en operación normal.
 * 2. IDEMPOTENCIA: Gestión de errores para migraciones en caliente.
 * 3. PERFORMANCE: Índices de aceleración para los barridos del watchdog
 *    y la paginación del Ledger.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del plano de control Aviary.
 */
const TACTICAL_TABLES: &[(&str, &str)] = &[
    ("TABLE_NODES", r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            host TEXT,
            capacity_mb INTEGER NOT NULL DEFAULT 0,
            used_mb INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'provisioning',
            last_heartbeat_at INTEGER NOT NULL DEFAULT 0,
            agent_version TEXT,
            owner_user_id TEXT,
            label TEXT,
            node_secret_hash TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#),
    ("TABLE_NODE_TRANSITIONS", r#"
        CREATE TABLE IF NOT EXISTS node_transitions (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            reason TEXT NOT NULL,
            triggered_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_BOT_INSTANCES", r#"
        CREATE TABLE IF NOT EXISTS bot_instances (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            node_id TEXT,
            billing_state TEXT NOT NULL DEFAULT 'active',
            suspended_at TEXT,
            destroy_after TEXT,
            storage_tier TEXT NOT NULL DEFAULT 'standard',
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_BOT_PROFILES", r#"
        CREATE TABLE IF NOT EXISTS bot_profiles (
            bot_id TEXT PRIMARY KEY,
            image TEXT,
            env_json TEXT,
            release_channel TEXT,
            update_policy TEXT,
            discovery_json TEXT,
            updated_at TEXT NOT NULL
        );
    "#),
    ("TABLE_RECOVERY_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS recovery_events (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            trigger_source TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'in_progress',
            tenants_total INTEGER NOT NULL DEFAULT 0,
            tenants_recovered INTEGER NOT NULL DEFAULT 0,
            tenants_failed INTEGER NOT NULL DEFAULT 0,
            tenants_waiting INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            report_json TEXT
        );
    "#),
    ("TABLE_RECOVERY_ITEMS", r#"
        CREATE TABLE IF NOT EXISTS recovery_items (
            id TEXT PRIMARY KEY,
            recovery_event_id TEXT NOT NULL,
            tenant TEXT NOT NULL,
            source_node TEXT NOT NULL,
            target_node TEXT,
            backup_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'waiting',
            reason TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0
        );
    "#),
    ("TABLE_CREDIT_TRANSACTIONS", r#"
        CREATE TABLE IF NOT EXISTS credit_transactions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            balance_after_cents INTEGER NOT NULL,
            transaction_type TEXT NOT NULL,
            description TEXT,
            reference_id TEXT UNIQUE,
            funding_source TEXT,
            attributed_user_id TEXT,
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_CREDIT_BALANCES", r#"
        CREATE TABLE IF NOT EXISTS credit_balances (
            tenant_id TEXT PRIMARY KEY,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL
        );
    "#),
    ("TABLE_SNAPSHOTS", r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            tenant TEXT NOT NULL,
            instance_id TEXT NOT NULL,
            user_id TEXT,
            snapshot_type TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            config_hash TEXT,
            plugins_json TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT,
            deleted_at TEXT
        );
    "#),
    ("TABLE_REGISTRATION_TOKENS", r#"
        CREATE TABLE IF NOT EXISTS registration_tokens (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            label TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            used INTEGER NOT NULL DEFAULT 0,
            node_id TEXT,
            used_at TEXT
        );
    "#),
    ("TABLE_TENANT_STATUS", r#"
        CREATE TABLE IF NOT EXISTS tenant_status (
            tenant_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'active',
            grace_deadline TEXT,
            data_delete_after TEXT,
            updated_at TEXT NOT NULL,
            updated_by TEXT
        );
    "#),
    ("TABLE_SERVICE_HEALTH", r#"
        CREATE TABLE IF NOT EXISTS service_health (
            node_id TEXT NOT NULL,
            service TEXT NOT NULL,
            healthy INTEGER NOT NULL DEFAULT 0,
            checked_at TEXT NOT NULL,
            PRIMARY KEY(node_id, service)
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que las tablas existentes se adapten a las nuevas capacidades.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    // --- ESCALADA GPU Y DRENAJE ---
    ("NODE_DROPLET_ID", "ALTER TABLE nodes ADD COLUMN droplet_id TEXT"),
    ("NODE_DRAIN_STARTED", "ALTER TABLE nodes ADD COLUMN drain_started_at TEXT"),
    ("NODE_DRAIN_REASON", "ALTER TABLE nodes ADD COLUMN drain_reason TEXT"),

    // --- ESTIMACIÓN DE MEMORIA POR LATIDO ---
    ("BOT_LAST_MEMORY", "ALTER TABLE bot_instances ADD COLUMN last_memory_mb INTEGER"),

    // --- PRIORIDAD DE RECUPERACIÓN POR PLAN ---
    ("TENANT_PLAN_TIER", "ALTER TABLE tenant_status ADD COLUMN plan_tier TEXT DEFAULT 'free'"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración)
 * Optimiza los barridos del watchdog y la paginación del Ledger.
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_NODES_STATUS", "CREATE INDEX IF NOT EXISTS idx_nodes_status ON nodes(status);"),
    ("IDX_TRANSITIONS_NODE", "CREATE INDEX IF NOT EXISTS idx_transitions_node ON node_transitions(node_id, created_at);"),
    ("IDX_BOTS_NODE", "CREATE INDEX IF NOT EXISTS idx_bots_node ON bot_instances(node_id);"),
    ("IDX_BOTS_TENANT_STATE", "CREATE INDEX IF NOT EXISTS idx_bots_tenant_state ON bot_instances(tenant_id, billing_state);"),
    ("IDX_CREDITS_TENANT", "CREATE INDEX IF NOT EXISTS idx_credits_tenant ON credit_transactions(tenant_id, created_at);"),
    ("IDX_RECOVERY_ITEMS_EVENT", "CREATE INDEX IF NOT EXISTS idx_recovery_items_event ON recovery_items(recovery_event_id, status);"),
    ("IDX_TOKENS_USER", "CREATE INDEX IF NOT EXISTS idx_tokens_user ON registration_tokens(user_id, used);"),
    ("IDX_SNAPSHOTS_TENANT", "CREATE INDEX IF NOT EXISTS idx_snapshots_tenant ON snapshots(tenant, deleted_at);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace con el motor libSQL.
 */
pub async fn apply_control_plane_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V12.0...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Control plane ledger V12.0 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in TACTICAL_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => debug!("  🟢 [REPAIR_OK]: Applied evolutionary stratum {}", identifier),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!("  ⚪ [REPAIR_SKIP]: {} already level.", identifier);
                } else {
                    warn!("  ⚠️ [REPAIR_BYPASS]: {} check incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {}", identifier))?;
    }
    Ok(())
}
