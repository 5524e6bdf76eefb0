// [libs/infra/db/src/repositories/bot.rs]
/*!
 * =================================================================
 * APARATO: BOT INSTANCE REPOSITORY (V5.0 - BILLING AWARE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: ASIGNACIONES DE CARGAS Y PERSISTENCIA DE LA PUERTA
 *                  DE FACTURACIÓN (SUSPEND / REACTIVATE / DESTROY)
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TERMINAL DISCIPLINE: Una fila 'destroyed' es terminal; ninguna
 *    operación de la puerta la revive.
 * 2. TIER-SORTED ASSIGNMENTS: La lista de inquilinos de un nodo muerto
 *    sale pre-ordenada por prioridad de plan (enterprise > pro >
 *    starter > free); el orquestador de recuperación procesa en orden
 *    de recepción y permanece agnóstico a los planes.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{parse_optional_timestamp, parse_timestamp};
use crate::ControlPlaneDatabase;
use aviary_domain_lifecycle::DEFAULT_REQUIRED_MB;
use aviary_domain_models::{BillingState, BotInstance, StorageTier, TenantAssignment};
use chrono::{DateTime, Utc};
use libsql::{params, Row};
use tracing::{debug, info, instrument};

const BOT_COLUMNS: &str = "id, tenant_id, name, node_id, billing_state, suspended_at, \
     destroy_after, storage_tier, created_at";

pub struct BotRepository {
    database_client: ControlPlaneDatabase,
}

impl BotRepository {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    // --- ESTRATO DE REGISTRO Y ASIGNACIÓN ---

    pub async fn register_bot(
        &self,
        bot_identifier: &str,
        tenant_identifier: &str,
        container_name: &str,
    ) -> Result<BotInstance, DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "INSERT INTO bot_instances (id, tenant_id, name, billing_state, storage_tier, created_at)
                 VALUES (?1, ?2, ?3, 'active', 'standard', ?4)",
                params![bot_identifier, tenant_identifier, container_name, Utc::now().to_rfc3339()],
            )
            .await?;

        info!("🤖 [WORKLOAD_REGISTRY]: Bot [{}] registered for tenant [{}].", bot_identifier, tenant_identifier);
        self.get(bot_identifier).await
    }

    pub async fn get(&self, bot_identifier: &str) -> Result<BotInstance, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                &format!("SELECT {BOT_COLUMNS} FROM bot_instances WHERE id = ?1"),
                params![bot_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => map_row_to_bot(&data_row),
            None => Err(DbError::BotNotFound(bot_identifier.to_string())),
        }
    }

    /// Cargas no destruidas actualmente alojadas en el nodo.
    pub async fn list_by_node(&self, node_identifier: &str) -> Result<Vec<BotInstance>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut workloads = Vec::new();

        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {BOT_COLUMNS} FROM bot_instances \
                     WHERE node_id = ?1 AND billing_state != 'destroyed' ORDER BY created_at ASC"
                ),
                params![node_identifier],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            workloads.push(map_row_to_bot(&data_row)?);
        }
        Ok(workloads)
    }

    /**
     * Inquilinos asignados a un nodo, pre-ordenados por prioridad de plan.
     * La memoria estimada proviene del último latido; sin telemetría se
     * asume la reserva por defecto del selector de colocación.
     */
    #[instrument(skip(self))]
    pub async fn list_assigned_tenants(&self, node_identifier: &str) -> Result<Vec<TenantAssignment>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut assignments = Vec::new();

        let mut query_results = connection
            .query(
                "SELECT b.id, b.tenant_id, b.name, COALESCE(b.last_memory_mb, ?2) \
                 FROM bot_instances b \
                 LEFT JOIN tenant_status t ON t.tenant_id = b.tenant_id \
                 WHERE b.node_id = ?1 AND b.billing_state != 'destroyed' \
                 ORDER BY CASE COALESCE(t.plan_tier, 'free') \
                     WHEN 'enterprise' THEN 0 \
                     WHEN 'pro' THEN 1 \
                     WHEN 'starter' THEN 2 \
                     ELSE 3 END ASC, b.created_at ASC",
                params![node_identifier, DEFAULT_REQUIRED_MB],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            assignments.push(TenantAssignment {
                bot_id: data_row.get(0)?,
                tenant_id: data_row.get(1)?,
                container_name: data_row.get(2)?,
                estimated_mb: data_row.get(3)?,
            });
        }
        Ok(assignments)
    }

    /// Re-asigna la carga a un nodo superviviente tras una migración o rescate.
    pub async fn reassign(&self, bot_identifier: &str, target_node_identifier: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE bot_instances SET node_id = ?2 WHERE id = ?1",
                params![bot_identifier, target_node_identifier],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::BotNotFound(bot_identifier.to_string()));
        }
        Ok(())
    }

    /// Actualiza la memoria observada de un contenedor desde el latido.
    pub async fn update_container_memory(
        &self,
        node_identifier: &str,
        container_name: &str,
        memory_mb: i64,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE bot_instances SET last_memory_mb = ?3 WHERE node_id = ?1 AND name = ?2",
                params![node_identifier, container_name, memory_mb],
            )
            .await?;
        Ok(())
    }

    // --- ESTRATO DE LA PUERTA DE FACTURACIÓN ---

    /**
     * Suspende toda carga activa del inquilino. Retorna los IDs tocados.
     * Fija 'destroy_after = now + gracia' para el cron de destrucción.
     */
    #[instrument(skip(self))]
    pub async fn suspend_all_for_tenant(
        &self,
        tenant_identifier: &str,
        destroy_after: DateTime<Utc>,
    ) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let atomic_suspension = connection.transaction().await.map_err(|_| DbError::TransactionError)?;

        let mut suspended_identifiers = Vec::new();
        let mut query_results = atomic_suspension
            .query(
                "SELECT id FROM bot_instances WHERE tenant_id = ?1 AND billing_state = 'active'",
                params![tenant_identifier],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            suspended_identifiers.push(data_row.get::<String>(0)?);
        }

        if suspended_identifiers.is_empty() {
            atomic_suspension.commit().await.map_err(|_| DbError::TransactionError)?;
            return Ok(suspended_identifiers);
        }

        atomic_suspension
            .execute(
                "UPDATE bot_instances SET billing_state = 'suspended', suspended_at = ?2, destroy_after = ?3 \
                 WHERE tenant_id = ?1 AND billing_state = 'active'",
                params![tenant_identifier, Utc::now().to_rfc3339(), destroy_after.to_rfc3339()],
            )
            .await?;

        atomic_suspension.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "⛔ [BILLING_GATE]: {} workloads suspended for tenant [{}].",
            suspended_identifiers.len(),
            tenant_identifier
        );
        Ok(suspended_identifiers)
    }

    /// Revierte toda suspensión del inquilino. Retorna los IDs reactivados.
    #[instrument(skip(self))]
    pub async fn reactivate_all_for_tenant(&self, tenant_identifier: &str) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let atomic_reactivation = connection.transaction().await.map_err(|_| DbError::TransactionError)?;

        let mut reactivated_identifiers = Vec::new();
        let mut query_results = atomic_reactivation
            .query(
                "SELECT id FROM bot_instances WHERE tenant_id = ?1 AND billing_state = 'suspended'",
                params![tenant_identifier],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            reactivated_identifiers.push(data_row.get::<String>(0)?);
        }

        if reactivated_identifiers.is_empty() {
            atomic_reactivation.commit().await.map_err(|_| DbError::TransactionError)?;
            return Ok(reactivated_identifiers);
        }

        atomic_reactivation
            .execute(
                "UPDATE bot_instances SET billing_state = 'active', suspended_at = NULL, destroy_after = NULL \
                 WHERE tenant_id = ?1 AND billing_state = 'suspended'",
                params![tenant_identifier],
            )
            .await?;

        atomic_reactivation.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "✅ [BILLING_GATE]: {} workloads reactivated for tenant [{}].",
            reactivated_identifiers.len(),
            tenant_identifier
        );
        Ok(reactivated_identifiers)
    }

    /// Reactivación puntual de una carga suspendida.
    pub async fn reactivate_bot(&self, bot_identifier: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE bot_instances SET billing_state = 'active', suspended_at = NULL, destroy_after = NULL \
                 WHERE id = ?1 AND billing_state = 'suspended'",
                params![bot_identifier],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::BotNotFound(bot_identifier.to_string()));
        }
        Ok(())
    }

    /// Marca terminal de una carga. 'destroyed' jamás regresa.
    pub async fn destroy_bot(&self, bot_identifier: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE bot_instances SET billing_state = 'destroyed' \
                 WHERE id = ?1 AND billing_state != 'destroyed'",
                params![bot_identifier],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::BotNotFound(bot_identifier.to_string()));
        }
        Ok(())
    }

    /**
     * Selecciona y marca como destruidas las suspensiones expiradas.
     * Retorna los IDs para que el colaborador de teardown desmonte los
     * contenedores fuera de este estrato.
     */
    #[instrument(skip(self))]
    pub async fn destroy_expired_suspended(&self, now: DateTime<Utc>) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let atomic_destruction = connection.transaction().await.map_err(|_| DbError::TransactionError)?;

        let mut expired_identifiers = Vec::new();
        let mut query_results = atomic_destruction
            .query(
                "SELECT id FROM bot_instances \
                 WHERE billing_state = 'suspended' AND destroy_after IS NOT NULL AND destroy_after <= ?1",
                params![now.to_rfc3339()],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            expired_identifiers.push(data_row.get::<String>(0)?);
        }

        if !expired_identifiers.is_empty() {
            atomic_destruction
                .execute(
                    "UPDATE bot_instances SET billing_state = 'destroyed' \
                     WHERE billing_state = 'suspended' AND destroy_after IS NOT NULL AND destroy_after <= ?1",
                    params![now.to_rfc3339()],
                )
                .await?;
        }

        atomic_destruction.commit().await.map_err(|_| DbError::TransactionError)?;

        if !expired_identifiers.is_empty() {
            debug!("💀 [BILLING_GATE]: {} expired workloads marked destroyed.", expired_identifiers.len());
        }
        Ok(expired_identifiers)
    }

    pub async fn get_active_bot_count(&self, tenant_identifier: &str) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                "SELECT COUNT(*) FROM bot_instances WHERE tenant_id = ?1 AND billing_state = 'active'",
                params![tenant_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Ok(0),
        }
    }

    // --- ESTRATO DE NIVELES DE ALMACENAMIENTO ---

    pub async fn get_storage_tier(&self, bot_identifier: &str) -> Result<StorageTier, DbError> {
        Ok(self.get(bot_identifier).await?.storage_tier)
    }

    pub async fn set_storage_tier(&self, bot_identifier: &str, tier: StorageTier) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE bot_instances SET storage_tier = ?2 WHERE id = ?1",
                params![bot_identifier, tier.as_str()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::BotNotFound(bot_identifier.to_string()));
        }
        Ok(())
    }

    /// Niveles de almacenamiento de las cargas no destruidas del inquilino,
    /// insumo del cron diario de runtime.
    pub async fn storage_tiers_for_tenant(
        &self,
        tenant_identifier: &str,
    ) -> Result<Vec<(String, StorageTier)>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut tier_inventory = Vec::new();

        let mut query_results = connection
            .query(
                "SELECT id, storage_tier FROM bot_instances \
                 WHERE tenant_id = ?1 AND billing_state != 'destroyed'",
                params![tenant_identifier],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            let raw_tier: String = data_row.get(1)?;
            let tier = StorageTier::parse(&raw_tier)
                .ok_or_else(|| DbError::MappingError(format!("TIER_DRIFT: {}", raw_tier)))?;
            tier_inventory.push((data_row.get::<String>(0)?, tier));
        }
        Ok(tier_inventory)
    }

    /// Inquilinos con al menos una carga suspendida (sonda de reactivación).
    pub async fn tenants_with_suspended_bots(&self) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut tenants = Vec::new();

        let mut query_results = connection
            .query(
                "SELECT DISTINCT tenant_id FROM bot_instances WHERE billing_state = 'suspended' ORDER BY tenant_id",
                (),
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            tenants.push(data_row.get::<String>(0)?);
        }
        Ok(tenants)
    }

    /// Inquilinos con al menos una carga activa (barrido del cron diario).
    pub async fn tenants_with_active_bots(&self) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut tenants = Vec::new();

        let mut query_results = connection
            .query(
                "SELECT DISTINCT tenant_id FROM bot_instances WHERE billing_state = 'active' ORDER BY tenant_id",
                (),
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            tenants.push(data_row.get::<String>(0)?);
        }
        Ok(tenants)
    }
}

fn map_row_to_bot(data_row: &Row) -> Result<BotInstance, DbError> {
    let raw_state: String = data_row.get(4)?;
    let billing_state = BillingState::parse(&raw_state)
        .ok_or_else(|| DbError::MappingError(format!("BILLING_STATE_DRIFT: {}", raw_state)))?;

    let raw_tier: String = data_row.get(7)?;
    let storage_tier = StorageTier::parse(&raw_tier)
        .ok_or_else(|| DbError::MappingError(format!("TIER_DRIFT: {}", raw_tier)))?;

    Ok(BotInstance {
        id: data_row.get(0)?,
        tenant_id: data_row.get(1)?,
        name: data_row.get(2)?,
        node_id: data_row.get::<String>(3).ok(),
        billing_state,
        suspended_at: parse_optional_timestamp(data_row.get::<String>(5).ok())?,
        destroy_after: parse_optional_timestamp(data_row.get::<String>(6).ok())?,
        storage_tier,
        created_at: parse_timestamp(&data_row.get::<String>(8)?)?,
    })
}
