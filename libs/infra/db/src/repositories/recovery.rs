// [libs/infra/db/src/repositories/recovery.rs]
/*!
 * =================================================================
 * APARATO: RECOVERY LEDGER REPOSITORY (V4.0 - INCIDENT STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE INCIDENTES E ITEMS POR INQUILINO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. INCIDENT AGGREGATES: Una fila de evento por nodo muerto; items
 *    append-only por inquilino con estado terminal o de espera.
 * 2. RETRY ACCOUNTING: Los contadores del evento se actualizan por
 *    adición en los reintentos; un item procesado jamás permanece
 *    en 'waiting'.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{parse_optional_timestamp, parse_timestamp};
use crate::ControlPlaneDatabase;
use aviary_domain_models::{
    RecoveryEvent, RecoveryEventStatus, RecoveryItem, RecoveryItemStatus, RecoveryTrigger,
};
use chrono::{DateTime, Utc};
use libsql::{params, Row};
use tracing::{info, instrument};
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, node_id, trigger_source, status, tenants_total, \
     tenants_recovered, tenants_failed, tenants_waiting, started_at, completed_at, report_json";

const ITEM_COLUMNS: &str = "id, recovery_event_id, tenant, source_node, target_node, \
     backup_key, status, reason, started_at, completed_at, retry_count";

pub struct RecoveryRepository {
    database_client: ControlPlaneDatabase,
}

impl RecoveryRepository {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    // --- ESTRATO DE EVENTOS ---

    #[instrument(skip(self))]
    pub async fn create_event(
        &self,
        node_identifier: &str,
        trigger: RecoveryTrigger,
        tenants_total: i64,
    ) -> Result<RecoveryEvent, DbError> {
        let connection = self.database_client.get_connection()?;
        let event_identifier = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO recovery_events (id, node_id, trigger_source, status, tenants_total, started_at)
                 VALUES (?1, ?2, ?3, 'in_progress', ?4, ?5)",
                params![
                    event_identifier.clone(),
                    node_identifier,
                    trigger.as_str(),
                    tenants_total,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        info!(
            "🚨 [RECOVERY_LEDGER]: Incident [{}] opened for node [{}] ({} tenants).",
            event_identifier, node_identifier, tenants_total
        );
        self.get_event(&event_identifier).await
    }

    pub async fn get_event(&self, event_identifier: &str) -> Result<RecoveryEvent, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM recovery_events WHERE id = ?1"),
                params![event_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => map_row_to_event(&data_row),
            None => Err(DbError::RecoveryEventNotFound(event_identifier.to_string())),
        }
    }

    /// Cierra el incidente con los contadores finales y el reporte sellado.
    #[instrument(skip(self, report_json))]
    pub async fn finalize_event(
        &self,
        event_identifier: &str,
        recovered: i64,
        failed: i64,
        waiting: i64,
        status: RecoveryEventStatus,
        report_json: &str,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE recovery_events SET tenants_recovered = ?2, tenants_failed = ?3, \
                 tenants_waiting = ?4, status = ?5, completed_at = ?6, report_json = ?7 WHERE id = ?1",
                params![
                    event_identifier,
                    recovered,
                    failed,
                    waiting,
                    status.as_str(),
                    Utc::now().to_rfc3339(),
                    report_json
                ],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::RecoveryEventNotFound(event_identifier.to_string()));
        }
        Ok(())
    }

    /**
     * Actualización por adición tras un reintento de esperas: los recién
     * recuperados/fallidos suman y las esperas restantes reemplazan el
     * contador. El estado colapsa a 'completed' cuando no quedan esperas.
     */
    #[instrument(skip(self))]
    pub async fn apply_retry_outcome(
        &self,
        event_identifier: &str,
        newly_recovered: i64,
        newly_failed: i64,
        still_waiting: i64,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let terminal_status = if still_waiting > 0 {
            RecoveryEventStatus::Partial
        } else {
            RecoveryEventStatus::Completed
        };

        let affected = connection
            .execute(
                "UPDATE recovery_events SET \
                     tenants_recovered = tenants_recovered + ?2, \
                     tenants_failed = tenants_failed + ?3, \
                     tenants_waiting = ?4, \
                     status = ?5, \
                     completed_at = ?6 \
                 WHERE id = ?1",
                params![
                    event_identifier,
                    newly_recovered,
                    newly_failed,
                    still_waiting,
                    terminal_status.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::RecoveryEventNotFound(event_identifier.to_string()));
        }
        Ok(())
    }

    /// Incidentes abiertos con inquilinos en espera (disparador de reintentos).
    pub async fn open_events_with_waiting(&self) -> Result<Vec<RecoveryEvent>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut open_events = Vec::new();

        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM recovery_events \
                     WHERE tenants_waiting > 0 AND status IN ('in_progress', 'partial') \
                     ORDER BY started_at ASC"
                ),
                (),
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            open_events.push(map_row_to_event(&data_row)?);
        }
        Ok(open_events)
    }

    // --- ESTRATO DE ITEMS ---

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, reason))]
    pub async fn insert_item(
        &self,
        event_identifier: &str,
        tenant: &str,
        source_node: &str,
        target_node: Option<&str>,
        backup_key: &str,
        status: RecoveryItemStatus,
        reason: Option<&str>,
        completed: bool,
    ) -> Result<RecoveryItem, DbError> {
        let connection = self.database_client.get_connection()?;
        let item_identifier = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        connection
            .execute(
                "INSERT INTO recovery_items (id, recovery_event_id, tenant, source_node, target_node, backup_key, status, reason, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    item_identifier.clone(),
                    event_identifier,
                    tenant,
                    source_node,
                    target_node.map(|t| t.to_string()),
                    backup_key,
                    status.as_str(),
                    reason.map(|r| r.to_string()),
                    now.clone(),
                    if completed { Some(now) } else { None }
                ],
            )
            .await?;

        self.get_item(&item_identifier).await
    }

    pub async fn get_item(&self, item_identifier: &str) -> Result<RecoveryItem, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM recovery_items WHERE id = ?1"),
                params![item_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => map_row_to_item(&data_row),
            None => Err(DbError::MappingError(format!("RECOVERY_ITEM_VOID: {}", item_identifier))),
        }
    }

    pub async fn list_waiting_items(&self, event_identifier: &str) -> Result<Vec<RecoveryItem>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut waiting_items = Vec::new();

        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM recovery_items \
                     WHERE recovery_event_id = ?1 AND status = 'waiting' ORDER BY started_at ASC"
                ),
                params![event_identifier],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            waiting_items.push(map_row_to_item(&data_row)?);
        }
        Ok(waiting_items)
    }

    /// Items en espera que superaron la ventana de reintento (toda la flota).
    pub async fn list_expired_waiting_items(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RecoveryItem>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut expired_items = Vec::new();

        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM recovery_items \
                     WHERE status = 'waiting' AND started_at <= ?1 ORDER BY started_at ASC"
                ),
                params![cutoff.to_rfc3339()],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            expired_items.push(map_row_to_item(&data_row)?);
        }
        Ok(expired_items)
    }

    /// Incrementa el contador de reintentos de un item que permanece en
    /// espera (sin capacidad nuevamente).
    pub async fn increment_item_retry(&self, item_identifier: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE recovery_items SET retry_count = retry_count + 1 WHERE id = ?1",
                params![item_identifier],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::MappingError(format!("RECOVERY_ITEM_VOID: {}", item_identifier)));
        }
        Ok(())
    }

    /**
     * Sella el desenlace de un item formerly-waiting: estado terminal,
     * destino, razón, 'completed_at' y contador de reintentos incrementado.
     */
    #[instrument(skip(self, reason))]
    pub async fn mark_item_outcome(
        &self,
        item_identifier: &str,
        status: RecoveryItemStatus,
        target_node: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE recovery_items SET status = ?2, target_node = ?3, reason = ?4, \
                 completed_at = ?5, retry_count = retry_count + 1 WHERE id = ?1",
                params![
                    item_identifier,
                    status.as_str(),
                    target_node.map(|t| t.to_string()),
                    reason.map(|r| r.to_string()),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::MappingError(format!("RECOVERY_ITEM_VOID: {}", item_identifier)));
        }
        Ok(())
    }
}

fn map_row_to_event(data_row: &Row) -> Result<RecoveryEvent, DbError> {
    let raw_trigger: String = data_row.get(2)?;
    let raw_status: String = data_row.get(3)?;

    Ok(RecoveryEvent {
        id: data_row.get(0)?,
        node_id: data_row.get(1)?,
        trigger: RecoveryTrigger::parse(&raw_trigger)
            .ok_or_else(|| DbError::MappingError(format!("TRIGGER_DRIFT: {}", raw_trigger)))?,
        status: RecoveryEventStatus::parse(&raw_status)
            .ok_or_else(|| DbError::MappingError(format!("EVENT_STATUS_DRIFT: {}", raw_status)))?,
        tenants_total: data_row.get(4)?,
        tenants_recovered: data_row.get(5)?,
        tenants_failed: data_row.get(6)?,
        tenants_waiting: data_row.get(7)?,
        started_at: parse_timestamp(&data_row.get::<String>(8)?)?,
        completed_at: parse_optional_timestamp(data_row.get::<String>(9).ok())?,
        report_json: data_row.get::<String>(10).ok(),
    })
}

fn map_row_to_item(data_row: &Row) -> Result<RecoveryItem, DbError> {
    let raw_status: String = data_row.get(6)?;

    Ok(RecoveryItem {
        id: data_row.get(0)?,
        recovery_event_id: data_row.get(1)?,
        tenant: data_row.get(2)?,
        source_node: data_row.get(3)?,
        target_node: data_row.get::<String>(4).ok(),
        backup_key: data_row.get(5)?,
        status: RecoveryItemStatus::parse(&raw_status)
            .ok_or_else(|| DbError::MappingError(format!("ITEM_STATUS_DRIFT: {}", raw_status)))?,
        reason: data_row.get::<String>(7).ok(),
        started_at: parse_timestamp(&data_row.get::<String>(8)?)?,
        completed_at: parse_optional_timestamp(data_row.get::<String>(9).ok())?,
        retry_count: data_row.get(10)?,
    })
}
