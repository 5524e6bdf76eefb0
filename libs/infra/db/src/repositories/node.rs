// [libs/infra/db/src/repositories/node.rs]
/*!
 * =================================================================
 * APARATO: FLEET NODE REPOSITORY (V6.0 - CAS GUARDED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE NODOS Y PROTOCOLO DE TRANSICIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE WRITE PATH: 'transition' es la única ruta legal para mutar
 *    'nodes.status'. Valida la arista en el dominio L2, ejecuta el
 *    compare-and-swap y sella el rastro de auditoría en una sola
 *    transacción ACID.
 * 2. RACE AWARENESS: Cero filas afectadas en el CAS se cataloga como
 *    'ConcurrentTransition', un fallo recuperable que el llamador
 *    reintenta a lo sumo una vez.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 *
 * # Mathematical Proof (Transition Linearization):
 * El predicado 'WHERE id = ?1 AND status = ?2' garantiza que dos
 * transiciones concurrentes contra el mismo estado previo no puedan
 * ambas tener éxito: el motor serializa los escritores y exactamente
 * uno observa el estado esperado.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{parse_optional_timestamp, parse_timestamp};
use crate::ControlPlaneDatabase;
use aviary_domain_lifecycle::{ensure_valid_transition, select_placement, PlacementCandidate, PlacementDecision};
use aviary_domain_models::{Node, NodeStatus, NodeTransition};
use chrono::Utc;
use libsql::{params, Row};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const NODE_COLUMNS: &str = "id, host, capacity_mb, used_mb, status, last_heartbeat_at, \
     agent_version, owner_user_id, label, node_secret_hash, droplet_id, \
     drain_started_at, drain_reason, created_at, updated_at";

/// Repositorio de autoridad única sobre la tabla de la flota.
pub struct NodeRepository {
    database_client: ControlPlaneDatabase,
}

impl NodeRepository {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    // --- ESTRATO DE REGISTRO ---

    /// Inserta un nodo recién registrado en estado 'provisioning'.
    #[instrument(skip(self))]
    pub async fn insert_provisioning(
        &self,
        node_identifier: &str,
        host: Option<&str>,
        capacity_mb: i64,
        agent_version: Option<&str>,
    ) -> Result<Node, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now().to_rfc3339();

        connection
            .execute(
                "INSERT INTO nodes (id, host, capacity_mb, used_mb, status, last_heartbeat_at, agent_version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, 'provisioning', ?4, ?5, ?6, ?6)",
                params![
                    node_identifier,
                    host.map(|h| h.to_string()),
                    capacity_mb,
                    Utc::now().timestamp(),
                    agent_version.map(|v| v.to_string()),
                    now
                ],
            )
            .await?;

        info!("🐣 [FLEET_REGISTRY]: Node [{}] solidified in provisioning strata.", node_identifier);
        self.get(node_identifier).await
    }

    /// Inserta un nodo self-hosted con propietario, etiqueta y huella del secreto.
    #[instrument(skip(self, node_secret_hash))]
    pub async fn insert_self_hosted(
        &self,
        node_identifier: &str,
        host: Option<&str>,
        capacity_mb: i64,
        agent_version: Option<&str>,
        owner_user_id: &str,
        label: Option<&str>,
        node_secret_hash: &str,
    ) -> Result<Node, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now().to_rfc3339();

        connection
            .execute(
                "INSERT INTO nodes (id, host, capacity_mb, used_mb, status, last_heartbeat_at, agent_version, owner_user_id, label, node_secret_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, 'provisioning', ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    node_identifier,
                    host.map(|h| h.to_string()),
                    capacity_mb,
                    Utc::now().timestamp(),
                    agent_version.map(|v| v.to_string()),
                    owner_user_id,
                    label.map(|l| l.to_string()),
                    node_secret_hash,
                    now
                ],
            )
            .await?;

        self.get(node_identifier).await
    }

    /// Actualiza metadatos de re-registro sin tocar el estado.
    #[instrument(skip(self))]
    pub async fn update_registration_metadata(
        &self,
        node_identifier: &str,
        host: Option<&str>,
        capacity_mb: i64,
        agent_version: Option<&str>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        let affected = connection
            .execute(
                "UPDATE nodes SET host = ?2, capacity_mb = ?3, agent_version = ?4, updated_at = ?5 WHERE id = ?1",
                params![
                    node_identifier,
                    host.map(|h| h.to_string()),
                    capacity_mb,
                    agent_version.map(|v| v.to_string()),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NodeNotFound(node_identifier.to_string()));
        }
        Ok(())
    }

    /// Fija la huella SHA-256 del secreto del nodo (nunca el texto claro).
    pub async fn set_secret_hash(&self, node_identifier: &str, secret_hash_hex: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE nodes SET node_secret_hash = ?2, updated_at = ?3 WHERE id = ?1",
                params![node_identifier, secret_hash_hex, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NodeNotFound(node_identifier.to_string()));
        }
        Ok(())
    }

    /// Fija el identificador de instancia del proveedor (escalada GPU).
    pub async fn set_droplet_id(&self, node_identifier: &str, droplet_identifier: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE nodes SET droplet_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![node_identifier, droplet_identifier, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NodeNotFound(node_identifier.to_string()));
        }
        Ok(())
    }

    // --- ESTRATO DE LECTURA ---

    pub async fn get(&self, node_identifier: &str) -> Result<Node, DbError> {
        self.try_get(node_identifier)
            .await?
            .ok_or_else(|| DbError::NodeNotFound(node_identifier.to_string()))
    }

    pub async fn try_get(&self, node_identifier: &str) -> Result<Option<Node>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![node_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_node(&data_row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_status(&self, statuses: &[NodeStatus]) -> Result<Vec<Node>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut fleet_inventory = Vec::new();

        // El catálogo de estados es cerrado; la interpolación es segura.
        let status_predicate = statuses
            .iter()
            .map(|status| format!("'{}'", status.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut query_results = connection
            .query(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE status IN ({status_predicate}) ORDER BY id"),
                (),
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            fleet_inventory.push(map_row_to_node(&data_row)?);
        }
        Ok(fleet_inventory)
    }

    /// Nodos monitoreados cuyo silencio supera el umbral de muerte.
    pub async fn stale_monitored_nodes(&self, silence_threshold_seconds: i64) -> Result<Vec<Node>, DbError> {
        let connection = self.database_client.get_connection()?;
        let expiration_boundary = Utc::now().timestamp() - silence_threshold_seconds;
        let mut silent_nodes = Vec::new();

        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {NODE_COLUMNS} FROM nodes \
                     WHERE status IN ('active', 'degraded', 'draining') AND last_heartbeat_at <= ?1 \
                     ORDER BY last_heartbeat_at ASC"
                ),
                params![expiration_boundary],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            silent_nodes.push(map_row_to_node(&data_row)?);
        }
        Ok(silent_nodes)
    }

    // --- ESTRATO DE LATIDOS ---

    /// Registra un latido: memoria agregada de contenedores y marca monótona.
    pub async fn update_heartbeat(&self, node_identifier: &str, used_mb: i64) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        let affected = connection
            .execute(
                "UPDATE nodes SET used_mb = ?2, last_heartbeat_at = ?3, updated_at = ?4 WHERE id = ?1",
                params![node_identifier, used_mb, Utc::now().timestamp(), Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            warn!("⚠️ [HEARTBEAT_REJECTED]: Node [{}] is void or unregistered.", node_identifier);
            return Err(DbError::NodeNotFound(node_identifier.to_string()));
        }

        debug!("🫀 [PACEMAKER]: Node {} vitality refreshed ({} MB in use).", node_identifier, used_mb);
        Ok(())
    }

    // --- ESTRATO DE TRANSICIÓN (ÚNICA RUTA LEGAL) ---

    /**
     * Protocolo de transición auditada con guardia optimista.
     *
     * 1. Lee el nodo; 'NodeNotFound' si está ausente.
     * 2. Valida la arista contra el grafo cerrado del dominio L2.
     * 3. En una sola transacción: CAS sobre 'status' (cero filas afectadas
     *    implica 'ConcurrentTransition') e inserción del rastro inmutable.
     * 4. Retorna el snapshot fresco del nodo.
     *
     * La arista 'draining -> active' limpia los campos de drenaje.
     */
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        node_identifier: &str,
        to_status: NodeStatus,
        reason: &str,
        triggered_by: &str,
    ) -> Result<Node, DbError> {
        let current_snapshot = self.get(node_identifier).await?;
        ensure_valid_transition(current_snapshot.status, to_status)?;

        let connection = self.database_client.get_connection()?;
        let atomic_transition = connection.transaction().await.map_err(|_| DbError::TransactionError)?;
        let now = Utc::now().to_rfc3339();

        // Compare-and-swap: el estado previo leído debe seguir vigente.
        let cas_sql = if current_snapshot.status == NodeStatus::Draining && to_status == NodeStatus::Active {
            "UPDATE nodes SET status = ?2, updated_at = ?3, drain_started_at = NULL, drain_reason = NULL \
             WHERE id = ?1 AND status = ?4"
        } else {
            "UPDATE nodes SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4"
        };

        let affected = atomic_transition
            .execute(
                cas_sql,
                params![
                    node_identifier,
                    to_status.as_str(),
                    now.clone(),
                    current_snapshot.status.as_str()
                ],
            )
            .await?;

        if affected == 0 {
            // Otro escritor movió el estado entre la lectura y el CAS.
            warn!(
                "⚔️ [CAS_LOST]: Node [{}] moved away from '{}' concurrently.",
                node_identifier,
                current_snapshot.status.as_str()
            );
            return Err(DbError::ConcurrentTransition {
                node_id: node_identifier.to_string(),
            });
        }

        atomic_transition
            .execute(
                "INSERT INTO node_transitions (id, node_id, from_status, to_status, reason, triggered_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    node_identifier,
                    current_snapshot.status.as_str(),
                    to_status.as_str(),
                    reason,
                    triggered_by,
                    now
                ],
            )
            .await?;

        atomic_transition.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "🔄 [FLEET_SHIFT]: Node [{}] {} -> {} ({})",
            node_identifier,
            current_snapshot.status.as_str(),
            to_status.as_str(),
            reason
        );

        self.get(node_identifier).await
    }

    /// Fija los campos de bitácora del drenaje en curso.
    pub async fn mark_drain_started(&self, node_identifier: &str, reason: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE nodes SET drain_started_at = ?2, drain_reason = ?3 WHERE id = ?1",
                params![node_identifier, Utc::now().to_rfc3339(), reason],
            )
            .await?;
        Ok(())
    }

    /// Rastro de auditoría de un nodo, en orden de inserción.
    pub async fn list_transitions(&self, node_identifier: &str) -> Result<Vec<NodeTransition>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut audit_trail = Vec::new();

        let mut query_results = connection
            .query(
                "SELECT id, node_id, from_status, to_status, reason, triggered_by, created_at \
                 FROM node_transitions WHERE node_id = ?1 ORDER BY created_at ASC, rowid ASC",
                params![node_identifier],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            audit_trail.push(map_row_to_transition(&data_row)?);
        }
        Ok(audit_trail)
    }

    // --- ESTRATO DE COLOCACIÓN ---

    /// Selector de empaquetado: delega en la regla pura del dominio sobre
    /// los candidatos 'active' vigentes, garantizando semántica idéntica
    /// entre el motor y la regla testeable.
    #[instrument(skip(self))]
    pub async fn find_placement(
        &self,
        required_mb: i64,
        exclude_node_ids: &[&str],
    ) -> Result<Option<PlacementDecision>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut candidates = Vec::new();

        let mut query_results = connection
            .query(
                "SELECT id, host, status, capacity_mb, used_mb FROM nodes WHERE status = 'active' ORDER BY id",
                (),
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            let raw_status: String = data_row.get(2)?;
            let status = NodeStatus::parse(&raw_status)
                .ok_or_else(|| DbError::MappingError(format!("STATUS_DRIFT: {}", raw_status)))?;

            candidates.push(PlacementCandidate {
                node_id: data_row.get(0)?,
                host: data_row.get::<String>(1).ok(),
                status,
                capacity_mb: data_row.get(3)?,
                used_mb: data_row.get(4)?,
            });
        }

        Ok(select_placement(&candidates, required_mb, exclude_node_ids))
    }

    /// Reserva (o libera, con delta negativo) capacidad tras una colocación.
    pub async fn reserve_capacity(&self, node_identifier: &str, delta_mb: i64) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE nodes SET used_mb = MAX(0, used_mb + ?2), updated_at = ?3 WHERE id = ?1",
                params![node_identifier, delta_mb, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NodeNotFound(node_identifier.to_string()));
        }
        Ok(())
    }

    // --- ESTRATO DE SALUD DE SERVICIOS (WATCHDOG DE INFERENCIA) ---

    /// Registro persistente del sondeo de salud por servicio.
    pub async fn record_service_health(
        &self,
        node_identifier: &str,
        service: &str,
        healthy: bool,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO service_health (node_id, service, healthy, checked_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(node_id, service) DO UPDATE SET healthy = excluded.healthy, checked_at = excluded.checked_at",
                params![node_identifier, service, if healthy { 1 } else { 0 }, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    /// Eliminación explícita; separada de toda transición de estado.
    pub async fn delete(&self, node_identifier: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute("DELETE FROM nodes WHERE id = ?1", params![node_identifier])
            .await?;

        if affected == 0 {
            return Err(DbError::NodeNotFound(node_identifier.to_string()));
        }
        Ok(())
    }
}

fn map_row_to_node(data_row: &Row) -> Result<Node, DbError> {
    let raw_status: String = data_row.get(4)?;
    let status = NodeStatus::parse(&raw_status)
        .ok_or_else(|| DbError::MappingError(format!("STATUS_DRIFT: {}", raw_status)))?;

    Ok(Node {
        id: data_row.get(0)?,
        host: data_row.get::<String>(1).ok(),
        capacity_mb: data_row.get(2)?,
        used_mb: data_row.get(3)?,
        status,
        last_heartbeat_at: data_row.get(5)?,
        agent_version: data_row.get::<String>(6).ok(),
        owner_user_id: data_row.get::<String>(7).ok(),
        label: data_row.get::<String>(8).ok(),
        node_secret_hash: data_row.get::<String>(9).ok(),
        droplet_id: data_row.get::<String>(10).ok(),
        drain_started_at: parse_optional_timestamp(data_row.get::<String>(11).ok())?,
        drain_reason: data_row.get::<String>(12).ok(),
        created_at: parse_timestamp(&data_row.get::<String>(13)?)?,
        updated_at: parse_timestamp(&data_row.get::<String>(14)?)?,
    })
}

fn map_row_to_transition(data_row: &Row) -> Result<NodeTransition, DbError> {
    let raw_from: String = data_row.get(2)?;
    let raw_to: String = data_row.get(3)?;

    Ok(NodeTransition {
        id: data_row.get(0)?,
        node_id: data_row.get(1)?,
        from_status: NodeStatus::parse(&raw_from)
            .ok_or_else(|| DbError::MappingError(format!("STATUS_DRIFT: {}", raw_from)))?,
        to_status: NodeStatus::parse(&raw_to)
            .ok_or_else(|| DbError::MappingError(format!("STATUS_DRIFT: {}", raw_to)))?,
        reason: data_row.get(4)?,
        triggered_by: data_row.get(5)?,
        created_at: parse_timestamp(&data_row.get::<String>(6)?)?,
    })
}
