// [libs/infra/db/src/repositories/snapshot.rs]

use crate::errors::DbError;
use crate::repositories::{parse_optional_timestamp, parse_timestamp};
use crate::ControlPlaneDatabase;
use aviary_domain_models::{Snapshot, SnapshotType};
use chrono::{DateTime, Utc};
use libsql::{params, Row};
use tracing::instrument;
use uuid::Uuid;

const SNAPSHOT_COLUMNS: &str = "id, tenant, instance_id, user_id, snapshot_type, storage_path, \
     size_bytes, config_hash, plugins_json, created_at, expires_at, deleted_at";

/// Catálogo de snapshots con borrado suave. El I/O de tarballs es un
/// colaborador externo; aquí vive solamente el registro.
pub struct SnapshotRepository {
    database_client: ControlPlaneDatabase,
}

impl SnapshotRepository {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, config_hash, plugins_json))]
    pub async fn record(
        &self,
        tenant: &str,
        instance_identifier: &str,
        user_identifier: Option<&str>,
        snapshot_type: SnapshotType,
        storage_path: &str,
        size_bytes: i64,
        config_hash: Option<&str>,
        plugins_json: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Snapshot, DbError> {
        let connection = self.database_client.get_connection()?;
        let snapshot_identifier = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO snapshots (id, tenant, instance_id, user_id, snapshot_type, storage_path, size_bytes, config_hash, plugins_json, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    snapshot_identifier.clone(),
                    tenant,
                    instance_identifier,
                    user_identifier.map(|u| u.to_string()),
                    snapshot_type.as_str(),
                    storage_path,
                    size_bytes,
                    config_hash.map(|c| c.to_string()),
                    plugins_json.map(|p| p.to_string()),
                    Utc::now().to_rfc3339(),
                    expires_at.map(|e| e.to_rfc3339())
                ],
            )
            .await?;

        self.get(&snapshot_identifier).await
    }

    pub async fn get(&self, snapshot_identifier: &str) -> Result<Snapshot, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1"),
                params![snapshot_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => map_row_to_snapshot(&data_row),
            None => Err(DbError::MappingError(format!("SNAPSHOT_VOID: {}", snapshot_identifier))),
        }
    }

    /// Listado del inquilino; las filas con borrado suave quedan ocultas.
    pub async fn list_for_tenant(&self, tenant: &str) -> Result<Vec<Snapshot>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut catalog = Vec::new();

        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
                     WHERE tenant = ?1 AND deleted_at IS NULL ORDER BY created_at DESC"
                ),
                params![tenant],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            catalog.push(map_row_to_snapshot(&data_row)?);
        }
        Ok(catalog)
    }

    pub async fn count_for_tenant(&self, tenant: &str) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                "SELECT COUNT(*) FROM snapshots WHERE tenant = ?1 AND deleted_at IS NULL",
                params![tenant],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Ok(0),
        }
    }

    /// Borrado suave: fija 'deleted_at' y preserva el registro.
    pub async fn soft_delete(&self, snapshot_identifier: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE snapshots SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![snapshot_identifier, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::MappingError(format!("SNAPSHOT_VOID: {}", snapshot_identifier)));
        }
        Ok(())
    }
}

fn map_row_to_snapshot(data_row: &Row) -> Result<Snapshot, DbError> {
    let raw_type: String = data_row.get(4)?;

    Ok(Snapshot {
        id: data_row.get(0)?,
        tenant: data_row.get(1)?,
        instance_id: data_row.get(2)?,
        user_id: data_row.get::<String>(3).ok(),
        snapshot_type: SnapshotType::parse(&raw_type)
            .ok_or_else(|| DbError::MappingError(format!("SNAPSHOT_TYPE_DRIFT: {}", raw_type)))?,
        storage_path: data_row.get(5)?,
        size_bytes: data_row.get(6)?,
        config_hash: data_row.get::<String>(7).ok(),
        plugins_json: data_row.get::<String>(8).ok(),
        created_at: parse_timestamp(&data_row.get::<String>(9)?)?,
        expires_at: parse_optional_timestamp(data_row.get::<String>(10).ok())?,
        deleted_at: parse_optional_timestamp(data_row.get::<String>(11).ok())?,
    })
}
