// [libs/infra/db/src/repositories/token.rs]
/*!
 * =================================================================
 * APARATO: REGISTRATION TOKEN STORE (V3.0 - SINGLE USE GUARD)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EMISIÓN Y CONSUMO ATÓMICO DE TOKENS DE REGISTRO
 *
 * # Mathematical Proof (Single Use):
 * El consumo ejecuta un UPDATE condicionado a 'used = 0 AND
 * expires_at > now'. El motor serializa los escritores, por lo que a
 * lo sumo un consumidor observa 'used = 0': toda repetición afecta
 * cero filas y retorna nulo.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{parse_optional_timestamp, parse_timestamp};
use crate::ControlPlaneDatabase;
use aviary_domain_models::{ConsumedToken, IssuedToken, RegistrationToken};
use chrono::{Duration, Utc};
use libsql::{params, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Ventana de validez de un token recién emitido.
pub const TOKEN_VALIDITY_MINUTES: i64 = 15;

const TOKEN_COLUMNS: &str = "id, user_id, label, created_at, expires_at, used, node_id, used_at";

pub struct RegistrationTokenStore {
    database_client: ControlPlaneDatabase,
}

impl RegistrationTokenStore {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    /// Emite un token portador UUID v4 con expiración de 15 minutos.
    #[instrument(skip(self))]
    pub async fn create(&self, user_identifier: &str, label: Option<&str>) -> Result<IssuedToken, DbError> {
        let connection = self.database_client.get_connection()?;
        let bearer_token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(TOKEN_VALIDITY_MINUTES);

        connection
            .execute(
                "INSERT INTO registration_tokens (id, user_id, label, created_at, expires_at, used)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    bearer_token.clone(),
                    user_identifier,
                    label.map(|l| l.to_string()),
                    now.to_rfc3339(),
                    expires_at.to_rfc3339()
                ],
            )
            .await?;

        info!("🎟️ [TOKEN_FORGE]: Registration token issued for user [{}].", user_identifier);
        Ok(IssuedToken { token: bearer_token, expires_at })
    }

    /**
     * Consumo atómico de un solo uso. Retorna nulo si el token no existe,
     * ya fue usado o expiró; el UPDATE condicionado garantiza que a lo
     * sumo un llamador reciba un resultado no nulo.
     */
    #[instrument(skip(self, bearer_token))]
    pub async fn consume(
        &self,
        bearer_token: &str,
        node_identifier: &str,
    ) -> Result<Option<ConsumedToken>, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now().to_rfc3339();

        let affected = connection
            .execute(
                "UPDATE registration_tokens SET used = 1, node_id = ?2, used_at = ?3 \
                 WHERE id = ?1 AND used = 0 AND expires_at > ?3",
                params![bearer_token, node_identifier, now],
            )
            .await?;

        if affected == 0 {
            debug!("🚫 [TOKEN_REJECTED]: Bearer is void, spent or expired.");
            return Ok(None);
        }

        let mut query_results = connection
            .query(
                "SELECT user_id, label FROM registration_tokens WHERE id = ?1",
                params![bearer_token],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(ConsumedToken {
                user_id: data_row.get(0)?,
                label: data_row.get::<String>(1).ok(),
            })),
            None => Ok(None),
        }
    }

    /// Tokens vigentes (no usados, no expirados) de un usuario.
    pub async fn list_active(&self, user_identifier: &str) -> Result<Vec<RegistrationToken>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut active_tokens = Vec::new();

        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {TOKEN_COLUMNS} FROM registration_tokens \
                     WHERE user_id = ?1 AND used = 0 AND expires_at > ?2 ORDER BY created_at DESC"
                ),
                params![user_identifier, Utc::now().to_rfc3339()],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            active_tokens.push(map_row_to_token(&data_row)?);
        }
        Ok(active_tokens)
    }

    /// Purga tokens expirados sin usar. Retorna el conteo eliminado.
    pub async fn purge_expired(&self) -> Result<u64, DbError> {
        let connection = self.database_client.get_connection()?;
        let purged = connection
            .execute(
                "DELETE FROM registration_tokens WHERE used = 0 AND expires_at <= ?1",
                params![Utc::now().to_rfc3339()],
            )
            .await?;

        if purged > 0 {
            debug!("🧹 [TOKEN_REAPER]: {} expired tokens purged.", purged);
        }
        Ok(purged)
    }
}

fn map_row_to_token(data_row: &Row) -> Result<RegistrationToken, DbError> {
    Ok(RegistrationToken {
        id: data_row.get(0)?,
        user_id: data_row.get(1)?,
        label: data_row.get::<String>(2).ok(),
        created_at: parse_timestamp(&data_row.get::<String>(3)?)?,
        expires_at: parse_timestamp(&data_row.get::<String>(4)?)?,
        used: data_row.get::<i64>(5)? != 0,
        node_id: data_row.get::<String>(6).ok(),
        used_at: parse_optional_timestamp(data_row.get::<String>(7).ok())?,
    })
}
