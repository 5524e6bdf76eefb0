// [libs/infra/db/src/repositories/profile.rs]

use crate::errors::DbError;
use crate::ControlPlaneDatabase;
use aviary_domain_models::BotProfile;
use chrono::Utc;
use libsql::params;
use std::collections::HashMap;

/// Repositorio de perfiles de configuración propiedad del inquilino.
/// La recuperación lee de aquí la imagen y el entorno de re-hidratación.
pub struct BotProfileRepository {
    database_client: ControlPlaneDatabase,
}

impl BotProfileRepository {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    pub async fn get(&self, bot_identifier: &str) -> Result<Option<BotProfile>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                "SELECT bot_id, image, env_json, release_channel, update_policy, discovery_json \
                 FROM bot_profiles WHERE bot_id = ?1",
                params![bot_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => {
                let environment: HashMap<String, String> = match data_row.get::<String>(2).ok() {
                    Some(raw_environment) => serde_json::from_str(&raw_environment)
                        .map_err(|fault| DbError::MappingError(format!("ENV_DRIFT: {}", fault)))?,
                    None => HashMap::new(),
                };

                Ok(Some(BotProfile {
                    bot_id: data_row.get(0)?,
                    image: data_row.get::<String>(1).ok(),
                    env: environment,
                    release_channel: data_row.get::<String>(3).ok(),
                    update_policy: data_row.get::<String>(4).ok(),
                    discovery_json: data_row.get::<String>(5).ok(),
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn upsert(&self, profile: &BotProfile) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let serialized_environment = serde_json::to_string(&profile.env)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        connection
            .execute(
                "INSERT INTO bot_profiles (bot_id, image, env_json, release_channel, update_policy, discovery_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(bot_id) DO UPDATE SET
                     image = excluded.image,
                     env_json = excluded.env_json,
                     release_channel = excluded.release_channel,
                     update_policy = excluded.update_policy,
                     discovery_json = excluded.discovery_json,
                     updated_at = excluded.updated_at",
                params![
                    profile.bot_id.clone(),
                    profile.image.clone(),
                    serialized_environment,
                    profile.release_channel.clone(),
                    profile.update_policy.clone(),
                    profile.discovery_json.clone(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }
}
