// [libs/infra/db/src/repositories/tenant.rs]

use crate::errors::DbError;
use crate::repositories::{parse_optional_timestamp, parse_timestamp};
use crate::ControlPlaneDatabase;
use aviary_domain_models::{PlanTier, TenantLifecycleStatus, TenantStatusRecord};
use chrono::{DateTime, Utc};
use libsql::params;
use tracing::instrument;

/// Estado ortogonal del inquilino. La ausencia de fila implica 'active'
/// con plan 'free'; la lectura nunca falla por inquilino desconocido.
pub struct TenantStatusRepository {
    database_client: ControlPlaneDatabase,
}

impl TenantStatusRepository {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    pub async fn get(&self, tenant_identifier: &str) -> Result<TenantStatusRecord, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                "SELECT tenant_id, status, COALESCE(plan_tier, 'free'), grace_deadline, \
                 data_delete_after, updated_at, updated_by \
                 FROM tenant_status WHERE tenant_id = ?1",
                params![tenant_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => {
                let raw_status: String = data_row.get(1)?;
                let raw_tier: String = data_row.get(2)?;

                Ok(TenantStatusRecord {
                    tenant_id: data_row.get(0)?,
                    status: TenantLifecycleStatus::parse(&raw_status)
                        .ok_or_else(|| DbError::MappingError(format!("TENANT_STATUS_DRIFT: {}", raw_status)))?,
                    plan_tier: PlanTier::parse(&raw_tier)
                        .ok_or_else(|| DbError::MappingError(format!("PLAN_TIER_DRIFT: {}", raw_tier)))?,
                    grace_deadline: parse_optional_timestamp(data_row.get::<String>(3).ok())?,
                    data_delete_after: parse_optional_timestamp(data_row.get::<String>(4).ok())?,
                    updated_at: parse_timestamp(&data_row.get::<String>(5)?)?,
                    updated_by: data_row.get::<String>(6).ok(),
                })
            }
            None => Ok(TenantStatusRecord::default_for(tenant_identifier)),
        }
    }

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        tenant_identifier: &str,
        status: TenantLifecycleStatus,
        grace_deadline: Option<DateTime<Utc>>,
        data_delete_after: Option<DateTime<Utc>>,
        updated_by: Option<&str>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO tenant_status (tenant_id, status, grace_deadline, data_delete_after, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(tenant_id) DO UPDATE SET
                     status = excluded.status,
                     grace_deadline = excluded.grace_deadline,
                     data_delete_after = excluded.data_delete_after,
                     updated_at = excluded.updated_at,
                     updated_by = excluded.updated_by",
                params![
                    tenant_identifier,
                    status.as_str(),
                    grace_deadline.map(|g| g.to_rfc3339()),
                    data_delete_after.map(|d| d.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                    updated_by.map(|u| u.to_string())
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn set_plan_tier(&self, tenant_identifier: &str, plan_tier: PlanTier) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO tenant_status (tenant_id, status, plan_tier, updated_at)
                 VALUES (?1, 'active', ?2, ?3)
                 ON CONFLICT(tenant_id) DO UPDATE SET
                     plan_tier = excluded.plan_tier,
                     updated_at = excluded.updated_at",
                params![tenant_identifier, plan_tier.as_str(), Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }
}
