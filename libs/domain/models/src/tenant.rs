// [libs/domain/models/src/tenant.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Ciclo de vida ortogonal del inquilino (independiente del Ledger).
/// Ausencia de fila implica 'Active'.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantLifecycleStatus {
    Active,
    Suspended,
    GracePeriod,
    Banned,
}

impl TenantLifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantLifecycleStatus::Active => "active",
            TenantLifecycleStatus::Suspended => "suspended",
            TenantLifecycleStatus::GracePeriod => "grace_period",
            TenantLifecycleStatus::Banned => "banned",
        }
    }

    pub fn parse(raw_status_label: &str) -> Option<Self> {
        match raw_status_label {
            "active" => Some(TenantLifecycleStatus::Active),
            "suspended" => Some(TenantLifecycleStatus::Suspended),
            "grace_period" => Some(TenantLifecycleStatus::GracePeriod),
            "banned" => Some(TenantLifecycleStatus::Banned),
            _ => None,
        }
    }
}

/// Plan contratado. Gobierna la prioridad de re-colocación en recuperación:
/// enterprise > pro > starter > free.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Enterprise,
    Pro,
    Starter,
    Free,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Enterprise => "enterprise",
            PlanTier::Pro => "pro",
            PlanTier::Starter => "starter",
            PlanTier::Free => "free",
        }
    }

    pub fn parse(raw_tier_label: &str) -> Option<Self> {
        match raw_tier_label {
            "enterprise" => Some(PlanTier::Enterprise),
            "pro" => Some(PlanTier::Pro),
            "starter" => Some(PlanTier::Starter),
            "free" => Some(PlanTier::Free),
            _ => None,
        }
    }

    /// Peso de ordenamiento: menor valor procesa primero.
    pub fn priority(&self) -> u8 {
        match self {
            PlanTier::Enterprise => 0,
            PlanTier::Pro => 1,
            PlanTier::Starter => 2,
            PlanTier::Free => 3,
        }
    }
}

/// Fila de estado del inquilino con campos de auditoría.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantStatusRecord {
    pub tenant_id: String,
    pub status: TenantLifecycleStatus,
    pub plan_tier: PlanTier,
    pub grace_deadline: Option<DateTime<Utc>>,
    pub data_delete_after: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl TenantStatusRecord {
    /// Estado por defecto cuando no existe fila persistida.
    pub fn default_for(tenant_identifier: &str) -> Self {
        Self {
            tenant_id: tenant_identifier.to_string(),
            status: TenantLifecycleStatus::Active,
            plan_tier: PlanTier::Free,
            grace_deadline: None,
            data_delete_after: None,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }
}
