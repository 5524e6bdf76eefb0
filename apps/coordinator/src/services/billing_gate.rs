// [apps/coordinator/src/services/billing_gate.rs]
/*!
 * =================================================================
 * APARATO: BOT BILLING GATE (V5.0 - ZERO CROSSING SENTINEL)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: CICLO SUSPEND / REACTIVATE / DESTROY ATADO AL LEDGER
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FIRE-AND-FORGET METERING: Los débitos de runtime toleran balance
 *    negativo por diseño; la vía de medición jamás se rechaza por
 *    balance y el ciclo diario reconcilia con suspensiones.
 * 2. GRACE DISCIPLINE: Suspensión fija 'destroy_after = now + 30 días';
 *    la destrucción real de contenedores la ejecuta el colaborador de
 *    teardown observando los IDs retornados.
 * 3. IDEMPOTENT CYCLES: Cada débito diario porta una referencia
 *    'runtime:<fecha>:<inquilino>'; repetir el ciclo el mismo día no
 *    duplica cargos.
 * =================================================================
 */

use aviary_domain_billing::{
    storage_tier_daily_cost_cents, storage_tier_monthly_cost_cents, BOT_RUNTIME_DAILY_COST_CENTS,
    SUSPENSION_GRACE_DAYS,
};
use aviary_domain_models::{CreditTransactionType, StorageTier};
use aviary_infra_db::repositories::{BotRepository, CreditRepository};
use aviary_infra_db::DbError;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Desenlace del ciclo diario de runtime.
#[derive(Debug, Clone, Default)]
pub struct DailyCycleReport {
    pub tenants_charged: usize,
    pub tenants_suspended: Vec<String>,
    pub tenants_reactivated: Vec<String>,
    pub bots_destroyed: Vec<String>,
}

pub struct BotBillingGate {
    bot_repository: Arc<BotRepository>,
    credit_repository: Arc<CreditRepository>,
}

impl BotBillingGate {
    #[must_use]
    pub fn new(bot_repository: Arc<BotRepository>, credit_repository: Arc<CreditRepository>) -> Self {
        Self {
            bot_repository,
            credit_repository,
        }
    }

    // --- OPERACIONES DE LA PUERTA ---

    /// Suspende toda carga activa del inquilino con la gracia de 30 días.
    #[instrument(skip(self))]
    pub async fn suspend_all_for_tenant(&self, tenant_identifier: &str) -> Result<Vec<String>, DbError> {
        let destroy_after = Utc::now() + Duration::days(SUSPENSION_GRACE_DAYS);
        self.bot_repository
            .suspend_all_for_tenant(tenant_identifier, destroy_after)
            .await
    }

    /// Con balance positivo, revierte toda suspensión del inquilino.
    #[instrument(skip(self))]
    pub async fn check_reactivation(&self, tenant_identifier: &str) -> Result<Vec<String>, DbError> {
        let current_balance = self.credit_repository.balance(tenant_identifier).await?;
        if current_balance <= 0 {
            return Ok(Vec::new());
        }
        self.bot_repository.reactivate_all_for_tenant(tenant_identifier).await
    }

    /// Marca como destruidas las suspensiones cuya gracia expiró.
    /// El teardown físico lo ejecuta el colaborador que observa los IDs.
    pub async fn destroy_expired_bots(&self) -> Result<Vec<String>, DbError> {
        self.bot_repository.destroy_expired_suspended(Utc::now()).await
    }

    pub async fn register_bot(
        &self,
        bot_identifier: &str,
        tenant_identifier: &str,
        container_name: &str,
    ) -> Result<(), DbError> {
        self.bot_repository
            .register_bot(bot_identifier, tenant_identifier, container_name)
            .await?;
        Ok(())
    }

    pub async fn reactivate_bot(&self, bot_identifier: &str) -> Result<(), DbError> {
        self.bot_repository.reactivate_bot(bot_identifier).await
    }

    pub async fn destroy_bot(&self, bot_identifier: &str) -> Result<(), DbError> {
        self.bot_repository.destroy_bot(bot_identifier).await
    }

    pub async fn get_active_bot_count(&self, tenant_identifier: &str) -> Result<i64, DbError> {
        self.bot_repository.get_active_bot_count(tenant_identifier).await
    }

    pub async fn get_storage_tier(&self, bot_identifier: &str) -> Result<StorageTier, DbError> {
        self.bot_repository.get_storage_tier(bot_identifier).await
    }

    pub async fn set_storage_tier(&self, bot_identifier: &str, tier: StorageTier) -> Result<(), DbError> {
        self.bot_repository.set_storage_tier(bot_identifier, tier).await
    }

    /// Costes mensuales de addon de almacenamiento por bot del inquilino.
    pub async fn get_storage_tier_costs_for_tenant(
        &self,
        tenant_identifier: &str,
    ) -> Result<Vec<(String, i64)>, DbError> {
        let tier_inventory = self.bot_repository.storage_tiers_for_tenant(tenant_identifier).await?;
        Ok(tier_inventory
            .into_iter()
            .map(|(bot_identifier, tier)| (bot_identifier, storage_tier_monthly_cost_cents(tier)))
            .collect())
    }

    // --- CICLO DIARIO DE RUNTIME ---

    /**
     * Cron diario: débitos de runtime y addons (fire-and-forget),
     * suspensión de inquilinos en o bajo cero, sonda de reactivación y
     * destrucción de gracias expiradas.
     */
    #[instrument(skip(self))]
    pub async fn run_daily_cycle(&self) -> Result<DailyCycleReport, DbError> {
        let mut report = DailyCycleReport::default();
        let cycle_date = Utc::now().format("%Y-%m-%d").to_string();

        // 1. MEDICIÓN: débito por inquilino con carga activa
        for tenant_identifier in self.bot_repository.tenants_with_active_bots().await? {
            if let Err(metering_fault) = self.charge_tenant_runtime(&tenant_identifier, &cycle_date).await {
                // Fallo transitorio: se registra y se sigue con el próximo.
                error!("❌ [RUNTIME_METERING_FAULT]: Tenant [{}]: {}", tenant_identifier, metering_fault);
                continue;
            }
            report.tenants_charged += 1;

            // 2. CRUCE POR CERO: suspensión reconciliadora
            let balance_after_metering = self.credit_repository.balance(&tenant_identifier).await?;
            if balance_after_metering <= 0 {
                let suspended = self.suspend_all_for_tenant(&tenant_identifier).await?;
                if !suspended.is_empty() {
                    warn!(
                        "⛔ [ZERO_CROSSING]: Tenant [{}] drained credits; {} workloads suspended.",
                        tenant_identifier,
                        suspended.len()
                    );
                    report.tenants_suspended.push(tenant_identifier.clone());
                }
            }
        }

        // 3. SONDA DE REACTIVACIÓN para inquilinos con suspensiones
        for tenant_identifier in self.bot_repository.tenants_with_suspended_bots().await? {
            let reactivated = self.check_reactivation(&tenant_identifier).await?;
            if !reactivated.is_empty() {
                info!(
                    "✅ [REACTIVATION]: Tenant [{}] back in credit; {} workloads resumed.",
                    tenant_identifier,
                    reactivated.len()
                );
                report.tenants_reactivated.push(tenant_identifier);
            }
        }

        // 4. DESTRUCCIÓN DE GRACIAS EXPIRADAS
        report.bots_destroyed = self.destroy_expired_bots().await?;

        info!(
            "🧾 [DAILY_CYCLE]: {} charged / {} suspended / {} reactivated / {} destroyed.",
            report.tenants_charged,
            report.tenants_suspended.len(),
            report.tenants_reactivated.len(),
            report.bots_destroyed.len()
        );

        Ok(report)
    }

    /// Débitos idempotentes del día: runtime por bot activo + addons.
    async fn charge_tenant_runtime(&self, tenant_identifier: &str, cycle_date: &str) -> Result<(), DbError> {
        let active_bot_count = self.bot_repository.get_active_bot_count(tenant_identifier).await?;
        if active_bot_count == 0 {
            return Ok(());
        }

        let runtime_cost_cents = active_bot_count * BOT_RUNTIME_DAILY_COST_CENTS;
        self.credit_repository
            .debit(
                tenant_identifier,
                runtime_cost_cents,
                CreditTransactionType::BotRuntime,
                &format!("daily runtime for {active_bot_count} bots"),
                Some(&format!("runtime:{cycle_date}:{tenant_identifier}")),
                true,
                None,
            )
            .await?;

        let addon_cost_cents: i64 = self
            .bot_repository
            .storage_tiers_for_tenant(tenant_identifier)
            .await?
            .into_iter()
            .map(|(_, tier)| storage_tier_daily_cost_cents(tier))
            .sum();

        if addon_cost_cents > 0 {
            self.credit_repository
                .debit(
                    tenant_identifier,
                    addon_cost_cents,
                    CreditTransactionType::Addon,
                    "daily storage tier addon",
                    Some(&format!("addon:{cycle_date}:{tenant_identifier}")),
                    true,
                    None,
                )
                .await?;
        }

        Ok(())
    }
}
