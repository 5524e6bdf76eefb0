// [apps/coordinator/src/services/maintenance.rs]
/*!
 * =================================================================
 * APARATO: MAINTENANCE REAPER (V4.0 - HYGIENE HARDENED)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: PURGA DE TOKENS, DESTRUCCIÓN DE GRACIAS EXPIRADAS Y
 *                  EXPIRACIÓN DE ESPERAS DE RECUPERACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. BOUNDED WAITING: Un item 'waiting' que supera la ventana de
 *    reintento se sella como 'failed' (razón 'waiting_expired'), los
 *    contadores del incidente se reconcilian y el Herald emite
 *    'waiting_tenants_expired'.
 * 2. ATOMICITY: Cada pasada es independiente; un fallo transitorio se
 *    registra y el daemon continúa en el siguiente ciclo.
 * =================================================================
 */

use crate::services::billing_gate::BotBillingGate;
use crate::services::notifier::AdminAlertSink;
use aviary_domain_notification::AdminEvent;
use aviary_domain_models::{RecoveryItem, RecoveryItemStatus};
use aviary_infra_db::repositories::{RecoveryRepository, RegistrationTokenStore};
use aviary_infra_db::DbError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

/// Cadencia del daemon de higiene.
const MAINTENANCE_INTERVAL_SECONDS: u64 = 3600;

pub struct MaintenanceReaper {
    token_store: Arc<RegistrationTokenStore>,
    billing_gate: Arc<BotBillingGate>,
    recovery_repository: Arc<RecoveryRepository>,
    alert_sink: Arc<dyn AdminAlertSink>,
    waiting_expiry: Duration,
}

impl MaintenanceReaper {
    #[must_use]
    pub fn new(
        token_store: Arc<RegistrationTokenStore>,
        billing_gate: Arc<BotBillingGate>,
        recovery_repository: Arc<RecoveryRepository>,
        alert_sink: Arc<dyn AdminAlertSink>,
        waiting_expiry: Duration,
    ) -> Self {
        Self {
            token_store,
            billing_gate,
            recovery_repository,
            alert_sink,
            waiting_expiry,
        }
    }

    /// Inicia el daemon de higiene perpetua.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut maintenance_ticker = interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECONDS));
            maintenance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!("💀 [REAPER_ACTIVE]: Infrastructure hygiene daemon initiated.");

            loop {
                maintenance_ticker.tick().await;
                if let Err(hygiene_fault) = self.run_once().await {
                    error!("💀 [REAPER_FAULT]: Hygiene pass collapsed: {}", hygiene_fault);
                }
            }
        });
    }

    /// Una pasada de higiene completa.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<(), DbError> {
        // 1. PURGA DE TOKENS DE REGISTRO EXPIRADOS
        let purged_tokens = self.token_store.purge_expired().await?;
        if purged_tokens > 0 {
            info!("🧹 [REAPER]: {} expired registration tokens purged.", purged_tokens);
        }

        // 2. DESTRUCCIÓN DE SUSPENSIONES CON GRACIA AGOTADA
        let destroyed_bots = self.billing_gate.destroy_expired_bots().await?;
        if !destroyed_bots.is_empty() {
            warn!("💀 [REAPER]: {} workloads past grace marked destroyed.", destroyed_bots.len());
        }

        // 3. EXPIRACIÓN DE ESPERAS DE RECUPERACIÓN
        self.expire_stale_waiting_items().await?;

        Ok(())
    }

    async fn expire_stale_waiting_items(&self) -> Result<(), DbError> {
        let expiry_cutoff = Utc::now()
            - chrono::Duration::from_std(self.waiting_expiry).unwrap_or_else(|_| chrono::Duration::hours(24));

        let expired_items = self.recovery_repository.list_expired_waiting_items(expiry_cutoff).await?;
        if expired_items.is_empty() {
            return Ok(());
        }

        // Agrupación por incidente para reconciliar contadores y notificar.
        let mut items_by_incident: HashMap<String, Vec<RecoveryItem>> = HashMap::new();
        for expired_item in expired_items {
            items_by_incident
                .entry(expired_item.recovery_event_id.clone())
                .or_default()
                .push(expired_item);
        }

        for (incident_identifier, expired_items) in items_by_incident {
            for expired_item in &expired_items {
                self.recovery_repository
                    .mark_item_outcome(
                        &expired_item.id,
                        RecoveryItemStatus::Failed,
                        None,
                        Some("waiting_expired"),
                    )
                    .await?;
            }

            let still_waiting = self
                .recovery_repository
                .list_waiting_items(&incident_identifier)
                .await?
                .len() as i64;

            self.recovery_repository
                .apply_retry_outcome(&incident_identifier, 0, expired_items.len() as i64, still_waiting)
                .await?;

            let expired_tenants: Vec<String> =
                expired_items.iter().map(|item| item.tenant.clone()).collect();

            warn!(
                "⌛ [WAITING_EXPIRED]: Incident [{}] closed {} stale waiting tenants.",
                incident_identifier,
                expired_tenants.len()
            );

            self.alert_sink
                .emit(AdminEvent::WaitingTenantsExpired {
                    recovery_event_id: incident_identifier,
                    tenants: expired_tenants,
                })
                .await;
        }

        Ok(())
    }
}

/// Cron diario del ciclo de runtime de la puerta de facturación.
pub fn spawn_daily_billing_cycle(billing_gate: Arc<BotBillingGate>) {
    tokio::spawn(async move {
        let mut daily_ticker = interval(Duration::from_secs(24 * 3600));
        daily_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("🧾 [BILLING_CRON]: Daily runtime cycle armed.");

        loop {
            daily_ticker.tick().await;
            match billing_gate.run_daily_cycle().await {
                Ok(cycle_report) => {
                    info!(
                        "🧾 [BILLING_CRON]: Cycle sealed ({} tenants charged).",
                        cycle_report.tenants_charged
                    );
                }
                Err(cycle_fault) => {
                    error!("❌ [BILLING_CRON_FAULT]: Daily cycle collapsed: {}", cycle_fault);
                }
            }
        }
    });
}
