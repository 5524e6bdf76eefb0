// [apps/coordinator/src/services/notifier.rs]
/*!
 * =================================================================
 * APARATO: ADMIN NOTIFIER (V3.0 - HERALD SINK)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: ENTREGA DE SEÑALES ADMINISTRATIVAS (LOG + WEBHOOK)
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. BEST EFFORT DELIVERY: El webhook es opcional y su fallo jamás
 *    aborta la operación que emitió la señal.
 * 2. SEVERITY ROUTING: El rastro local se enruta por urgencia para el
 *    renderizado cromático del Panóptico.
 * =================================================================
 */

use async_trait::async_trait;
use aviary_domain_notification::{AdminEvent, AlertEnvelope, AlertSeverity};
use std::time::Duration;
use tracing::{error, info, warn};

/// Costura de alertas de los orquestadores; los proving grounds inyectan
/// sumideros sintéticos que capturan las señales.
#[async_trait]
pub trait AdminAlertSink: Send + Sync {
    async fn emit(&self, event: AdminEvent);
}

/// Sumidero real: rastro estructurado + webhook opcional del operador.
pub struct AdminNotifier {
    webhook_endpoint_url: Option<String>,
    http_client: reqwest::Client,
}

impl AdminNotifier {
    #[must_use]
    pub fn new(webhook_endpoint_url: Option<String>) -> Self {
        Self {
            webhook_endpoint_url,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AdminAlertSink for AdminNotifier {
    async fn emit(&self, event: AdminEvent) {
        let envelope = AlertEnvelope::seal(&event);

        match envelope.severity {
            AlertSeverity::Critical => {
                error!(target: "herald", "🚨 [{}]: {}", envelope.kind, envelope.payload)
            }
            AlertSeverity::Warning => {
                warn!(target: "herald", "⚠️ [{}]: {}", envelope.kind, envelope.payload)
            }
            AlertSeverity::Info => {
                info!(target: "herald", "📢 [{}]: {}", envelope.kind, envelope.payload)
            }
        }

        // Entrega best-effort: el fallo del webhook se registra y se sigue.
        if let Some(endpoint) = &self.webhook_endpoint_url {
            if let Err(delivery_fault) = self.http_client.post(endpoint).json(&envelope).send().await {
                warn!(
                    "📭 [HERALD_UNDELIVERED]: Webhook rejected signal [{}]: {}",
                    envelope.kind, delivery_fault
                );
            }
        }
    }
}
