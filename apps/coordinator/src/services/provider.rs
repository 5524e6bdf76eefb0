// [apps/coordinator/src/services/provider.rs]
/*!
 * =================================================================
 * APARATO: COMPUTE PROVIDER CLIENT (V4.0 - REBOOT AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L6)
 * RESPONSABILIDAD: EMISIÓN DE REINICIOS DE DROPLETS Y VIGILANCIA DE CUOTA
 *
 * # Mathematical Proof (Best-Effort Escalation):
 * El reinicio es best-effort por diseño: un fallo del proveedor se
 * registra y NO aborta la transición a 'degraded' que lo precede, por
 * lo que el watchdog conserva su ventana de escalada a 'failed'.
 * =================================================================
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Costura de reinicio del watchdog de inferencia; los proving grounds
/// inyectan reiniciadores sintéticos que capturan las órdenes.
#[async_trait]
pub trait NodeRebooter: Send + Sync {
    async fn reboot(&self, droplet_identifier: &str) -> Result<()>;
}

/// Cliente real contra la API del proveedor de cómputo (droplets).
pub struct ComputeProviderClient {
    network_communication_client: Client,
    provider_api_token: String,
    provider_api_base_url: String,
}

impl ComputeProviderClient {
    /**
     * Construye e inicializa el cliente validando la presencia de
     * secretos en el entorno.
     *
     * # Errors:
     * Retorna fallo crítico si PROVIDER_API_TOKEN es nulo.
     */
    pub fn from_production_environment() -> Result<Self> {
        let provider_api_token = std::env::var("PROVIDER_API_TOKEN")
            .context("CRITICAL_CONFIG_VOID: 'PROVIDER_API_TOKEN' is missing in environment.")?;

        let provider_api_base_url = std::env::var("PROVIDER_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.digitalocean.com/v2".to_string());

        info!("📡 [PROVIDER_LINK]: Initializing reboot authority against {}", provider_api_base_url);

        Ok(Self {
            network_communication_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("Aviary-Coordinator/V4.0")
                .build()?,
            provider_api_token,
            provider_api_base_url,
        })
    }

    /// Extrae y audita los metadatos de cuota de la API del proveedor.
    fn log_rate_limit_metrics(&self, response_headers: &HeaderMap) {
        if let Some(remaining_credits) = response_headers.get("ratelimit-remaining") {
            if let Ok(remaining_string) = remaining_credits.to_str() {
                debug!("📊 [PROVIDER_QUOTA]: Remaining API credits: {}", remaining_string);

                if let Ok(remaining_value) = remaining_string.parse::<u32>() {
                    if remaining_value < 100 {
                        warn!("🚨 [PROVIDER_CRITICAL_QUOTA]: API near exhaustion: {} credits left.", remaining_value);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl NodeRebooter for ComputeProviderClient {
    #[instrument(skip(self))]
    async fn reboot(&self, droplet_identifier: &str) -> Result<()> {
        let reboot_endpoint_url = format!(
            "{}/droplets/{}/actions",
            self.provider_api_base_url, droplet_identifier
        );

        let network_response = self
            .network_communication_client
            .post(&reboot_endpoint_url)
            .header("Authorization", format!("Bearer {}", self.provider_api_token))
            .json(&json!({ "type": "reboot" }))
            .send()
            .await?;

        self.log_rate_limit_metrics(network_response.headers());

        let response_status_code = network_response.status();

        if response_status_code == StatusCode::CREATED || response_status_code.is_success() {
            info!("🔁 [PROVIDER_REBOOT]: Reboot accepted for droplet [{}].", droplet_identifier);
            Ok(())
        } else {
            let error_diagnostic_body = network_response.text().await.unwrap_or_default();
            error!(
                "❌ [PROVIDER_REBOOT_FAILED]: Droplet [{}] rejected: {} -> {}",
                droplet_identifier, response_status_code, error_diagnostic_body
            );
            Err(anyhow::anyhow!(
                "PROVIDER_REBOOT_ERROR: {} -> {}",
                response_status_code,
                error_diagnostic_body
            ))
        }
    }
}
