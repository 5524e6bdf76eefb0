// [apps/coordinator/src/config.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR CONFIGURATION (V2.0)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA DE ENTORNO Y SINTONÍA DE DAEMONS
 * =================================================================
 */

use std::time::Duration;

/// Imagen OCI por defecto cuando el perfil del bot no declara una.
pub const DEFAULT_BOT_IMAGE: &str = "ghcr.io/aviary/bot-runtime:stable";

/// Sintonía operativa del coordinador. Los valores salen del entorno en
/// la ignición; los proving grounds construyen variantes directas.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Cadencia del barrido del watchdog de latidos.
    pub heartbeat_sweep_interval: Duration,
    /// Silencio que declara muerto a un nodo monitoreado.
    pub dead_threshold_seconds: i64,
    /// Timeout por comando del bus.
    pub command_timeout: Duration,
    /// Migraciones simultáneas durante un drenaje.
    pub drain_concurrency: usize,
    /// Cadencia del sondeo de salud de inferencia.
    pub inference_poll_interval: Duration,
    /// Timeout por endpoint de salud.
    pub inference_probe_timeout: Duration,
    /// Ciclos consecutivos con todo caído antes del reinicio.
    pub inference_reboot_threshold: u32,
    /// Ventana post-reinicio antes de declarar 'failed'.
    pub inference_failed_timeout: Duration,
    /// Ventana de espera de un item 'waiting' antes de expirarlo.
    pub waiting_expiry: Duration,
    /// Webhook opcional del Herald.
    pub admin_webhook_url: Option<String>,
    /// Token portador de la superficie administrativa.
    pub admin_api_token: Option<String>,
}

impl CoordinatorConfig {
    /// Captura la sintonía desde el entorno con los defaults de diseño.
    pub fn from_environment() -> Self {
        Self {
            heartbeat_sweep_interval: Duration::from_secs(read_env_u64("AVIARY_HEARTBEAT_SWEEP_SECONDS", 30)),
            dead_threshold_seconds: read_env_u64("AVIARY_DEAD_THRESHOLD_SECONDS", 90) as i64,
            command_timeout: Duration::from_secs(read_env_u64("AVIARY_COMMAND_TIMEOUT_SECONDS", 30)),
            drain_concurrency: read_env_u64("AVIARY_DRAIN_CONCURRENCY", 1) as usize,
            inference_poll_interval: Duration::from_secs(read_env_u64("AVIARY_INFERENCE_POLL_SECONDS", 30)),
            inference_probe_timeout: Duration::from_secs(read_env_u64("AVIARY_INFERENCE_PROBE_TIMEOUT_SECONDS", 5)),
            inference_reboot_threshold: read_env_u64("AVIARY_INFERENCE_REBOOT_THRESHOLD", 2) as u32,
            inference_failed_timeout: Duration::from_secs(read_env_u64("AVIARY_INFERENCE_FAILED_TIMEOUT_SECONDS", 600)),
            waiting_expiry: Duration::from_secs(read_env_u64("AVIARY_WAITING_EXPIRY_HOURS", 24) * 3600),
            admin_webhook_url: std::env::var("AVIARY_ADMIN_WEBHOOK_URL").ok(),
            admin_api_token: std::env::var("AVIARY_ADMIN_API_TOKEN").ok(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_sweep_interval: Duration::from_secs(30),
            dead_threshold_seconds: 90,
            command_timeout: Duration::from_secs(30),
            drain_concurrency: 1,
            inference_poll_interval: Duration::from_secs(30),
            inference_probe_timeout: Duration::from_secs(5),
            inference_reboot_threshold: 2,
            inference_failed_timeout: Duration::from_secs(600),
            waiting_expiry: Duration::from_secs(24 * 3600),
            admin_webhook_url: None,
            admin_api_token: None,
        }
    }
}

fn read_env_u64(variable_name: &str, default_value: u64) -> u64 {
    std::env::var(variable_name)
        .ok()
        .and_then(|raw_value| raw_value.parse().ok())
        .unwrap_or(default_value)
}
