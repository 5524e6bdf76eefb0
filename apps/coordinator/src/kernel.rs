// [apps/coordinator/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR KERNEL (V6.0 - IGNITION AUTHORITY)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: SINAPSIS L3 (DB) <-> L4 (API) E IGNICIÓN DE DAEMONS
 *
 * # Mathematical Proof (Deterministic Ignition):
 * El Kernel garantiza que el esquema esté sellado y el estado maestro
 * forjado ANTES de la apertura del socket TCP, previniendo estados de
 * carrera donde un agente registre latidos contra tablas inexistentes.
 * =================================================================
 */

use crate::config::CoordinatorConfig;
use crate::routes::create_control_plane_router;
use crate::services::heartbeat::HeartbeatWatchdog;
use crate::services::inference_watchdog::{
    default_service_catalog, HttpHealthProbe, InferenceWatchdog,
};
use crate::services::maintenance::{spawn_daily_billing_cycle, MaintenanceReaper};
use crate::services::provider::{ComputeProviderClient, NodeRebooter};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use aviary_infra_db::ControlPlaneDatabase;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Reiniciador nulo para entornos sin credenciales del proveedor: el
/// watchdog sigue degradando y escalando, solamente omite el reinicio.
struct NullRebooter;

#[async_trait]
impl NodeRebooter for NullRebooter {
    async fn reboot(&self, droplet_identifier: &str) -> Result<()> {
        warn!("🚫 [REBOOT_NOOP]: No provider credentials; droplet [{}] untouched.", droplet_identifier);
        Ok(())
    }
}

pub struct CoordinatorKernel {
    pub application_shared_state: AppState,
    listening_network_port: u16,
}

impl CoordinatorKernel {
    /**
     * Forja el Kernel: enlace con el motor libSQL, sellado del esquema
     * y construcción del estado maestro.
     */
    pub async fn ignite(
        database_connection_url: &str,
        database_access_token: Option<String>,
        listening_network_port: u16,
    ) -> Result<Self> {
        let database_client =
            ControlPlaneDatabase::connect(database_connection_url, database_access_token).await?;

        let config = CoordinatorConfig::from_environment();
        let application_shared_state = AppState::new(database_client, config);

        Ok(Self {
            application_shared_state,
            listening_network_port,
        })
    }

    /**
     * Activa los daemons de vigilancia y levanta el servidor Axum.
     * Esta llamada solamente retorna si el listener colapsa.
     */
    pub async fn launch_control_plane(self) -> Result<()> {
        let state = self.application_shared_state.clone();

        // 1. WATCHDOG DE LATIDOS (muerte silenciosa -> rescate)
        Arc::new(HeartbeatWatchdog::new(
            Arc::clone(&state.node_repository),
            Arc::clone(&state.recovery_orchestrator),
            state.config.heartbeat_sweep_interval,
            state.config.dead_threshold_seconds,
        ))
        .spawn();

        // 2. WATCHDOG DE INFERENCIA (N-strike + reinicio del proveedor)
        let rebooter: Arc<dyn NodeRebooter> = match ComputeProviderClient::from_production_environment() {
            Ok(provider_client) => Arc::new(provider_client),
            Err(missing_credentials) => {
                warn!("⚠️ [PROVIDER_OFFLINE]: {} (reboots disabled)", missing_credentials);
                Arc::new(NullRebooter)
            }
        };

        Arc::new(InferenceWatchdog::new(
            Arc::clone(&state.node_repository),
            Arc::new(HttpHealthProbe::new(state.config.inference_probe_timeout)),
            rebooter,
            state.notifier.clone(),
            default_service_catalog(),
            state.config.inference_reboot_threshold,
            state.config.inference_failed_timeout,
            state.config.inference_poll_interval,
        ))
        .start();

        // 3. REAPER DE HIGIENE (tokens, gracias agotadas, esperas vencidas)
        Arc::new(MaintenanceReaper::new(
            Arc::clone(&state.token_store),
            Arc::clone(&state.billing_gate),
            Arc::clone(&state.recovery_repository),
            state.notifier.clone(),
            state.config.waiting_expiry,
        ))
        .spawn();

        // 4. CRON DIARIO DE RUNTIME
        spawn_daily_billing_cycle(Arc::clone(&state.billing_gate));

        // 5. SUPERFICIE HTTP + WS
        let control_plane_router = create_control_plane_router(state);
        let listener_address = format!("0.0.0.0:{}", self.listening_network_port);

        info!("🛰️  [CONTROL_PLANE_ONLINE]: Listening on {}.", listener_address);

        let tcp_listener = tokio::net::TcpListener::bind(&listener_address).await?;
        if let Err(server_fault) = axum::serve(tcp_listener, control_plane_router).await {
            error!("💀 [LISTENER_COLLAPSE]: {}", server_fault);
            return Err(server_fault.into());
        }

        Ok(())
    }
}
