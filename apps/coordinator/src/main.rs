// [apps/coordinator/src/main.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR MAIN ENTRY POINT (V5.0 - GOLD MASTER)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * # Mathematical Proof (Deterministic Ignition):
 * El proceso garantiza que la observabilidad (Watchtower) y el sellado
 * del esquema ocurran antes de la apertura del socket TCP, previniendo
 * estados de carrera donde un agente reporte contra un Ledger frío.
 * =================================================================
 */

use aviary_coordinator::prelude::*;
use aviary_shared_watchtower::ignite_observability;
use dotenvy::dotenv;
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO SOBERANO
    dotenv().ok();

    // 2. INICIALIZACIÓN DE OBSERVABILIDAD (WATCHTOWER)
    ignite_observability("aviary_coordinator");

    // 3. RUNTIME MULTI-HILO DE TOKIO
    let runtime_coordinator = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime_coordinator.block_on(async {
        info!("🛰️  [COMMAND_CENTER]: Control plane ignition sequence starting...");

        // 4. ADQUISICIÓN DE COORDENADAS TÁCTICAS
        let database_connection_url = std::env::var("DATABASE_URL")
            .expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment.");

        let database_access_token = std::env::var("TURSO_AUTH_TOKEN").ok();

        let listening_network_port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        // 5. CONSTRUCCIÓN DEL KERNEL SOBERANO
        let kernel_instance = match CoordinatorKernel::ignite(
            &database_connection_url,
            database_access_token,
            listening_network_port,
        )
        .await
        {
            Ok(kernel) => kernel,
            Err(ignition_fault) => {
                error!("❌ [IGNITION_FAILED]: Kernel forge collapsed: {}", ignition_fault);
                std::process::exit(1);
            }
        };

        // 6. IGNICIÓN DE OPERACIONES DE LA FLOTA
        info!("🚀 [AVIARY_ONLINE]: Coordinator operational on port {}.", listening_network_port);
        if let Err(runtime_fault) = kernel_instance.launch_control_plane().await {
            error!("💀 [CONTROL_PLANE_DOWN]: {}", runtime_fault);
            std::process::exit(1);
        }

        Ok(())
    })
}
