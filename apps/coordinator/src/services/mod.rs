// [apps/coordinator/src/services/mod.rs]
/*!
 * =================================================================
 * APARATO: SERVICE REGISTRY (V4.0)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO NOMINAL DE SERVICIOS DEL COORDINADOR
 * =================================================================
 */

pub mod billing_gate;
pub mod command_bus;
pub mod drain;
pub mod heartbeat;
pub mod inference_watchdog;
pub mod maintenance;
pub mod notifier;
pub mod provider;
pub mod recovery;
pub mod registrar;
