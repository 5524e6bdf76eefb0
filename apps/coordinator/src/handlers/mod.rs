// [apps/coordinator/src/handlers/mod.rs]
/*!
 * =================================================================
 * APARATO: HANDLER REGISTRY (V4.0)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO NOMINAL DE SUPERFICIES HTTP Y WS
 * =================================================================
 */

pub mod agent_link;
pub mod credits;
pub mod nodes;
pub mod registration;
