// [libs/infra/db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PERSISTENCE PORT REGISTRY (V3.0 - FLEET SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN DE REPOSITORIOS TIPADOS Y CLIENTE ACID
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE WRITER: El coordinador es el único escritor de todas las
 *    tablas; los agentes jamás tocan la persistencia directamente.
 * 2. SEMANTIC ERRORS: Toda superficie de fallo se cataloga en 'DbError'
 *    para la recuperación autonómica en el Kernel.
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::ControlPlaneDatabase;
pub use errors::DbError;
