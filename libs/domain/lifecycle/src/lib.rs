// [libs/domain/lifecycle/src/lib.rs]
/*!
 * =================================================================
 * APARATO: FLEET LIFECYCLE ENGINE (V2.1 - PURE DOMAIN)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: GRAFO DE TRANSICIONES Y REGLA DE COLOCACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ZERO I/O: Las funciones de este estrato son puras; la persistencia
 *    y el rastro de auditoría viven en el repositorio de nodos (L3).
 * 2. CLOSED GRAPH: Toda mutación de estado de un nodo debe validar su
 *    arista aquí antes de tocar el Ledger.
 * =================================================================
 */

pub mod placement;
pub mod transitions;

pub use placement::{select_placement, PlacementCandidate, PlacementDecision, DEFAULT_REQUIRED_MB};
pub use transitions::{ensure_valid_transition, is_valid_transition, InvalidTransitionFault};
