// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN MODELS REGISTRY (V3.0 - FLEET SOBERANO)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: FUENTE ÚNICA DE VERDAD PARA ENTIDADES Y DTOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE SOURCE OF TRUTH: Toda entidad persistida (nodos, bots,
 *    recuperación, Ledger) y todo frame del protocolo de agentes se
 *    define aquí y solamente aquí.
 * 2. TYPESHARE ALIGNMENT: Los DTOs consumidos por el Dashboard Skyline
 *    portan anotaciones de sincronización TypeScript.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

pub mod bot;
pub mod credit;
pub mod node;
pub mod protocol;
pub mod recovery;
pub mod snapshot;
pub mod tenant;
pub mod token;

pub use bot::{BillingState, BotInstance, BotProfile, StorageTier};
pub use credit::{CreditBalance, CreditTransaction, CreditTransactionType};
pub use node::{Node, NodeStatus, NodeTransition};
pub use protocol::{
    AgentFrame, CommandFrame, CommandKind, ContainerReport, HealthEventKind,
};
pub use recovery::{
    FailedTenant, RecoveredTenant, RecoveryEvent, RecoveryEventStatus, RecoveryItem,
    RecoveryItemStatus, RecoveryReport, RecoveryTrigger, TenantAssignment, WaitingTenant,
};
pub use snapshot::{Snapshot, SnapshotType};
pub use tenant::{PlanTier, TenantLifecycleStatus, TenantStatusRecord};
pub use token::{ConsumedToken, IssuedToken, RegistrationToken};
