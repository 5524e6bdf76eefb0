// [libs/domain/lifecycle/src/transitions.rs]

use aviary_domain_models::NodeStatus;
use thiserror::Error;

/// Arista prohibida del grafo de estados. Porta ambos extremos para el
/// diagnóstico del Panóptico y para los reportes de drenaje/recuperación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("[L2_LIFECYCLE_FAULT]: ILLEGAL_TRANSITION -> {from} => {to}")]
pub struct InvalidTransitionFault {
    pub from: NodeStatus,
    pub to: NodeStatus,
}

/// Función pura sobre el grafo cerrado de transiciones legales.
///
/// Aristas permitidas:
/// - provisioning -> {active, failed}
/// - active       -> {draining, offline, degraded}
/// - degraded     -> {active, offline, failed}
/// - draining     -> {active, offline}
/// - offline      -> {recovering, returning, active}
/// - recovering   -> {offline, failed}
/// - returning    -> {active, failed}
/// - failed       -> {recovering, active}   (manual)
pub fn is_valid_transition(from: NodeStatus, to: NodeStatus) -> bool {
    use NodeStatus::*;

    matches!(
        (from, to),
        (Provisioning, Active)
            | (Provisioning, Failed)
            | (Active, Draining)
            | (Active, Offline)
            | (Active, Degraded)
            | (Degraded, Active)
            | (Degraded, Offline)
            | (Degraded, Failed)
            | (Draining, Active)
            | (Draining, Offline)
            | (Offline, Recovering)
            | (Offline, Returning)
            | (Offline, Active)
            | (Recovering, Offline)
            | (Recovering, Failed)
            | (Returning, Active)
            | (Returning, Failed)
            | (Failed, Recovering)
            | (Failed, Active)
    )
}

/// Variante con resultado para los llamadores que propagan el fallo.
pub fn ensure_valid_transition(
    from: NodeStatus,
    to: NodeStatus,
) -> Result<(), InvalidTransitionFault> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(InvalidTransitionFault { from, to })
    }
}
