// [libs/domain/lifecycle/src/placement.rs]

use aviary_domain_models::NodeStatus;
use serde::{Deserialize, Serialize};

/// Memoria requerida por defecto cuando el llamador no estima (MB).
pub const DEFAULT_REQUIRED_MB: i64 = 100;

/// Proyección mínima de un nodo evaluable para colocación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementCandidate {
    pub node_id: String,
    pub host: Option<String>,
    pub status: NodeStatus,
    pub capacity_mb: i64,
    pub used_mb: i64,
}

impl PlacementCandidate {
    fn slack_mb(&self) -> i64 {
        (self.capacity_mb - self.used_mb).max(0)
    }
}

/// Decisión de colocación entregada a los orquestadores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub node_id: String,
    pub host: Option<String>,
    pub available_mb: i64,
}

/// Selector de empaquetado por holgura máxima.
///
/// Entre los candidatos con 'status = active', fuera de la lista de exclusión
/// y con holgura suficiente, retorna el de mayor 'capacity_mb - used_mb'
/// (first-fit-decreasing-by-slack: empaquetar en el contenedor más grande).
/// Empates se resuelven por el orden estable de entrada. Los nodos 'degraded'
/// nunca son candidatos.
pub fn select_placement(
    candidates: &[PlacementCandidate],
    required_mb: i64,
    exclude_node_ids: &[&str],
) -> Option<PlacementDecision> {
    candidates
        .iter()
        .filter(|candidate| candidate.status == NodeStatus::Active)
        .filter(|candidate| !exclude_node_ids.contains(&candidate.node_id.as_str()))
        .filter(|candidate| candidate.slack_mb() >= required_mb)
        .max_by_key(|candidate| candidate.slack_mb())
        .map(|winner| PlacementDecision {
            node_id: winner.node_id.clone(),
            host: winner.host.clone(),
            available_mb: winner.slack_mb(),
        })
}
