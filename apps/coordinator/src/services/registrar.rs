// [apps/coordinator/src/services/registrar.rs]
/*!
 * =================================================================
 * APARATO: NODE REGISTRAR (V5.0 - HANDSHAKE SOBERANO)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: ALTA DE NODOS, RE-REGISTRO Y DISPARO DE REINTENTOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. UPSERT SEMANTICS: Desconocido -> 'provisioning' + 'active' con
 *    razón 'first_registration'. Conocido y caído -> metadatos + escolta
 *    por aristas legales hasta 'returning' con razón 're_registration'.
 *    Conocido y sano -> solamente metadatos.
 * 2. CALLBACK DISCIPLINE: El registrar dispara 'on_returning' y
 *    'on_retry_waiting' por incidente abierto; el scheduler externo
 *    decide si reintenta ahora. Jamás reintenta por cuenta propia.
 * 3. SECRET HYGIENE: El secreto viaja una sola vez en claro hacia el
 *    agente; aquí solo se persiste su huella SHA-256.
 * =================================================================
 */

use aviary_domain_models::{Node, NodeStatus, RecoveryEvent};
use aviary_infra_db::repositories::{NodeRepository, RecoveryRepository};
use aviary_infra_db::DbError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Huella SHA-256 hex de un secreto de nodo en claro.
pub fn hash_node_secret(cleartext_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cleartext_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Solicitud de registro emitida por el agente.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub node_id: String,
    pub host: Option<String>,
    pub capacity_mb: i64,
    pub agent_version: Option<String>,
}

/// Desenlace del registro para el llamador HTTP.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    /// Nodo nuevo: 'provisioning -> active' con 'first_registration'.
    FirstRegistration(Node),
    /// Nodo caído que volvió: escoltado a 'returning'.
    Reregistration(Node),
    /// Nodo sano: solamente metadatos refrescados.
    MetadataRefreshed(Node),
}

type ReturningCallback = Arc<dyn Fn(&Node) + Send + Sync>;
type RetryWaitingCallback = Arc<dyn Fn(&RecoveryEvent) + Send + Sync>;

pub struct NodeRegistrar {
    node_repository: Arc<NodeRepository>,
    recovery_repository: Arc<RecoveryRepository>,
    on_returning: Option<ReturningCallback>,
    on_retry_waiting: Option<RetryWaitingCallback>,
}

impl NodeRegistrar {
    #[must_use]
    pub fn new(node_repository: Arc<NodeRepository>, recovery_repository: Arc<RecoveryRepository>) -> Self {
        Self {
            node_repository,
            recovery_repository,
            on_returning: None,
            on_retry_waiting: None,
        }
    }

    /// Inyecta el callback disparado cuando un nodo caído vuelve.
    #[must_use]
    pub fn with_on_returning(mut self, callback: ReturningCallback) -> Self {
        self.on_returning = Some(callback);
        self
    }

    /// Inyecta el callback disparado por incidente abierto con esperas.
    #[must_use]
    pub fn with_on_retry_waiting(mut self, callback: RetryWaitingCallback) -> Self {
        self.on_retry_waiting = Some(callback);
        self
    }

    /**
     * Registro con semántica de upsert.
     *
     * # Errors:
     * Aflora 'DbError' de persistencia y de transición; un
     * 'ConcurrentTransition' se cede al otro escritor (el agente
     * reintentará su registro).
     */
    #[instrument(skip(self))]
    pub async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationOutcome, DbError> {
        let outcome = match self.node_repository.try_get(&request.node_id).await? {
            None => {
                // ALTA: inserción en 'provisioning' + activación auditada.
                self.node_repository
                    .insert_provisioning(
                        &request.node_id,
                        request.host.as_deref(),
                        request.capacity_mb,
                        request.agent_version.as_deref(),
                    )
                    .await?;

                let activated = self
                    .node_repository
                    .transition(&request.node_id, NodeStatus::Active, "first_registration", "registrar")
                    .await?;

                info!("🐣 [REGISTRAR]: Node [{}] first registration sealed.", request.node_id);
                RegistrationOutcome::FirstRegistration(activated)
            }

            Some(known_node)
                if matches!(
                    known_node.status,
                    NodeStatus::Offline | NodeStatus::Recovering | NodeStatus::Failed
                ) =>
            {
                // RETORNO: metadatos frescos + escolta legal a 'returning'.
                self.node_repository
                    .update_registration_metadata(
                        &request.node_id,
                        request.host.as_deref(),
                        request.capacity_mb,
                        request.agent_version.as_deref(),
                    )
                    .await?;

                let returning = self.escort_to_returning(&request.node_id, known_node.status).await?;

                warn!(
                    "🔄 [REGISTRAR]: Node [{}] returned from '{}'; rehydration pending.",
                    request.node_id,
                    known_node.status.as_str()
                );

                if let Some(callback) = &self.on_returning {
                    callback(&returning);
                }

                RegistrationOutcome::Reregistration(returning)
            }

            Some(_healthy_node) => {
                // SANO: solamente metadatos.
                self.node_repository
                    .update_registration_metadata(
                        &request.node_id,
                        request.host.as_deref(),
                        request.capacity_mb,
                        request.agent_version.as_deref(),
                    )
                    .await?;

                let refreshed = self.node_repository.get(&request.node_id).await?;
                RegistrationOutcome::MetadataRefreshed(refreshed)
            }
        };

        // Tras cualquier registro: un incidente abierto con esperas dispara
        // el callback de reintento; el scheduler externo decide.
        let open_incidents = self.recovery_repository.open_events_with_waiting().await?;
        if let Some(callback) = &self.on_retry_waiting {
            for incident in &open_incidents {
                callback(incident);
            }
        }

        Ok(outcome)
    }

    /**
     * Alta de un nodo self-hosted: inserción con propietario, etiqueta y
     * huella del secreto, seguida de la activación auditada.
     */
    #[instrument(skip(self, node_secret_hash))]
    pub async fn register_self_hosted(
        &self,
        request: &RegistrationRequest,
        owner_user_id: &str,
        label: Option<&str>,
        node_secret_hash: &str,
    ) -> Result<Node, DbError> {
        self.node_repository
            .insert_self_hosted(
                &request.node_id,
                request.host.as_deref(),
                request.capacity_mb,
                request.agent_version.as_deref(),
                owner_user_id,
                label,
                node_secret_hash,
            )
            .await?;

        let activated = self
            .node_repository
            .transition(&request.node_id, NodeStatus::Active, "first_registration", "registrar")
            .await?;

        info!(
            "🏠 [REGISTRAR]: Self-hosted node [{}] active for owner [{}].",
            request.node_id, owner_user_id
        );
        Ok(activated)
    }

    /// Escolta el nodo hasta 'returning' recorriendo solamente aristas
    /// legales del grafo: failed -> recovering -> offline -> returning.
    async fn escort_to_returning(&self, node_identifier: &str, from: NodeStatus) -> Result<Node, DbError> {
        let corridor: &[NodeStatus] = match from {
            NodeStatus::Failed => &[NodeStatus::Recovering, NodeStatus::Offline, NodeStatus::Returning],
            NodeStatus::Recovering => &[NodeStatus::Offline, NodeStatus::Returning],
            _ => &[NodeStatus::Returning],
        };

        let mut current_snapshot = None;
        for waypoint in corridor {
            current_snapshot = Some(
                self.node_repository
                    .transition(node_identifier, *waypoint, "re_registration", "registrar")
                    .await?,
            );
        }

        match current_snapshot {
            Some(node) => Ok(node),
            None => self.node_repository.get(node_identifier).await,
        }
    }
}
