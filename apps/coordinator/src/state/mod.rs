// [apps/coordinator/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN STATE ORCHESTRATOR (V9.0 - FLEET SINGULARITY)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: ORQUESTACIÓN DE REPOSITORIOS, BUS Y ORQUESTADORES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. COMPOSITION ROOT: Centraliza el rastro de los repositorios, el bus
 *    de comandos, el registro de enlaces y los orquestadores de drenaje,
 *    recuperación y facturación.
 * 2. NOMINAL PURITY: Uso de 'Arc<T>' para inmutabilidad compartida;
 *    todo estado de larga vida reside en la base de datos.
 * =================================================================
 */

pub mod link_registry;

use crate::config::CoordinatorConfig;
use crate::services::billing_gate::BotBillingGate;
use crate::services::command_bus::CommandBus;
use crate::services::drain::{CommandBusMigrator, DrainOrchestrator};
use crate::services::notifier::{AdminAlertSink, AdminNotifier};
use crate::services::recovery::RecoveryOrchestrator;
use crate::services::registrar::NodeRegistrar;
use aviary_infra_db::repositories::{
    BotProfileRepository, BotRepository, CreditRepository, NodeRepository, RecoveryRepository,
    RegistrationTokenStore, SnapshotRepository, TenantStatusRepository,
};
use aviary_infra_db::ControlPlaneDatabase;
use link_registry::NodeLinkRegistry;
use std::sync::Arc;
use tracing::debug;

/**
 * Contenedor de estado compartido (Thread-Safe) para el coordinador.
 * Actúa como la placa base donde se conectan todos los estratos.
 */
#[derive(Clone)]
pub struct AppState {
    /// Cliente táctico del motor libSQL.
    pub database_client: ControlPlaneDatabase,
    /// Sintonía operativa capturada en la ignición.
    pub config: Arc<CoordinatorConfig>,

    // --- ESTRATO L3: REPOSITORIOS ---
    pub node_repository: Arc<NodeRepository>,
    pub bot_repository: Arc<BotRepository>,
    pub profile_repository: Arc<BotProfileRepository>,
    pub recovery_repository: Arc<RecoveryRepository>,
    pub credit_repository: Arc<CreditRepository>,
    pub snapshot_repository: Arc<SnapshotRepository>,
    pub token_store: Arc<RegistrationTokenStore>,
    pub tenant_repository: Arc<TenantStatusRepository>,

    // --- ESTRATO L4: ENLACES Y SERVICIOS ---
    /// Inventario de sockets vivos por nodo.
    pub link_registry: Arc<NodeLinkRegistry>,
    /// Bus de comandos correlacionado sobre los enlaces.
    pub command_bus: Arc<CommandBus>,
    /// Sumidero de señales administrativas (log + webhook).
    pub notifier: Arc<AdminNotifier>,
    /// Orquestador de rescates por inquilino.
    pub recovery_orchestrator: Arc<RecoveryOrchestrator>,
    /// Orquestador de drenajes graciosos.
    pub drain_orchestrator: Arc<DrainOrchestrator>,
    /// Puerta de facturación atada al Ledger.
    pub billing_gate: Arc<BotBillingGate>,
    /// Registro de nodos con semántica de upsert.
    pub registrar: Arc<NodeRegistrar>,
}

impl AppState {
    /// Forja el estado maestro inyectando todas las dependencias.
    pub fn new(database_client: ControlPlaneDatabase, config: CoordinatorConfig) -> Self {
        debug!("🧬 [APP_STATE]: Executing sovereign ignition sequence V9.0...");

        let config = Arc::new(config);

        // Pre-hidratación de repositorios soberanos
        let node_repository = Arc::new(NodeRepository::new(database_client.clone()));
        let bot_repository = Arc::new(BotRepository::new(database_client.clone()));
        let profile_repository = Arc::new(BotProfileRepository::new(database_client.clone()));
        let recovery_repository = Arc::new(RecoveryRepository::new(database_client.clone()));
        let credit_repository = Arc::new(CreditRepository::new(database_client.clone()));
        let snapshot_repository = Arc::new(SnapshotRepository::new(database_client.clone()));
        let token_store = Arc::new(RegistrationTokenStore::new(database_client.clone()));
        let tenant_repository = Arc::new(TenantStatusRepository::new(database_client.clone()));

        // Enlaces, bus y Herald
        let link_registry = Arc::new(NodeLinkRegistry::new());
        let command_bus = Arc::new(CommandBus::new(Arc::clone(&link_registry), config.command_timeout));
        let notifier = Arc::new(AdminNotifier::new(config.admin_webhook_url.clone()));

        let alert_sink: Arc<dyn AdminAlertSink> = notifier.clone();

        // Orquestadores de la flota
        let recovery_orchestrator = Arc::new(RecoveryOrchestrator::new(
            Arc::clone(&node_repository),
            Arc::clone(&bot_repository),
            Arc::clone(&profile_repository),
            Arc::clone(&recovery_repository),
            command_bus.clone(),
            alert_sink.clone(),
        ));

        let migrator = Arc::new(CommandBusMigrator::new(
            Arc::clone(&node_repository),
            Arc::clone(&bot_repository),
            command_bus.clone(),
        ));

        let drain_orchestrator = Arc::new(DrainOrchestrator::new(
            Arc::clone(&node_repository),
            Arc::clone(&bot_repository),
            migrator,
            alert_sink,
            config.drain_concurrency,
        ));

        let billing_gate = Arc::new(BotBillingGate::new(
            Arc::clone(&bot_repository),
            Arc::clone(&credit_repository),
        ));

        let registrar = Arc::new(NodeRegistrar::new(
            Arc::clone(&node_repository),
            Arc::clone(&recovery_repository),
        ));

        Self {
            database_client,
            config,
            node_repository,
            bot_repository,
            profile_repository,
            recovery_repository,
            credit_repository,
            snapshot_repository,
            token_store,
            tenant_repository,
            link_registry,
            command_bus,
            notifier,
            recovery_orchestrator,
            drain_orchestrator,
            billing_gate,
            registrar,
        }
    }
}
