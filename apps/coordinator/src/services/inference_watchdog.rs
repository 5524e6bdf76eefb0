// [apps/coordinator/src/services/inference_watchdog.rs]
/*!
 * =================================================================
 * APARATO: INFERENCE WATCHDOG (V6.0 - N-STRIKE ESCALATION)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: SONDEO EXTERNO DE SERVICIOS DE MODELO Y ESCALADA
 *                  REINICIO -> DEGRADED -> FAILED
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. N-STRIKE DISCIPLINE: Ciclos consecutivos con TODOS los servicios
 *    caídos acumulan strikes; el umbral dispara 'degraded' + reinicio.
 *    Un solo servicio vivo resetea el contador y revierte a 'active'.
 * 2. POST-REBOOT WINDOW: Tras el reinicio corre una ventana de gracia;
 *    agotada con todo aún caído, el nodo se declara 'failed' y el
 *    estado en RAM se desaloja.
 * 3. NULL-HOST IMMUNITY: Nodos sin host jamás se sondean. El doble
 *    arranque del daemon es un no-op.
 * =================================================================
 */

use crate::services::notifier::AdminAlertSink;
use crate::services::provider::NodeRebooter;
use async_trait::async_trait;
use aviary_domain_notification::AdminEvent;
use aviary_domain_models::{Node, NodeStatus};
use aviary_infra_db::repositories::NodeRepository;
use aviary_infra_db::DbError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Catálogo por defecto de servicios de inferencia sondeados.
pub fn default_service_catalog() -> Vec<(String, u16)> {
    vec![
        ("llama".to_string(), 8080),
        ("chatterbox".to_string(), 8081),
        ("whisper".to_string(), 8082),
        ("qwen".to_string(), 8083),
    ]
}

/// Costura del sondeo HTTP; los proving grounds inyectan sondas guionadas.
#[async_trait]
pub trait ServiceHealthProbe: Send + Sync {
    /// true = 'ok', false = 'down' (error, timeout o status no exitoso).
    async fn is_healthy(&self, health_endpoint_url: &str) -> bool;
}

/// Sonda real con timeout independiente por endpoint.
pub struct HttpHealthProbe {
    http_client: reqwest::Client,
}

impl HttpHealthProbe {
    #[must_use]
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(probe_timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ServiceHealthProbe for HttpHealthProbe {
    async fn is_healthy(&self, health_endpoint_url: &str) -> bool {
        match self.http_client.get(health_endpoint_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Estado de strikes en RAM por nodo; desalojado en recuperación o 'failed'.
#[derive(Debug, Clone, Default)]
struct NodeStrikeState {
    consecutive_all_down: u32,
    rebooted_at: Option<DateTime<Utc>>,
}

pub struct InferenceWatchdog {
    node_repository: Arc<NodeRepository>,
    health_probe: Arc<dyn ServiceHealthProbe>,
    rebooter: Arc<dyn NodeRebooter>,
    alert_sink: Arc<dyn AdminAlertSink>,
    service_catalog: Vec<(String, u16)>,
    reboot_threshold: u32,
    failed_timeout: Duration,
    poll_interval: Duration,
    node_states: Mutex<HashMap<String, NodeStrikeState>>,
    daemon_started: AtomicBool,
}

impl InferenceWatchdog {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        node_repository: Arc<NodeRepository>,
        health_probe: Arc<dyn ServiceHealthProbe>,
        rebooter: Arc<dyn NodeRebooter>,
        alert_sink: Arc<dyn AdminAlertSink>,
        service_catalog: Vec<(String, u16)>,
        reboot_threshold: u32,
        failed_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            node_repository,
            health_probe,
            rebooter,
            alert_sink,
            service_catalog,
            reboot_threshold,
            failed_timeout,
            poll_interval,
            node_states: Mutex::new(HashMap::new()),
            daemon_started: AtomicBool::new(false),
        }
    }

    /// Inicia el daemon de sondeo. El doble arranque es un no-op.
    pub fn start(self: Arc<Self>) {
        if self.daemon_started.swap(true, Ordering::SeqCst) {
            debug!("💤 [INFERENCE_WATCHDOG]: Already running; double start ignored.");
            return;
        }

        let watchdog = self;
        tokio::spawn(async move {
            let mut poll_ticker = interval(watchdog.poll_interval);
            poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "🧠 [INFERENCE_WATCHDOG]: Model-service sentinel active ({} services).",
                watchdog.service_catalog.len()
            );

            loop {
                poll_ticker.tick().await;
                if let Err(poll_fault) = watchdog.poll_cycle().await {
                    error!("❌ [INFERENCE_POLL_FAULT]: {}", poll_fault);
                }
            }
        });
    }

    /// Un ciclo de sondeo sobre los nodos 'active|degraded' con host.
    #[instrument(skip(self))]
    pub async fn poll_cycle(&self) -> Result<(), DbError> {
        let monitored_nodes = self
            .node_repository
            .list_by_status(&[NodeStatus::Active, NodeStatus::Degraded])
            .await?;

        for node in monitored_nodes {
            // Los nodos sin host jamás se sondean.
            let Some(host) = node.host.clone() else { continue };
            self.evaluate_node(&node, &host).await?;
        }

        Ok(())
    }

    async fn evaluate_node(&self, node: &Node, host: &str) -> Result<(), DbError> {
        // 1. SONDEO POR SERVICIO CON REGISTRO PERSISTENTE
        let mut services_down = Vec::new();
        let mut any_service_up = false;

        for (service_name, service_port) in &self.service_catalog {
            let endpoint_url = format!("http://{host}:{service_port}/health");
            let healthy = self.health_probe.is_healthy(&endpoint_url).await;

            self.node_repository
                .record_service_health(&node.id, service_name, healthy)
                .await?;

            if healthy {
                any_service_up = true;
            } else {
                services_down.push(service_name.clone());
            }
        }

        // 2. CLASIFICACIÓN Y ESCALADA
        if any_service_up {
            self.handle_any_up(node).await?;
        } else {
            self.handle_all_down(node, services_down).await?;
        }

        Ok(())
    }

    /// Algún servicio vive: resetea strikes y revierte 'degraded -> active'.
    async fn handle_any_up(&self, node: &Node) -> Result<(), DbError> {
        let had_tracked_state = {
            let mut states_guard = self.node_states.lock().expect("FATAL: Strike map lock poisoned.");
            match states_guard.get(&node.id) {
                Some(state) if state.consecutive_all_down > 0 || state.rebooted_at.is_some() => {
                    states_guard.remove(&node.id);
                    true
                }
                _ => false,
            }
        };

        if !had_tracked_state {
            return Ok(());
        }

        info!("🌅 [INFERENCE_RECOVERED]: Node [{}] model services back online.", node.id);

        if node.status == NodeStatus::Degraded {
            if let Err(transition_fault) = self
                .node_repository
                .transition(&node.id, NodeStatus::Active, "inference_recovered", "inference_watchdog")
                .await
            {
                warn!("⚔️ [INFERENCE_SHIFT_LOST]: Node [{}] reactivation ceded: {}", node.id, transition_fault);
            }
        }

        Ok(())
    }

    /// Todo caído: acumula strikes, reinicia en el umbral y escala a
    /// 'failed' cuando la ventana post-reinicio se agota.
    async fn handle_all_down(&self, node: &Node, services_down: Vec<String>) -> Result<(), DbError> {
        let state_snapshot = {
            let states_guard = self.node_states.lock().expect("FATAL: Strike map lock poisoned.");
            states_guard.get(&node.id).cloned().unwrap_or_default()
        };

        // --- VENTANA POST-REINICIO ---
        if let Some(rebooted_at) = state_snapshot.rebooted_at {
            let elapsed_since_reboot = Utc::now().signed_duration_since(rebooted_at);
            let window = chrono::Duration::from_std(self.failed_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(600));

            if elapsed_since_reboot >= window {
                error!(
                    "💀 [GPU_NODE_FAILED]: Node [{}] exhausted post-reboot window. Declaring failed.",
                    node.id
                );

                if let Err(transition_fault) = self
                    .node_repository
                    .transition(&node.id, NodeStatus::Failed, "inference_reboot_exhausted", "inference_watchdog")
                    .await
                {
                    warn!("⚔️ [INFERENCE_SHIFT_LOST]: Node [{}] failure shift ceded: {}", node.id, transition_fault);
                }

                self.alert_sink
                    .emit(AdminEvent::GpuNodeFailed { node_id: node.id.clone() })
                    .await;

                // Desalojo del estado en RAM tras la escalada terminal.
                self.node_states
                    .lock()
                    .expect("FATAL: Strike map lock poisoned.")
                    .remove(&node.id);
            } else {
                debug!("⏳ [REBOOT_WINDOW]: Node [{}] still inside grace window.", node.id);
            }

            return Ok(());
        }

        // --- ACUMULACIÓN DE STRIKES ---
        let strikes = state_snapshot.consecutive_all_down + 1;
        {
            let mut states_guard = self.node_states.lock().expect("FATAL: Strike map lock poisoned.");
            states_guard.entry(node.id.clone()).or_default().consecutive_all_down = strikes;
        }

        if strikes < self.reboot_threshold {
            debug!("📉 [INFERENCE_STRIKE]: Node [{}] all-down strike {}/{}.", node.id, strikes, self.reboot_threshold);
            return Ok(());
        }

        warn!(
            "🛠️ [GPU_NODE_DEGRADED]: Node [{}] reached {} all-down cycles. Degrading and rebooting...",
            node.id, strikes
        );

        if let Err(transition_fault) = self
            .node_repository
            .transition(&node.id, NodeStatus::Degraded, "inference_all_down", "inference_watchdog")
            .await
        {
            warn!("⚔️ [INFERENCE_SHIFT_LOST]: Node [{}] degrade shift ceded: {}", node.id, transition_fault);
        }

        self.alert_sink
            .emit(AdminEvent::GpuNodeDegraded {
                node_id: node.id.clone(),
                services_down,
            })
            .await;

        // Reinicio best-effort: sin droplet conocido se omite con rastro.
        match &node.droplet_id {
            Some(droplet_identifier) => {
                if let Err(reboot_fault) = self.rebooter.reboot(droplet_identifier).await {
                    error!("⚠️ [REBOOT_FAULT]: Node [{}] reboot rejected: {}", node.id, reboot_fault);
                }
            }
            None => {
                error!("🚫 [REBOOT_SKIPPED]: Node [{}] has no provider droplet id.", node.id);
            }
        }

        // La ventana de gracia corre aunque el reinicio haya fallado.
        self.node_states
            .lock()
            .expect("FATAL: Strike map lock poisoned.")
            .entry(node.id.clone())
            .or_default()
            .rebooted_at = Some(Utc::now());

        Ok(())
    }
}
