// [apps/coordinator/src/state/link_registry.rs]
/*!
 * =================================================================
 * APARATO: NODE LINK REGISTRY (V3.0 - SOCKET SOBERANO)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: INVENTARIO DE ENLACES VIVOS POR NODO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONE LINK PER NODE: Un socket por 'node_id'; un re-enlace reemplaza
 *    al anterior y el handler saliente se desmonta solo.
 * 2. LOOKUP AT SEND TIME: El bus de comandos consulta el registro en
 *    cada envío y jamás retiene referencias al socket.
 * =================================================================
 */

use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Capacidad del buffer de frames salientes por enlace.
const OUTBOUND_FRAME_BUFFER_CAPACITY: usize = 64;

/// Inventario de enlaces WebSocket vivos, propiedad del registro de
/// conexiones; el desmontaje ocurre en la desconexión del socket.
#[derive(Default)]
pub struct NodeLinkRegistry {
    active_links: RwLock<HashMap<String, mpsc::Sender<String>>>,
}

impl NodeLinkRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el enlace de un nodo. Retorna el receptor que el handler
    /// del socket drena hacia el cable y el emisor gemelo que identifica
    /// a ESTE enlace en el desmontaje (un re-enlace lo reemplaza).
    pub fn attach(&self, node_identifier: &str) -> (mpsc::Receiver<String>, mpsc::Sender<String>) {
        let (frame_sender, frame_receiver) = mpsc::channel(OUTBOUND_FRAME_BUFFER_CAPACITY);

        let mut links_guard = self.active_links.write().expect("FATAL: Link registry lock poisoned.");
        if links_guard.insert(node_identifier.to_string(), frame_sender.clone()).is_some() {
            warn!("🔁 [LINK_REGISTRY]: Node [{}] re-attached; previous link superseded.", node_identifier);
        } else {
            info!("🔗 [LINK_REGISTRY]: Node [{}] link established.", node_identifier);
        }

        (frame_receiver, frame_sender)
    }

    /// Desmonta el enlace del nodo solamente si sigue siendo el vigente;
    /// un enlace superseded jamás desmonta a su sucesor.
    pub fn detach(&self, node_identifier: &str, owned_sender: &mpsc::Sender<String>) {
        let mut links_guard = self.active_links.write().expect("FATAL: Link registry lock poisoned.");
        if let Some(current_sender) = links_guard.get(node_identifier) {
            if current_sender.same_channel(owned_sender) {
                links_guard.remove(node_identifier);
                info!("🔌 [LINK_REGISTRY]: Node [{}] link torn down.", node_identifier);
            }
        }
    }

    /// Emisor de frames del nodo, consultado en el momento del envío.
    pub fn frame_sender(&self, node_identifier: &str) -> Option<mpsc::Sender<String>> {
        self.active_links
            .read()
            .expect("FATAL: Link registry lock poisoned.")
            .get(node_identifier)
            .cloned()
    }

    pub fn connected_count(&self) -> usize {
        self.active_links
            .read()
            .expect("FATAL: Link registry lock poisoned.")
            .len()
    }
}
