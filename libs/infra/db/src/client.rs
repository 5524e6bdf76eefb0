// [libs/infra/db/src/client.rs]
/*!
 * =================================================================
 * APARATO: CONTROL PLANE DATABASE CLIENT (V4.0 - LOCATION AWARE)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: CLASIFICACIÓN DE DESTINO, ENLACE CON REINTENTOS Y
 *                  SELLADO DEL ESQUEMA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LOCATION CLASSIFIER: La URL se clasifica una sola vez (remoto
 *    Turso, disco local, memoria compartida) y cada destino define su
 *    propia política de apertura y reintento.
 * 2. BOUNDED RETRY: El coordinador suele arrancar antes que el cluster
 *    remoto; el enlace remoto reintenta con backoff acotado en lugar
 *    de colapsar la ignición. Disco y memoria abren en un intento.
 * 3. LINK VERIFICATION: Ningún esquema se sella sobre un enlace no
 *    verificado; una sonda 'SELECT 1' precede al bootstrap.
 * 4. MEMORY ANCHOR: En destinos de memoria compartida, una conexión
 *    ancla permanece viva durante toda la vida del cliente; sin ella
 *    SQLite purga la base al cerrar la última conexión.
 * =================================================================
 */

use crate::errors::DbError;
use crate::schema::apply_control_plane_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Intentos de apertura contra un cluster remoto.
const REMOTE_OPEN_ATTEMPTS: u32 = 3;
/// Base del backoff entre intentos remotos.
const REMOTE_BACKOFF_BASE_MS: u64 = 500;

/// Destino de persistencia clasificado desde la URL de conexión.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DatabaseLocation {
    /// Cluster Turso remoto; exige token de acceso.
    TursoRemote { url: String, auth_token: String },
    /// Fichero SQLite en disco local.
    LocalDisk { path: String },
    /// Base en RAM con caché compartida (proving grounds).
    SharedMemory { url: String },
}

impl DatabaseLocation {
    fn classify(connection_url: &str, auth_token: Option<String>) -> Result<Self, DbError> {
        if connection_url.is_empty() {
            return Err(DbError::ConnectionError("DATABASE_URL is empty".into()));
        }

        let is_remote = connection_url.starts_with("libsql://") || connection_url.starts_with("https://");
        let is_memory = connection_url.contains(":memory:") || connection_url.contains("mode=memory");

        if is_remote {
            let auth_token = auth_token.ok_or_else(|| {
                DbError::ConnectionError(format!("remote target {connection_url} requires TURSO_AUTH_TOKEN"))
            })?;
            return Ok(DatabaseLocation::TursoRemote {
                url: connection_url.to_string(),
                auth_token,
            });
        }

        if is_memory {
            return Ok(DatabaseLocation::SharedMemory {
                url: connection_url.to_string(),
            });
        }

        Ok(DatabaseLocation::LocalDisk {
            path: connection_url.to_string(),
        })
    }

    /// Política de reintento: solamente el destino remoto reintenta.
    fn open_attempts(&self) -> u32 {
        match self {
            DatabaseLocation::TursoRemote { .. } => REMOTE_OPEN_ATTEMPTS,
            _ => 1,
        }
    }

    fn describe(&self) -> &str {
        match self {
            DatabaseLocation::TursoRemote { url, .. } => url,
            DatabaseLocation::LocalDisk { path } => path,
            DatabaseLocation::SharedMemory { url } => url,
        }
    }
}

#[derive(Clone)]
pub struct ControlPlaneDatabase {
    internal_database_driver: Arc<Database>,
    /// Conexión ancla que mantiene viva la base de memoria compartida.
    _memory_persistence_anchor: Option<Arc<Connection>>,
}

impl ControlPlaneDatabase {
    pub async fn connect(
        database_connection_url: &str,
        database_access_token: Option<String>,
    ) -> Result<Self, DbError> {
        let location = DatabaseLocation::classify(database_connection_url, database_access_token)?;
        info!("🔌 [DATABASE]: Linking control plane to [{}]", location.describe());

        let attempts = location.open_attempts();
        let mut last_fault: Option<DbError> = None;

        for attempt in 1..=attempts {
            match Self::open(&location).await {
                Ok(client) => {
                    client.seal_schema().await?;
                    return Ok(client);
                }
                Err(open_fault) => {
                    if attempt < attempts {
                        let backoff = Duration::from_millis(REMOTE_BACKOFF_BASE_MS * u64::from(attempt));
                        warn!(
                            "🔁 [DATABASE_RETRY]: Link attempt {}/{} failed ({}). Backing off {:?}.",
                            attempt, attempts, open_fault, backoff
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_fault = Some(open_fault);
                }
            }
        }

        Err(last_fault
            .unwrap_or_else(|| DbError::ConnectionError("uplink never attempted".into())))
    }

    /// Apertura del driver según el destino. Para memoria compartida, el
    /// ancla se toma ANTES de cualquier otra operación sobre la base.
    async fn open(location: &DatabaseLocation) -> Result<Self, DbError> {
        let database_driver = match location {
            DatabaseLocation::TursoRemote { url, auth_token } => {
                Builder::new_remote(url.clone(), auth_token.clone()).build().await
            }
            DatabaseLocation::LocalDisk { path } => Builder::new_local(path).build().await,
            DatabaseLocation::SharedMemory { url } => Builder::new_local(url).build().await,
        }
        .map_err(|open_fault| {
            DbError::ConnectionError(format!("driver refused {}: {open_fault}", location.describe()))
        })?;

        let shared_driver = Arc::new(database_driver);

        let memory_anchor = match location {
            DatabaseLocation::SharedMemory { .. } => {
                let anchor_connection = shared_driver.connect().map_err(|anchor_fault| {
                    DbError::ConnectionError(format!("memory anchor refused: {anchor_fault}"))
                })?;
                Some(Arc::new(anchor_connection))
            }
            _ => None,
        };

        Ok(Self {
            internal_database_driver: shared_driver,
            _memory_persistence_anchor: memory_anchor,
        })
    }

    /// Verifica el enlace con una sonda mínima y sella el esquema.
    /// Con ancla presente, ambas operaciones corren sobre el ancla para
    /// que las tablas residan en el segmento de memoria compartido.
    async fn seal_schema(&self) -> Result<(), DbError> {
        match &self._memory_persistence_anchor {
            Some(anchor_connection) => self.verify_and_bootstrap(anchor_connection).await,
            None => {
                let bootstrap_connection = self.get_connection()?;
                self.verify_and_bootstrap(&bootstrap_connection).await
            }
        }
    }

    async fn verify_and_bootstrap(&self, bootstrap_connection: &Connection) -> Result<(), DbError> {
        bootstrap_connection
            .query("SELECT 1", ())
            .await
            .map_err(|probe_fault| {
                DbError::ConnectionError(format!("link probe rejected: {probe_fault}"))
            })?;

        apply_control_plane_schema(bootstrap_connection)
            .await
            .map_err(|schema_fault| {
                DbError::ConnectionError(format!("schema bootstrap collapsed: {schema_fault}"))
            })?;

        info!("⚓ [DATABASE]: Link verified and schema sealed.");
        Ok(())
    }

    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.internal_database_driver.connect().map_err(|allocation_fault| {
            error!("⚠️ [DATABASE]: Connection allocation refused: {}", allocation_fault);
            DbError::ConnectionError(allocation_fault.to_string())
        })
    }
}
