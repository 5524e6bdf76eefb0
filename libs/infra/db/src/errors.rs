// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V3.1 - SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RECOVERABLE KINDS: 'ConcurrentTransition' es distinguible para que
 *    los llamadores reintenten exactamente una vez ante carreras CAS.
 * 2. PANOPTICON COMPLIANCE: Formatea los mensajes con prefijos de
 *    estrato para su renderizado cromático en el Dashboard Skyline.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use aviary_domain_lifecycle::InvalidTransitionFault;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el cluster libSQL.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el dominio Rust.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// Error al comprometer cambios en una secuencia multi-tabla.
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE")]
    TransactionError,

    // --- ESTRATO DE LA FLOTA (L2/L3) ---

    /// El nodo solicitado no existe en la tabla de la flota.
    #[error("[L3_FLEET_FAULT]: NODE_NOT_FOUND -> {0}")]
    NodeNotFound(String),

    /// La arista de estado solicitada no pertenece al grafo legal.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransitionFault),

    /// La escritura optimista perdió la carrera: otro escritor movió el
    /// estado entre la lectura y el compare-and-swap.
    #[error("[L3_FLEET_FAULT]: CONCURRENT_TRANSITION_LOST -> node {node_id}")]
    ConcurrentTransition { node_id: String },

    // --- ESTRATO DE CARGAS DE TRABAJO ---

    /// El bot solicitado no existe en las tablas activas.
    #[error("[L3_WORKLOAD_FAULT]: BOT_NOT_FOUND -> {0}")]
    BotNotFound(String),

    /// El incidente de recuperación referido no está registrado.
    #[error("[L3_RECOVERY_FAULT]: EVENT_NOT_FOUND -> {0}")]
    RecoveryEventNotFound(String),

    // --- ESTRATO DEL LEDGER DE CRÉDITOS ---

    /// El débito empujaría el balance bajo cero sin autorización.
    /// Porta el balance vigente para la superficie administrativa.
    #[error("[L3_LEDGER_FAULT]: INSUFFICIENT_BALANCE -> current {current_balance_cents}")]
    InsufficientBalance { current_balance_cents: i64 },
}
