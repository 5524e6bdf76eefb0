// [libs/infra/db/src/repositories/credit.rs]
/*!
 * =================================================================
 * APARATO: CREDIT LEDGER REPOSITORY (V7.0 - RUNNING SUM GUARD)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: LEDGER APPEND-ONLY Y CACHÉ DE BALANCE COHERENTE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IDEMPOTENCY BY REFERENCE: 'reference_id' es el único mecanismo de
 *    idempotencia; una repetición retorna la fila previa sin alterar
 *    el balance (restricción UNIQUE + lectura dentro de la transacción).
 * 2. ATOMIC APPEND: Inserción de la fila y upsert de la caché de balance
 *    en la misma transacción; el motor serializa los escritores.
 * 3. SIGN DISCIPLINE: El guardia de balance bajo cero aplica solamente
 *    a deltas negativos sin autorización ('allow_negative = false').
 *
 * # Mathematical Proof (I1 - Running Sum):
 * Sea S(n) la suma de 'amount_cents' de las primeras n filas de un
 * inquilino. El append calcula balance_after = S(n-1) + delta dentro
 * de la transacción que inserta la fila n, por lo que S(n) =
 * balance_after(n) para todo prefijo y la caché desnormalizada se
 * actualiza con el mismo valor antes del commit.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::parse_timestamp;
use crate::ControlPlaneDatabase;
use aviary_domain_billing::{validate_adjustment, AdjustmentKind, TRANSACTION_LIST_LIMIT_CAP};
use aviary_domain_models::{CreditTransaction, CreditTransactionType};
use chrono::{DateTime, Utc};
use libsql::{params, Row, Transaction};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "id, tenant_id, amount_cents, balance_after_cents, \
     transaction_type, description, reference_id, funding_source, attributed_user_id, created_at";

/// Filtro de paginación del historial (más reciente primero).
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub transaction_type: Option<CreditTransactionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Repositorio de autoridad única sobre el Ledger de créditos.
pub struct CreditRepository {
    database_client: ControlPlaneDatabase,
}

impl CreditRepository {
    #[must_use]
    pub fn new(database_client: ControlPlaneDatabase) -> Self {
        Self { database_client }
    }

    // --- ESTRATO DE MUTACIÓN NUCLEAR ---

    /**
     * Núcleo atómico del Ledger. Todo abono y débito converge aquí.
     *
     * # Errors:
     * - `DbError::InsufficientBalance`: delta negativo no autorizado que
     *   empujaría la suma corrida bajo cero. Porta el balance vigente.
     * - `DbError::TransactionError`: colapso del sellado multi-tabla.
     */
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, description, funding_source, attributed_user_id))]
    async fn append(
        &self,
        tenant_identifier: &str,
        signed_amount_cents: i64,
        transaction_type: CreditTransactionType,
        description: Option<&str>,
        reference_identifier: Option<&str>,
        funding_source: Option<&str>,
        attributed_user_id: Option<&str>,
        allow_negative: bool,
    ) -> Result<CreditTransaction, DbError> {
        let connection = self.database_client.get_connection()?;
        let atomic_append = connection.transaction().await.map_err(|_| DbError::TransactionError)?;

        // 1. GUARDIA DE IDEMPOTENCIA: una referencia repetida retorna la
        //    fila previa sin tocar el balance.
        if let Some(reference) = reference_identifier {
            if let Some(prior_row) = find_by_reference(&atomic_append, reference).await? {
                debug!("🔁 [LEDGER_REPLAY]: Reference [{}] already sealed. Returning prior row.", reference);
                atomic_append.commit().await.map_err(|_| DbError::TransactionError)?;
                return Ok(prior_row);
            }
        }

        // 2. SUMA CORRIDA VIGENTE
        let current_balance = read_balance(&atomic_append, tenant_identifier).await?;
        let balance_after = current_balance + signed_amount_cents;

        if signed_amount_cents < 0 && balance_after < 0 && !allow_negative {
            return Err(DbError::InsufficientBalance {
                current_balance_cents: current_balance,
            });
        }

        // 3. SELLADO DE LA FILA Y DE LA CACHÉ
        let transaction_identifier = Uuid::new_v4().to_string();
        let now = Utc::now();

        atomic_append
            .execute(
                "INSERT INTO credit_transactions (id, tenant_id, amount_cents, balance_after_cents, transaction_type, description, reference_id, funding_source, attributed_user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    transaction_identifier.clone(),
                    tenant_identifier,
                    signed_amount_cents,
                    balance_after,
                    transaction_type.as_str(),
                    description.map(|d| d.to_string()),
                    reference_identifier.map(|r| r.to_string()),
                    funding_source.map(|f| f.to_string()),
                    attributed_user_id.map(|a| a.to_string()),
                    now.to_rfc3339()
                ],
            )
            .await?;

        atomic_append
            .execute(
                "INSERT INTO credit_balances (tenant_id, balance_cents, last_updated) VALUES (?1, ?2, ?3)
                 ON CONFLICT(tenant_id) DO UPDATE SET balance_cents = excluded.balance_cents, last_updated = excluded.last_updated",
                params![tenant_identifier, balance_after, now.to_rfc3339()],
            )
            .await?;

        atomic_append.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "💳 [LEDGER_SEALED]: {} {} cents for tenant [{}] (balance {}).",
            transaction_type.as_str(),
            signed_amount_cents,
            tenant_identifier,
            balance_after
        );

        Ok(CreditTransaction {
            id: transaction_identifier,
            tenant_id: tenant_identifier.to_string(),
            amount_cents: signed_amount_cents,
            balance_after_cents: balance_after,
            transaction_type,
            description: description.map(|d| d.to_string()),
            reference_id: reference_identifier.map(|r| r.to_string()),
            funding_source: funding_source.map(|f| f.to_string()),
            attributed_user_id: attributed_user_id.map(|a| a.to_string()),
            created_at: now,
        })
    }

    /// Abono genérico (compras, dividendos, onboarding).
    pub async fn credit(
        &self,
        tenant_identifier: &str,
        amount_cents: i64,
        transaction_type: CreditTransactionType,
        description: Option<&str>,
        reference_identifier: Option<&str>,
        funding_source: Option<&str>,
    ) -> Result<CreditTransaction, DbError> {
        self.append(
            tenant_identifier,
            amount_cents,
            transaction_type,
            description,
            reference_identifier,
            funding_source,
            None,
            true,
        )
        .await
    }

    /// Débito de uso. Almacena el delta negativo; 'allow_negative' habilita
    /// la vía fire-and-forget del medidor de consumo.
    #[allow(clippy::too_many_arguments)]
    pub async fn debit(
        &self,
        tenant_identifier: &str,
        amount_cents: i64,
        transaction_type: CreditTransactionType,
        description: &str,
        reference_identifier: Option<&str>,
        allow_negative: bool,
        attributed_user_id: Option<&str>,
    ) -> Result<CreditTransaction, DbError> {
        self.append(
            tenant_identifier,
            -amount_cents.abs(),
            transaction_type,
            Some(description),
            reference_identifier,
            None,
            attributed_user_id,
            allow_negative,
        )
        .await
    }

    // --- ESTRATO ADMINISTRATIVO (GRANT / REFUND / CORRECTION) ---

    /// Abono administrativo. 'amount_cents > 0' y razón no vacía.
    pub async fn grant(
        &self,
        tenant_identifier: &str,
        amount_cents: i64,
        reason: &str,
        acting_admin: &str,
    ) -> Result<CreditTransaction, DbError> {
        let signed_delta = validate_adjustment(AdjustmentKind::Grant, amount_cents, reason)
            .map_err(|violation| DbError::MappingError(violation.to_string()))?;

        self.append(
            tenant_identifier,
            signed_delta,
            CreditTransactionType::Grant,
            Some(reason),
            None,
            None,
            Some(acting_admin),
            true,
        )
        .await
    }

    /// Reembolso administrativo. Almacenado negativo; falla si empuja el
    /// balance bajo cero. 'reference_ids' viaja serializado como JSON para
    /// los enlaces cruzados de auditoría.
    pub async fn refund(
        &self,
        tenant_identifier: &str,
        amount_cents: i64,
        reason: &str,
        acting_admin: &str,
        reference_ids: Option<&[String]>,
    ) -> Result<CreditTransaction, DbError> {
        let signed_delta = validate_adjustment(AdjustmentKind::Refund, amount_cents, reason)
            .map_err(|violation| DbError::MappingError(violation.to_string()))?;

        let serialized_references = match reference_ids {
            Some(references) if !references.is_empty() => Some(
                serde_json::to_string(references)
                    .map_err(|fault| DbError::MappingError(fault.to_string()))?,
            ),
            _ => None,
        };

        self.append(
            tenant_identifier,
            signed_delta,
            CreditTransactionType::Refund,
            Some(reason),
            serialized_references.as_deref(),
            None,
            Some(acting_admin),
            false,
        )
        .await
    }

    /// Corrección contable firmada. Cero permitido; si es negativa y
    /// empujaría el balance bajo cero, falla.
    pub async fn correction(
        &self,
        tenant_identifier: &str,
        amount_cents: i64,
        reason: &str,
        acting_admin: &str,
    ) -> Result<CreditTransaction, DbError> {
        let signed_delta = validate_adjustment(AdjustmentKind::Correction, amount_cents, reason)
            .map_err(|violation| DbError::MappingError(violation.to_string()))?;

        self.append(
            tenant_identifier,
            signed_delta,
            CreditTransactionType::Correction,
            Some(reason),
            None,
            None,
            Some(acting_admin),
            false,
        )
        .await
    }

    // --- ESTRATO DE LECTURA ---

    /// Balance vigente de la caché desnormalizada. Cero para desconocidos.
    pub async fn balance(&self, tenant_identifier: &str) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                "SELECT balance_cents FROM credit_balances WHERE tenant_id = ?1",
                params![tenant_identifier],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Ok(0),
        }
    }

    /// Verdad de referencia: existe alguna fila portando esa llave.
    pub async fn has_reference_id(&self, reference_identifier: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut query_results = connection
            .query(
                "SELECT 1 FROM credit_transactions WHERE reference_id = ?1 LIMIT 1",
                params![reference_identifier],
            )
            .await?;

        Ok(query_results.next().await?.is_some())
    }

    /// Historial paginado, más reciente primero. 'limit' capado en 250.
    pub async fn list_transactions(
        &self,
        tenant_identifier: &str,
        filter: &TransactionFilter,
    ) -> Result<(Vec<CreditTransaction>, u64), DbError> {
        let connection = self.database_client.get_connection()?;

        let effective_limit = filter
            .limit
            .unwrap_or(50)
            .min(TRANSACTION_LIST_LIMIT_CAP) as i64;
        let effective_offset = filter.offset.unwrap_or(0) as i64;

        let type_filter = filter.transaction_type.map(|t| t.as_str().to_string());
        let from_filter = filter.from.map(|t| t.to_rfc3339());
        let to_filter = filter.to.map(|t| t.to_rfc3339());

        let mut count_results = connection
            .query(
                "SELECT COUNT(*) FROM credit_transactions \
                 WHERE tenant_id = ?1 \
                   AND (?2 IS NULL OR transaction_type = ?2) \
                   AND (?3 IS NULL OR created_at >= ?3) \
                   AND (?4 IS NULL OR created_at <= ?4)",
                params![
                    tenant_identifier,
                    type_filter.clone(),
                    from_filter.clone(),
                    to_filter.clone()
                ],
            )
            .await?;

        let total: i64 = match count_results.next().await? {
            Some(data_row) => data_row.get(0)?,
            None => 0,
        };

        let mut page = Vec::new();
        let mut query_results = connection
            .query(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions \
                     WHERE tenant_id = ?1 \
                       AND (?2 IS NULL OR transaction_type = ?2) \
                       AND (?3 IS NULL OR created_at >= ?3) \
                       AND (?4 IS NULL OR created_at <= ?4) \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?5 OFFSET ?6"
                ),
                params![
                    tenant_identifier,
                    type_filter,
                    from_filter,
                    to_filter,
                    effective_limit,
                    effective_offset
                ],
            )
            .await?;

        while let Some(data_row) = query_results.next().await? {
            page.push(map_row_to_transaction(&data_row)?);
        }

        Ok((page, total as u64))
    }
}

async fn find_by_reference(
    atomic_context: &Transaction,
    reference_identifier: &str,
) -> Result<Option<CreditTransaction>, DbError> {
    let mut query_results = atomic_context
        .query(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM credit_transactions WHERE reference_id = ?1"),
            params![reference_identifier],
        )
        .await?;

    match query_results.next().await? {
        Some(data_row) => Ok(Some(map_row_to_transaction(&data_row)?)),
        None => Ok(None),
    }
}

async fn read_balance(atomic_context: &Transaction, tenant_identifier: &str) -> Result<i64, DbError> {
    let mut query_results = atomic_context
        .query(
            "SELECT balance_cents FROM credit_balances WHERE tenant_id = ?1",
            params![tenant_identifier],
        )
        .await?;

    match query_results.next().await? {
        Some(data_row) => Ok(data_row.get(0)?),
        None => Ok(0),
    }
}

fn map_row_to_transaction(data_row: &Row) -> Result<CreditTransaction, DbError> {
    let raw_type: String = data_row.get(4)?;
    let transaction_type = CreditTransactionType::parse(&raw_type)
        .ok_or_else(|| DbError::MappingError(format!("LEDGER_TYPE_DRIFT: {}", raw_type)))?;

    Ok(CreditTransaction {
        id: data_row.get(0)?,
        tenant_id: data_row.get(1)?,
        amount_cents: data_row.get(2)?,
        balance_after_cents: data_row.get(3)?,
        transaction_type,
        description: data_row.get::<String>(5).ok(),
        reference_id: data_row.get::<String>(6).ok(),
        funding_source: data_row.get::<String>(7).ok(),
        attributed_user_id: data_row.get::<String>(8).ok(),
        created_at: parse_timestamp(&data_row.get::<String>(9)?)?,
    })
}
