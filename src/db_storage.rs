use crate::errors::{AppError, ResultExt};
use crate::models::{CreditReportRecord, ReportStats, StoredReport};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const REPORT_COLUMNS: &str = r#"
    id, name, mobile_phone, pan, credit_score,
    total_accounts, active_accounts, closed_accounts,
    current_balance_amount, secured_accounts_amount, unsecured_accounts_amount,
    last_7_days_enquiries, credit_accounts, source_file_name, content_sha256,
    degraded_sections, uploaded_at, created_at, updated_at
"#;

/// Database storage service for extracted credit reports
#[derive(Clone)]
pub struct ReportStorage {
    pool: PgPool,
}

impl ReportStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist an extracted report.
    ///
    /// A report without a holder name is rejected: the rest of the record
    /// may be partially defaulted, but the name is what identifies it.
    pub async fn insert(
        &self,
        record: &CreditReportRecord,
        content_sha256: &str,
    ) -> Result<StoredReport, AppError> {
        if record.identity.name.trim().is_empty() {
            return Err(AppError::Unprocessable(
                "Report is missing the account holder name".to_string(),
            ));
        }

        let degraded: Vec<String> = record
            .degraded_sections
            .iter()
            .map(|section| section.as_str().to_string())
            .collect();

        let query = format!(
            r#"
            INSERT INTO credit_reports (
                id, name, mobile_phone, pan, credit_score,
                total_accounts, active_accounts, closed_accounts,
                current_balance_amount, secured_accounts_amount, unsecured_accounts_amount,
                last_7_days_enquiries, credit_accounts, source_file_name, content_sha256,
                degraded_sections, uploaded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );

        let stored = sqlx::query_as::<_, StoredReport>(&query)
            .bind(Uuid::new_v4())
            .bind(&record.identity.name)
            .bind(&record.identity.mobile_phone)
            .bind(&record.identity.pan)
            .bind(record.identity.credit_score)
            .bind(record.summary.total_accounts)
            .bind(record.summary.active_accounts)
            .bind(record.summary.closed_accounts)
            .bind(record.summary.current_balance_amount)
            .bind(record.summary.secured_accounts_amount)
            .bind(record.summary.unsecured_accounts_amount)
            .bind(record.summary.last_7_days_enquiries)
            .bind(Json(&record.credit_accounts))
            .bind(&record.source_file_name)
            .bind(content_sha256)
            .bind(&degraded)
            .bind(record.uploaded_at)
            .fetch_one(&self.pool)
            .await
            .context("Failed to store credit report")?;

        tracing::info!(
            "Stored credit report {} from {} ({} accounts)",
            stored.id,
            stored.source_file_name,
            stored.credit_accounts.len()
        );

        Ok(stored)
    }

    /// Newest reports first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<StoredReport>, AppError> {
        let query = format!(
            "SELECT {} FROM credit_reports ORDER BY uploaded_at DESC LIMIT $1",
            REPORT_COLUMNS
        );
        sqlx::query_as::<_, StoredReport>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list credit reports")
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredReport>, AppError> {
        let query = format!("SELECT {} FROM credit_reports WHERE id = $1", REPORT_COLUMNS);
        sqlx::query_as::<_, StoredReport>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load credit report {}", id))
    }

    /// Most recently uploaded report for a PAN.
    pub async fn find_latest_by_pan(&self, pan: &str) -> Result<Option<StoredReport>, AppError> {
        self.find_latest_by("pan", pan).await
    }

    /// Most recently uploaded report for a mobile number.
    pub async fn find_latest_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<StoredReport>, AppError> {
        self.find_latest_by("mobile_phone", phone).await
    }

    // `column` is always one of the fixed names above, never user input.
    async fn find_latest_by(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<StoredReport>, AppError> {
        let query = format!(
            "SELECT {} FROM credit_reports WHERE {} = $1 ORDER BY uploaded_at DESC LIMIT 1",
            REPORT_COLUMNS, column
        );
        sqlx::query_as::<_, StoredReport>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to search credit reports by {}", column))
    }

    /// Delete a report, returning the removed row if it existed.
    pub async fn delete(&self, id: Uuid) -> Result<Option<StoredReport>, AppError> {
        let query = format!(
            "DELETE FROM credit_reports WHERE id = $1 RETURNING {}",
            REPORT_COLUMNS
        );
        let deleted = sqlx::query_as::<_, StoredReport>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to delete credit report {}", id))?;

        if deleted.is_some() {
            tracing::info!("Deleted credit report {}", id);
        }
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<ReportStats, AppError> {
        sqlx::query_as::<_, ReportStats>(
            r#"
            SELECT
                COUNT(*)::BIGINT AS total_reports,
                COALESCE(AVG(credit_score), 0)::FLOAT8 AS avg_credit_score,
                COALESCE(AVG(current_balance_amount), 0)::FLOAT8 AS avg_outstanding_balance
            FROM credit_reports
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute report statistics")
    }
}
