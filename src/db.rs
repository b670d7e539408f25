use sqlx::{postgres::PgPoolOptions, PgPool};

/// Statements creating the report table and its lookup indices.
///
/// Idempotent; there is no versioned migration history.
pub const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS credit_reports (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL CHECK (btrim(name) <> ''),
        mobile_phone TEXT NOT NULL DEFAULT '',
        pan TEXT NOT NULL DEFAULT '',
        credit_score BIGINT NOT NULL DEFAULT 0,
        total_accounts BIGINT NOT NULL DEFAULT 0,
        active_accounts BIGINT NOT NULL DEFAULT 0,
        closed_accounts BIGINT NOT NULL DEFAULT 0,
        current_balance_amount BIGINT NOT NULL DEFAULT 0,
        secured_accounts_amount BIGINT NOT NULL DEFAULT 0,
        unsecured_accounts_amount BIGINT NOT NULL DEFAULT 0,
        last_7_days_enquiries BIGINT NOT NULL DEFAULT 0,
        credit_accounts JSONB NOT NULL DEFAULT '[]'::jsonb,
        source_file_name TEXT NOT NULL,
        content_sha256 TEXT NOT NULL,
        degraded_sections TEXT[] NOT NULL DEFAULT '{}',
        uploaded_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS credit_reports_pan_idx ON credit_reports (pan)",
    "CREATE INDEX IF NOT EXISTS credit_reports_mobile_phone_idx ON credit_reports (mobile_phone)",
    "CREATE INDEX IF NOT EXISTS credit_reports_uploaded_at_idx ON credit_reports (uploaded_at DESC)",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create the report table and indices if they do not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Report schema ready");
        Ok(())
    }
}
