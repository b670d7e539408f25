use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Extracted Sections ============

/// Identity and score of the report holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIdentity {
    /// First and last name joined by a single space.
    pub name: String,
    pub mobile_phone: String,
    /// Tax identifier, stored verbatim.
    pub pan: String,
    /// Bureau score, 0 when missing or unparseable.
    pub credit_score: i64,
}

/// Aggregate account figures from the summary blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_accounts: i64,
    pub active_accounts: i64,
    pub closed_accounts: i64,
    pub current_balance_amount: i64,
    pub secured_accounts_amount: i64,
    pub unsecured_accounts_amount: i64,
    #[serde(rename = "last7DaysEnquiries")]
    pub last_7_days_enquiries: i64,
}

/// One credit account. Embedded in its report, never stored on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAccount {
    pub credit_card_type: String,
    pub bank_name: String,
    /// Holder address lines, city, state and postal code joined by `", "`.
    pub address: String,
    pub account_number: String,
    pub amount_overdue: i64,
    pub current_balance: i64,
}

/// Report sections that are extracted independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSection {
    Identity,
    Summary,
    Accounts,
}

impl ReportSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSection::Identity => "identity",
            ReportSection::Summary => "summary",
            ReportSection::Accounts => "accounts",
        }
    }
}

impl std::fmt::Display for ReportSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Assembled Report ============

/// A fully extracted report, ready to be handed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditReportRecord {
    #[serde(flatten)]
    pub identity: ExtractedIdentity,
    #[serde(flatten)]
    pub summary: ReportSummary,
    pub credit_accounts: Vec<CreditAccount>,
    /// Original upload name, kept as a label only.
    pub source_file_name: String,
    pub uploaded_at: DateTime<Utc>,
    /// Sections whose shape was unexpected and which fell back to defaults.
    pub degraded_sections: Vec<ReportSection>,
}

impl CreditReportRecord {
    /// Merge the section outputs into one record stamped with the current time.
    ///
    /// No validation happens here; a blank `name` is rejected by storage.
    pub fn assemble(
        identity: ExtractedIdentity,
        summary: ReportSummary,
        credit_accounts: Vec<CreditAccount>,
        source_file_name: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            summary,
            credit_accounts,
            source_file_name: source_file_name.into(),
            uploaded_at: Utc::now(),
            degraded_sections: Vec::new(),
        }
    }
}

// ============ Database Models ============

/// A report row in `credit_reports`.
///
/// Serialized in the shape the dashboard reads: camelCase with the id under `_id`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub mobile_phone: String,
    pub pan: String,
    pub credit_score: i64,
    pub total_accounts: i64,
    pub active_accounts: i64,
    pub closed_accounts: i64,
    pub current_balance_amount: i64,
    pub secured_accounts_amount: i64,
    pub unsecured_accounts_amount: i64,
    #[serde(rename = "last7DaysEnquiries")]
    pub last_7_days_enquiries: i64,
    #[sqlx(json)]
    pub credit_accounts: Vec<CreditAccount>,
    pub source_file_name: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub content_sha256: String,
    pub degraded_sections: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate figures over all stored reports.
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub total_reports: i64,
    pub avg_credit_score: f64,
    pub avg_outstanding_balance: f64,
}

// ============ API Response Models ============

/// Success envelope shared by all report endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            count: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            count: None,
            data,
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn list(data: Vec<T>) -> Self {
        Self {
            success: true,
            message: None,
            count: Some(data.len()),
            data,
        }
    }
}
