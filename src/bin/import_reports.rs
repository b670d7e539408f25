//! Bulk import every `*.xml` report in a directory into the database.
//!
//! Usage: `import_reports <directory>`. Reads `DATABASE_URL` like the server.
//! A file that fails to decode or store is logged and skipped.

use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;

use credit_report_api::db::Database;
use credit_report_api::db_storage::ReportStorage;
use credit_report_api::extraction::extract_credit_report;
use credit_report_api::handlers::is_xml_file_name;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: import_reports <directory>"))?;

    let database_url = env::var("DATABASE_URL")
        .or_else(|_| env::var("DB_URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL or DB_URL must be set"))?;
    let db = Database::new(&database_url).await?;
    let storage = ReportStorage::new(db.pool.clone());

    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|name| is_xml_file_name(&name.to_string_lossy()))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();

    let total = files.len();
    tracing::info!("Found {} XML reports in {}", total, dir.display());

    let mut imported = 0;
    let mut failed = 0;

    for path in files {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to read {}: {}", path.display(), e);
                failed += 1;
                continue;
            }
        };
        let content_sha256 = hex::encode(Sha256::digest(&bytes));

        let record = match extract_credit_report(&bytes, &file_name) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Skipping {}: {}", file_name, e);
                failed += 1;
                continue;
            }
        };

        match storage.insert(&record, &content_sha256).await {
            Ok(stored) => {
                tracing::info!("Imported {} as {}", file_name, stored.id);
                imported += 1;
            }
            Err(e) => {
                tracing::error!("Failed to store {}: {}", file_name, e);
                failed += 1;
            }
        }
    }

    tracing::info!(
        "Import finished: {} of {} reports imported, {} failed",
        imported,
        total,
        failed
    );

    Ok(())
}
