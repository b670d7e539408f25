//! Extract one XML credit report offline and print the record as JSON.
//!
//! Usage: `extract_report <report.xml>`

use std::env;
use std::path::Path;

use credit_report_api::extraction::extract_credit_report;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credit_report_api=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: extract_report <report.xml>"))?;
    let path = Path::new(&path);

    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let record = extract_credit_report(&bytes, &file_name)?;
    if !record.degraded_sections.is_empty() {
        tracing::warn!("Sections defaulted: {:?}", record.degraded_sections);
    }

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
