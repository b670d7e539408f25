use std::env;

use credit_report_api::data::db_storage::ReportStorage;
use credit_report_api::db::Database;
use credit_report_api::extraction::extract_credit_report;

const REPORT: &str = "<INProfileResponse>\
    <Current_Application><Current_Application_Details><Current_Applicant_Details>\
        <First_Name>Storage</First_Name><Last_Name>Smoke</Last_Name>\
        <MobilePhoneNumber>{phone}</MobilePhoneNumber>\
        <IncomeTaxPan>{pan}</IncomeTaxPan>\
    </Current_Applicant_Details></Current_Application_Details></Current_Application>\
    <CAIS_Account><CAIS_Summary><Total_Outstanding_Balance>\
        <Outstanding_Balance_All>1000</Outstanding_Balance_All>\
    </Total_Outstanding_Balance></CAIS_Summary>\
    <CAIS_Account_DETAILS><Account_Number>SMOKE-1</Account_Number>\
        <Subscriber_Name>Test Bank</Subscriber_Name><Current_Balance>1000</Current_Balance>\
    </CAIS_Account_DETAILS></CAIS_Account>\
    <SCORE><BureauScore>742</BureauScore></SCORE>\
    </INProfileResponse>";

/// Integration smoke test for report storage: insert, lookups, stats, delete.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn store_and_query_report_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let storage = ReportStorage::new(db.pool.clone());

    // Unique identifiers so repeated runs do not collide on lookups.
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let pan = format!("SMK{}", &suffix[..7]).to_uppercase();
    let phone = format!("9{}", uuid::Uuid::new_v4().as_u128() % 1_000_000_000);
    let xml = REPORT.replace("{pan}", &pan).replace("{phone}", &phone);

    let record = extract_credit_report(xml.as_bytes(), "smoke.xml")?;
    let stored = storage
        .insert(&record, "0000")
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    assert_eq!(stored.name, "Storage Smoke");
    assert_eq!(stored.credit_score, 742);
    assert_eq!(stored.credit_accounts.len(), 1);
    assert_eq!(stored.credit_accounts[0].bank_name, "Test Bank");

    let by_pan = storage
        .find_latest_by_pan(&pan)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(by_pan.map(|r| r.id), Some(stored.id));

    let by_phone = storage
        .find_latest_by_phone(&phone)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(by_phone.map(|r| r.id), Some(stored.id));

    let stats = storage
        .stats()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(stats.total_reports >= 1);

    let deleted = storage
        .delete(stored.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(deleted.is_some());
    assert!(storage
        .find_by_id(stored.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .is_none());

    Ok(())
}
