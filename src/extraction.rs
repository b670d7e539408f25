//! Credit report extraction pipeline.
//!
//! 1. Decode the uploaded bytes into a [`RawNode`] tree
//! 2. Extract identity, summary and accounts independently
//! 3. Assemble the sections into a [`CreditReportRecord`]
//!
//! Only decoding can fail the pipeline. Each section runs behind its own
//! error boundary: an unexpected shape inside one section replaces that
//! section with its defaults and leaves the other two untouched.
use crate::coerce::{join_parts, to_integer, to_non_negative, to_trimmed_string};
use crate::locator::{locate, FieldSpec, Repeated};
use crate::models::{
    CreditAccount, CreditReportRecord, ExtractedIdentity, ReportSection, ReportSummary,
};
use crate::xml_tree::{decode, DecodeError, RawNode, ATTRIBUTES_KEY, TEXT_KEY};
use thiserror::Error;

// ============ Field Tables ============

pub const FIRST_NAME: FieldSpec = FieldSpec {
    name: "first_name",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Account_DETAILS",
            "CAIS_Holder_Details",
            "First_Name_Non_Normalized",
        ],
        &[
            "INProfileResponse",
            "Current_Application",
            "Current_Application_Details",
            "Current_Applicant_Details",
            "First_Name",
        ],
    ],
};

pub const LAST_NAME: FieldSpec = FieldSpec {
    name: "last_name",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Account_DETAILS",
            "CAIS_Holder_Details",
            "Surname_Non_Normalized",
        ],
        &[
            "INProfileResponse",
            "Current_Application",
            "Current_Application_Details",
            "Current_Applicant_Details",
            "Last_Name",
        ],
    ],
};

// Applicant details take priority for the phone, holder details for the PAN.
pub const MOBILE_PHONE: FieldSpec = FieldSpec {
    name: "mobile_phone",
    paths: &[
        &[
            "INProfileResponse",
            "Current_Application",
            "Current_Application_Details",
            "Current_Applicant_Details",
            "MobilePhoneNumber",
        ],
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Account_DETAILS",
            "CAIS_Holder_Details",
            "Mobile_Telephone_Number",
        ],
    ],
};

pub const PAN: FieldSpec = FieldSpec {
    name: "pan",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Account_DETAILS",
            "CAIS_Holder_Details",
            "Income_TAX_PAN",
        ],
        &[
            "INProfileResponse",
            "Current_Application",
            "Current_Application_Details",
            "Current_Applicant_Details",
            "IncomeTaxPan",
        ],
    ],
};

pub const BUREAU_SCORE: FieldSpec = FieldSpec {
    name: "bureau_score",
    paths: &[&["INProfileResponse", "SCORE", "BureauScore"]],
};

pub const TOTAL_ACCOUNTS: FieldSpec = FieldSpec {
    name: "total_accounts",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Summary",
            "Credit_Account",
            "CreditAccountTotal",
        ],
    ],
};

pub const ACTIVE_ACCOUNTS: FieldSpec = FieldSpec {
    name: "active_accounts",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Summary",
            "Credit_Account",
            "CreditAccountActive",
        ],
    ],
};

pub const CLOSED_ACCOUNTS: FieldSpec = FieldSpec {
    name: "closed_accounts",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Summary",
            "Credit_Account",
            "CreditAccountClosed",
        ],
    ],
};

pub const CURRENT_BALANCE_AMOUNT: FieldSpec = FieldSpec {
    name: "current_balance_amount",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Summary",
            "Total_Outstanding_Balance",
            "Outstanding_Balance_All",
        ],
    ],
};

pub const SECURED_ACCOUNTS_AMOUNT: FieldSpec = FieldSpec {
    name: "secured_accounts_amount",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Summary",
            "Total_Outstanding_Balance",
            "Outstanding_Balance_Secured",
        ],
    ],
};

pub const UNSECURED_ACCOUNTS_AMOUNT: FieldSpec = FieldSpec {
    name: "unsecured_accounts_amount",
    paths: &[
        &[
            "INProfileResponse",
            "CAIS_Account",
            "CAIS_Summary",
            "Total_Outstanding_Balance",
            "Outstanding_Balance_UnSecured",
        ],
    ],
};

pub const LAST_7_DAYS_ENQUIRIES: FieldSpec = FieldSpec {
    name: "last_7_days_enquiries",
    paths: &[&["INProfileResponse", "TotalCAPS_Summary", "TotalCAPSLast7Days"]],
};

/// The repeated per-account block.
pub const ACCOUNT_DETAILS_PATH: &[&str] =
    &["INProfileResponse", "CAIS_Account", "CAIS_Account_DETAILS"];

// Relative to one account block.
const ACCOUNT_TYPE: FieldSpec = FieldSpec {
    name: "Account_Type",
    paths: &[&["Account_Type"]],
};

const SUBSCRIBER_NAME: FieldSpec = FieldSpec {
    name: "Subscriber_Name",
    paths: &[&["Subscriber_Name"]],
};

const ACCOUNT_NUMBER: FieldSpec = FieldSpec {
    name: "Account_Number",
    paths: &[&["Account_Number"]],
};

const AMOUNT_PAST_DUE: FieldSpec = FieldSpec {
    name: "Amount_Past_Due",
    paths: &[&["Amount_Past_Due"]],
};

const CURRENT_BALANCE: FieldSpec = FieldSpec {
    name: "Current_Balance",
    paths: &[&["Current_Balance"]],
};
const HOLDER_ADDRESS: &str = "CAIS_Holder_Address_Details";

/// Address sub-fields in the order they are joined.
pub const ADDRESS_PARTS: [&str; 6] = [
    "First_Line_Of_Address_non_normalized",
    "Second_Line_Of_Address_non_normalized",
    "Third_Line_Of_Address_non_normalized",
    "City_non_normalized",
    "State_non_normalized",
    "ZIP_Postal_Code_non_normalized",
];

// ============ Section Errors ============

/// A section of the tree that does not have the shape extraction expects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SectionError {
    #[error("`{field}` should contain child elements, found {found}")]
    ExpectedContainer {
        field: &'static str,
        found: &'static str,
    },
    #[error("`{field}` should be a text value, found {found}")]
    ExpectedText {
        field: &'static str,
        found: &'static str,
    },
}

fn describe(node: &RawNode) -> &'static str {
    match node {
        RawNode::Text(_) => "text",
        RawNode::Map(_) => "nested elements",
        RawNode::List(_) => "a repeated element",
    }
}

/// Text of a leaf. An element carrying only attributes and text counts as a leaf.
fn leaf_text<'a>(
    field: &'static str,
    node: Option<&'a RawNode>,
) -> Result<Option<&'a str>, SectionError> {
    match node {
        None => Ok(None),
        Some(RawNode::Text(text)) => Ok(Some(text)),
        Some(RawNode::Map(map))
            if map.keys().all(|key| key == TEXT_KEY || key == ATTRIBUTES_KEY) =>
        {
            Ok(map.get(TEXT_KEY).and_then(RawNode::as_text))
        }
        Some(other) => Err(SectionError::ExpectedText {
            field,
            found: describe(other),
        }),
    }
}

fn field_text<'a>(spec: &FieldSpec, node: &'a RawNode) -> Result<Option<&'a str>, SectionError> {
    leaf_text(spec.name, spec.resolve(node))
}

/// A node that must hold child elements; blank text is an empty element.
fn container<'a>(
    field: &'static str,
    node: Option<&'a RawNode>,
) -> Result<Option<&'a RawNode>, SectionError> {
    match node {
        None => Ok(None),
        Some(node) if node.is_blank() => Ok(None),
        Some(node @ RawNode::Map(_)) => Ok(Some(node)),
        Some(other) => Err(SectionError::ExpectedContainer {
            field,
            found: describe(other),
        }),
    }
}

// ============ Section Extractors ============

fn try_extract_identity(tree: &RawNode) -> Result<ExtractedIdentity, SectionError> {
    let first_name = field_text(&FIRST_NAME, tree)?.unwrap_or_default();
    let last_name = field_text(&LAST_NAME, tree)?.unwrap_or_default();

    Ok(ExtractedIdentity {
        name: format!("{} {}", first_name, last_name).trim().to_string(),
        mobile_phone: field_text(&MOBILE_PHONE, tree)?
            .unwrap_or_default()
            .to_string(),
        pan: field_text(&PAN, tree)?.unwrap_or_default().to_string(),
        credit_score: to_integer(field_text(&BUREAU_SCORE, tree)?),
    })
}

fn try_extract_summary(tree: &RawNode) -> Result<ReportSummary, SectionError> {
    let amount = |spec: &FieldSpec| field_text(spec, tree).map(to_non_negative);

    Ok(ReportSummary {
        total_accounts: amount(&TOTAL_ACCOUNTS)?,
        active_accounts: amount(&ACTIVE_ACCOUNTS)?,
        closed_accounts: amount(&CLOSED_ACCOUNTS)?,
        current_balance_amount: amount(&CURRENT_BALANCE_AMOUNT)?,
        secured_accounts_amount: amount(&SECURED_ACCOUNTS_AMOUNT)?,
        unsecured_accounts_amount: amount(&UNSECURED_ACCOUNTS_AMOUNT)?,
        last_7_days_enquiries: amount(&LAST_7_DAYS_ENQUIRIES)?,
    })
}

fn try_extract_accounts(tree: &RawNode) -> Result<Vec<CreditAccount>, SectionError> {
    let details = Repeated::of(locate(tree, ACCOUNT_DETAILS_PATH));

    let mut accounts = Vec::new();
    for node in details.into_nodes() {
        // Blank entries are empty `<CAIS_Account_DETAILS/>` elements.
        if let Some(account) = container("CAIS_Account_DETAILS", Some(node))? {
            accounts.push(account_from_node(account)?);
        }
    }
    Ok(accounts)
}

fn account_from_node(account: &RawNode) -> Result<CreditAccount, SectionError> {
    Ok(CreditAccount {
        credit_card_type: field_text(&ACCOUNT_TYPE, account)?
            .unwrap_or_default()
            .to_string(),
        bank_name: to_trimmed_string(field_text(&SUBSCRIBER_NAME, account)?),
        address: holder_address(account)?,
        account_number: field_text(&ACCOUNT_NUMBER, account)?
            .unwrap_or_default()
            .to_string(),
        amount_overdue: to_non_negative(field_text(&AMOUNT_PAST_DUE, account)?),
        current_balance: to_non_negative(field_text(&CURRENT_BALANCE, account)?),
    })
}

fn holder_address(account: &RawNode) -> Result<String, SectionError> {
    let Some(address) = container(HOLDER_ADDRESS, account.get(HOLDER_ADDRESS))? else {
        return Ok(String::new());
    };

    let mut parts = Vec::with_capacity(ADDRESS_PARTS.len());
    for field in ADDRESS_PARTS {
        parts.push(leaf_text(field, address.get(field))?);
    }
    Ok(join_parts(&parts))
}

/// Run a section extractor behind its own error boundary.
///
/// Returns the section value, or its defaults when the section's shape was
/// unexpected, together with whether the fallback was taken.
fn within_boundary<T: Default>(
    section: ReportSection,
    result: Result<T, SectionError>,
) -> (T, bool) {
    match result {
        Ok(value) => (value, false),
        Err(e) => {
            tracing::warn!("Falling back to defaults for {} section: {}", section, e);
            (T::default(), true)
        }
    }
}

/// Identity and bureau score; empty strings and a zero score on failure.
pub fn extract_identity(tree: &RawNode) -> ExtractedIdentity {
    within_boundary(ReportSection::Identity, try_extract_identity(tree)).0
}

/// Summary figures; all zeros on failure.
pub fn extract_summary(tree: &RawNode) -> ReportSummary {
    within_boundary(ReportSection::Summary, try_extract_summary(tree)).0
}

/// Every account block in document order; empty on failure.
pub fn extract_accounts(tree: &RawNode) -> Vec<CreditAccount> {
    within_boundary(ReportSection::Accounts, try_extract_accounts(tree)).0
}

/// The three sections of one report plus the sections that fell back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSections {
    pub identity: ExtractedIdentity,
    pub summary: ReportSummary,
    pub accounts: Vec<CreditAccount>,
    pub degraded: Vec<ReportSection>,
}

pub fn extract_sections(tree: &RawNode) -> ExtractedSections {
    let mut degraded = Vec::new();

    let (identity, failed) = within_boundary(ReportSection::Identity, try_extract_identity(tree));
    if failed {
        degraded.push(ReportSection::Identity);
    }
    let (summary, failed) = within_boundary(ReportSection::Summary, try_extract_summary(tree));
    if failed {
        degraded.push(ReportSection::Summary);
    }
    let (accounts, failed) = within_boundary(ReportSection::Accounts, try_extract_accounts(tree));
    if failed {
        degraded.push(ReportSection::Accounts);
    }

    ExtractedSections {
        identity,
        summary,
        accounts,
        degraded,
    }
}

/// Extract and assemble a record from an already decoded tree.
pub fn assemble_from_tree(tree: &RawNode, file_name: &str) -> CreditReportRecord {
    let sections = extract_sections(tree);
    let mut record = CreditReportRecord::assemble(
        sections.identity,
        sections.summary,
        sections.accounts,
        file_name,
    );
    record.degraded_sections = sections.degraded;
    record
}

/// Decode `bytes` and extract a full report record.
///
/// Only malformed XML fails; every other problem is absorbed into defaults.
pub fn extract_credit_report(
    bytes: &[u8],
    file_name: &str,
) -> Result<CreditReportRecord, DecodeError> {
    let tree = decode(bytes)?;
    let record = assemble_from_tree(&tree, file_name);

    tracing::debug!(
        "Extracted report from {}: score={}, accounts={}, degraded={:?}",
        file_name,
        record.identity.credit_score,
        record.credit_accounts.len(),
        record.degraded_sections
    );

    Ok(record)
}
