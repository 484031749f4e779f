use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tax identifier
// ---------------------------------------------------------------------------

/// Normalized tax identifier (INN). The business key of the registry.
///
/// Stored as the observed digit string so leading zeros survive. Numeric
/// spreadsheet cells come back as `7704726225.0`; the trailing `.0` is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxIdError {
    Empty,
    NonNumeric(String),
}

impl fmt::Display for TaxIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "tax id is empty"),
            Self::NonNumeric(raw) => write!(f, "tax id '{raw}' is not numeric"),
        }
    }
}

impl std::error::Error for TaxIdError {}

impl TaxId {
    pub fn parse(raw: &str) -> Result<Self, TaxIdError> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(TaxIdError::Empty);
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TaxIdError::NonNumeric(raw.to_string()));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl TryFrom<String> for TaxId {
    type Error = TaxIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaxId> for String {
    fn from(id: TaxId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Legal status
// ---------------------------------------------------------------------------

pub const UNKNOWN_LABEL: &str = "Неизвестно";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Active,
    Liquidating,
    Liquidated,
    Bankrupt,
    Reorganizing,
    Unknown,
}

impl CompanyStatus {
    pub const ALL: [CompanyStatus; 6] = [
        Self::Active,
        Self::Liquidating,
        Self::Liquidated,
        Self::Bankrupt,
        Self::Reorganizing,
        Self::Unknown,
    ];

    /// Map a lookup-service status code. Anything unrecognized is `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "ACTIVE" => Self::Active,
            "LIQUIDATING" => Self::Liquidating,
            "LIQUIDATED" => Self::Liquidated,
            "BANKRUPT" => Self::Bankrupt,
            "REORGANIZING" => Self::Reorganizing,
            _ => Self::Unknown,
        }
    }

    /// Locale label as persisted in the registry file.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "Действующая",
            Self::Liquidating => "Ликвидируется",
            Self::Liquidated => "Ликвидирована",
            Self::Bankrupt => "Банкротство",
            Self::Reorganizing => {
                "В процессе присоединения к другому юрлицу, с последующей ликвидацией"
            }
            Self::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.label() == label)
            .unwrap_or(Self::Unknown)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Legal names
// ---------------------------------------------------------------------------

/// Canonical name from the lookup service, or the unknown sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalName {
    Known(String),
    #[default]
    Unknown,
}

impl LegalName {
    pub fn from_option(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(s) if !s.is_empty() => Self::Known(s.to_string()),
            _ => Self::Unknown,
        }
    }

    /// Parse a persisted cell. Empty and the sentinel label are both `Unknown`.
    pub fn from_cell(cell: &str) -> Self {
        let cell = cell.trim();
        if cell == UNKNOWN_LABEL {
            Self::Unknown
        } else {
            Self::from_option(Some(cell))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(name) => name,
            Self::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for LegalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Folder dates
// ---------------------------------------------------------------------------

pub const ABSENT_LABEL: &str = "Отсутствует";
pub const FOLDER_DATE_FORMAT: &str = "%d.%m.%Y";

/// One of the two freshness dates, or the "Absent" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderDate {
    Date(NaiveDate),
    Absent,
}

impl FolderDate {
    /// Parse the persisted form (`DD.MM.YYYY` or `Отсутствует`).
    /// Returns `None` for anything else, including an empty cell.
    pub fn parse_cell(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if cell == ABSENT_LABEL {
            return Some(Self::Absent);
        }
        NaiveDate::parse_from_str(cell, FOLDER_DATE_FORMAT)
            .ok()
            .map(Self::Date)
    }

    pub fn from_option(date: Option<NaiveDate>) -> Self {
        date.map(Self::Date).unwrap_or(Self::Absent)
    }
}

impl fmt::Display for FolderDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format(FOLDER_DATE_FORMAT)),
            Self::Absent => f.write_str(ABSENT_LABEL),
        }
    }
}

/// Display helper for an optional date cell; unset cells render empty.
pub fn display_folder_date(date: &Option<FolderDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub const CHECKED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One tracked company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Assigned once on first observation, never changed.
    pub sequence_number: u32,
    pub tax_id: TaxId,
    /// Name as observed on the source portal.
    pub display_name: String,
    pub status: CompanyStatus,
    pub status_checked_at: Option<NaiveDateTime>,
    pub legal_name_short: LegalName,
    pub legal_name_full: LegalName,
    pub extracted_name: String,
    /// `None` until the first freshness pass writes the cell.
    pub folder_latest_date: Option<FolderDate>,
    pub folder_prior_date: Option<FolderDate>,
    /// Link maintained by hand in the published sheet.
    pub remote_url: String,
    pub is_new: bool,
}

impl CompanyRecord {
    /// A freshly observed company. Starts `Active` until the first status pass.
    pub fn new(sequence_number: u32, tax_id: TaxId, display_name: impl Into<String>) -> Self {
        Self {
            sequence_number,
            tax_id,
            display_name: display_name.into(),
            status: CompanyStatus::Active,
            status_checked_at: None,
            legal_name_short: LegalName::Unknown,
            legal_name_full: LegalName::Unknown,
            extracted_name: String::new(),
            folder_latest_date: None,
            folder_prior_date: None,
            remote_url: String::new(),
            is_new: true,
        }
    }

    pub fn is_inactive_highlighted(&self) -> bool {
        !self.status.is_active()
    }

    /// Name used for the document folder: the extracted name, or the
    /// observed name until one has been extracted.
    pub fn folder_name(&self) -> &str {
        if self.extracted_name.trim().is_empty() {
            &self.display_name
        } else {
            &self.extracted_name
        }
    }
}

/// A raw `{name, inn}` pair produced by the scrape adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub name: String,
    pub tax_id: String,
}

impl Observation {
    pub fn new(name: impl Into<String>, tax_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tax_id: tax_id.into(),
        }
    }
}
