// Registry Store: the companies workbook
//
// One sheet, header in row 1, one company per row from row 2. Cell fills are
// derived from record fields at save time and ignored on load.

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use iprtrack_core::model::CHECKED_AT_FORMAT;
use iprtrack_core::{CompanyRecord, CompanyStatus, FolderDate, LegalName, TaxId};
use iprtrack_recon::Registry;
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use tracing::{debug, info, warn};

use crate::backup;
use crate::error::StoreError;

pub const SHEET_NAME: &str = "Sheet1";

/// Column order of the registry sheet.
pub const HEADERS: [&str; 13] = [
    "№",
    "GOSUSLUGI_NAME",
    "INN",
    "STATUS",
    "LAST_CHECK_TIMESTAMP",
    "",
    "SHORT_NAME",
    "FULL_NAME",
    "EXTRACTED_NAME",
    "FOLDER_LATEST_DATE",
    "FOLDER_PRIOR_DATE",
    "URL",
    "MARKER",
];

const COL_SEQ: usize = 0;
const COL_SEQ_LABEL: &str = "A (№)";
const COL_INN_LABEL: &str = "C (INN)";
const COL_NAME: usize = 1;
const COL_INN: usize = 2;
const COL_STATUS: usize = 3;
const COL_CHECKED_AT: usize = 4;
const COL_SHORT: usize = 6;
const COL_FULL: usize = 7;
const COL_EXTRACTED: usize = 8;
const COL_LATEST: usize = 9;
const COL_PRIOR: usize = 10;
const COL_URL: usize = 11;
const COL_MARKER: usize = 12;

/// Marker cell value for records first seen in the latest reconciliation.
pub const NEW_MARKER: &str = "NEW";

const NEW_FILL: u32 = 0x00FF00;
const INACTIVE_FILL: u32 = 0xFF0000;

/// The registry workbook on disk plus its backup directory.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
    backup_dir: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Load the registry. A missing file is an empty registry.
    pub fn load(&self) -> Result<Registry, StoreError> {
        if !self.path.exists() {
            info!("registry {} not found, starting empty", self.path.display());
            return Ok(Registry::new());
        }

        let mut workbook = open_workbook_auto(&self.path).map_err(|e| StoreError::Open {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let sheet_names = workbook.sheet_names().to_vec();
        let Some(first) = sheet_names.first() else {
            return Err(StoreError::Open {
                path: self.path.clone(),
                message: "workbook contains no sheets".to_string(),
            });
        };
        let range = workbook
            .worksheet_range(first)
            .map_err(|e| StoreError::Open {
                path: self.path.clone(),
                message: format!("failed to read sheet '{first}': {e}"),
            })?;

        // Ranges start at the first used cell; rebase to absolute rows.
        let (start_row, start_col) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut records = Vec::new();
        for (offset, cells) in range.rows().enumerate() {
            let row_idx = start_row + offset;
            if row_idx == 0 {
                continue;
            }
            let row: Vec<Data> = (0..HEADERS.len())
                .map(|col| {
                    col.checked_sub(start_col)
                        .and_then(|c| cells.get(c))
                        .cloned()
                        .unwrap_or(Data::Empty)
                })
                .collect();
            if row.iter().all(|c| cell_text(c).is_empty()) {
                continue;
            }
            records.push(parse_row(row_idx + 1, &row)?);
        }

        debug!("loaded {} record(s) from {}", records.len(), self.path.display());
        Ok(Registry::from_records(records)?)
    }

    /// Write the registry atomically (temp file, then rename).
    pub fn save(&self, registry: &Registry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = self.path.with_extension("xlsx.tmp");
        write_workbook(registry, &tmp_path).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        info!("Changes saved to {}", self.path.display());
        Ok(())
    }

    /// Copy the current file into the backup directory before a mutation.
    /// Skipped when there is nothing to protect.
    pub fn backup(
        &self,
        loaded: &Registry,
        now: NaiveDateTime,
    ) -> Result<Option<PathBuf>, StoreError> {
        if loaded.is_empty() || !self.path.exists() {
            debug!("registry empty, no backup taken");
            return Ok(None);
        }
        let dest = backup::snapshot(&self.path, &self.backup_dir, now)?;
        info!("backup written to {}", dest.display());
        Ok(Some(dest))
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn parse_row(row: usize, cells: &[Data]) -> Result<CompanyRecord, StoreError> {
    let cell = |col: usize| &cells[col];

    let seq_text = cell_text(cell(COL_SEQ));
    if seq_text.is_empty() {
        return Err(StoreError::row(row, COL_SEQ_LABEL, "sequence number is blank"));
    }
    let sequence_number: u32 = seq_text
        .strip_suffix(".0")
        .unwrap_or(&seq_text)
        .parse()
        .map_err(|_| {
            StoreError::row(row, COL_SEQ_LABEL, format!("invalid sequence number '{seq_text}'"))
        })?;

    let inn_text = cell_text(cell(COL_INN));
    let tax_id =
        TaxId::parse(&inn_text).map_err(|e| StoreError::row(row, COL_INN_LABEL, e.to_string()))?;

    let status_text = cell_text(cell(COL_STATUS));
    let status = if status_text.is_empty() {
        CompanyStatus::Active
    } else {
        CompanyStatus::from_label(&status_text)
    };

    let status_checked_at = match cell(COL_CHECKED_AT) {
        Data::DateTime(dt) => serial_to_datetime(dt.as_f64()),
        other => {
            let text = cell_text(other);
            if text.is_empty() {
                None
            } else {
                let parsed = NaiveDateTime::parse_from_str(&text, CHECKED_AT_FORMAT).ok();
                if parsed.is_none() {
                    warn!("row {row}: unreadable check timestamp '{text}'");
                }
                parsed
            }
        }
    };

    Ok(CompanyRecord {
        sequence_number,
        tax_id,
        display_name: cell_text(cell(COL_NAME)),
        status,
        status_checked_at,
        legal_name_short: LegalName::from_cell(&cell_text(cell(COL_SHORT))),
        legal_name_full: LegalName::from_cell(&cell_text(cell(COL_FULL))),
        extracted_name: cell_text(cell(COL_EXTRACTED)),
        folder_latest_date: parse_date_cell(row, cell(COL_LATEST)),
        folder_prior_date: parse_date_cell(row, cell(COL_PRIOR)),
        remote_url: cell_text(cell(COL_URL)),
        is_new: cell_text(cell(COL_MARKER)).eq_ignore_ascii_case(NEW_MARKER),
    })
}

fn parse_date_cell(row: usize, data: &Data) -> Option<FolderDate> {
    if let Data::DateTime(dt) = data {
        return serial_to_datetime(dt.as_f64()).map(|d| FolderDate::Date(d.date()));
    }
    let text = cell_text(data);
    if text.is_empty() {
        return None;
    }
    let parsed = FolderDate::parse_cell(&text);
    if parsed.is_none() {
        warn!("row {row}: unreadable folder date '{text}'");
    }
    parsed
}

/// Cell content as trimmed text. Whole floats print without a fraction so
/// numeric tax ids and sequence numbers read back as digits.
fn cell_text(data: &Data) -> String {
    match data {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{e:?}"),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
    }
}

/// Excel 1900-system serial to a timestamp.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let secs = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::days(days) + Duration::seconds(secs))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_workbook(registry: &Registry, path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header = Format::new().set_bold();
    for (col, title) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    let plain = Format::new();
    let new_fill = Format::new().set_background_color(Color::RGB(NEW_FILL));
    let inactive_fill = Format::new().set_background_color(Color::RGB(INACTIVE_FILL));

    for (idx, record) in registry.iter().enumerate() {
        let row = idx as u32 + 1;
        // Inactive wins over new: the status pass runs after reconciliation.
        let format = if record.is_inactive_highlighted() {
            &inactive_fill
        } else if record.is_new {
            &new_fill
        } else {
            &plain
        };
        write_record(worksheet, row, record, format)?;
    }

    worksheet.set_column_width(COL_NAME as u16, 40)?;
    worksheet.set_column_width(COL_STATUS as u16, 18)?;
    worksheet.set_column_width(COL_CHECKED_AT as u16, 20)?;
    worksheet.set_column_width(COL_FULL as u16, 50)?;

    workbook.save(path)
}

fn write_record(
    worksheet: &mut Worksheet,
    row: u32,
    record: &CompanyRecord,
    format: &Format,
) -> Result<(), XlsxError> {
    let checked_at = record
        .status_checked_at
        .map(|t| t.format(CHECKED_AT_FORMAT).to_string())
        .unwrap_or_default();
    let latest = iprtrack_core::model::display_folder_date(&record.folder_latest_date);
    let prior = iprtrack_core::model::display_folder_date(&record.folder_prior_date);
    let marker = if record.is_new { NEW_MARKER } else { "" };

    let text_cells: [(usize, &str); 11] = [
        (COL_NAME, &record.display_name),
        // String cell: leading zeros must survive.
        (COL_INN, record.tax_id.as_str()),
        (COL_STATUS, record.status.label()),
        (COL_CHECKED_AT, &checked_at),
        (COL_SHORT, record.legal_name_short.as_str()),
        (COL_FULL, record.legal_name_full.as_str()),
        (COL_EXTRACTED, &record.extracted_name),
        (COL_LATEST, &latest),
        (COL_PRIOR, &prior),
        (COL_URL, &record.remote_url),
        (COL_MARKER, marker),
    ];

    worksheet.write_number_with_format(row, COL_SEQ as u16, record.sequence_number, format)?;
    worksheet.write_blank(row, 5, format)?;
    for (col, value) in text_cells {
        if value.is_empty() {
            worksheet.write_blank(row, col as u16, format)?;
        } else {
            worksheet.write_string_with_format(row, col as u16, value, format)?;
        }
    }
    Ok(())
}
