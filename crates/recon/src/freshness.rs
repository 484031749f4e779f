//! Freshness pass: the two most recent dated subfolders of each record's
//! document folder.
//!
//! Folder names look like `10.01.24 на проверку`: the part before the
//! delimiter is a `DD.MM.YY` date. Missing folders leave the record alone,
//! folders without dated subfolders get the `Absent` sentinel.

use chrono::NaiveDate;
use iprtrack_core::{CompanyRecord, FolderDate, TaxId};
use iprtrack_core::model::display_folder_date;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{ReconError, ResolveError};
use crate::fanout::map_ordered;
use crate::model::{FreshnessChange, FreshnessReport, PassOptions};
use crate::registry::Registry;

const PASS: &str = "freshness";

/// Subfolder date format (two-digit year).
pub const SUBFOLDER_DATE_FORMAT: &str = "%d.%m.%y";

/// Where record folders live and how their subfolders are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    /// Remote root, e.g. `disk:/ИПР`.
    pub root: String,
    /// Token that ends the date part of a subfolder name.
    pub date_delimiter: String,
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self {
            root: "disk:/ИПР".to_string(),
            date_delimiter: " на".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub kind: EntryKind,
    pub name: String,
}

impl FolderEntry {
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Dir,
            name: name.into(),
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::File,
            name: name.into(),
        }
    }
}

/// Result of listing one record folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderListing {
    /// The store reported an error for the path (usually "not found").
    Missing(String),
    Entries(Vec<FolderEntry>),
}

impl FolderListing {
    /// Interpret a `{_embedded: {items: [...]}}` / `{error: ...}` body.
    ///
    /// A body with neither key is an existing folder with nothing in it.
    /// Items without a string `name` are ignored.
    pub fn from_response(body: &Value) -> Self {
        if let Some(err) = body.get("error") {
            let reason = body["description"]
                .as_str()
                .or_else(|| err.as_str())
                .unwrap_or("error")
                .to_string();
            return Self::Missing(reason);
        }

        let entries = body["_embedded"]["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let name = item["name"].as_str()?;
                        let kind = match item["type"].as_str() {
                            Some("dir") => EntryKind::Dir,
                            _ => EntryKind::File,
                        };
                        Some(FolderEntry {
                            kind,
                            name: name.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self::Entries(entries)
    }
}

/// Remote hierarchical store, queried by path.
pub trait FreshnessResolver: Sync {
    fn list(&self, path: &str) -> Result<FolderListing, ResolveError>;
}

/// `{root}/{seq}. {folder name} ({tax id})`
pub fn folder_path(root: &str, record: &CompanyRecord) -> String {
    format!(
        "{}/{}. {} ({})",
        root.trim_end_matches('/'),
        record.sequence_number,
        record.folder_name(),
        record.tax_id
    )
}

/// Date encoded in a subfolder name, or `None` if the prefix does not parse.
pub fn parse_folder_date(name: &str, delimiter: &str) -> Option<NaiveDate> {
    let prefix = if delimiter.is_empty() {
        name
    } else {
        name.split(delimiter).next().unwrap_or(name)
    };
    NaiveDate::parse_from_str(prefix.trim(), SUBFOLDER_DATE_FORMAT).ok()
}

/// Latest and prior dates among directory entries, `Absent` where missing.
pub fn latest_two(entries: &[FolderEntry], delimiter: &str) -> (FolderDate, FolderDate) {
    let mut dates: Vec<NaiveDate> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::Dir)
        .filter_map(|e| {
            let date = parse_folder_date(&e.name, delimiter);
            if date.is_none() {
                warn!("Could not parse date from folder name: {}", e.name);
            }
            date
        })
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));

    (
        FolderDate::from_option(dates.first().copied()),
        FolderDate::from_option(dates.get(1).copied()),
    )
}

/// List every record folder, in registry order.
pub fn collect_freshness<R: FreshnessResolver>(
    registry: &Registry,
    resolver: &R,
    layout: &FolderLayout,
    concurrency: usize,
) -> Result<Vec<(TaxId, FolderListing)>, ResolveError> {
    let records = registry.records();
    map_ordered(records, concurrency, |record| {
        let listing = resolver.list(&folder_path(&layout.root, record))?;
        Ok((record.tax_id.clone(), listing))
    })
}

/// Write listings back. Both dates are overwritten; a change is reported
/// only when a displayed value differs from the persisted one.
pub fn apply_freshness(
    registry: &mut Registry,
    listings: Vec<(TaxId, FolderListing)>,
    delimiter: &str,
) -> FreshnessReport {
    let mut report = FreshnessReport::default();

    for (tax_id, listing) in listings {
        let Some(position) = registry.position(&tax_id) else {
            continue;
        };
        let row = position + 2;
        report.checked += 1;

        let entries = match listing {
            FolderListing::Missing(reason) => {
                warn!("Folder does not exist for row number {row} ({reason})");
                report.skipped.push(tax_id);
                continue;
            }
            FolderListing::Entries(entries) => entries,
        };

        let (latest, prior) = latest_two(&entries, delimiter);
        let Some(record) = registry.get_mut(&tax_id) else {
            continue;
        };

        let changed = display_folder_date(&record.folder_latest_date) != latest.to_string()
            || display_folder_date(&record.folder_prior_date) != prior.to_string();
        if changed {
            report.changes.push(FreshnessChange {
                row,
                tax_id: tax_id.clone(),
                folder_name: record.folder_name().to_string(),
                old_latest: record.folder_latest_date,
                new_latest: latest,
                old_prior: record.folder_prior_date,
                new_prior: prior,
            });
        }

        record.folder_latest_date = Some(latest);
        record.folder_prior_date = Some(prior);
    }

    report
}

/// Run the full freshness pass: collect under the batch retry policy, then apply.
pub fn run_freshness_pass<R: FreshnessResolver>(
    registry: &mut Registry,
    resolver: &R,
    options: &PassOptions,
    layout: &FolderLayout,
) -> Result<FreshnessReport, ReconError> {
    info!("freshness pass: listing {} folder(s) under {}", registry.len(), layout.root);

    let listings = options
        .retry
        .run(
            "freshness pass",
            &options.cancel,
            |attempt| {
                collect_freshness(registry, resolver, layout, options.concurrency).inspect_err(
                    |e| error!("freshness pass attempt {attempt} failed: {e}"),
                )
            },
            ResolveError::retry_decision,
        )
        .map_err(|e| ReconError::from_retry(PASS, e))?;

    let report = apply_freshness(registry, listings, &layout.date_delimiter);
    for change in &report.changes {
        info!("{change}");
    }
    info!(
        "freshness pass: {} checked, {} changed, {} missing",
        report.checked,
        report.changes.len(),
        report.skipped.len()
    );
    Ok(report)
}
