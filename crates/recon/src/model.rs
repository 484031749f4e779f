use std::fmt;

use iprtrack_core::model::display_folder_date;
use iprtrack_core::{CompanyStatus, FolderDate, TaxId};
use serde::Serialize;

use crate::registry::Registry;
use crate::retry::{CancelToken, RetryPolicy};

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// An observed row that could not be used as a registry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedObservation {
    /// 0-based position in the observed batch.
    pub position: usize,
    pub name: String,
    pub raw_tax_id: String,
    pub reason: String,
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconReport {
    /// Newly appended, in assignment order.
    pub appended: Vec<TaxId>,
    /// Known records whose `is_new` marker was cleared this run.
    pub cleared: Vec<TaxId>,
    /// Observed tax ids already present in the registry.
    pub known: usize,
    /// New tax ids dropped by the exclusion list.
    pub excluded: Vec<TaxId>,
    /// Later occurrences of a tax id already seen in the same batch.
    pub duplicates: Vec<TaxId>,
    pub rejected: Vec<RejectedObservation>,
}

#[derive(Debug, Clone)]
pub struct ReconOutcome {
    pub registry: Registry,
    pub report: ReconReport,
}

// ---------------------------------------------------------------------------
// Status pass
// ---------------------------------------------------------------------------

/// The audit-trail event of the status pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub tax_id: TaxId,
    pub display_name: String,
    pub old: CompanyStatus,
    pub new: CompanyStatus,
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} изменил статус с {} на {}.",
            self.display_name, self.old, self.new
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub checked: usize,
    pub transitions: Vec<StatusTransition>,
    /// Records whose lookup returned no usable status.
    pub unknown: usize,
}

// ---------------------------------------------------------------------------
// Freshness pass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreshnessChange {
    /// Spreadsheet row number (header is row 1).
    pub row: usize,
    pub tax_id: TaxId,
    pub folder_name: String,
    pub old_latest: Option<FolderDate>,
    pub new_latest: FolderDate,
    pub old_prior: Option<FolderDate>,
    pub new_prior: FolderDate,
}

impl fmt::Display for FreshnessChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row {}: Changes detected for {} ({}) - last update date: {} -> {}, before last update date: {} -> {}",
            self.row,
            self.folder_name,
            self.tax_id,
            display_folder_date(&self.old_latest),
            self.new_latest,
            display_folder_date(&self.old_prior),
            self.new_prior,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FreshnessReport {
    pub checked: usize,
    pub changes: Vec<FreshnessChange>,
    /// Records whose folder lookup reported an error; dates left unchanged.
    pub skipped: Vec<TaxId>,
}

// ---------------------------------------------------------------------------
// Pass options
// ---------------------------------------------------------------------------

/// Execution knobs shared by the status and freshness passes.
#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Maximum in-flight lookups.
    pub concurrency: usize,
    /// Whole-batch retry on transient resolver failure.
    pub retry: RetryPolicy,
    pub cancel: CancelToken,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            cancel: CancelToken::new(),
        }
    }
}
