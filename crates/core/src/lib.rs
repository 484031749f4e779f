//! `iprtrack-core`: data model for the company registry.
//!
//! Records, identifiers, statuses, sentinel-bearing fields, and name helpers.
//! No IO.

pub mod model;
pub mod names;

pub use model::{
    CompanyRecord, CompanyStatus, FolderDate, LegalName, Observation, TaxId, TaxIdError,
};
