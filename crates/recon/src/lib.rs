//! `iprtrack-recon`: company registry reconciliation engine.
//!
//! Pure engine crate: merges observed `{name, inn}` batches into a registry,
//! runs the status and freshness passes against injected resolvers, and
//! returns reports. No CLI, HTTP, or file IO.

pub mod engine;
pub mod error;
pub mod fanout;
pub mod freshness;
pub mod model;
pub mod registry;
pub mod retry;
pub mod status;

pub use engine::reconcile;
pub use error::{FatalKind, ReconError, ResolveError};
pub use freshness::{run_freshness_pass, FolderEntry, FolderLayout, FolderListing, FreshnessResolver};
pub use model::{
    FreshnessChange, FreshnessReport, PassOptions, ReconOutcome, ReconReport, StatusReport,
    StatusTransition,
};
pub use registry::Registry;
pub use retry::{CancelToken, RetryDecision, RetryError, RetryPolicy};
pub use status::{run_status_pass, StatusLookup, StatusResolver};
