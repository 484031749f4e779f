//! `iprtrack-io`: Registry Store and file adapters.
//!
//! xlsx load/save with backup-before-mutate and a single-writer lock,
//! import of scraped observations, and the publication projection.

pub mod backup;
pub mod error;
pub mod lock;
pub mod observations;
pub mod projection;
pub mod store;

pub use error::StoreError;
pub use lock::RegistryLock;
pub use observations::{read_observations, ObservationFormat};
pub use projection::{export_csv, project, ProjectionRow, PROJECTION_HEADERS};
pub use store::RegistryStore;
