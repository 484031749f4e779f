use iprtrack_config::ConfigError;
use iprtrack_io::StoreError;
use iprtrack_recon::{FatalKind, ReconError, ResolveError};

use crate::exit_codes::*;

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::Io { .. } | StoreError::Write { .. } => EXIT_IO,
            StoreError::Open { .. }
            | StoreError::Row { .. }
            | StoreError::Registry(_)
            | StoreError::Csv { .. } => EXIT_PARSE,
            StoreError::Locked { .. } => EXIT_LOCKED,
        };
        let hint = match &err {
            StoreError::Locked { path } => Some(format!(
                "another run is in progress; delete {} if it is stale",
                path.display()
            )),
            StoreError::Row { row, column, .. } => Some(format!(
                "fix column {column} in row {row} of the registry workbook, \
                 or restore it from the backup directory"
            )),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let code = match &err {
            ReconError::DuplicateTaxId { .. } | ReconError::DuplicateSequence { .. } => {
                EXIT_PARSE
            }
            ReconError::Resolver { source, .. } => resolve_exit_code(source),
            ReconError::GaveUp { .. } => EXIT_FETCH_GAVE_UP,
            ReconError::Cancelled { .. } => EXIT_ERROR,
        };
        let hint = match &err {
            ReconError::Resolver { source: ResolveError::Fatal { kind: FatalKind::Auth, .. }, .. } => {
                Some("check the token (flag or env var named in the config)".to_string())
            }
            ReconError::GaveUp { .. } => {
                Some("the service kept failing; raise [retry.batch] max_attempts or retry later".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

fn resolve_exit_code(err: &ResolveError) -> u8 {
    match err {
        ResolveError::Fatal { kind: FatalKind::Auth, .. } => EXIT_FETCH_AUTH,
        ResolveError::Fatal { kind: FatalKind::Rejected, .. } => EXIT_FETCH_VALIDATION,
        ResolveError::Fatal { kind: FatalKind::Upstream, .. } => EXIT_FETCH_UPSTREAM,
        ResolveError::Transient { .. } => EXIT_FETCH_UPSTREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn store_errors_map_to_registry_codes() {
        let locked: CliError = StoreError::Locked { path: PathBuf::from("r.xlsx.lock") }.into();
        assert_eq!(locked.code, EXIT_LOCKED);
        assert!(locked.hint.unwrap().contains("r.xlsx.lock"));

        let row: CliError =
            StoreError::Row { row: 3, column: "A (№)", message: "sequence number is blank".into() }
                .into();
        assert_eq!(row.code, EXIT_PARSE);
        assert_eq!(row.message, "row 3, column A (№): sequence number is blank");
        assert!(row.hint.unwrap().contains("column A (№) in row 3"));

        let io: CliError = StoreError::Io {
            path: PathBuf::from("x"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert_eq!(io.code, EXIT_IO);
    }

    #[test]
    fn pass_failures_map_to_fetch_codes() {
        let auth: CliError = ReconError::Resolver {
            pass: "status",
            source: ResolveError::auth("DaData auth failed (403)"),
        }
        .into();
        assert_eq!(auth.code, EXIT_FETCH_AUTH);
        assert!(auth.hint.is_some());

        let rejected: CliError = ReconError::Resolver {
            pass: "freshness",
            source: ResolveError::rejected("bad path"),
        }
        .into();
        assert_eq!(rejected.code, EXIT_FETCH_VALIDATION);

        let gave_up: CliError = ReconError::GaveUp {
            pass: "status",
            attempts: 3,
            last: ResolveError::transient("503"),
        }
        .into();
        assert_eq!(gave_up.code, EXIT_FETCH_GAVE_UP);
        assert!(gave_up.message.contains("3 attempt(s)"));
    }

    #[test]
    fn config_errors_exit_6() {
        let err: CliError = ConfigError::Validation("[status] concurrency must be at least 1".into()).into();
        assert_eq!(err.code, EXIT_CONFIG);
    }
}
