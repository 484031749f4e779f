//! One locked, loaded registry and the stages that mutate it.
//!
//! A `Session` holds the single-writer lock for its whole life, takes one
//! backup before the first change of the run, and saves after each stage
//! so a failing later stage keeps the earlier ones.

use std::collections::{HashMap, HashSet};
use std::mem;

use chrono::{Local, NaiveDateTime, Timelike};
use iprtrack_config::RegistrySettings;
use iprtrack_core::{Observation, TaxId};
use iprtrack_io::{RegistryLock, RegistryStore};
use iprtrack_recon::{
    reconcile, run_freshness_pass, run_status_pass, FolderLayout, FreshnessReport,
    FreshnessResolver, PassOptions, ReconReport, Registry, StatusReport, StatusResolver,
};
use tracing::{info, warn};

use crate::CliError;

pub struct Session {
    store: RegistryStore,
    registry: Registry,
    backed_up: bool,
    _lock: Option<RegistryLock>,
}

impl Session {
    /// Lock (if configured) and load.
    pub fn open(settings: &RegistrySettings) -> Result<Self, CliError> {
        let lock = if settings.lock {
            Some(RegistryLock::acquire(&settings.path)?)
        } else {
            None
        };
        let store = RegistryStore::new(&settings.path, &settings.backup_dir);
        let registry = store.load()?;
        info!("loaded {} record(s) from {}", registry.len(), store.path().display());
        Ok(Self {
            store,
            registry,
            backed_up: false,
            _lock: lock,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Snapshot the file as loaded, once per run.
    fn before_change(&mut self) -> Result<(), CliError> {
        if !self.backed_up {
            self.store.backup(&self.registry, now())?;
            self.backed_up = true;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), CliError> {
        self.store.save(&self.registry)?;
        Ok(())
    }

    pub fn reconcile(
        &mut self,
        observed: &[Observation],
        exclusions: &HashSet<TaxId>,
    ) -> Result<ReconReport, CliError> {
        self.before_change()?;
        let outcome = reconcile(mem::take(&mut self.registry), observed, exclusions);
        self.registry = outcome.registry;
        for rejected in &outcome.report.rejected {
            warn!(
                "rejected observation #{} '{}' ({}): {}",
                rejected.position + 1,
                rejected.name,
                rejected.raw_tax_id,
                rejected.reason
            );
        }
        self.save()?;
        Ok(outcome.report)
    }

    pub fn status<R: StatusResolver>(
        &mut self,
        resolver: &R,
        options: &PassOptions,
        keywords: &[String],
    ) -> Result<StatusReport, CliError> {
        self.before_change()?;
        let report = run_status_pass(&mut self.registry, resolver, options, now(), keywords)?;
        self.save()?;
        Ok(report)
    }

    pub fn freshness<R: FreshnessResolver>(
        &mut self,
        resolver: &R,
        options: &PassOptions,
        layout: &FolderLayout,
    ) -> Result<FreshnessReport, CliError> {
        self.before_change()?;
        let report = run_freshness_pass(&mut self.registry, resolver, options, layout)?;
        self.save()?;
        Ok(report)
    }

    /// Copy hand-maintained links from the published sheet into the
    /// registry. Returns how many records changed; saves only then.
    pub fn merge_links(&mut self, links: &HashMap<String, String>) -> Result<usize, CliError> {
        let updates: Vec<(TaxId, String)> = self
            .registry
            .iter()
            .filter_map(|record| {
                let link = links.get(record.tax_id.as_str())?;
                (*link != record.remote_url).then(|| (record.tax_id.clone(), link.clone()))
            })
            .collect();
        if updates.is_empty() {
            return Ok(0);
        }

        self.before_change()?;
        for (tax_id, link) in &updates {
            if let Some(record) = self.registry.get_mut(tax_id) {
                record.remote_url = link.clone();
            }
        }
        info!("updated {} link(s) from the published sheet", updates.len());
        self.save()?;
        Ok(updates.len())
    }
}

/// Local wall-clock time, second precision.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iprtrack_core::CompanyStatus;
    use iprtrack_recon::{FolderEntry, FolderListing, ResolveError, RetryPolicy};
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::tempdir;

    fn settings(dir: &std::path::Path) -> RegistrySettings {
        RegistrySettings {
            path: dir.join("companies.xlsx"),
            backup_dir: dir.join("backup"),
            lock: true,
        }
    }

    fn options() -> PassOptions {
        PassOptions {
            concurrency: 2,
            retry: RetryPolicy::none(),
            ..PassOptions::default()
        }
    }

    fn ids(raw: &[&str]) -> HashSet<TaxId> {
        raw.iter().map(|r| TaxId::parse(r).unwrap()).collect()
    }

    struct Liquidating;
    impl StatusResolver for Liquidating {
        fn lookup(&self, _: &TaxId) -> Result<Option<Value>, ResolveError> {
            Ok(Some(json!({
                "data": {
                    "state": { "status": "LIQUIDATING" },
                    "name": { "short_with_opf": "ООО \"РОМАШКА\"", "full_with_opf": "ООО \"РОМАШКА\"" }
                }
            })))
        }
    }

    struct OneFolder;
    impl FreshnessResolver for OneFolder {
        fn list(&self, _: &str) -> Result<FolderListing, ResolveError> {
            Ok(FolderListing::Entries(vec![FolderEntry::dir("10.01.24 на 09.01.24")]))
        }
    }

    #[test]
    fn lock_is_held_for_the_session() {
        let dir = tempdir().unwrap();
        let s = settings(dir.path());
        let session = Session::open(&s).unwrap();
        let err = match Session::open(&s) {
            Ok(_) => panic!("second session must not get the lock"),
            Err(e) => e,
        };
        assert_eq!(err.code, crate::exit_codes::EXIT_LOCKED);
        drop(session);
        assert!(Session::open(&s).is_ok());
    }

    #[test]
    fn stages_persist_and_backup_once() {
        let dir = tempdir().unwrap();
        let s = settings(dir.path());

        // First run bootstraps an empty registry: nothing to back up.
        let mut session = Session::open(&s).unwrap();
        let report = session
            .reconcile(
                &[Observation::new("ООО Ромашка", "7701234567"), Observation::new("Тест", "999999999")],
                &ids(&["999999999"]),
            )
            .unwrap();
        assert_eq!(report.appended.len(), 1);
        drop(session);
        assert!(!s.backup_dir.exists());

        // Second run: one backup even though three stages change the file.
        let mut session = Session::open(&s).unwrap();
        session
            .reconcile(&[Observation::new("ООО Ромашка", "7701234567")], &HashSet::new())
            .unwrap();
        let status = session
            .status(&Liquidating, &options(), &["ДЭК".to_string()])
            .unwrap();
        assert_eq!(status.transitions.len(), 1);
        let fresh = session
            .freshness(&OneFolder, &options(), &FolderLayout::default())
            .unwrap();
        assert_eq!(fresh.changes.len(), 1);
        drop(session);

        assert_eq!(fs::read_dir(&s.backup_dir).unwrap().count(), 1);

        let reloaded = RegistryStore::new(&s.path, &s.backup_dir).load().unwrap();
        let record = reloaded.get(&TaxId::parse("7701234567").unwrap()).unwrap();
        assert_eq!(record.status, CompanyStatus::Liquidating);
        assert!(!record.is_new);
        assert!(record.status_checked_at.is_some());
        assert!(record.folder_latest_date.is_some());
    }

    #[test]
    fn merge_links_by_tax_id() {
        let dir = tempdir().unwrap();
        let s = settings(dir.path());
        let mut session = Session::open(&s).unwrap();
        session
            .reconcile(
                &[Observation::new("A", "1"), Observation::new("B", "2")],
                &HashSet::new(),
            )
            .unwrap();

        let links: HashMap<String, String> = [
            ("2".to_string(), "https://disk.example/b".to_string()),
            ("404".to_string(), "https://disk.example/none".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(session.merge_links(&links).unwrap(), 1);
        assert_eq!(session.merge_links(&links).unwrap(), 0);

        let record = session.registry().get(&TaxId::parse("2").unwrap()).unwrap();
        assert_eq!(record.remote_url, "https://disk.example/b");
        assert_eq!(session.registry().len(), 2);
    }
}
