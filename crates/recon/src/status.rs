//! Status pass: refresh legal status and canonical names for every record.
//!
//! Lookups fan out with bounded concurrency; results are written back by
//! tax id so row order is untouched. Any transient resolver error aborts
//! the collection and the whole batch is retried under the pass policy.
//! Nothing is written to the registry until every lookup succeeded.

use chrono::NaiveDateTime;
use iprtrack_core::names::extract_name;
use iprtrack_core::{CompanyStatus, LegalName, TaxId};
use serde_json::Value;
use tracing::{error, info};

use crate::error::{ReconError, ResolveError};
use crate::fanout::map_ordered;
use crate::model::{PassOptions, StatusReport, StatusTransition};
use crate::registry::Registry;

const PASS: &str = "status";

/// Company-lookup service, queried by tax id.
///
/// `Ok(None)` means the service knows no company with that id; the record
/// then degrades to sentinel values like any incomplete response.
pub trait StatusResolver: Sync {
    fn lookup(&self, tax_id: &TaxId) -> Result<Option<Value>, ResolveError>;
}

/// Fields the pass consumes from one lookup response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLookup {
    pub status: CompanyStatus,
    pub short_name: LegalName,
    pub full_name: LegalName,
}

impl StatusLookup {
    /// Read `data.state.status` and `data.name.{short,full}_with_opf`.
    /// Any missing or non-string field degrades to its sentinel.
    pub fn from_response(response: &Value) -> Self {
        let data = &response["data"];
        let status = data["state"]["status"]
            .as_str()
            .map(CompanyStatus::from_code)
            .unwrap_or(CompanyStatus::Unknown);
        Self {
            status,
            short_name: LegalName::from_option(data["name"]["short_with_opf"].as_str()),
            full_name: LegalName::from_option(data["name"]["full_with_opf"].as_str()),
        }
    }

    pub fn unresolved() -> Self {
        Self {
            status: CompanyStatus::Unknown,
            short_name: LegalName::Unknown,
            full_name: LegalName::Unknown,
        }
    }
}

/// Query the resolver for every record, in registry order.
pub fn collect_status<R: StatusResolver>(
    registry: &Registry,
    resolver: &R,
    concurrency: usize,
) -> Result<Vec<(TaxId, StatusLookup)>, ResolveError> {
    let ids = registry.tax_ids();
    map_ordered(&ids, concurrency, |tax_id| {
        let lookup = match resolver.lookup(tax_id)? {
            Some(response) => StatusLookup::from_response(&response),
            None => StatusLookup::unresolved(),
        };
        Ok((tax_id.clone(), lookup))
    })
}

/// Write lookups back into the registry.
///
/// Status and both legal names are overwritten unconditionally, the
/// extracted name is recomputed from the full name, and the check
/// timestamp is set. A transition is recorded whenever the status differs
/// from the persisted one. Lookups for ids not in the registry are ignored.
pub fn apply_status<S: AsRef<str>>(
    registry: &mut Registry,
    lookups: Vec<(TaxId, StatusLookup)>,
    checked_at: NaiveDateTime,
    keywords: &[S],
) -> StatusReport {
    let mut report = StatusReport::default();

    for (tax_id, lookup) in lookups {
        let Some(record) = registry.get_mut(&tax_id) else {
            continue;
        };
        report.checked += 1;
        if lookup.status == CompanyStatus::Unknown {
            report.unknown += 1;
        }
        if record.status != lookup.status {
            report.transitions.push(StatusTransition {
                tax_id: tax_id.clone(),
                display_name: record.display_name.clone(),
                old: record.status,
                new: lookup.status,
            });
        }

        record.extracted_name = extract_name(&lookup.full_name, &record.display_name, keywords);
        record.status = lookup.status;
        record.legal_name_short = lookup.short_name;
        record.legal_name_full = lookup.full_name;
        record.status_checked_at = Some(checked_at);
    }

    report
}

/// Run the full status pass: collect under the batch retry policy, then apply.
pub fn run_status_pass<R: StatusResolver, S: AsRef<str>>(
    registry: &mut Registry,
    resolver: &R,
    options: &PassOptions,
    checked_at: NaiveDateTime,
    keywords: &[S],
) -> Result<StatusReport, ReconError> {
    info!("status pass: checking {} record(s)", registry.len());

    let lookups = options
        .retry
        .run(
            "status pass",
            &options.cancel,
            |attempt| {
                collect_status(registry, resolver, options.concurrency).inspect_err(|e| {
                    error!("status pass attempt {attempt} failed: {e}");
                })
            },
            ResolveError::retry_decision,
        )
        .map_err(|e| ReconError::from_retry(PASS, e))?;

    let report = apply_status(registry, lookups, checked_at, keywords);
    log_transitions(&report);
    Ok(report)
}

fn log_transitions(report: &StatusReport) {
    if report.transitions.is_empty() {
        info!("Изменений нет.");
        return;
    }
    info!("Изменения в компаниях:");
    for transition in &report.transitions {
        info!("{transition}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{CancelToken, RetryPolicy};
    use chrono::NaiveDate;
    use iprtrack_core::CompanyRecord;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const KEYWORDS: &[&str] = &["ТРАНСЭНЕРГО"];

    fn id(s: &str) -> TaxId {
        TaxId::parse(s).unwrap()
    }

    fn registry(rows: &[(u32, &str, &str)]) -> Registry {
        Registry::from_records(
            rows.iter()
                .map(|(seq, inn, name)| CompanyRecord::new(*seq, id(inn), *name))
                .collect(),
        )
        .unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn party(status: &str, short: &str, full: &str) -> Value {
        json!({
            "value": short,
            "data": {
                "state": { "status": status },
                "name": { "short_with_opf": short, "full_with_opf": full }
            }
        })
    }

    struct MapResolver(HashMap<String, Value>);

    impl StatusResolver for MapResolver {
        fn lookup(&self, tax_id: &TaxId) -> Result<Option<Value>, ResolveError> {
            Ok(self.0.get(tax_id.as_str()).cloned())
        }
    }

    /// Fails transiently for the first `failures` calls.
    struct FlakyResolver {
        failures: usize,
        calls: AtomicUsize,
    }

    impl StatusResolver for FlakyResolver {
        fn lookup(&self, _tax_id: &TaxId) -> Result<Option<Value>, ResolveError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ResolveError::transient("connection reset"))
            } else {
                Ok(Some(party("ACTIVE", "ООО \"А\"", "ОБЩЕСТВО \"А\"")))
            }
        }
    }

    fn quick_options(max_attempts: u32) -> PassOptions {
        PassOptions {
            concurrency: 2,
            retry: RetryPolicy::fixed(max_attempts, Duration::from_millis(1)),
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn lookup_reads_all_fields() {
        let lookup = StatusLookup::from_response(&party(
            "LIQUIDATING",
            "ООО \"РОМАШКА\"",
            "ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ \"РОМАШКА\"",
        ));
        assert_eq!(lookup.status, CompanyStatus::Liquidating);
        assert_eq!(lookup.short_name, LegalName::Known("ООО \"РОМАШКА\"".into()));
        assert!(lookup.full_name.is_known());
    }

    #[test]
    fn missing_status_degrades_to_unknown() {
        let response = json!({ "data": { "name": { "short_with_opf": "X", "full_with_opf": "Y" } } });
        let lookup = StatusLookup::from_response(&response);
        assert_eq!(lookup.status, CompanyStatus::Unknown);
        assert_eq!(lookup.short_name, LegalName::Known("X".into()));
    }

    #[test]
    fn empty_response_degrades_to_sentinels() {
        assert_eq!(StatusLookup::from_response(&json!({})), StatusLookup::unresolved());
        assert_eq!(StatusLookup::from_response(&json!(null)), StatusLookup::unresolved());
        let odd = json!({ "data": { "state": { "status": 7 } } });
        assert_eq!(StatusLookup::from_response(&odd).status, CompanyStatus::Unknown);
    }

    #[test]
    fn unrecognized_code_is_unknown() {
        let lookup = StatusLookup::from_response(&party("SUSPENDED", "a", "b"));
        assert_eq!(lookup.status, CompanyStatus::Unknown);
    }

    #[test]
    fn active_to_liquidating_emits_one_transition() {
        let mut reg = registry(&[(1, "123", "ООО Ромашка")]);
        let resolver = MapResolver(HashMap::from([(
            "123".to_string(),
            party("LIQUIDATING", "ООО \"РОМАШКА\"", "ОБЩЕСТВО \"РОМАШКА\""),
        )]));
        let report =
            run_status_pass(&mut reg, &resolver, &quick_options(1), now(), KEYWORDS).unwrap();

        assert_eq!(report.transitions.len(), 1);
        let t = &report.transitions[0];
        assert_eq!(t.display_name, "ООО Ромашка");
        assert_eq!(t.old, CompanyStatus::Active);
        assert_eq!(t.new, CompanyStatus::Liquidating);
        assert_eq!(
            t.to_string(),
            "ООО Ромашка изменил статус с Действующая на Ликвидируется."
        );

        let rec = reg.get(&id("123")).unwrap();
        assert_eq!(rec.status, CompanyStatus::Liquidating);
        assert!(rec.is_inactive_highlighted());
        assert_eq!(rec.extracted_name, "РОМАШКА");
        assert_eq!(rec.status_checked_at, Some(now()));
    }

    #[test]
    fn unchanged_status_emits_nothing_but_refreshes_fields() {
        let mut reg = registry(&[(1, "1", "a")]);
        let resolver = MapResolver(HashMap::from([(
            "1".to_string(),
            party("ACTIVE", "АО \"ВЕКТОР\"", "АКЦИОНЕРНОЕ ОБЩЕСТВО \"ВЕКТОР\""),
        )]));
        let report =
            run_status_pass(&mut reg, &resolver, &quick_options(1), now(), KEYWORDS).unwrap();
        assert!(report.transitions.is_empty());
        assert_eq!(report.checked, 1);
        let rec = reg.get(&id("1")).unwrap();
        assert_eq!(rec.legal_name_short.as_str(), "АО \"ВЕКТОР\"");
        assert_eq!(rec.extracted_name, "ВЕКТОР");
    }

    #[test]
    fn not_found_sets_sentinels_without_failing() {
        let mut reg = registry(&[(1, "1", "a"), (2, "2", "b")]);
        let resolver = MapResolver(HashMap::from([(
            "2".to_string(),
            party("ACTIVE", "b", "b"),
        )]));
        let report =
            run_status_pass(&mut reg, &resolver, &quick_options(1), now(), KEYWORDS).unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.unknown, 1);
        let rec = reg.get(&id("1")).unwrap();
        assert_eq!(rec.status, CompanyStatus::Unknown);
        assert_eq!(rec.legal_name_full, LegalName::Unknown);
        assert_eq!(rec.extracted_name, "НЕИЗВЕСТНО");
    }

    #[test]
    fn keyword_match_uses_display_name() {
        let mut reg = registry(&[(1, "9", "Трансэнерго филиал")]);
        let resolver = MapResolver(HashMap::from([(
            "9".to_string(),
            party("ACTIVE", "x", "ООО \"ТРАНСЭНЕРГО\""),
        )]));
        run_status_pass(&mut reg, &resolver, &quick_options(1), now(), KEYWORDS).unwrap();
        assert_eq!(reg.get(&id("9")).unwrap().extracted_name, "Трансэнерго филиал");
    }

    #[test]
    fn transient_failure_retries_whole_batch() {
        let mut reg = registry(&[(1, "1", "a"), (2, "2", "b")]);
        let resolver = FlakyResolver {
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let report =
            run_status_pass(&mut reg, &resolver, &quick_options(3), now(), KEYWORDS).unwrap();
        assert_eq!(report.checked, 2);
        assert!(reg.iter().all(|r| r.status_checked_at.is_some()));
    }

    #[test]
    fn gives_up_and_leaves_registry_untouched() {
        let mut reg = registry(&[(1, "1", "a")]);
        let before = reg.clone();
        let resolver = FlakyResolver {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let err =
            run_status_pass(&mut reg, &resolver, &quick_options(2), now(), KEYWORDS).unwrap_err();
        assert!(matches!(err, ReconError::GaveUp { attempts: 2, .. }));
        assert_eq!(reg, before);
    }

    #[test]
    fn fatal_error_stops_without_retry() {
        struct Denied(AtomicUsize);
        impl StatusResolver for Denied {
            fn lookup(&self, _: &TaxId) -> Result<Option<Value>, ResolveError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(ResolveError::auth("401 unauthorized"))
            }
        }
        let mut reg = registry(&[(1, "1", "a")]);
        let resolver = Denied(AtomicUsize::new(0));
        let err =
            run_status_pass(&mut reg, &resolver, &quick_options(5), now(), KEYWORDS).unwrap_err();
        assert!(matches!(err, ReconError::Resolver { pass: "status", .. }));
        assert_eq!(resolver.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn order_is_preserved() {
        let mut reg = registry(&[(5, "50", "e"), (1, "10", "a"), (3, "30", "c")]);
        let resolver = MapResolver(HashMap::new());
        run_status_pass(&mut reg, &resolver, &quick_options(1), now(), KEYWORDS).unwrap();
        let order: Vec<u32> = reg.iter().map(|r| r.sequence_number).collect();
        assert_eq!(order, vec![5, 1, 3]);
    }
}
