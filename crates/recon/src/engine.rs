use std::collections::HashSet;

use iprtrack_core::{CompanyRecord, Observation, TaxId};
use tracing::{debug, info, warn};

use crate::model::{ReconOutcome, ReconReport, RejectedObservation};
use crate::registry::Registry;

/// Merge an observed batch into the registry.
///
/// Existing records keep their position and sequence number; those seen
/// again lose their `is_new` marker. Unseen, non-excluded tax ids are
/// appended in first-observed order with `max + 1, max + 2, ...` and
/// `is_new = true`. Nothing is ever removed. Within the batch the first
/// occurrence of a tax id wins. Rows whose tax id is not numeric are
/// rejected and reported.
pub fn reconcile(
    registry: Registry,
    observed: &[Observation],
    exclusions: &HashSet<TaxId>,
) -> ReconOutcome {
    let mut registry = registry;
    let mut report = ReconReport::default();

    // Normalize + dedupe (first occurrence wins)
    let mut seen: HashSet<TaxId> = HashSet::new();
    let mut batch: Vec<(TaxId, &str)> = Vec::with_capacity(observed.len());
    for (position, obs) in observed.iter().enumerate() {
        match TaxId::parse(&obs.tax_id) {
            Ok(tax_id) => {
                if seen.insert(tax_id.clone()) {
                    batch.push((tax_id, obs.name.trim()));
                } else {
                    debug!("duplicate tax id {tax_id} in batch at position {position}, keeping first");
                    report.duplicates.push(tax_id);
                }
            }
            Err(e) => {
                warn!("rejected observation '{}' at position {position}: {e}", obs.name);
                report.rejected.push(RejectedObservation {
                    position,
                    name: obs.name.clone(),
                    raw_tax_id: obs.tax_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    // Partition: known records get their marker cleared, the rest are candidates
    let mut candidates: Vec<(TaxId, &str)> = Vec::new();
    for (tax_id, name) in batch {
        match registry.get_mut(&tax_id) {
            Some(record) => {
                report.known += 1;
                if record.is_new {
                    record.is_new = false;
                    report.cleared.push(tax_id);
                }
            }
            None => {
                if exclusions.contains(&tax_id) {
                    report.excluded.push(tax_id);
                } else {
                    candidates.push((tax_id, name));
                }
            }
        }
    }

    // Append with fresh sequence numbers
    let mut next = registry.max_sequence() + 1;
    for (tax_id, name) in candidates {
        let record = CompanyRecord::new(next, tax_id.clone(), name);
        // Candidates are unique and absent from the registry.
        if registry.push(record).is_ok() {
            report.appended.push(tax_id);
            next += 1;
        }
    }

    info!(
        "reconciled {} observation(s): {} known, {} new, {} excluded, {} duplicate, {} rejected",
        observed.len(),
        report.known,
        report.appended.len(),
        report.excluded.len(),
        report.duplicates.len(),
        report.rejected.len(),
    );

    ReconOutcome { registry, report }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(name: &str, id: &str) -> Observation {
        Observation::new(name, id)
    }

    fn id(s: &str) -> TaxId {
        TaxId::parse(s).unwrap()
    }

    fn no_exclusions() -> HashSet<TaxId> {
        HashSet::new()
    }

    #[test]
    fn empty_registry_numbers_from_one() {
        let out = reconcile(
            Registry::new(),
            &[obs("ООО Ромашка", "123"), obs("АО Вектор", "456")],
            &no_exclusions(),
        );
        let recs = out.registry.records();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].sequence_number, 1);
        assert_eq!(recs[1].sequence_number, 2);
        assert!(recs.iter().all(|r| r.is_new));
        assert_eq!(out.report.appended, vec![id("123"), id("456")]);
    }

    #[test]
    fn two_run_scenario() {
        let first = reconcile(Registry::new(), &[obs("ООО Ромашка", "123")], &no_exclusions());
        assert_eq!(first.registry.len(), 1);
        let r = first.registry.get(&id("123")).unwrap();
        assert_eq!(r.sequence_number, 1);
        assert!(r.is_new);

        let second = reconcile(
            first.registry,
            &[obs("ООО Ромашка", "123"), obs("АО Вектор", "456")],
            &no_exclusions(),
        );
        let reg = &second.registry;
        assert_eq!(reg.len(), 2);
        let romashka = reg.get(&id("123")).unwrap();
        assert_eq!(romashka.sequence_number, 1);
        assert!(!romashka.is_new);
        let vector = reg.get(&id("456")).unwrap();
        assert_eq!(vector.sequence_number, 2);
        assert!(vector.is_new);
        assert_eq!(second.report.cleared, vec![id("123")]);
    }

    #[test]
    fn empty_batch_is_noop() {
        let first = reconcile(Registry::new(), &[obs("a", "1")], &no_exclusions());
        let before = first.registry.clone();
        let out = reconcile(first.registry, &[], &no_exclusions());
        assert_eq!(out.registry, before);
        assert!(out.registry.get(&id("1")).unwrap().is_new);
        assert_eq!(out.report, ReconReport::default());
    }

    #[test]
    fn exclusions_never_append() {
        let exclusions: HashSet<TaxId> = [id("999999999")].into_iter().collect();
        let out = reconcile(
            Registry::new(),
            &[obs("test", "999999999"), obs("real", "5")],
            &exclusions,
        );
        assert_eq!(out.registry.len(), 1);
        assert_eq!(out.registry.records()[0].sequence_number, 1);
        assert_eq!(out.report.excluded, vec![id("999999999")]);
    }

    #[test]
    fn exclusion_does_not_touch_existing_record() {
        let base = reconcile(Registry::new(), &[obs("kept", "42")], &no_exclusions()).registry;
        let exclusions: HashSet<TaxId> = [id("42")].into_iter().collect();
        let out = reconcile(base, &[obs("kept", "42")], &exclusions);
        let rec = out.registry.get(&id("42")).unwrap();
        assert!(!rec.is_new);
        assert!(out.report.excluded.is_empty());
    }

    #[test]
    fn first_occurrence_wins_within_batch() {
        let out = reconcile(
            Registry::new(),
            &[obs("first", "7"), obs("other", "8"), obs("second", "7")],
            &no_exclusions(),
        );
        assert_eq!(out.registry.len(), 2);
        assert_eq!(out.registry.get(&id("7")).unwrap().display_name, "first");
        assert_eq!(out.registry.get(&id("8")).unwrap().sequence_number, 2);
        assert_eq!(out.report.duplicates, vec![id("7")]);
    }

    #[test]
    fn normalization_matches_across_forms() {
        let base = reconcile(Registry::new(), &[obs("a", "7704726225")], &no_exclusions()).registry;
        let out = reconcile(base, &[obs("a", " 7704726225.0 ")], &no_exclusions());
        assert_eq!(out.registry.len(), 1);
        assert_eq!(out.report.known, 1);
    }

    #[test]
    fn malformed_rows_are_rejected_and_reported() {
        let out = reconcile(
            Registry::new(),
            &[obs("bad", "12-34"), obs("blank", ""), obs("good", "1")],
            &no_exclusions(),
        );
        assert_eq!(out.registry.len(), 1);
        assert_eq!(out.registry.records()[0].sequence_number, 1);
        assert_eq!(out.report.rejected.len(), 2);
        assert_eq!(out.report.rejected[0].position, 0);
        assert_eq!(out.report.rejected[0].raw_tax_id, "12-34");
        assert_eq!(out.report.rejected[1].name, "blank");
    }

    #[test]
    fn numbering_continues_after_gaps() {
        let mut a = CompanyRecord::new(3, id("1"), "a");
        a.is_new = false;
        let mut b = CompanyRecord::new(10, id("2"), "b");
        b.is_new = false;
        let reg = Registry::from_records(vec![a, b]).unwrap();
        let out = reconcile(reg, &[obs("c", "3"), obs("d", "4")], &no_exclusions());
        let seqs: Vec<u32> = out.registry.iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![3, 10, 11, 12]);
    }

    #[test]
    fn absent_records_are_retained_unchanged() {
        let base = reconcile(Registry::new(), &[obs("a", "1"), obs("b", "2")], &no_exclusions()).registry;
        let out = reconcile(base.clone(), &[obs("a", "1")], &no_exclusions());
        assert_eq!(out.registry.get(&id("2")), base.get(&id("2")));
        assert_eq!(out.registry.len(), 2);
    }
}
