use std::collections::{HashMap, HashSet};

use iprtrack_core::{CompanyRecord, TaxId};

use crate::error::ReconError;

/// The persisted set of company records.
///
/// Lookup is by tax id; the append order is kept separately because it is
/// the published row order and must survive every pass unchanged. Records
/// are never removed, so positions are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    records: Vec<CompanyRecord>,
    index: HashMap<TaxId, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows in file order. Duplicate tax ids or sequence numbers
    /// are rejected.
    pub fn from_records(records: Vec<CompanyRecord>) -> Result<Self, ReconError> {
        let mut registry = Self::new();
        let mut sequences = HashSet::new();
        for record in records {
            if !sequences.insert(record.sequence_number) {
                return Err(ReconError::DuplicateSequence {
                    sequence_number: record.sequence_number,
                });
            }
            registry.push(record)?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, tax_id: &TaxId) -> bool {
        self.index.contains_key(tax_id)
    }

    pub fn get(&self, tax_id: &TaxId) -> Option<&CompanyRecord> {
        self.index.get(tax_id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, tax_id: &TaxId) -> Option<&mut CompanyRecord> {
        self.index.get(tax_id).map(|&i| &mut self.records[i])
    }

    /// 0-based position in append order.
    pub fn position(&self, tax_id: &TaxId) -> Option<usize> {
        self.index.get(tax_id).copied()
    }

    /// Records in append order.
    pub fn iter(&self) -> impl Iterator<Item = &CompanyRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[CompanyRecord] {
        &self.records
    }

    pub fn tax_ids(&self) -> Vec<TaxId> {
        self.records.iter().map(|r| r.tax_id.clone()).collect()
    }

    /// Highest assigned sequence number, 0 when empty.
    pub fn max_sequence(&self) -> u32 {
        self.records
            .iter()
            .map(|r| r.sequence_number)
            .max()
            .unwrap_or(0)
    }

    /// Append a record at the end of the order.
    pub fn push(&mut self, record: CompanyRecord) -> Result<(), ReconError> {
        if self.index.contains_key(&record.tax_id) {
            return Err(ReconError::DuplicateTaxId {
                tax_id: record.tax_id.to_string(),
            });
        }
        self.index.insert(record.tax_id.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn into_records(self) -> Vec<CompanyRecord> {
        self.records
    }
}
