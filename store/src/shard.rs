use chrono::NaiveDate;
use plagued_common::PatientRecord;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::debug;

/// Ordering key for the date-indexed trees: admission date plus a
/// strictly increasing synthetic sequence id assigned at ingestion.
///
/// The sequence id only breaks ties between same-day records; 0 and
/// `u64::MAX` act as the lower/upper sentinels when scanning a range, so
/// an inclusive range picks up every record of its boundary days.
pub type EntryKey = (NaiveDate, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The record id already exists in this shard; nothing was mutated.
    Duplicate,
}

/// One worker's in-memory shard: a point-lookup map over record ids plus
/// a per-disease index ordered by admission date.
///
/// Owned exclusively by the worker process that holds the shard; never
/// shared across processes.
#[derive(Debug, Default)]
pub struct ShardStore {
    patients: HashMap<String, PatientRecord>,
    disease_index: HashMap<String, BTreeMap<EntryKey, String>>,
    next_seq: u64,
}

impl ShardStore {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Insert an admission record. Duplicate record ids are rejected
    /// without touching any index.
    pub fn insert(&mut self, record: PatientRecord) -> InsertOutcome {
        if self.patients.contains_key(&record.record_id) {
            return InsertOutcome::Duplicate;
        }

        let key = (record.entry_date, self.next_seq);
        self.next_seq += 1;

        self.disease_index
            .entry(record.disease_id.clone())
            .or_default()
            .insert(key, record.record_id.clone());
        self.patients.insert(record.record_id.clone(), record);

        InsertOutcome::Inserted
    }

    /// Apply an EXIT line: set the record's exit date, at most once.
    ///
    /// Rejected when the record is absent, already discharged, the
    /// credentials don't match the admission, the exit age is lower than
    /// the entry age, or the exit date precedes the entry date.
    #[allow(clippy::too_many_arguments)]
    pub fn record_exit(
        &mut self,
        record_id: &str,
        first_name: &str,
        last_name: &str,
        disease_id: &str,
        country: &str,
        age: u16,
        exit_date: NaiveDate,
    ) -> bool {
        let Some(record) = self.patients.get_mut(record_id) else {
            return false;
        };
        if record.exit_date.is_some() {
            debug!(record_id, "exit for an already discharged patient");
            return false;
        }
        if record.first_name != first_name
            || record.last_name != last_name
            || record.disease_id != disease_id
            || record.country != country
        {
            return false;
        }
        if record.age > age || exit_date < record.entry_date {
            return false;
        }
        record.exit_date = Some(exit_date);
        true
    }

    pub fn find_patient(&self, record_id: &str) -> Option<&PatientRecord> {
        self.patients.get(record_id)
    }

    /// Count records of `disease` admitted within `[from, to]`
    /// (inclusive; `None` means unbounded on that side), optionally
    /// filtered by country.
    ///
    /// One ordered scan over the disease tree: the sentinel sequence ids
    /// in the range bounds make ties at the boundary dates resolve to
    /// "all records of that day". Absent disease => 0.
    pub fn admissions_in_range(
        &self,
        disease: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        country: Option<&str>,
    ) -> u64 {
        let Some(tree) = self.disease_index.get(disease) else {
            return 0;
        };
        self.range_count(tree, from, to, country)
    }

    /// Count records of `disease` *discharged* within `[from, to]`,
    /// optionally filtered by country. The exit date is not part of the
    /// ordering key, so this is a full walk of the disease tree.
    pub fn discharges_in_range(
        &self,
        disease: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        country: Option<&str>,
    ) -> u64 {
        let Some(tree) = self.disease_index.get(disease) else {
            return 0;
        };
        tree.values()
            .filter_map(|id| self.patients.get(id))
            .filter(|rec| {
                let Some(exit) = rec.exit_date else {
                    return false;
                };
                from.is_none_or(|d| exit >= d)
                    && to.is_none_or(|d| exit <= d)
                    && country.is_none_or(|c| rec.country == c)
            })
            .count() as u64
    }

    fn range_count(
        &self,
        tree: &BTreeMap<EntryKey, String>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        country: Option<&str>,
    ) -> u64 {
        let lower = match from {
            Some(d) => Bound::Included((d, 0)),
            None => Bound::Unbounded,
        };
        let upper = match to {
            Some(d) => Bound::Included((d, u64::MAX)),
            None => Bound::Unbounded,
        };
        let in_range = tree.range((lower, upper));
        match country {
            None => in_range.count() as u64,
            Some(c) => in_range
                .filter_map(|(_, id)| self.patients.get(id))
                .filter(|rec| rec.country == c)
                .count() as u64,
        }
    }
}
