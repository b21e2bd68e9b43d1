//! Per-goal log of completed tasks. The only authority on whether a goal had
//! something done on a given day.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use crate::model::CompletedTaskRecord;
use crate::store::Store;

const KEY_PREFIX: &str = "completed_tasks_";

pub fn key(goal_id: i64) -> String {
    format!("{KEY_PREFIX}{goal_id}")
}

pub fn goal_id_from_key(key: &str) -> Option<i64> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok()
}

pub fn records_for(store: &Store, goal_id: i64) -> Result<Vec<CompletedTaskRecord>> {
    store.get_json(&key(goal_id))
}

pub fn save(store: &Store, goal_id: i64, records: &[CompletedTaskRecord]) -> Result<()> {
    store.set_json(&key(goal_id), records)
}

pub fn clear(store: &Store, goal_id: i64) -> Result<()> {
    store.remove(&key(goal_id))
}

pub fn append(store: &Store, goal_id: i64, record: CompletedTaskRecord) -> Result<()> {
    let mut records = records_for(store, goal_id)?;
    records.push(record);
    save(store, goal_id, &records)
}

/// Remove the first record with this `(id, completed_at)` pair.
/// Returns false when nothing matched.
pub fn remove_one(
    store: &Store,
    goal_id: i64,
    id: i64,
    completed_at: DateTime<Utc>,
) -> Result<bool> {
    let mut records = records_for(store, goal_id)?;
    let Some(pos) = records.iter().position(|r| r.matches(id, completed_at)) else {
        return Ok(false);
    };
    records.remove(pos);
    save(store, goal_id, &records)?;
    Ok(true)
}

pub fn has_record_on_day(store: &Store, goal_id: i64, day: NaiveDate) -> Result<bool> {
    Ok(records_for(store, goal_id)?.iter().any(|r| r.day() == day))
}

pub fn records_on_day(
    store: &Store,
    goal_id: i64,
    day: NaiveDate,
) -> Result<Vec<CompletedTaskRecord>> {
    let mut records = records_for(store, goal_id)?;
    records.retain(|r| r.day() == day);
    Ok(records)
}

/// Every goal's ledger that has a key in the store, keyed by goal id.
pub fn all_records(store: &Store) -> Result<BTreeMap<i64, Vec<CompletedTaskRecord>>> {
    let mut out = BTreeMap::new();
    for k in store.keys_with_prefix(KEY_PREFIX)? {
        if let Some(goal_id) = goal_id_from_key(&k) {
            out.insert(goal_id, records_for(store, goal_id)?);
        }
    }
    Ok(out)
}

/// Group records by local calendar day, newest day first.
pub fn group_by_day(records: &[CompletedTaskRecord]) -> Vec<(NaiveDate, Vec<&CompletedTaskRecord>)> {
    let mut days: BTreeMap<NaiveDate, Vec<&CompletedTaskRecord>> = BTreeMap::new();
    for record in records {
        days.entry(record.day()).or_default().push(record);
    }
    days.into_iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use chrono::{Local, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 1, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn task(id: i64) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            completed: false,
            due_date: None,
            goal_id: Some(1),
        }
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn day_queries_ignore_time_of_day() {
        let store = Store::open_memory().unwrap();
        append(&store, 1, CompletedTaskRecord::new(&task(10), at(1, 0))).unwrap();
        append(&store, 1, CompletedTaskRecord::new(&task(11), at(1, 23))).unwrap();
        append(&store, 1, CompletedTaskRecord::new(&task(10), at(2, 8))).unwrap();

        assert!(has_record_on_day(&store, 1, jan(1)).unwrap());
        assert!(!has_record_on_day(&store, 1, jan(3)).unwrap());
        assert_eq!(records_on_day(&store, 1, jan(1)).unwrap().len(), 2);
        assert_eq!(records_on_day(&store, 1, jan(2)).unwrap().len(), 1);
        assert!(!has_record_on_day(&store, 2, jan(1)).unwrap());
    }

    #[test]
    fn remove_one_matches_id_and_timestamp() {
        let store = Store::open_memory().unwrap();
        append(&store, 1, CompletedTaskRecord::new(&task(10), at(1, 9))).unwrap();
        append(&store, 1, CompletedTaskRecord::new(&task(10), at(2, 9))).unwrap();

        assert!(!remove_one(&store, 1, 10, at(3, 9)).unwrap());
        assert!(!remove_one(&store, 1, 11, at(1, 9)).unwrap());
        assert!(remove_one(&store, 1, 10, at(1, 9)).unwrap());

        let left = records_for(&store, 1).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].completed_at, at(2, 9));
    }

    #[test]
    fn remove_one_takes_only_one_duplicate() {
        let store = Store::open_memory().unwrap();
        let record = CompletedTaskRecord::new(&task(10), at(1, 9));
        append(&store, 1, record.clone()).unwrap();
        append(&store, 1, record).unwrap();
        assert!(remove_one(&store, 1, 10, at(1, 9)).unwrap());
        assert_eq!(records_for(&store, 1).unwrap().len(), 1);
    }

    #[test]
    fn all_records_and_grouping() {
        let store = Store::open_memory().unwrap();
        append(&store, 1, CompletedTaskRecord::new(&task(10), at(1, 9))).unwrap();
        append(&store, 1, CompletedTaskRecord::new(&task(11), at(2, 9))).unwrap();
        append(&store, 3, CompletedTaskRecord::new(&task(30), at(2, 9))).unwrap();
        store.set("tasks_1", "[]").unwrap();

        let all = all_records(&store).unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 3]);

        let grouped = group_by_day(&all[&1]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, jan(2));
        assert_eq!(grouped[1].0, jan(1));
    }
}
