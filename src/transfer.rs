//! Export and import of the whole data set as a single JSON document.
//!
//! Import merges: goals get fresh ids above the existing maximum and every
//! task and completion is re-keyed through that translation, so importing
//! the same file twice yields two independent copies.

use std::collections::{BTreeMap, HashMap};
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::goals;
use crate::ledger;
use crate::model::{CompletedTaskRecord, Goal, Task};
use crate::store::Store;
use crate::tasks;

/// Largest file accepted for import.
pub const MAX_IMPORT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<DateTime<Utc>>,
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub tasks: BTreeMap<i64, Vec<Task>>,
    #[serde(default)]
    pub completed_tasks: BTreeMap<i64, Vec<CompletedTaskRecord>>,
    #[serde(default)]
    pub selected_goal: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub goal_count: usize,
    pub task_count: usize,
    pub completed_task_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub goals: usize,
    pub tasks: usize,
    pub completed_tasks: usize,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("please select a valid JSON file")]
    NotJson,
    #[error("file is too large ({size} bytes); maximum size is 10MB")]
    TooLarge { size: u64 },
    #[error("failed to read the file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse the import file; make sure it is a JSON export: {0}")]
    Parse(serde_json::Error),
    #[error("invalid file format: {0}")]
    InvalidShape(String),
    #[error("failed to write imported data: {0:#}")]
    Store(anyhow::Error),
}

pub fn collect(store: &Store, now: DateTime<Utc>) -> anyhow::Result<ExportData> {
    let goals = goals::list_all(store)?;
    let mut data = ExportData {
        export_date: Some(now),
        goals: Vec::new(),
        tasks: BTreeMap::new(),
        completed_tasks: BTreeMap::new(),
        selected_goal: goals::selected(store)?,
    };
    for goal in &goals {
        data.tasks.insert(goal.id, tasks::load(store, goal.id)?);
        data.completed_tasks
            .insert(goal.id, ledger::records_for(store, goal.id)?);
    }
    data.goals = goals;
    Ok(data)
}

pub fn export_stats(store: &Store) -> anyhow::Result<ExportStats> {
    let mut stats = ExportStats::default();
    for goal in goals::list_all(store)? {
        stats.goal_count += 1;
        stats.task_count += tasks::load(store, goal.id)?.len();
        stats.completed_task_count += ledger::records_for(store, goal.id)?.len();
    }
    Ok(stats)
}

pub fn default_file_name(now: DateTime<Utc>) -> String {
    format!("achieve-data-export-{}.json", now.format("%Y-%m-%d"))
}

/// Write the export next to `path` and atomically move it into place.
pub fn write_export(store: &Store, path: &Path, now: DateTime<Utc>) -> anyhow::Result<ExportStats> {
    let data = collect(store, now)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, &data)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("exported {} goals to {}", data.goals.len(), path.display());
    Ok(ExportStats {
        goal_count: data.goals.len(),
        task_count: data.tasks.values().map(Vec::len).sum(),
        completed_task_count: data.completed_tasks.values().map(Vec::len).sum(),
    })
}

/// File-level checks done before the content is read.
pub fn validate_file(path: &Path) -> Result<(), ImportError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if !is_json {
        return Err(ImportError::NotJson);
    }
    let size = std::fs::metadata(path)?.len();
    if size > MAX_IMPORT_BYTES {
        return Err(ImportError::TooLarge { size });
    }
    Ok(())
}

pub fn import_file(store: &Store, path: &Path) -> Result<ImportSummary, ImportError> {
    validate_file(path)?;
    let content = std::fs::read_to_string(path)?;
    import_str(store, &content)
}

pub fn import_str(store: &Store, content: &str) -> Result<ImportSummary, ImportError> {
    let data = parse(content)?;
    store
        .atomically(|store| merge(store, data))
        .map_err(ImportError::Store)
}

/// Parse and shape-check an export document without touching any store.
pub fn parse(content: &str) -> Result<ExportData, ImportError> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(ImportError::Parse)?;
    match value.get("goals") {
        Some(serde_json::Value::Array(_)) => {}
        _ => {
            return Err(ImportError::InvalidShape(
                "missing or invalid goals data".into(),
            ))
        }
    }
    serde_json::from_value(value).map_err(|e| ImportError::InvalidShape(e.to_string()))
}

fn merge(store: &Store, data: ExportData) -> anyhow::Result<ImportSummary> {
    let mut all_goals = goals::list_all(store)?;
    let base = all_goals.iter().map(|g| g.id).max().unwrap_or(0);

    let mut goal_ids: HashMap<i64, i64> = HashMap::new();
    let mut summary = ImportSummary::default();
    for (offset, mut goal) in (1..).zip(data.goals) {
        let new_id = base + offset;
        goal_ids.insert(goal.id, new_id);
        goal.id = new_id;
        all_goals.push(goal);
        summary.goals += 1;
    }
    goals::save_all(store, &all_goals)?;

    let mut tasks_by_goal = data.tasks;
    let mut records_by_goal = data.completed_tasks;
    let mut translated: Vec<(&i64, &i64)> = goal_ids.iter().collect();
    translated.sort();
    for (old_id, &new_id) in translated {
        let incoming_tasks = tasks_by_goal.remove(old_id).unwrap_or_default();
        let incoming_records = records_by_goal.remove(old_id).unwrap_or_default();
        if incoming_tasks.is_empty() && incoming_records.is_empty() {
            continue;
        }

        let mut existing_tasks = tasks::load(store, new_id)?;
        let mut existing_records = ledger::records_for(store, new_id)?;
        let mut next_id = existing_tasks
            .iter()
            .map(|t| t.id)
            .chain(existing_records.iter().map(|r| r.id()))
            .max()
            .unwrap_or(0);
        // Truncated fractional ids can repeat, so tasks are numbered by
        // position. A record keeps its task link only when exactly one
        // incoming task carried its id; records sharing any other id share
        // one fresh id.
        let mut holders: HashMap<i64, usize> = HashMap::new();
        for task in &incoming_tasks {
            *holders.entry(task.id).or_default() += 1;
        }
        let mut linked: HashMap<i64, i64> = HashMap::new();
        for mut task in incoming_tasks {
            next_id += 1;
            if holders.get(&task.id) == Some(&1) {
                linked.insert(task.id, next_id);
            }
            task.id = next_id;
            task.goal_id = Some(new_id);
            existing_tasks.push(task);
            summary.tasks += 1;
        }
        for mut record in incoming_records {
            record.task.id = *linked.entry(record.task.id).or_insert_with(|| {
                next_id += 1;
                next_id
            });
            record.task.goal_id = Some(new_id);
            existing_records.push(record);
            summary.completed_tasks += 1;
        }
        tasks::save(store, new_id, &existing_tasks)?;
        ledger::save(store, new_id, &existing_records)?;
    }

    for old_id in tasks_by_goal.keys().chain(records_by_goal.keys()) {
        log::warn!("import skipped entries for unknown goal {old_id}");
    }
    log::info!(
        "imported {} goals, {} tasks, {} completed tasks",
        summary.goals,
        summary.tasks,
        summary.completed_tasks
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    const SAMPLE: &str = r#"{
        "exportDate": "2024-01-31T10:00:00.000Z",
        "goals": [
            {"id": 1700000000000, "title": "Run", "description": "", "isHabit": true,
             "streak": ["2024-01-30T23:00:00.000Z"]},
            {"id": 1700000000001, "title": "Ship", "description": "v1"}
        ],
        "tasks": {
            "1700000000000": [
                {"id": 1700000000100.25, "title": "Run 5k", "completed": false,
                 "dueDate": "2024-01-01T00:00:00.000Z", "goalId": 1700000000000}
            ],
            "1700000000001": [
                {"id": 5, "title": "Write docs", "completed": false},
                {"id": 6, "title": "Tag release", "completed": false}
            ],
            "99": [{"id": 1, "title": "orphan", "completed": false}]
        },
        "completedTasks": {
            "1700000000000": [
                {"id": 1700000000100.25, "title": "Run 5k", "completed": true,
                 "completedAt": "2024-01-31T08:00:00.000Z", "goalId": 1700000000000}
            ]
        },
        "selectedGoal": 1700000000000
    }"#;

    #[test]
    fn rejects_non_json_and_bad_shape() {
        let store = Store::open_memory().unwrap();
        assert!(matches!(
            import_str(&store, "not json"),
            Err(ImportError::Parse(_))
        ));
        assert!(matches!(
            import_str(&store, r#"{"tasks": {}}"#),
            Err(ImportError::InvalidShape(_))
        ));
        assert!(matches!(
            import_str(&store, r#"{"goals": {}}"#),
            Err(ImportError::InvalidShape(_))
        ));
        assert!(matches!(
            import_str(&store, r#"{"goals": [{"title": "no id"}]}"#),
            Err(ImportError::InvalidShape(_))
        ));
        assert_eq!(store.latest_change().unwrap(), 0);
    }

    #[test]
    fn imports_into_empty_store() {
        let store = Store::open_memory().unwrap();
        let summary = import_str(&store, SAMPLE).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                goals: 2,
                tasks: 3,
                completed_tasks: 1
            }
        );

        let all = goals::list_all(&store).unwrap();
        assert_eq!(all.iter().map(|g| g.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(all[0].streak.len(), 1);
        assert_eq!(goals::selected(&store).unwrap(), None);

        // the habit task and its completion still share an id
        let run_tasks = tasks::load(&store, 1).unwrap();
        let run_records = ledger::records_for(&store, 1).unwrap();
        assert_eq!(run_tasks[0].id, run_records[0].id());
        assert_eq!(run_tasks[0].goal_id, Some(1));
        assert_eq!(run_records[0].task.goal_id, Some(1));

        let ship_tasks = tasks::load(&store, 2).unwrap();
        assert_eq!(
            ship_tasks.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn colliding_fractional_ids_get_distinct_ids() {
        let store = Store::open_memory().unwrap();
        let json = r#"{
            "goals": [{"id": 7, "title": "Read"}],
            "tasks": {"7": [
                {"id": 1700000000100.25, "title": "A", "completed": false},
                {"id": 1700000000100.75, "title": "B", "completed": false},
                {"id": 1700000000200.5, "title": "C", "completed": false}
            ]},
            "completedTasks": {"7": [
                {"id": 1700000000100.25, "title": "A", "completed": true,
                 "completedAt": "2024-01-30T08:00:00.000Z"},
                {"id": 1700000000100.75, "title": "B", "completed": true,
                 "completedAt": "2024-01-30T09:00:00.000Z"},
                {"id": 1700000000200.5, "title": "C", "completed": true,
                 "completedAt": "2024-01-30T10:00:00.000Z"}
            ]}
        }"#;
        import_str(&store, json).unwrap();

        let list = tasks::load(&store, 1).unwrap();
        assert_eq!(list.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let records = ledger::records_for(&store, 1).unwrap();
        // the ambiguous pair shares an id that matches no active task
        assert_eq!(records[0].id(), 4);
        assert_eq!(records[1].id(), 4);
        assert_eq!(records[2].id(), 3);
    }

    #[test]
    fn import_appends_after_existing_goals() {
        let store = Store::open_memory().unwrap();
        goals::create(&store, Goal::new(40, "Existing", "", false)).unwrap();
        import_str(&store, SAMPLE).unwrap();
        let ids: Vec<i64> = goals::list_all(&store)
            .unwrap()
            .iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![40, 41, 42]);
    }

    #[test]
    fn renumbers_above_residual_keys() {
        let store = Store::open_memory().unwrap();
        // leftover list from a goal id that will be reused by the import
        store
            .set("tasks_1", r#"[{"id":7,"title":"stale","completed":false}]"#)
            .unwrap();
        import_str(&store, SAMPLE).unwrap();
        let list = tasks::load(&store, 1).unwrap();
        assert_eq!(list.iter().map(|t| t.id).collect::<Vec<_>>(), vec![7, 8]);
    }

    #[test]
    fn collect_and_stats() {
        let store = Store::open_memory().unwrap();
        import_str(&store, SAMPLE).unwrap();
        goals::select(&store, Some(2)).unwrap();
        let data = collect(&store, now()).unwrap();
        assert_eq!(data.selected_goal, Some(2));
        assert_eq!(data.tasks[&2].len(), 2);
        assert_eq!(
            export_stats(&store).unwrap(),
            ExportStats {
                goal_count: 2,
                task_count: 3,
                completed_task_count: 1
            }
        );
        assert_eq!(default_file_name(now()), "achieve-data-export-2024-02-01.json");
    }
}
