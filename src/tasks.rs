use std::collections::HashSet;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::model::Task;
use crate::store::Store;

const KEY_PREFIX: &str = "tasks_";

pub fn key(goal_id: i64) -> String {
    format!("{KEY_PREFIX}{goal_id}")
}

/// Inverse of [`key`]: `tasks_12` → `Some(12)`.
pub fn goal_id_from_key(key: &str) -> Option<i64> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok()
}

/// The goal's active tasks in display order.
pub fn load(store: &Store, goal_id: i64) -> Result<Vec<Task>> {
    let mut tasks: Vec<Task> = store.get_json(&key(goal_id))?;
    let bumped = dedupe_ids(&mut tasks);
    if bumped > 0 {
        log::warn!("goal {goal_id}: reassigned {bumped} duplicate task ids");
    }
    Ok(tasks)
}

/// Fractional ids collapse when truncated, so two tasks can read back with
/// the same id. Every holder after the first gets a fresh id above the list's
/// maximum. Returns how many ids changed.
pub fn dedupe_ids(tasks: &mut [Task]) -> usize {
    let mut next = tasks.iter().map(|t| t.id).max().unwrap_or(0);
    let mut seen = HashSet::new();
    let mut bumped = 0;
    for task in tasks.iter_mut() {
        if !seen.insert(task.id) {
            next += 1;
            task.id = next;
            seen.insert(next);
            bumped += 1;
        }
    }
    bumped
}

pub fn save(store: &Store, goal_id: i64, tasks: &[Task]) -> Result<()> {
    store.set_json(&key(goal_id), tasks)
}

pub fn clear(store: &Store, goal_id: i64) -> Result<()> {
    store.remove(&key(goal_id))
}

pub fn add(
    store: &Store,
    goal_id: i64,
    title: &str,
    due_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Task> {
    let title = title.trim();
    if title.is_empty() {
        bail!("task title must not be empty");
    }
    let mut tasks = load(store, goal_id)?;
    let mut id = Task::new_id(now);
    while tasks.iter().any(|t| t.id == id) {
        id += 1;
    }
    let task = Task {
        id,
        title: title.to_string(),
        completed: false,
        due_date: Some(due_date.unwrap_or(now)),
        goal_id: Some(goal_id),
    };
    tasks.push(task.clone());
    save(store, goal_id, &tasks)?;
    Ok(task)
}

pub fn remove(store: &Store, goal_id: i64, task_id: i64) -> Result<()> {
    let mut tasks = load(store, goal_id)?;
    let before = tasks.len();
    tasks.retain(|t| t.id != task_id);
    if tasks.len() == before {
        bail!("task {task_id} not found in goal {goal_id}");
    }
    save(store, goal_id, &tasks)
}

pub fn rename(store: &Store, goal_id: i64, task_id: i64, title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("task title must not be empty");
    }
    let mut tasks = load(store, goal_id)?;
    let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
        bail!("task {task_id} not found in goal {goal_id}");
    };
    task.title = title.to_string();
    save(store, goal_id, &tasks)
}

/// Move a task to `target_index`, clamped to the end of the list.
pub fn reorder(store: &Store, goal_id: i64, task_id: i64, target_index: usize) -> Result<()> {
    let mut tasks = load(store, goal_id)?;
    let Some(from) = tasks.iter().position(|t| t.id == task_id) else {
        bail!("task {task_id} not found in goal {goal_id}");
    };
    let task = tasks.remove(from);
    let to = target_index.min(tasks.len());
    tasks.insert(to, task);
    save(store, goal_id, &tasks)
}
