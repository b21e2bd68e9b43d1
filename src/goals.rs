use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::ledger;
use crate::model::Goal;
use crate::store::Store;
use crate::tasks;

pub const GOALS_KEY: &str = "achieve_goals";
pub const SELECTED_GOAL_KEY: &str = "selected_goal_for_today";

pub fn list_all(store: &Store) -> Result<Vec<Goal>> {
    store.get_json(GOALS_KEY)
}

pub fn list_active(store: &Store) -> Result<Vec<Goal>> {
    let mut goals = list_all(store)?;
    goals.retain(|g| !g.is_archived);
    Ok(goals)
}

pub fn get(store: &Store, id: i64) -> Result<Option<Goal>> {
    Ok(list_all(store)?.into_iter().find(|g| g.id == id))
}

pub fn require(store: &Store, id: i64) -> Result<Goal> {
    match get(store, id)? {
        Some(goal) => Ok(goal),
        None => bail!("goal {id} not found"),
    }
}

/// Overwrite the whole goal list.
pub fn save_all(store: &Store, goals: &[Goal]) -> Result<()> {
    store.set_json(GOALS_KEY, goals)
}

pub fn create(store: &Store, goal: Goal) -> Result<()> {
    if goal.title.trim().is_empty() {
        bail!("goal title must not be empty");
    }
    let mut goals = list_all(store)?;
    if goals.iter().any(|g| g.id == goal.id) {
        bail!("goal {} already exists", goal.id);
    }
    log::info!("creating goal {} '{}'", goal.id, goal.title);
    goals.push(goal);
    save_all(store, &goals)
}

/// Full replace by id. Archiving through here also drops the selection.
pub fn update(store: &Store, goal: Goal) -> Result<()> {
    let mut goals = list_all(store)?;
    let Some(slot) = goals.iter_mut().find(|g| g.id == goal.id) else {
        bail!("goal {} not found", goal.id);
    };
    let archived = goal.is_archived;
    let id = goal.id;
    *slot = goal;
    save_all(store, &goals)?;
    if archived {
        clear_selection_if(store, id)?;
    }
    Ok(())
}

pub fn archive(store: &Store, id: i64) -> Result<()> {
    let mut goal = require(store, id)?;
    goal.is_archived = true;
    update(store, goal)
}

pub fn unarchive(store: &Store, id: i64) -> Result<()> {
    let mut goal = require(store, id)?;
    goal.is_archived = false;
    update(store, goal)
}

/// Permanently delete a goal together with its task list and ledger.
pub fn delete(store: &Store, id: i64) -> Result<()> {
    store.atomically(|store| {
        let mut goals = list_all(store)?;
        let before = goals.len();
        goals.retain(|g| g.id != id);
        if goals.len() == before {
            bail!("goal {id} not found");
        }
        save_all(store, &goals)?;
        tasks::clear(store, id)?;
        ledger::clear(store, id)?;
        clear_selection_if(store, id)
    })?;
    log::info!("deleted goal {id}");
    Ok(())
}

/// A fresh goal id derived from the clock, bumped past any id already taken.
pub fn next_id(store: &Store, now: DateTime<Utc>) -> Result<i64> {
    let goals = list_all(store)?;
    let mut id = now.timestamp_millis();
    while goals.iter().any(|g| g.id == id) {
        id += 1;
    }
    Ok(id)
}

pub fn selected(store: &Store) -> Result<Option<i64>> {
    let Some(raw) = store.get(SELECTED_GOAL_KEY)? else {
        return Ok(None);
    };
    match raw.trim().parse() {
        Ok(id) => Ok(Some(id)),
        Err(_) => {
            log::warn!("ignoring malformed selected goal '{raw}'");
            Ok(None)
        }
    }
}

pub fn select(store: &Store, id: Option<i64>) -> Result<()> {
    match id {
        Some(id) => {
            let goal = require(store, id)?;
            if goal.is_archived {
                bail!("goal {id} is archived");
            }
            store.set(SELECTED_GOAL_KEY, &id.to_string())
        }
        None => store.remove(SELECTED_GOAL_KEY),
    }
}

fn clear_selection_if(store: &Store, id: i64) -> Result<()> {
    if selected(store)? == Some(id) {
        store.remove(SELECTED_GOAL_KEY)?;
    }
    Ok(())
}
