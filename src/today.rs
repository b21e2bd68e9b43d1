use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::goals;
use crate::ledger;
use crate::model::{local_day, Goal, Task};
use crate::store::Store;
use crate::tasks;

/// What the "today" panel shows for the selected goal.
#[derive(Debug, Clone, Serialize)]
pub struct Today {
    pub goal: Goal,
    /// First active task, hidden once something was completed today unless
    /// the caller asked to reveal the next one.
    pub current_task: Option<Task>,
    pub completed_today: bool,
    pub remaining: usize,
}

pub fn today(store: &Store, now: DateTime<Utc>, reveal_next: bool) -> Result<Option<Today>> {
    let Some(goal_id) = goals::selected(store)? else {
        return Ok(None);
    };
    let Some(goal) = goals::get(store, goal_id)? else {
        return Ok(None);
    };
    if goal.is_archived {
        return Ok(None);
    }
    let active = tasks::load(store, goal_id)?;
    let completed_today = ledger::has_record_on_day(store, goal_id, local_day(now))?;
    let current_task = if completed_today && !reveal_next {
        None
    } else {
        active.first().cloned()
    };
    Ok(Some(Today {
        goal,
        current_task,
        completed_today,
        remaining: active.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;
    use chrono::{Local, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 1, 1, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn nothing_selected() {
        let store = Store::open_memory().unwrap();
        assert!(today(&store, at(9), false).unwrap().is_none());
    }

    #[test]
    fn hides_next_task_after_completion() {
        let store = Store::open_memory().unwrap();
        goals::create(&store, Goal::new(1, "Run", "", true)).unwrap();
        let a = tasks::add(&store, 1, "A", None, at(8)).unwrap();
        let b = tasks::add(&store, 1, "B", None, at(8)).unwrap();
        goals::select(&store, Some(1)).unwrap();

        let view = today(&store, at(9), false).unwrap().unwrap();
        assert_eq!(view.current_task.as_ref().map(|t| t.id), Some(a.id));
        assert!(!view.completed_today);

        engine::toggle(&store, a.id, 1, at(9)).unwrap();

        let view = today(&store, at(10), false).unwrap().unwrap();
        assert!(view.completed_today);
        assert!(view.current_task.is_none());
        assert_eq!(view.remaining, 2);

        let view = today(&store, at(10), true).unwrap().unwrap();
        assert_eq!(view.current_task.map(|t| t.id), Some(b.id));
    }

    #[test]
    fn selection_pointing_at_deleted_goal() {
        let store = Store::open_memory().unwrap();
        store.set(goals::SELECTED_GOAL_KEY, "7").unwrap();
        assert!(today(&store, at(9), false).unwrap().is_none());
    }
}
