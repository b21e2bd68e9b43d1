//! Task completion state machine.
//!
//! Each (goal, task, day) is either `Pending` or `CompletedToday`. Toggling
//! flips it and produces effects on three keys: the ledger, the active task
//! list and the goal's streak. [`plan_toggle`] decides the transition from a
//! snapshot without touching the store; [`toggle`] loads the snapshot, plans,
//! and applies the effects in ledger, tasks, goal order.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use crate::goals;
use crate::ledger;
use crate::model::{local_day, CompletedTaskRecord, Goal, Task};
use crate::store::Store;
use crate::streak;
use crate::tasks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    CompletedToday,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    AppendRecord(CompletedTaskRecord),
    RemoveRecord { id: i64, completed_at: DateTime<Utc> },
    SaveTasks(Vec<Task>),
    AddStreakDay(NaiveDate),
    RemoveStreakDay(NaiveDate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: TaskState,
    pub to: TaskState,
    pub effects: Vec<Effect>,
}

pub fn state_of(records: &[CompletedTaskRecord], task_id: i64, today: NaiveDate) -> TaskState {
    if records.iter().any(|r| r.id() == task_id && r.day() == today) {
        TaskState::CompletedToday
    } else {
        TaskState::Pending
    }
}

/// Decide what toggling `task_id` at `now` does. `None` when the task is not
/// in the goal's active list.
pub fn plan_toggle(
    goal: &Goal,
    tasks: &[Task],
    records: &[CompletedTaskRecord],
    task_id: i64,
    now: DateTime<Utc>,
) -> Option<Transition> {
    let task = tasks.iter().find(|t| t.id == task_id)?;
    let today = local_day(now);
    let from = state_of(records, task_id, today);

    let mut effects = Vec::new();
    let to = match from {
        TaskState::Pending => {
            effects.push(Effect::AppendRecord(CompletedTaskRecord::new(task, now)));
            let mut remaining: Vec<Task> =
                tasks.iter().filter(|t| t.id != task_id).cloned().collect();
            if goal.is_habit {
                // Habit tasks rotate to the back instead of leaving the list.
                remaining.push(Task {
                    completed: false,
                    ..task.clone()
                });
                effects.push(Effect::SaveTasks(remaining));
                if !streak::contains(&goal.streak, today) {
                    effects.push(Effect::AddStreakDay(today));
                }
            } else {
                effects.push(Effect::SaveTasks(remaining));
            }
            TaskState::CompletedToday
        }
        TaskState::CompletedToday => {
            effects.extend(
                records
                    .iter()
                    .filter(|r| r.id() == task_id && r.day() == today)
                    .map(|r| Effect::RemoveRecord {
                        id: r.id(),
                        completed_at: r.completed_at,
                    }),
            );
            if goal.is_habit {
                let others_today = records
                    .iter()
                    .any(|r| r.id() != task_id && r.day() == today);
                if !others_today && streak::contains(&goal.streak, today) {
                    effects.push(Effect::RemoveStreakDay(today));
                }
            }
            TaskState::Pending
        }
    };

    Some(Transition { from, to, effects })
}

fn apply(store: &Store, goal_id: i64, effects: &[Effect]) -> Result<()> {
    for effect in effects {
        match effect {
            Effect::AppendRecord(record) => ledger::append(store, goal_id, record.clone())?,
            Effect::RemoveRecord { id, completed_at } => {
                ledger::remove_one(store, goal_id, *id, *completed_at)?;
            }
            Effect::SaveTasks(list) => tasks::save(store, goal_id, list)?,
            Effect::AddStreakDay(day) => {
                let mut goal = goals::require(store, goal_id)?;
                if streak::insert(&mut goal.streak, *day) {
                    goals::update(store, goal)?;
                }
            }
            Effect::RemoveStreakDay(day) => {
                let mut goal = goals::require(store, goal_id)?;
                if streak::remove(&mut goal.streak, *day) {
                    goals::update(store, goal)?;
                }
            }
        }
    }
    Ok(())
}

/// Complete or un-complete a task for today. Unknown goal or task is a no-op
/// and returns `None`. Callers must not run two toggles for the same task
/// concurrently.
pub fn toggle(
    store: &Store,
    task_id: i64,
    goal_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Transition>> {
    store.atomically(|store| {
        let Some(goal) = goals::get(store, goal_id)? else {
            log::debug!("toggle ignored: goal {goal_id} not found");
            return Ok(None);
        };
        let active = tasks::load(store, goal_id)?;
        let records = ledger::records_for(store, goal_id)?;
        let Some(transition) = plan_toggle(&goal, &active, &records, task_id, now) else {
            log::debug!("toggle ignored: task {task_id} not in goal {goal_id}");
            return Ok(None);
        };
        apply(store, goal_id, &transition.effects)?;
        log::debug!(
            "task {task_id} of goal {goal_id}: {:?} -> {:?}",
            transition.from,
            transition.to
        );
        Ok(Some(transition))
    })
}

/// Whether this specific task has a completion dated today.
pub fn is_completed_today(
    store: &Store,
    goal_id: i64,
    task_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let records = ledger::records_for(store, goal_id)?;
    Ok(state_of(&records, task_id, local_day(now)) == TaskState::CompletedToday)
}

/// Delete one completed record (history view) and drop its day from the
/// goal's streak when no other completion remains on that day. Returns false
/// when no record matched.
pub fn delete_completed(
    store: &Store,
    goal_id: i64,
    id: i64,
    completed_at: DateTime<Utc>,
) -> Result<bool> {
    store.atomically(|store| {
        if !ledger::remove_one(store, goal_id, id, completed_at)? {
            return Ok(false);
        }
        let day = local_day(completed_at);
        if !ledger::has_record_on_day(store, goal_id, day)? {
            if let Some(mut goal) = goals::get(store, goal_id)? {
                if streak::remove(&mut goal.streak, day) {
                    goals::update(store, goal)?;
                }
            }
        }
        log::info!("deleted completion of task {id} in goal {goal_id}");
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 1, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn task(id: i64, goal_id: i64) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            completed: false,
            due_date: None,
            goal_id: Some(goal_id),
        }
    }

    fn ids(list: &[Task]) -> Vec<i64> {
        list.iter().map(|t| t.id).collect()
    }

    #[test]
    fn unknown_task_plans_nothing() {
        let goal = Goal::new(1, "Run", "", true);
        assert!(plan_toggle(&goal, &[task(10, 1)], &[], 99, at(1, 9)).is_none());
    }

    #[test]
    fn completing_habit_rotates_and_marks_day() {
        let goal = Goal::new(1, "Run", "", true);
        let list = vec![task(10, 1), task(11, 1)];
        let plan = plan_toggle(&goal, &list, &[], 10, at(1, 9)).unwrap();

        assert_eq!(plan.from, TaskState::Pending);
        assert_eq!(plan.to, TaskState::CompletedToday);
        match &plan.effects[..] {
            [Effect::AppendRecord(r), Effect::SaveTasks(saved), Effect::AddStreakDay(day)] => {
                assert_eq!(r.id(), 10);
                assert!(r.task.completed);
                assert_eq!(r.completed_at, at(1, 9));
                assert_eq!(ids(saved), vec![11, 10]);
                assert!(!saved[1].completed);
                assert_eq!(*day, local_day(at(1, 9)));
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn completing_habit_on_marked_day_skips_streak() {
        let mut goal = Goal::new(1, "Run", "", true);
        goal.streak.push(local_day(at(1, 9)));
        let plan = plan_toggle(&goal, &[task(10, 1)], &[], 10, at(1, 20)).unwrap();
        assert!(!plan
            .effects
            .iter()
            .any(|e| matches!(e, Effect::AddStreakDay(_))));
    }

    #[test]
    fn completing_one_off_removes_task() {
        let goal = Goal::new(2, "Ship", "", false);
        let list = vec![task(20, 2), task(21, 2)];
        let plan = plan_toggle(&goal, &list, &[], 20, at(1, 9)).unwrap();
        match &plan.effects[..] {
            [Effect::AppendRecord(r), Effect::SaveTasks(saved)] => {
                assert_eq!(r.id(), 20);
                assert_eq!(ids(saved), vec![21]);
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn undo_last_completion_clears_day() {
        let mut goal = Goal::new(1, "Run", "", true);
        goal.streak.push(local_day(at(1, 9)));
        let records = vec![CompletedTaskRecord::new(&task(10, 1), at(1, 9))];
        let plan = plan_toggle(&goal, &[task(10, 1)], &records, 10, at(1, 18)).unwrap();

        assert_eq!(plan.from, TaskState::CompletedToday);
        assert_eq!(
            plan.effects,
            vec![
                Effect::RemoveRecord {
                    id: 10,
                    completed_at: at(1, 9)
                },
                Effect::RemoveStreakDay(local_day(at(1, 9))),
            ]
        );
    }

    #[test]
    fn undo_keeps_day_when_other_task_done() {
        let mut goal = Goal::new(1, "Run", "", true);
        goal.streak.push(local_day(at(1, 9)));
        let records = vec![
            CompletedTaskRecord::new(&task(10, 1), at(1, 9)),
            CompletedTaskRecord::new(&task(11, 1), at(1, 10)),
        ];
        let list = vec![task(10, 1), task(11, 1)];
        let plan = plan_toggle(&goal, &list, &records, 10, at(1, 18)).unwrap();
        assert_eq!(plan.effects.len(), 1);
        assert!(matches!(plan.effects[0], Effect::RemoveRecord { id: 10, .. }));
    }

    #[test]
    fn yesterdays_completion_counts_as_pending() {
        let goal = Goal::new(1, "Run", "", true);
        let records = vec![CompletedTaskRecord::new(&task(10, 1), at(1, 9))];
        let plan = plan_toggle(&goal, &[task(10, 1)], &records, 10, at(2, 9)).unwrap();
        assert_eq!(plan.from, TaskState::Pending);
    }

    #[test]
    fn toggle_applies_and_undoes() {
        let store = Store::open_memory().unwrap();
        goals::create(&store, Goal::new(1, "Run", "", true)).unwrap();
        tasks::save(&store, 1, &[task(10, 1)]).unwrap();

        let done = toggle(&store, 10, 1, at(1, 9)).unwrap().unwrap();
        assert_eq!(done.to, TaskState::CompletedToday);
        assert!(is_completed_today(&store, 1, 10, at(1, 12)).unwrap());
        assert_eq!(
            goals::require(&store, 1).unwrap().streak,
            vec![local_day(at(1, 9))]
        );

        let undone = toggle(&store, 10, 1, at(1, 12)).unwrap().unwrap();
        assert_eq!(undone.to, TaskState::Pending);
        assert!(goals::require(&store, 1).unwrap().streak.is_empty());
        assert!(ledger::records_for(&store, 1).unwrap().is_empty());
        assert_eq!(ids(&tasks::load(&store, 1).unwrap()), vec![10]);
    }

    #[test]
    fn toggle_missing_goal_or_task_is_noop() {
        let store = Store::open_memory().unwrap();
        assert!(toggle(&store, 10, 1, at(1, 9)).unwrap().is_none());
        goals::create(&store, Goal::new(1, "Run", "", true)).unwrap();
        assert!(toggle(&store, 10, 1, at(1, 9)).unwrap().is_none());
        assert_eq!(store.get(&ledger::key(1)).unwrap(), None);
    }

    #[test]
    fn deleting_completion_drops_empty_day() {
        let store = Store::open_memory().unwrap();
        goals::create(&store, Goal::new(1, "Run", "", true)).unwrap();
        tasks::save(&store, 1, &[task(10, 1), task(11, 1)]).unwrap();
        toggle(&store, 10, 1, at(1, 9)).unwrap();
        toggle(&store, 11, 1, at(1, 10)).unwrap();

        assert!(delete_completed(&store, 1, 10, at(1, 9)).unwrap());
        assert_eq!(goals::require(&store, 1).unwrap().streak.len(), 1);

        assert!(delete_completed(&store, 1, 11, at(1, 10)).unwrap());
        assert!(goals::require(&store, 1).unwrap().streak.is_empty());

        assert!(!delete_completed(&store, 1, 11, at(1, 10)).unwrap());
    }
}
