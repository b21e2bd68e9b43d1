//! Cross-context synchronization.
//!
//! Other contexts' writes show up in the store's change log. The notifier
//! decodes them into typed [`Change`]s and a [`View`] folds them into an
//! in-memory projection. Delivery is per key with no multi-key atomicity, so a
//! view may briefly hold a goal whose task list has not arrived yet.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;

use crate::goals::{self, GOALS_KEY, SELECTED_GOAL_KEY};
use crate::ledger;
use crate::model::{CompletedTaskRecord, Goal, Task};
use crate::store::{Store, StoreChange};
use crate::tasks;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Goals(Vec<Goal>),
    Selection(i64),
    Tasks {
        goal_id: i64,
        tasks: Vec<Task>,
    },
    Ledger {
        goal_id: i64,
        records: Vec<CompletedTaskRecord>,
    },
}

fn decode_json<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("ignoring undecodable change to '{key}': {e}");
            None
        }
    }
}

/// Decode a raw store change. Unknown keys, removals and payloads that do
/// not decode yield `None`.
pub fn decode(change: &StoreChange) -> Option<Change> {
    let raw = change.new_value.as_deref()?;
    let key = change.key.as_str();
    if key == GOALS_KEY {
        return decode_json(key, raw).map(Change::Goals);
    }
    if key == SELECTED_GOAL_KEY {
        return match raw.trim().parse() {
            Ok(id) => Some(Change::Selection(id)),
            Err(_) => {
                log::warn!("ignoring malformed selection change '{raw}'");
                None
            }
        };
    }
    if let Some(goal_id) = tasks::goal_id_from_key(key) {
        return decode_json(key, raw).map(|mut tasks: Vec<Task>| {
            tasks::dedupe_ids(&mut tasks);
            Change::Tasks { goal_id, tasks }
        });
    }
    if let Some(goal_id) = ledger::goal_id_from_key(key) {
        return decode_json(key, raw).map(|records| Change::Ledger { goal_id, records });
    }
    None
}

pub struct ChangeNotifier {
    cursor: i64,
}

impl ChangeNotifier {
    /// Start listening from the store's current position; earlier writes are
    /// assumed to be already reflected in whatever the caller loaded.
    pub fn new(store: &Store) -> Result<Self> {
        Ok(ChangeNotifier {
            cursor: store.latest_change()?,
        })
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Changes made by other contexts since the last poll, oldest first.
    pub fn poll(&mut self, store: &Store) -> Result<Vec<Change>> {
        let raw = store.changes_since(self.cursor)?;
        if let Some(last) = raw.last() {
            self.cursor = last.seq;
        }
        Ok(raw.iter().filter_map(decode).collect())
    }

    /// Poll and fold everything into `view`. Returns how many changes applied.
    pub fn sync(&mut self, store: &Store, view: &mut View) -> Result<usize> {
        let changes = self.poll(store)?;
        let n = changes.len();
        for change in changes {
            view.apply(change);
        }
        Ok(n)
    }
}

/// In-memory projection of the store a context renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
    pub goals: Vec<Goal>,
    pub selected_goal: Option<i64>,
    pub tasks: BTreeMap<i64, Vec<Task>>,
    pub ledgers: BTreeMap<i64, Vec<CompletedTaskRecord>>,
}

impl View {
    pub fn load(store: &Store) -> Result<Self> {
        let goals = goals::list_all(store)?;
        let mut view = View {
            selected_goal: goals::selected(store)?,
            ..View::default()
        };
        for goal in &goals {
            view.tasks.insert(goal.id, tasks::load(store, goal.id)?);
            view.ledgers
                .insert(goal.id, ledger::records_for(store, goal.id)?);
        }
        view.goals = goals;
        Ok(view)
    }

    pub fn apply(&mut self, change: Change) {
        match change {
            Change::Goals(goals) => {
                // Removals are not delivered; drop what belonged to deleted goals.
                self.tasks.retain(|id, _| goals.iter().any(|g| g.id == *id));
                self.ledgers.retain(|id, _| goals.iter().any(|g| g.id == *id));
                let still_active = self
                    .selected_goal
                    .is_some_and(|id| goals.iter().any(|g| g.id == id && !g.is_archived));
                if !still_active {
                    self.selected_goal = None;
                }
                self.goals = goals;
            }
            Change::Selection(id) => self.selected_goal = Some(id),
            Change::Tasks { goal_id, tasks } => {
                self.tasks.insert(goal_id, tasks);
            }
            Change::Ledger { goal_id, records } => {
                self.ledgers.insert(goal_id, records);
            }
        }
    }

    pub fn active_goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| !g.is_archived)
    }

    pub fn goal(&self, id: i64) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    pub fn tasks_for(&self, goal_id: i64) -> &[Task] {
        self.tasks.get(&goal_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether any task of the goal was completed on `day`.
    pub fn completed_on(&self, goal_id: i64, day: NaiveDate) -> bool {
        self.ledgers
            .get(&goal_id)
            .is_some_and(|records| records.iter().any(|r| r.day() == day))
    }
}
