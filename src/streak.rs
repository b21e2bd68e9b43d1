//! Streak calendar: the set of days a habit goal was satisfied.
//!
//! The engine keeps the streak in step with the ledger. Calendar edits made
//! here may add days with no completion behind them; [`audit`] reports those.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::goals;
use crate::ledger;
use crate::model::{CompletedTaskRecord, Goal};
use crate::store::Store;

pub fn contains(streak: &[NaiveDate], day: NaiveDate) -> bool {
    streak.contains(&day)
}

/// Append `day` unless present. Returns whether it was added.
pub fn insert(streak: &mut Vec<NaiveDate>, day: NaiveDate) -> bool {
    if contains(streak, day) {
        return false;
    }
    streak.push(day);
    true
}

/// Returns whether `day` was present.
pub fn remove(streak: &mut Vec<NaiveDate>, day: NaiveDate) -> bool {
    let before = streak.len();
    streak.retain(|d| *d != day);
    streak.len() != before
}

/// Outcome of clicking a day on the streak calendar.
#[derive(Debug, Clone, PartialEq)]
pub enum StreakEdit {
    Added,
    Removed,
    /// The day has completions; the streak is untouched and the records are
    /// returned so the caller can show or delete them.
    HasCompletions(Vec<CompletedTaskRecord>),
}

pub fn toggle_day(store: &Store, goal_id: i64, day: NaiveDate) -> Result<StreakEdit> {
    let mut goal = goals::require(store, goal_id)?;
    if !goal.is_habit {
        bail!("goal {goal_id} is not a habit");
    }
    if !contains(&goal.streak, day) {
        insert(&mut goal.streak, day);
        goals::update(store, goal)?;
        return Ok(StreakEdit::Added);
    }
    let records = ledger::records_on_day(store, goal_id, day)?;
    if !records.is_empty() {
        return Ok(StreakEdit::HasCompletions(records));
    }
    remove(&mut goal.streak, day);
    goals::update(store, goal)?;
    Ok(StreakEdit::Removed)
}

/// Consecutive marked days ending at `today`, or at yesterday when today is
/// not marked yet.
pub fn current_run(streak: &[NaiveDate], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = streak.iter().copied().collect();
    let mut cursor = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(d) => d,
            None => return 0,
        }
    };
    let mut run = 0;
    while days.contains(&cursor) {
        run += 1;
        match cursor.pred_opt() {
            Some(d) => cursor = d,
            None => break,
        }
    }
    run
}

pub fn longest_run(streak: &[NaiveDate]) -> u32 {
    let days: BTreeSet<NaiveDate> = streak.iter().copied().collect();
    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for day in days {
        run = match prev {
            Some(p) if p.succ_opt() == Some(day) => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(day);
    }
    best
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreakAudit {
    /// Marked days with no completion record (manual calendar marks).
    pub unsupported: Vec<NaiveDate>,
    /// Days with completions that are not marked.
    pub missing: Vec<NaiveDate>,
}

impl StreakAudit {
    pub fn is_consistent(&self) -> bool {
        self.unsupported.is_empty() && self.missing.is_empty()
    }
}

pub fn audit(goal: &Goal, records: &[CompletedTaskRecord]) -> StreakAudit {
    let marked: BTreeSet<NaiveDate> = goal.streak.iter().copied().collect();
    let done: BTreeSet<NaiveDate> = records.iter().map(|r| r.day()).collect();
    StreakAudit {
        unsupported: marked.difference(&done).copied().collect(),
        missing: done.difference(&marked).copied().collect(),
    }
}
