use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::engine::{TaskState, Transition};
use crate::ledger;
use crate::model::{CompletedTaskRecord, Goal, Task};
use crate::notifier::Change;
use crate::streak::{self, StreakAudit};
use crate::today::Today;
use crate::transfer::{ExportStats, ImportSummary};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDetail<'a> {
    #[serde(flatten)]
    pub goal: &'a Goal,
    pub current_run: u32,
    pub longest_run: u32,
    pub tasks: &'a [Task],
    pub completed_count: usize,
}

fn goal_icon(goal: &Goal, selected: Option<i64>) -> char {
    if selected == Some(goal.id) {
        '>'
    } else if goal.is_archived {
        '-'
    } else {
        '.'
    }
}

pub fn format_goal_list(goals: &[Goal], selected: Option<i64>, today: NaiveDate) -> String {
    let mut out = String::new();
    for goal in goals {
        let habit = if goal.is_habit {
            format!("  [habit, {} day streak]", streak::current_run(&goal.streak, today))
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{} {} {}{}\n",
            goal_icon(goal, selected),
            goal.id,
            goal.title,
            habit
        ));
    }
    out
}

pub fn format_goal_detail(
    goal: &Goal,
    tasks: &[Task],
    records: &[CompletedTaskRecord],
    today: NaiveDate,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Id:          {}\n", goal.id));
    out.push_str(&format!("Title:       {}\n", goal.title));
    if !goal.description.is_empty() {
        out.push_str(&format!("Description: {}\n", goal.description));
    }
    out.push_str(&format!(
        "Kind:        {}\n",
        if goal.is_habit { "habit" } else { "goal" }
    ));
    if goal.is_archived {
        out.push_str("Archived:    yes\n");
    }
    out.push_str(&format!("Tasks:       {}\n", tasks.len()));
    out.push_str(&format!("Completed:   {}\n", records.len()));

    if goal.is_habit {
        out.push_str(&format!(
            "Streak:      {} (longest {})\n",
            streak::current_run(&goal.streak, today),
            streak::longest_run(&goal.streak)
        ));
        let report = streak::audit(goal, records);
        if !report.is_consistent() {
            out.push_str(&format_audit(&report));
        }
    }

    if !tasks.is_empty() {
        out.push('\n');
        out.push_str("Tasks:\n");
        for line in format_task_list(tasks).lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }
    out
}

fn format_days(days: &[NaiveDate]) -> String {
    days.iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_audit(report: &StreakAudit) -> String {
    let mut out = String::new();
    if !report.unsupported.is_empty() {
        out.push_str(&format!(
            "Marked only: {}\n",
            format_days(&report.unsupported)
        ));
    }
    if !report.missing.is_empty() {
        out.push_str(&format!("Unmarked:    {}\n", format_days(&report.missing)));
    }
    out
}

pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::new();
    for (i, task) in tasks.iter().enumerate() {
        let due = task
            .due_date
            .map(|d| format!("  (due {})", d.with_timezone(&Local).format("%Y-%m-%d")))
            .unwrap_or_default();
        out.push_str(&format!("{}. {} {}{}\n", i + 1, task.id, task.title, due));
    }
    out
}

/// Completed records grouped by local day, newest first.
pub fn format_history(records: &[CompletedTaskRecord]) -> String {
    let mut out = String::new();
    for (day, group) in ledger::group_by_day(records) {
        out.push_str(&format!("{}\n", day.format("%Y-%m-%d (%a)")));
        for record in group {
            out.push_str(&format!(
                "  {} {} {}\n",
                record.completed_at.with_timezone(&Local).format("%H:%M"),
                record.id(),
                record.task.title
            ));
        }
    }
    out
}

pub fn format_today(today: Option<&Today>) -> String {
    let Some(today) = today else {
        return "No goal selected for today\n".to_string();
    };
    let mut out = format!("Goal: {}\n", today.goal.title);
    match (&today.current_task, today.completed_today) {
        (Some(task), _) => out.push_str(&format!("Next: {} {}\n", task.id, task.title)),
        (None, true) => out.push_str("Done for today\n"),
        (None, false) => out.push_str("No tasks left\n"),
    }
    out.push_str(&format!("Remaining: {}\n", today.remaining));
    out
}

pub fn format_export_stats(stats: &ExportStats) -> String {
    format!(
        "{} goals, {} tasks, {} completed tasks\n",
        stats.goal_count, stats.task_count, stats.completed_task_count
    )
}

pub fn format_import_summary(summary: &ImportSummary) -> String {
    format!(
        "Imported {} goals, {} tasks, {} completed tasks\n",
        summary.goals, summary.tasks, summary.completed_tasks
    )
}

/// Status line for a toggle. A missing goal or task is reported, not an error.
pub fn format_toggle(transition: Option<&Transition>, goal_id: i64, task_id: i64) -> String {
    match transition.map(|t| t.to) {
        Some(TaskState::CompletedToday) => format!("Completed task {task_id}\n"),
        Some(TaskState::Pending) => format!("Undid today's completion of task {task_id}\n"),
        None => format!("Task {task_id} is not an active task of goal {goal_id}; nothing changed\n"),
    }
}

/// One line describing a change made by another process.
pub fn format_change(change: &Change) -> String {
    match change {
        Change::Goals(goals) => format!("goals: {} total\n", goals.len()),
        Change::Selection(id) => format!("selected goal: {id}\n"),
        Change::Tasks { goal_id, tasks } => {
            format!("goal {goal_id}: {} active tasks\n", tasks.len())
        }
        Change::Ledger { goal_id, records } => {
            format!("goal {goal_id}: {} completed tasks\n", records.len())
        }
    }
}
