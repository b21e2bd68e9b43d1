mod cli;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use clap::Parser;

use achieve::engine;
use achieve::model::{local_day, parse_day, Goal};
use achieve::notifier::{ChangeNotifier, View};
use achieve::output;
use achieve::store::Store;
use achieve::streak::{self, StreakEdit};
use achieve::{goals, ledger, paths, tasks, today, transfer, watch};

use cli::{Cli, Command, GoalCommand, TaskCommand};

fn resolve_db_path(cli_db: Option<String>) -> String {
    cli_db.unwrap_or_else(paths::db_path)
}

fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or(paths::LOG_ENV, "warn"))
        .format_timestamp_secs()
        .init();
}

/// Local midnight of a `YYYY-MM-DD` argument.
fn parse_day_arg(s: &str) -> Result<DateTime<Utc>> {
    let Some(day) = parse_day(s) else {
        bail!("invalid day '{s}', expected YYYY-MM-DD");
    };
    match Local.from_local_datetime(&day.and_time(NaiveTime::MIN)).earliest() {
        Some(at) => Ok(at.with_timezone(&Utc)),
        None => bail!("day '{s}' has no local midnight"),
    }
}

fn main() {
    setup_logging();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db);
    ensure_db_dir(&db_path)?;
    let store = Store::open(&db_path)?;
    let now = Utc::now();

    match cli.command {
        Command::Init => {
            eprintln!("Initialized store at {db_path}");
        }

        Command::Goal(cmd) => run_goal(&store, cmd, now)?,

        Command::Task(cmd) => run_task(&store, cmd, now)?,

        Command::Toggle { goal, task } => {
            let transition = engine::toggle(&store, task, goal, now)?;
            eprint!("{}", output::format_toggle(transition.as_ref(), goal, task));
        }

        Command::Select { goal, clear } => {
            if goal.is_none() && !clear {
                bail!("pass a goal id or --clear");
            }
            goals::select(&store, goal)?;
            match goal {
                Some(id) => eprintln!("Selected goal {id} for today"),
                None => eprintln!("Cleared today's goal"),
            }
        }

        Command::Today { next, json } => {
            let view = today::today(&store, now, next)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print!("{}", output::format_today(view.as_ref()));
            }
        }

        Command::History { goal, json } => {
            goals::require(&store, goal)?;
            let records = ledger::records_for(&store, goal)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print!("{}", output::format_history(&records));
            }
        }

        Command::Forget {
            goal,
            task,
            completed_at,
        } => {
            let at = DateTime::parse_from_rfc3339(&completed_at)
                .with_context(|| format!("invalid timestamp '{completed_at}'"))?
                .with_timezone(&Utc);
            if !engine::delete_completed(&store, goal, task, at)? {
                bail!("no completion of task {task} at {completed_at}");
            }
            eprintln!("Deleted completion of task {task}");
        }

        Command::Export { path, stats } => {
            if stats {
                print!("{}", output::format_export_stats(&transfer::export_stats(&store)?));
            } else {
                let path = path.unwrap_or_else(|| transfer::default_file_name(now));
                let written = transfer::write_export(&store, std::path::Path::new(&path), now)?;
                eprint!("Exported {}", output::format_export_stats(&written));
                println!("{path}");
            }
        }

        Command::Import { path } => {
            let summary = transfer::import_file(&store, std::path::Path::new(&path))?;
            eprint!("{}", output::format_import_summary(&summary));
        }

        Command::Watch { poll_interval } => {
            let mut view = View::load(&store)?;
            let mut notifier = ChangeNotifier::new(&store)?;
            let (_watcher, rx) = watch::watch_db(&db_path)?;
            let timeout = Duration::from_secs(poll_interval.max(1));
            loop {
                watch::wait_for_change(&rx, timeout);
                watch::drain_events(&rx);
                for change in notifier.poll(&store)? {
                    print!("{}", output::format_change(&change));
                    view.apply(change);
                }
                log::debug!(
                    "view at change {}: {} goals",
                    notifier.cursor(),
                    view.goals.len()
                );
            }
        }
    }

    Ok(())
}

fn run_goal(store: &Store, cmd: GoalCommand, now: DateTime<Utc>) -> Result<()> {
    match cmd {
        GoalCommand::New { title, desc, habit } => {
            let id = goals::next_id(store, now)?;
            goals::create(store, Goal::new(id, &title, &desc, habit))?;
            println!("{id}");
            eprintln!("Created goal '{title}'");
        }

        GoalCommand::List { all, json } => {
            let list = if all {
                goals::list_all(store)?
            } else {
                goals::list_active(store)?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                let selected = goals::selected(store)?;
                print!("{}", output::format_goal_list(&list, selected, local_day(now)));
            }
        }

        GoalCommand::Show { goal, json } => {
            let goal = goals::require(store, goal)?;
            let active = tasks::load(store, goal.id)?;
            let records = ledger::records_for(store, goal.id)?;
            let today = local_day(now);
            if json {
                let detail = output::GoalDetail {
                    goal: &goal,
                    current_run: streak::current_run(&goal.streak, today),
                    longest_run: streak::longest_run(&goal.streak),
                    tasks: &active,
                    completed_count: records.len(),
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!(
                    "{}",
                    output::format_goal_detail(&goal, &active, &records, today)
                );
            }
        }

        GoalCommand::Edit {
            goal,
            title,
            desc,
            habit,
        } => {
            let mut g = goals::require(store, goal)?;
            if let Some(title) = title {
                if title.trim().is_empty() {
                    bail!("goal title must not be empty");
                }
                g.title = title;
            }
            if let Some(desc) = desc {
                g.description = desc;
            }
            if let Some(habit) = habit {
                g.is_habit = habit;
            }
            goals::update(store, g)?;
            eprintln!("Updated goal {goal}");
        }

        GoalCommand::Archive { goal } => {
            goals::archive(store, goal)?;
            eprintln!("Archived goal {goal}");
        }

        GoalCommand::Unarchive { goal } => {
            goals::unarchive(store, goal)?;
            eprintln!("Restored goal {goal}");
        }

        GoalCommand::Rm { goal } => {
            goals::delete(store, goal)?;
            eprintln!("Deleted goal {goal}");
        }

        GoalCommand::Mark { goal, day } => {
            let day = match day {
                Some(s) => local_day(parse_day_arg(&s)?),
                None => local_day(now),
            };
            match streak::toggle_day(store, goal, day)? {
                StreakEdit::Added => eprintln!("Marked {day}"),
                StreakEdit::Removed => eprintln!("Unmarked {day}"),
                StreakEdit::HasCompletions(records) => {
                    eprintln!("{day} has completed tasks; delete them with `forget` first");
                    print!("{}", output::format_history(&records));
                }
            }
        }
    }
    Ok(())
}

fn run_task(store: &Store, cmd: TaskCommand, now: DateTime<Utc>) -> Result<()> {
    match cmd {
        TaskCommand::Add { goal, title, due } => {
            goals::require(store, goal)?;
            let due = due.as_deref().map(parse_day_arg).transpose()?;
            let task = tasks::add(store, goal, &title, due, now)?;
            println!("{}", task.id);
            eprintln!("Added task '{}'", task.title);
        }

        TaskCommand::List { goal, json } => {
            let list = tasks::load(store, goal)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print!("{}", output::format_task_list(&list));
            }
        }

        TaskCommand::Rm { goal, task } => {
            tasks::remove(store, goal, task)?;
            eprintln!("Removed task {task}");
        }

        TaskCommand::Move {
            goal,
            task,
            position,
        } => {
            if position == 0 {
                bail!("positions start at 1");
            }
            tasks::reorder(store, goal, task, position - 1)?;
            eprintln!("Moved task {task} to position {position}");
        }

        TaskCommand::Rename { goal, task, title } => {
            tasks::rename(store, goal, task, &title)?;
            eprintln!("Renamed task {task}");
        }
    }
    Ok(())
}
