//! Goal and habit tracking core: goals with ordered task lists, a per-goal
//! completion ledger, daily streaks, and change propagation between processes
//! sharing one SQLite-backed store.

pub mod engine;
pub mod goals;
pub mod ledger;
pub mod model;
pub mod notifier;
pub mod output;
pub mod paths;
pub mod store;
pub mod streak;
pub mod tasks;
pub mod today;
pub mod transfer;
pub mod watch;
