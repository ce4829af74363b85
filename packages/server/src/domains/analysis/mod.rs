//! Analysis domain - runs, per-query execution and their stored results

pub mod actions;
pub mod models;
pub mod report;
pub mod store;

pub use actions::{enqueue_run, mark_run_failed, QueryExecutor, RunRequest};
pub use models::{AnalysisRun, PageAnalysis, QueryResult, RunStatus};
pub use report::{build_run_report, RunReport};
pub use store::{ResultStore, RunStore};
