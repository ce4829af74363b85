pub mod execute_query;
pub mod start_run;

pub use execute_query::{ExecutionError, ExecutionSummary, QueryExecutor};
pub use start_run::{enqueue_run, mark_run_failed, RunRequest};
