//! Work queue infrastructure for the query pipeline.
//!
//! - [`WorkQueue`] - Durable queue with atomic claim, retry and stuck-item recovery
//! - [`PostgresWorkQueue`] / [`MemoryWorkQueue`] - Implementations
//! - [`QueryWorker`] - Bounded-runtime worker with continuation
//! - [`WorkItem`] - One (query, platform) unit of work
//!
//! # Architecture
//!
//! ```text
//! enqueue_run(queries)
//!     │
//!     └─► WorkQueue.enqueue_many()  ──► WorkerTrigger.trigger()
//!
//! QueryWorker.run()
//!     │
//!     ├─► WorkQueue.claim_batch()   (FOR UPDATE SKIP LOCKED)
//!     ├─► WorkItemHandler.execute() (domains/analysis QueryExecutor)
//!     ├─► complete / fail_or_retry + RunStore counters
//!     └─► WorkerTrigger.trigger()   when items remain
//! ```
//!
//! Business logic stays in domains; this module only moves items through states.

mod memory;
mod queue;
mod trigger;
mod work_item;
mod worker;

pub use memory::MemoryWorkQueue;
pub use queue::{PostgresWorkQueue, WorkQueue};
pub use trigger::{ChannelTrigger, HttpWorkerTrigger, NoopTrigger};
pub use work_item::{
    ErrorKind, FailureOutcome, QueryPayload, QueueCounts, WorkItem, WorkItemStatus,
};
pub use worker::{
    HandlerError, QueryWorker, StopReason, WorkItemHandler, WorkerConfig, WorkerInvocation,
    WorkerReport,
};
