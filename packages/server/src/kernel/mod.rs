//! Kernel module - pipeline infrastructure and dependencies.

pub mod classifier;
pub mod concurrency;
pub mod deps;
pub mod dispatch;
pub mod jobs;
pub mod scoring;
pub mod test_dependencies;
pub mod traits;

pub use classifier::MentionClassifier;
pub use concurrency::ConcurrencyLimit;
pub use deps::PipelineDeps;
pub use dispatch::{ChatCompletionDispatcher, DispatchError, DispatchResponse, PlatformEndpoint};
pub use scoring::{LlmContentScorer, NoopContentScorer};
pub use traits::*;
