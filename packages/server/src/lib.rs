// Citation Pipeline - Core
//
// Runs batches of queries against AI chat platforms, extracts the URLs they
// cite, fetches and scores each cited page.
//
// Work is distributed through a durable queue (kernel/jobs) drained by
// bounded-runtime workers that hand off to a fresh invocation when work
// remains. Domain logic lives in domains/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
