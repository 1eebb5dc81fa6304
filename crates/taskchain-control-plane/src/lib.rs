//! taskchain control plane library.
//!
//! Task queue with priority and retry/backoff, a bounded worker pool with
//! an executor registry, an in-process event bus, a hash-chained audit log
//! and the HTTP surface over all of them.

pub mod audit;
pub mod bus;
pub mod config;
pub mod http;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod store;

pub use audit::AuditChain;
pub use bus::EventBus;
pub use config::Config;
pub use pool::{executor_fn, TaskContext, TaskExecutor, WorkerPool};
pub use queue::TaskQueue;
pub use scheduler::Scheduler;
pub use state::AppState;
