//! # fanout
//!
//! `fanout` maps a function over a batch of inputs on a fixed pool of
//! workers and hands back the results in no particular order.
//!
//! Inputs are dealt round-robin to one bounded inbox per worker, every
//! worker pushes its results into a shared collector, and the call returns
//! once the last worker is done. Each call owns its tasks and channels and
//! tears them down before returning.
//!
//! ## Features
//!
//! - **Round-Robin Distribution**: input `i` goes to worker `i % worker_count`,
//!   every worker processes its share in FIFO order.
//! - **Parallel Workers**: each worker runs on tokio's blocking pool, so
//!   CPU-bound or blocking transforms run side by side on any runtime.
//! - **Back-pressure**: tiny bounded inboxes, a worker never races ahead of
//!   its own unconsumed items.
//! - **Failure Policies**: fail-fast (default) or best-effort with a list of
//!   failed inputs. Panics inside the transform are caught per item.
//! - **Deadlines and Cancellation**: optional timeout and shutdown signal.
//! - **Per-worker Stats**: processed/failed counts and execution time.
//! - **YAML Options**: load `MapperOptions` from a section of a config file.
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! let squares = fanout::execute(3, vec![1, 2, 3, 4, 5], |x: i32| x * x).await?;
//! ```
//!
//! Outside of a tokio runtime use [`execute_blocking`]. Check demos!
//!
//! ## Modules
//!
//! - `mapper`: the executor, its options, errors and stats.
//! - `config`: YAML loading of executor options.
pub mod config;
pub mod mapper;
pub mod prelude;

pub use mapper::{
    ConcurrentMapper, MapReport, MapperError, MapperOptions, execute,
    execute_blocking,
};

// re-export
pub use serde_yaml;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;
