mod dispatcher;
pub mod error;
pub mod executor;
pub mod options;
pub mod stats;
pub mod worker;

pub use error::{FailureReason, MapperError, TransformFailure};
pub use executor::{ConcurrentMapper, MapReport, execute, execute_blocking};
pub use options::{
    FailurePolicy, MAX_WORKER_COUNT, MapperOptions, MapperOptionsBuilder,
    MapperOptionsBuilderError,
};
pub use stats::{MapStats, WorkerStats};
pub use worker::{Envelope, WorkerId, WorkerResult};
