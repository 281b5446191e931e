pub use crate::config::ConfigError;
pub use crate::mapper::{
    ConcurrentMapper, FailurePolicy, FailureReason, MapReport, MapStats,
    MapperError, MapperOptions, MapperOptionsBuilder, TransformFailure, WorkerId,
    WorkerStats, execute, execute_blocking,
};
