use super::WorkerId;
use serde::Serialize;
use std::time::Duration;

/// Stats of a whole call, one entry per worker ordered by worker id.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MapStats {
    pub workers: Vec<WorkerStats>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkerStats {
    pub worker_id: WorkerId,
    pub total_execution_time: Duration,
    pub items_processed: usize,
    pub items_succeeded: usize,
    pub items_failed: usize,
}

impl WorkerStats {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            total_execution_time: Duration::ZERO,
            items_processed: 0,
            items_succeeded: 0,
            items_failed: 0,
        }
    }

    pub fn record_execution_time(&mut self, duration: Duration) {
        self.total_execution_time += duration;
        self.items_processed += 1;
    }

    pub fn record_success(&mut self) {
        self.items_succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.items_failed += 1;
    }

    pub fn average_execution_time(&self) -> Duration {
        if self.items_processed == 0 {
            return Duration::ZERO;
        }
        self.total_execution_time / self.items_processed as u32
    }
}

impl MapStats {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
        }
    }

    pub fn add_worker_stats(&mut self, stats: WorkerStats) {
        let pos = self
            .workers
            .partition_point(|s| s.worker_id < stats.worker_id);
        self.workers.insert(pos, stats);
    }

    pub fn total_processed(&self) -> usize {
        self.workers.iter().map(|s| s.items_processed).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.workers.iter().map(|s| s.items_failed).sum()
    }
}
