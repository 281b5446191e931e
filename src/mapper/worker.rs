use crate::mapper::{
    FailureReason, TransformFailure, WorkerStats, error::panic_message,
};
use serde::Serialize;
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

/// Zero based position of the worker in the pool; input `i` is routed to
/// worker `i % worker_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WorkerId(usize);

impl WorkerId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope sent from the distributor into a worker inbox.
#[derive(Debug)]
pub struct Envelope<In> {
    pub index: usize,
    pub input: In,
}

/// What a worker reports to the collector for every envelope.
#[derive(Debug)]
pub enum WorkerResult<Out> {
    Output { index: usize, output: Out },
    Failure(TransformFailure),
}

/// Drain the inbox until the distributor closes it, applying `transform`
/// to every item. Panics are caught per item so the worker keeps going
/// and the collector always hears about the input.
///
/// Runs on a blocking-pool thread. `stop` is checked before every item, so
/// after it is raised at most the item already in flight gets finished.
#[instrument(name = "worker", skip_all, fields(worker_id = %worker_id))]
pub(crate) fn worker_loop<In, Out, E, F>(
    worker_id: WorkerId,
    mut inbox: mpsc::Receiver<Envelope<In>>,
    results: mpsc::Sender<WorkerResult<Out>>,
    transform: Arc<F>,
    stop: Arc<AtomicBool>,
) -> WorkerStats
where
    F: Fn(In) -> Result<Out, E> + Send + Sync + 'static,
    E: fmt::Display,
{
    let mut stats = WorkerStats::new(worker_id);

    while let Some(Envelope { index, input }) = inbox.blocking_recv() {
        if stop.load(Ordering::Acquire) {
            debug!(index, "batch interrupted; dropping queued input");
            break;
        }

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| transform(input)));
        stats.record_execution_time(started.elapsed());

        let result = match outcome {
            Ok(Ok(output)) => {
                stats.record_success();
                trace!(index, "item processed");
                WorkerResult::Output { index, output }
            }
            Ok(Err(err)) => {
                stats.record_failure();
                warn!(index, error = %err, "transform returned error");
                WorkerResult::Failure(TransformFailure {
                    index,
                    worker_id,
                    reason: FailureReason::Error(err.to_string()),
                })
            }
            Err(payload) => {
                stats.record_failure();
                let msg = panic_message(payload.as_ref());
                warn!(index, panic = %msg, "transform panicked");
                WorkerResult::Failure(TransformFailure {
                    index,
                    worker_id,
                    reason: FailureReason::Panic(msg),
                })
            }
        };

        if results.blocking_send(result).is_err() {
            debug!("collector closed; stopping early");
            break;
        }
    }

    debug!(
        processed = stats.items_processed,
        failed = stats.items_failed,
        "worker inbox drained"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn spawn_worker<F>(
        worker_id: WorkerId,
        inbox: mpsc::Receiver<Envelope<u32>>,
        results: mpsc::Sender<WorkerResult<u32>>,
        transform: F,
        stop: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<WorkerStats>
    where
        F: Fn(u32) -> Result<u32, Infallible> + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        tokio::task::spawn_blocking(move || {
            worker_loop(worker_id, inbox, results, transform, stop)
        })
    }

    #[tokio::test]
    async fn worker_processes_inbox_in_fifo_order() {
        let (inbox_tx, inbox_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);

        let handle = spawn_worker(
            WorkerId::new(0),
            inbox_rx,
            result_tx,
            |x| Ok(x * 10),
            Arc::default(),
        );

        for (index, input) in [1u32, 2, 3].into_iter().enumerate() {
            inbox_tx.send(Envelope { index, input }).await.unwrap();
        }
        drop(inbox_tx);

        let mut seen = Vec::new();
        while let Some(result) = result_rx.recv().await {
            match result {
                WorkerResult::Output { index, output } => seen.push((index, output)),
                WorkerResult::Failure(f) => panic!("unexpected failure: {f}"),
            }
        }
        assert_eq!(seen, vec![(0, 10), (1, 20), (2, 30)]);

        let stats = handle.await.unwrap();
        assert_eq!(stats.items_processed, 3);
        assert_eq!(stats.items_succeeded, 3);
    }

    #[tokio::test]
    async fn worker_survives_panicking_transform() {
        let (inbox_tx, inbox_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        let transform = |x: u32| {
            if x == 2 {
                panic!("two is not allowed");
            }
            Ok(x)
        };

        let handle = spawn_worker(
            WorkerId::new(5),
            inbox_rx,
            result_tx,
            transform,
            Arc::default(),
        );

        for (index, input) in [1u32, 2, 3].into_iter().enumerate() {
            inbox_tx.send(Envelope { index, input }).await.unwrap();
        }
        drop(inbox_tx);

        let mut outputs = Vec::new();
        let mut failures = Vec::new();
        while let Some(result) = result_rx.recv().await {
            match result {
                WorkerResult::Output { output, .. } => outputs.push(output),
                WorkerResult::Failure(f) => failures.push(f),
            }
        }

        assert_eq!(outputs, vec![1, 3]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].worker_id, WorkerId::new(5));
        assert_eq!(
            failures[0].reason,
            FailureReason::Panic("two is not allowed".to_string())
        );

        let stats = handle.await.unwrap();
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.items_succeeded, 2);
    }

    #[tokio::test]
    async fn worker_stops_when_collector_is_gone() {
        let (inbox_tx, inbox_rx) = mpsc::channel(4);
        let (result_tx, result_rx) = mpsc::channel(1);
        drop(result_rx);

        let handle = spawn_worker(
            WorkerId::new(0),
            inbox_rx,
            result_tx,
            Ok,
            Arc::default(),
        );
        inbox_tx.send(Envelope { index: 0, input: 1 }).await.unwrap();

        // Returns without the inbox being closed.
        let stats = handle.await.unwrap();
        assert_eq!(stats.items_processed, 1);
    }

    #[tokio::test]
    async fn worker_skips_queued_items_once_stopped() {
        let (inbox_tx, inbox_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        let stop = Arc::new(AtomicBool::new(true));

        for (index, input) in [1u32, 2, 3].into_iter().enumerate() {
            inbox_tx.send(Envelope { index, input }).await.unwrap();
        }
        let handle = spawn_worker(WorkerId::new(1), inbox_rx, result_tx, Ok, stop);

        // Inbox still open, the worker leaves on the stop flag alone.
        let stats = handle.await.unwrap();
        assert_eq!(stats.items_processed, 0);
        assert!(result_rx.recv().await.is_none());
        drop(inbox_tx);
    }
}
