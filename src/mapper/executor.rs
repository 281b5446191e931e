use crate::mapper::{
    Envelope, FailurePolicy, MapStats, MapperError, MapperOptions, TransformFailure,
    WorkerId, WorkerResult, dispatcher::distributor_loop, options::worker_count_from,
    worker::worker_loop,
};
use std::{
    convert::Infallible,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinSet,
    time::Instant,
};
use tracing::{Span, debug, error, info, instrument, warn};

/// Outputs of a call together with the inputs that failed.
///
/// `outputs` carries no ordering relation to the inputs.
#[derive(Debug)]
pub struct MapReport<Out> {
    pub outputs: Vec<Out>,
    pub failures: Vec<TransformFailure>,
    pub stats: MapStats,
}

impl<Out> MapReport<Out> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fan-out/fan-in executor: a fixed pool of workers, one inbox per worker,
/// inputs handed out round-robin, results merged into one unordered vector.
///
/// Every worker is a task on tokio's blocking pool, so transforms run in
/// parallel on any runtime flavour while the collector keeps reacting to
/// deadlines and shutdown. Nothing survives between calls. Every task
/// spawned by a call is joined before the call returns, on success and on
/// failure.
#[derive(Debug, Clone)]
pub struct ConcurrentMapper {
    options: MapperOptions,
    shutdown: Option<watch::Receiver<()>>,
}

impl ConcurrentMapper {
    pub fn new(options: MapperOptions) -> Result<Self, MapperError> {
        options.validate()?;
        Ok(Self {
            options,
            shutdown: None,
        })
    }

    /// Default options with `worker_count` workers. Zero and negative
    /// counts are rejected.
    pub fn with_workers<W>(worker_count: W) -> Result<Self, MapperError>
    where
        W: TryInto<usize> + Copy + fmt::Display,
    {
        Self::new(MapperOptions {
            worker_count: worker_count_from(worker_count)?,
            ..Default::default()
        })
    }

    /// A value sent on `shutdown` while a call is running cancels that call.
    /// Values sent while the mapper is idle are ignored, so later calls run
    /// normally. A dropped sender never cancels.
    ///
    /// A transform already running is never interrupted: on cancellation
    /// each worker finishes at most the item it holds, then exits.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// All or nothing: returns exactly one output per input, or the first
    /// failure regardless of the configured failure policy.
    pub async fn execute<In, Out, F>(
        &self,
        inputs: impl IntoIterator<Item = In>,
        transform: F,
    ) -> Result<Vec<Out>, MapperError>
    where
        In: Send + 'static,
        Out: Send + 'static,
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        let transform = move |input: In| Ok::<Out, Infallible>(transform(input));
        let report = self
            .run(inputs.into_iter().collect(), transform, FailurePolicy::FailFast)
            .await?;
        Ok(report.outputs)
    }

    /// Like [`ConcurrentMapper::execute`], but panics are handled according
    /// to the configured failure policy.
    pub async fn execute_report<In, Out, F>(
        &self,
        inputs: impl IntoIterator<Item = In>,
        transform: F,
    ) -> Result<MapReport<Out>, MapperError>
    where
        In: Send + 'static,
        Out: Send + 'static,
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        let transform = move |input: In| Ok::<Out, Infallible>(transform(input));
        self.run(
            inputs.into_iter().collect(),
            transform,
            self.options.failure_policy,
        )
        .await
    }

    /// Map a fallible transform. `Err` values and panics are both handled
    /// according to the configured failure policy.
    pub async fn try_execute<In, Out, E, F>(
        &self,
        inputs: impl IntoIterator<Item = In>,
        transform: F,
    ) -> Result<MapReport<Out>, MapperError>
    where
        In: Send + 'static,
        Out: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(In) -> Result<Out, E> + Send + Sync + 'static,
    {
        self.run(
            inputs.into_iter().collect(),
            transform,
            self.options.failure_policy,
        )
        .await
    }

    /// Synchronous [`ConcurrentMapper::execute`] on a private runtime.
    ///
    /// Fails with [`MapperError::InvalidConfiguration`] when called from
    /// within a tokio runtime; use [`ConcurrentMapper::execute`] there.
    pub fn execute_blocking<In, Out, F>(
        &self,
        inputs: impl IntoIterator<Item = In>,
        transform: F,
    ) -> Result<Vec<Out>, MapperError>
    where
        In: Send + 'static,
        Out: Send + 'static,
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(MapperError::InvalidConfiguration(
                "execute_blocking called from within a tokio runtime; \
                 await execute instead"
                    .to_string(),
            ));
        }
        let runtime = self.build_runtime()?;
        runtime.block_on(self.execute(inputs, transform))
    }

    // Workers live on the blocking pool, sized to fit all of them.
    fn build_runtime(&self) -> Result<tokio::runtime::Runtime, MapperError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(self.options.worker_count)
            .thread_name("fanout-worker")
            .enable_all()
            .build()?;
        Ok(runtime)
    }

    #[instrument(
        name = "fanout",
        skip_all,
        fields(workers = self.options.worker_count, inputs = inputs.len())
    )]
    async fn run<In, Out, E, F>(
        &self,
        inputs: Vec<In>,
        transform: F,
        policy: FailurePolicy,
    ) -> Result<MapReport<Out>, MapperError>
    where
        In: Send + 'static,
        Out: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(In) -> Result<Out, E> + Send + Sync + 'static,
    {
        let worker_count = self.options.worker_count;
        let total = inputs.len();
        let transform = Arc::new(transform);
        // A timeout too large to represent behaves like no timeout.
        let deadline = self
            .options
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let mut shutdown = self.shutdown.clone();
        if let Some(rx) = shutdown.as_mut() {
            rx.borrow_and_update();
        }
        let stop = Arc::new(AtomicBool::new(false));

        let (result_tx, mut result_rx) =
            mpsc::channel::<WorkerResult<Out>>(self.options.result_buffer);

        let mut inbox_senders = Vec::with_capacity(worker_count);
        let mut workers = JoinSet::new();
        for worker_idx in 0..worker_count {
            let (tx, rx) = mpsc::channel::<Envelope<In>>(self.options.inbox_capacity);
            inbox_senders.push(tx);
            let results = result_tx.clone();
            let transform = Arc::clone(&transform);
            let stop = Arc::clone(&stop);
            let span = Span::current();
            workers.spawn_blocking(move || {
                span.in_scope(|| {
                    worker_loop(WorkerId::new(worker_idx), rx, results, transform, stop)
                })
            });
        }
        // The collector closes once the last worker drops its sender.
        drop(result_tx);
        drop(transform);

        let distributor = tokio::spawn(distributor_loop(inputs, inbox_senders));

        let mut outputs = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let interrupted = 'drain: loop {
            tokio::select! {
                result = result_rx.recv() => match result {
                    Some(WorkerResult::Output { output, .. }) => outputs.push(output),
                    Some(WorkerResult::Failure(failure)) => match policy {
                        FailurePolicy::FailFast => {
                            error!("aborting batch, {failure}");
                            break 'drain Some(MapperError::Transform(failure));
                        }
                        FailurePolicy::BestEffort => failures.push(failure),
                    },
                    None => break 'drain None,
                },
                _ = deadline_reached(deadline) => {
                    let timeout = self.options.timeout.unwrap_or_default();
                    warn!(?timeout, "deadline reached before all inputs were mapped");
                    break 'drain Some(MapperError::Timeout(timeout));
                }
                _ = cancelled(&mut shutdown) => {
                    warn!("shutdown requested, cancelling batch");
                    break 'drain Some(MapperError::Cancelled);
                }
            }
        };

        // Running transforms cannot be aborted. Raising `stop`, closing the
        // inboxes and dropping the collector lets each worker leave after at
        // most the item it holds.
        if interrupted.is_some() {
            stop.store(true, Ordering::Release);
            distributor.abort();
        }
        drop(result_rx);

        let mut stats = MapStats::new();
        let mut lost = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_stats) => stats.add_worker_stats(worker_stats),
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    error!("Fatal error in one of the workers: {:?}", err);
                    lost = lost.or(Some(MapperError::WorkerLost(err.to_string())));
                }
            }
        }
        match distributor.await {
            Ok(distributed) => debug!(distributed, "distributor finished"),
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                error!("Fatal error in distributor: {:?}", err);
                lost = lost.or(Some(MapperError::WorkerLost(err.to_string())));
            }
        }

        if let Some(err) = interrupted.or(lost) {
            return Err(err);
        }

        let accounted = outputs.len() + failures.len();
        if accounted != total {
            return Err(MapperError::WorkerLost(format!(
                "{} of {total} inputs unaccounted for",
                total - accounted
            )));
        }

        info!(
            outputs = outputs.len(),
            failures = failures.len(),
            "all workers finished"
        );
        Ok(MapReport {
            outputs,
            failures,
            stats,
        })
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(shutdown: &mut Option<watch::Receiver<()>>) {
    match shutdown {
        Some(rx) => {
            if rx.changed().await.is_err() {
                // Sender gone, nobody can cancel anymore.
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

/// Apply `transform` to every input on `worker_count` workers and return the
/// outputs in no particular order.
///
/// `worker_count` may be any integer; zero or negative values fail with
/// [`MapperError::InvalidConfiguration`] before anything is spawned.
pub async fn execute<W, In, Out, F>(
    worker_count: W,
    inputs: impl IntoIterator<Item = In>,
    transform: F,
) -> Result<Vec<Out>, MapperError>
where
    W: TryInto<usize> + Copy + fmt::Display,
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Out + Send + Sync + 'static,
{
    ConcurrentMapper::with_workers(worker_count)?
        .execute(inputs, transform)
        .await
}

/// Blocking flavour of [`execute`], for callers outside a tokio runtime.
pub fn execute_blocking<W, In, Out, F>(
    worker_count: W,
    inputs: impl IntoIterator<Item = In>,
    transform: F,
) -> Result<Vec<Out>, MapperError>
where
    W: TryInto<usize> + Copy + fmt::Display,
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Out + Send + Sync + 'static,
{
    ConcurrentMapper::with_workers(worker_count)?.execute_blocking(inputs, transform)
}
