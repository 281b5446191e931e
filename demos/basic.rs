use std::time::Duration;

use anyhow::anyhow;
use fanout::{prelude::*, tracing, tracing_subscriber};
use rand::{Rng, rng};

#[derive(Clone, Debug)]
struct Page {
    id: u32,
    words: u64,
}

/// Pretend to tokenize a page; takes longer for bigger pages.
fn count_tokens(page: Page) -> Result<(u32, u64), String> {
    if page.words == 0 {
        return Err(format!("page {} is empty", page.id));
    }
    std::thread::sleep(Duration::from_millis(page.words / 100));
    Ok((page.id, page.words * 4 / 3))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut rng = rng();
    let pages: Vec<Page> = (0..40)
        .map(|id| Page {
            id,
            words: if id % 13 == 7 { 0 } else { rng.random_range(500..5_000) },
        })
        .collect();

    // Plain all-or-nothing call, ordering reconstructed by the caller.
    let mut lengths = fanout::execute(4, pages.clone(), |page: Page| {
        (page.id, page.words)
    })
    .await?;
    lengths.sort();
    tracing::info!(first = ?lengths.first(), last = ?lengths.last(), "page lengths");

    // Best effort: keep going past empty pages and look at what failed.
    let options = MapperOptionsBuilder::default()
        .worker_count(4usize)
        .failure_policy(FailurePolicy::BestEffort)
        .timeout(Duration::from_secs(30))
        .build()?;
    let mapper = ConcurrentMapper::new(options)?;
    let report = mapper.try_execute(pages, count_tokens).await?;

    for failure in &report.failures {
        tracing::warn!("skipped: {failure}");
    }
    for stats in &report.stats.workers {
        tracing::info!(
            worker_id = %stats.worker_id,
            processed = stats.items_processed,
            failed = stats.items_failed,
            avg = ?stats.average_execution_time(),
            "worker stats"
        );
    }

    if report.outputs.is_empty() {
        return Err(anyhow!("no page could be tokenized"));
    }
    let tokens: u64 = report.outputs.iter().map(|(_, tokens)| tokens).sum();
    tracing::info!(
        pages = report.outputs.len(),
        failed = report.failures.len(),
        tokens,
        "done"
    );
    Ok(())
}
