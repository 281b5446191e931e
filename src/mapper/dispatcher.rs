use crate::mapper::Envelope;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Hand every input to `inboxes[index % inboxes.len()]`, then drop the
/// senders so each worker sees its inbox close once it is drained.
///
/// Returns how many items were handed off.
#[instrument(name = "distributor", skip_all, fields(workers = inboxes.len()))]
pub(crate) async fn distributor_loop<In>(
    inputs: Vec<In>,
    inboxes: Vec<mpsc::Sender<Envelope<In>>>,
) -> usize {
    let worker_count = inboxes.len();
    let total = inputs.len();
    let mut distributed = 0usize;

    for (index, input) in inputs.into_iter().enumerate() {
        let worker_idx = index % worker_count;
        if let Err(err) = inboxes[worker_idx].send(Envelope { index, input }).await {
            warn!("failed to send input #{} to inbox {worker_idx}: {err}", err.0.index);
            break;
        }
        distributed += 1;
    }

    drop(inboxes);
    debug!(distributed, total, "inputs distributed; worker inboxes closed");
    distributed
}
