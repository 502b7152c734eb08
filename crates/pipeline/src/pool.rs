use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::progress::Progress;

/// Run `task` over every item with at most `workers` in flight.
///
/// Outputs come back in completion order. A task that panics is logged and
/// contributes no output, so the result may be shorter than `items`.
pub(crate) async fn run_bounded<T, O, F, Fut>(
    items: Vec<T>,
    workers: usize,
    progress: &Progress,
    task: F,
) -> Vec<O>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let task = Arc::new(task);
    let mut set = JoinSet::new();
    let mut outputs = Vec::with_capacity(items.len());

    for item in items {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let task = task.clone();
        let progress = progress.clone();
        set.spawn(async move {
            let out = task(item).await;
            drop(permit);
            progress.inc();
            out
        });
        while let Some(joined) = set.try_join_next() {
            collect(joined, &mut outputs);
        }
    }

    while let Some(joined) = set.join_next().await {
        collect(joined, &mut outputs);
    }
    outputs
}

fn collect<O>(joined: Result<O, tokio::task::JoinError>, outputs: &mut Vec<O>) {
    match joined {
        Ok(out) => outputs.push(out),
        Err(e) => tracing::error!("Worker task failed: {e}"),
    }
}
