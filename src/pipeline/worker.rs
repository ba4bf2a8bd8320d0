use crate::config::IngestConfig;
use crate::storage::Store;
use crate::visitor::Visitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

/// Write-behind worker: consumes captured visits from the channel, batches
/// them, and flushes to the store on batch size or time trigger.
pub async fn run_worker(mut rx: mpsc::Receiver<Visitor>, store: Arc<Store>, config: IngestConfig) {
    let batch_size = config.flush_batch_size.max(1);
    let mut buffer: Vec<Visitor> = Vec::with_capacity(batch_size);
    let mut flush_timer = time::interval(Duration::from_secs(config.flush_interval_secs.max(1)));
    flush_timer.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Some(visitor) => {
                        buffer.push(visitor);
                        if buffer.len() >= batch_size {
                            flush(&store, &mut buffer).await;
                        }
                    }
                    None => {
                        tracing::info!("visit channel closed, draining buffer");
                        if !buffer.is_empty() {
                            flush(&store, &mut buffer).await;
                        }
                        return;
                    }
                }
            }
            _ = flush_timer.tick() => {
                if !buffer.is_empty() {
                    flush(&store, &mut buffer).await;
                }
            }
        }
    }
}

async fn flush(store: &Store, buffer: &mut Vec<Visitor>) {
    let visitors = std::mem::take(buffer);
    let count = visitors.len();

    // One retry, then the batch is dropped.
    for attempt in 0..2u8 {
        match store.visitor_create_batch(visitors.clone()).await {
            Ok(inserted) => {
                tracing::debug!(inserted, "flushed visits");
                return;
            }
            Err(e) => {
                if attempt == 0 {
                    tracing::warn!(error = %e, count, "visit flush failed, retrying in 500ms");
                    time::sleep(Duration::from_millis(500)).await;
                } else {
                    tracing::error!(error = %e, count, "visit flush retry failed, batch dropped");
                }
            }
        }
    }
}
