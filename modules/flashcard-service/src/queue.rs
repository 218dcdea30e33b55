//! Serialized write queue for the card store.
//!
//! Every mutation is a unit of work sent down one channel. A single background
//! task drains the channel and runs each unit's load → mutate → save cycle to
//! completion before picking up the next, so cycles never interleave and are
//! applied in enqueue order. A failing or panicking unit is logged and the
//! queue moves on.

use crate::store::{Result, StoreError, StoreFile};
use flashcard_types::Card;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce(&StoreFile) + Send + 'static>;

/// A queued unit of work waiting for its turn against the store file.
struct Unit {
    seq: u64,
    job: Job,
}

/// Handle to the store's single writer. Cheap to clone; all clones feed the
/// same queue.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Unit>,
    next_seq: Arc<AtomicU64>,
}

impl WriteQueue {
    /// Create the queue and spawn its background drain task.
    pub fn new(store: Arc<StoreFile>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::drain_loop(store, rx));
        Self {
            tx,
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Queue a mutation of the full collection.
    ///
    /// The unit is queued before this returns, so ordering follows call
    /// order. The returned future resolves once the new collection is on
    /// disk. Dropping the future does not cancel the unit.
    pub fn enqueue<R, F>(&self, mutator: F) -> impl Future<Output = Result<R>> + Send + use<R, F>
    where
        F: FnOnce(&mut Vec<Card>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let seq = self.submit(Box::new(move |store: &StoreFile| {
            let _ = done_tx.send(run_unit(store, mutator));
        }));

        async move {
            match done_rx.await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => {
                    log::error!("[WRITE_QUEUE] Unit #{} failed: {}", seq, e);
                    Err(e)
                }
                Err(_) => Err(StoreError::QueueClosed(format!(
                    "write unit #{} did not complete",
                    seq
                ))),
            }
        }
    }

    /// Wait until every unit queued before this call has finished.
    pub async fn drain(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(Box::new(move |_: &StoreFile| {
            let _ = done_tx.send(());
        }));
        done_rx
            .await
            .map_err(|_| StoreError::QueueClosed("write queue stopped before drain".to_string()))
    }

    fn submit(&self, job: Job) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Unit { seq, job }).is_err() {
            log::error!("[WRITE_QUEUE] Background writer is gone, dropping unit #{}", seq);
        }
        seq
    }

    /// Background loop: one unit at a time, each on the blocking pool.
    async fn drain_loop(store: Arc<StoreFile>, mut rx: mpsc::UnboundedReceiver<Unit>) {
        while let Some(Unit { seq, job }) = rx.recv().await {
            let store = store.clone();
            log::debug!("[WRITE_QUEUE] Running unit #{}", seq);
            if let Err(e) = tokio::task::spawn_blocking(move || job(&store)).await {
                log::error!("[WRITE_QUEUE] Unit #{} panicked: {}", seq, e);
            }
        }

        log::info!("[WRITE_QUEUE] Background writer shutting down");
    }
}

/// One read-modify-write cycle. Nothing is saved if loading fails.
fn run_unit<R, F>(store: &StoreFile, mutator: F) -> Result<R>
where
    F: FnOnce(&mut Vec<Card>) -> R,
{
    let mut cards = store.load()?;
    let outcome = mutator(&mut cards);
    store.save(&cards)?;
    Ok(outcome)
}
