//! Card operations used by the HTTP layer.
//!
//! Reads go straight to the store file. Every mutation is funneled through
//! the [`WriteQueue`] and awaited until it is on disk.

use crate::model::{absorb, generate_id, has_supplied_id, merge_patch, sanitize};
use crate::queue::WriteQueue;
use crate::store::{StoreError, StoreFile};
use flashcard_types::Card;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid_payload")]
    InvalidPayload,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertSummary {
    pub added: usize,
    pub total: usize,
}

/// A sanitized incoming card and whether the client chose its id.
struct Incoming {
    card: Card,
    supplied_id: bool,
}

pub struct CardService {
    store: Arc<StoreFile>,
    queue: WriteQueue,
}

impl CardService {
    /// Build the service and start its write queue. Must run inside a tokio
    /// runtime.
    pub fn new(store: Arc<StoreFile>) -> Self {
        let queue = WriteQueue::new(store.clone());
        Self { store, queue }
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Wait for every queued write to land.
    pub async fn flush(&self) -> Result<()> {
        self.queue.drain().await?;
        Ok(())
    }

    /// Current collection, read without waiting on queued writes.
    pub fn list_all(&self) -> Result<Vec<Card>> {
        Ok(self.store.load()?)
    }

    /// Sanitize `raw_items` and upsert the valid ones by id.
    ///
    /// Fails with `InvalidPayload` when nothing survives sanitization; in that
    /// case nothing is queued.
    pub async fn create_or_upsert(&self, raw_items: &[Value]) -> Result<UpsertSummary> {
        let items: Vec<Incoming> = raw_items
            .iter()
            .filter_map(|raw| {
                sanitize(raw).map(|card| Incoming {
                    card,
                    supplied_id: has_supplied_id(raw),
                })
            })
            .collect();

        if items.is_empty() {
            return Err(ServiceError::InvalidPayload);
        }
        let added = items.len();
        if added < raw_items.len() {
            log::debug!(
                "[CARD_SERVICE] Dropped {} invalid item(s) from upsert",
                raw_items.len() - added
            );
        }

        self.queue
            .enqueue(move |cards| upsert_all(cards, items))
            .await?;

        let total = self.store.load()?.len();
        log::info!("[CARD_SERVICE] Upserted {} card(s), total {}", added, total);
        Ok(UpsertSummary { added, total })
    }

    /// Apply a partial patch to the card with `id`. Returns `false` if no such
    /// card exists when the write runs.
    pub async fn patch_by_id(&self, id: &str, patch: Map<String, Value>) -> Result<bool> {
        let target = id.to_string();
        let updated = self
            .queue
            .enqueue(move |cards| match cards.iter_mut().find(|c| c.id == target) {
                Some(card) => {
                    *card = merge_patch(card, &patch);
                    true
                }
                None => false,
            })
            .await?;

        if updated {
            log::info!("[CARD_SERVICE] Patched card {}", id);
        }
        Ok(updated)
    }

    /// Remove the card with `id`. Returns `false` if nothing was removed.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let target = id.to_string();
        let removed = self
            .queue
            .enqueue(move |cards| {
                let before = cards.len();
                cards.retain(|c| c.id != target);
                cards.len() != before
            })
            .await?;

        if removed {
            log::info!("[CARD_SERVICE] Deleted card {}", id);
        }
        Ok(removed)
    }
}

/// Merge each incoming card into `cards` by id, appending new ones.
///
/// A client-supplied id that matches an existing card updates it in place. A
/// generated id that happens to collide is regenerated instead.
fn upsert_all(cards: &mut Vec<Card>, items: Vec<Incoming>) {
    for Incoming {
        mut card,
        supplied_id,
    } in items
    {
        if let Some(pos) = cards.iter().position(|c| c.id == card.id) {
            if supplied_id {
                cards[pos] = absorb(&cards[pos], card);
                continue;
            }
            while cards.iter().any(|c| c.id == card.id) {
                log::warn!("[CARD_SERVICE] Generated id {} collided, regenerating", card.id);
                card.id = generate_id();
            }
        }
        cards.push(card);
    }
}
