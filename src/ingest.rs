//! Background knowledge ingestion
//!
//! A periodic worker that pulls documents from an external feed and
//! pushes them into the memory store through its normal write
//! contract. The worker shares nothing with the query path beyond the
//! store itself, so ingestion never blocks an in-flight query for
//! longer than one store write. Duplicate documents are absorbed by
//! the store's content-hash dedup.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::{CognateError, Result};
use crate::memory::MemoryStore;
use crate::types::{MemoryId, MemoryItem, MemoryKind};

/// A document fetched from an external source
#[derive(Debug, Clone)]
pub struct KnowledgeDoc {
    pub text: String,
    pub source: String,
}

/// Seam for external fetchers (news, threat feeds, ...). The core
/// never talks to the outside world directly.
pub trait KnowledgeFeed: Send + Sync {
    fn fetch(&self) -> Result<Vec<KnowledgeDoc>>;
}

/// Bounded push queue for ad-hoc ingestion alongside the periodic pull
pub struct IngestQueue {
    sender: Sender<KnowledgeDoc>,
    receiver: Receiver<KnowledgeDoc>,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    pub async fn push(&self, doc: KnowledgeDoc) -> Result<()> {
        self.sender
            .send(doc)
            .await
            .map_err(|e| CognateError::InvalidInput(format!("ingest queue closed: {}", e)))
    }

    pub fn push_blocking(&self, doc: KnowledgeDoc) -> Result<()> {
        self.sender
            .send_blocking(doc)
            .map_err(|e| CognateError::InvalidInput(format!("ingest queue closed: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn receiver(&self) -> Receiver<KnowledgeDoc> {
        self.receiver.clone()
    }
}

impl Clone for IngestQueue {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

/// The scheduled worker: drains the queue and polls the feed
pub struct IngestWorker {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    feed: Option<Arc<dyn KnowledgeFeed>>,
    queue: IngestQueue,
    poll_interval: Duration,
}

impl IngestWorker {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        feed: Option<Arc<dyn KnowledgeFeed>>,
        queue: IngestQueue,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            feed,
            queue,
            poll_interval,
        }
    }

    /// Run forever (call in a spawned task).
    pub async fn run(&self) {
        let receiver = self.queue.receiver();
        let mut tick = interval(self.poll_interval);

        loop {
            tokio::select! {
                Ok(doc) = receiver.recv() => {
                    if let Err(e) = self.store_doc(&doc) {
                        warn!(source = %doc.source, error = %e, "failed to ingest queued doc");
                    }
                }
                _ = tick.tick() => {
                    match self.pull_feed() {
                        Ok(0) => {}
                        Ok(n) => info!(count = n, "ingested documents from feed"),
                        Err(e) => warn!(error = %e, "feed fetch failed"),
                    }
                }
            }
        }
    }

    /// One feed poll: fetch and record everything. A failed embed
    /// skips that document; the worker keeps going.
    pub fn pull_feed(&self) -> Result<usize> {
        let Some(feed) = &self.feed else {
            return Ok(0);
        };

        let docs = feed.fetch()?;
        let mut ingested = 0;
        for doc in docs {
            match self.store_doc(&doc) {
                Ok(_) => ingested += 1,
                Err(e) => warn!(source = %doc.source, error = %e, "skipping document"),
            }
        }
        Ok(ingested)
    }

    /// Record one document as a knowledge item.
    pub fn store_doc(&self, doc: &KnowledgeDoc) -> Result<MemoryId> {
        let embedding = self.embedder.embed(&doc.text)?;
        let item = MemoryItem::new(&doc.text, embedding, MemoryKind::Knowledge, &doc.source);
        let id = self.store.record(item)?;
        debug!(id = %id, source = %doc.source, "ingested knowledge item");
        Ok(id)
    }
}
