//! Index maintenance: batched writes into the inverted index and the
//! atomic swap used for full rebuilds.

mod engine;

pub use engine::SearchIndex;

use std::mem;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use crate::metrics;
use crate::model::Entry;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("index directory error: {0}")]
    OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("index open error: {0}")]
    OpenRead(#[from] tantivy::directory::error::OpenReadError),
}

/// Operations the index engine exposes to the service layer.
pub trait IndexRepository: Send + Sync {
    /// Write a batch of entries; each id replaces any previous entry.
    fn index_batch(&self, entries: &[(String, Entry)]) -> Result<(), IndexError>;
    fn delete(&self, id: &str) -> Result<(), IndexError>;
    /// Atomically replace the live index with a fresh empty one.
    fn swap(&self) -> Result<(), IndexError>;
    fn len(&self) -> usize;
}

/// Batching front of the index: accumulates entries under a mutex and
/// submits them once the configured threshold is reached.
pub struct Indexer {
    repo: Arc<dyn IndexRepository>,
    batch: Mutex<Vec<(String, Entry)>>,
    batch_size: usize,
}

impl Indexer {
    pub fn new(repo: Arc<dyn IndexRepository>, batch_size: usize) -> Self {
        Self {
            repo,
            batch: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size,
        }
    }

    /// Create a fresh empty index and swap it with the live one.
    pub fn empty_index(&self) -> Result<(), IndexError> {
        self.repo.swap()
    }

    /// Queue an entry; a full queue is submitted before the entry is added.
    pub fn rooms_batch(&self, id: String, entry: Entry) -> Result<(), IndexError> {
        let mut batch = self.batch.lock().unwrap();
        let mut result = Ok(());
        if batch.len() >= self.batch_size {
            result = self.flush_locked(&mut batch);
        }
        batch.push((id, entry));
        result
    }

    /// Submit whatever is queued.
    pub fn index_batch(&self) -> Result<(), IndexError> {
        let mut batch = self.batch.lock().unwrap();
        self.flush_locked(&mut batch)
    }

    pub fn delete(&self, id: &str) -> Result<(), IndexError> {
        self.repo.delete(id)
    }

    pub fn len(&self) -> usize {
        self.repo.len()
    }

    /// The queue is reset unconditionally so a failing batch is not
    /// resubmitted forever.
    fn flush_locked(&self, batch: &mut Vec<(String, Entry)>) -> Result<(), IndexError> {
        let size = batch.len();
        if size == 0 {
            return Ok(());
        }
        info!(len = size, "indexing batch...");
        let entries = mem::replace(batch, Vec::with_capacity(self.batch_size));
        let result = self.repo.index_batch(&entries);
        metrics::ROOMS_INDEXED_TOTAL.inc_by(size as u64);
        info!(len = size, "indexed batch");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingRepo {
        batches: Mutex<Vec<Vec<String>>>,
        swaps: AtomicUsize,
        deletes: Mutex<Vec<String>>,
    }

    impl IndexRepository for RecordingRepo {
        fn index_batch(&self, entries: &[(String, Entry)]) -> Result<(), IndexError> {
            self.batches
                .lock()
                .unwrap()
                .push(entries.iter().map(|(id, _)| id.clone()).collect());
            Ok(())
        }

        fn delete(&self, id: &str) -> Result<(), IndexError> {
            self.deletes.lock().unwrap().push(id.to_string());
            Ok(())
        }

        fn swap(&self) -> Result<(), IndexError> {
            self.swaps.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn len(&self) -> usize {
            self.batches.lock().unwrap().iter().map(Vec::len).sum()
        }
    }

    fn entry(id: &str) -> Entry {
        Entry {
            id: id.to_string(),
            kind: "room".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_batch_submitted_at_threshold() {
        let repo = Arc::new(RecordingRepo::default());
        let indexer = Indexer::new(repo.clone(), 2);

        indexer.rooms_batch("!a:x".into(), entry("!a:x")).unwrap();
        indexer.rooms_batch("!b:x".into(), entry("!b:x")).unwrap();
        assert!(repo.batches.lock().unwrap().is_empty());

        // third entry submits the full queue first, then enqueues itself
        indexer.rooms_batch("!c:x".into(), entry("!c:x")).unwrap();
        assert_eq!(repo.batches.lock().unwrap().as_slice(), &[vec!["!a:x", "!b:x"]]);

        indexer.index_batch().unwrap();
        assert_eq!(repo.batches.lock().unwrap().len(), 2);
        assert_eq!(repo.batches.lock().unwrap()[1], vec!["!c:x"]);
    }

    #[test]
    fn test_no_entry_lost_across_flushes() {
        let repo = Arc::new(RecordingRepo::default());
        let indexer = Indexer::new(repo.clone(), 3);

        for i in 0..10 {
            let id = format!("!r{}:x", i);
            indexer.rooms_batch(id.clone(), entry(&id)).unwrap();
        }
        indexer.index_batch().unwrap();

        let total: usize = repo.batches.lock().unwrap().iter().map(Vec::len).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let repo = Arc::new(RecordingRepo::default());
        let indexer = Indexer::new(repo.clone(), 2);
        indexer.index_batch().unwrap();
        assert!(repo.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_swap_pass_through() {
        let repo = Arc::new(RecordingRepo::default());
        let indexer = Indexer::new(repo.clone(), 2);
        indexer.delete("!a:x").unwrap();
        indexer.empty_index().unwrap();
        assert_eq!(repo.deletes.lock().unwrap().as_slice(), &["!a:x"]);
        assert_eq!(repo.swaps.load(Ordering::SeqCst), 1);
    }
}
