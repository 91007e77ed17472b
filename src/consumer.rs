//! Document consumer — drains the intake queue into the originals store.
//!
//! The scheduler talks to the consumer through the [`Consume`] trait; the
//! directory-backed [`DirConsumer`] is the production implementation. What
//! happens to a document after it lands in the originals store (parsing,
//! thumbnailing, indexing) is downstream work and none of our business.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::ConsumerError;
use crate::storage;

/// One batch-drain of the intake queue. Idempotent per call.
#[async_trait]
pub trait Consume: Send {
    async fn consume(&mut self) -> Result<(), ConsumerError>;
}

/// Directory-backed consumer: moves stable files from the consumption
/// directory into the originals store.
#[derive(Debug)]
pub struct DirConsumer {
    consumption_dir: PathBuf,
    originals_dir: PathBuf,
    /// Sizes observed on the previous drain. A file is only moved once its
    /// size has held steady across two drains, so partially written uploads
    /// are left alone.
    seen_sizes: HashMap<PathBuf, u64>,
}

impl DirConsumer {
    /// Create a consumer. Fails when the consumption directory is missing
    /// or is not a directory; that is a startup misconfiguration.
    pub fn new(
        consumption_dir: impl Into<PathBuf>,
        originals_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConsumerError> {
        let consumption_dir = consumption_dir.into();
        if !consumption_dir.is_dir() {
            return Err(ConsumerError::Misconfigured {
                path: consumption_dir,
            });
        }
        Ok(Self {
            consumption_dir,
            originals_dir: originals_dir.into(),
            seen_sizes: HashMap::new(),
        })
    }

    fn drain_err(&self, source: std::io::Error) -> ConsumerError {
        ConsumerError::Drain {
            path: self.consumption_dir.clone(),
            source,
        }
    }
}

#[async_trait]
impl Consume for DirConsumer {
    async fn consume(&mut self) -> Result<(), ConsumerError> {
        let mut entries = fs::read_dir(&self.consumption_dir)
            .await
            .map_err(|e| self.drain_err(e))?;

        let mut current_sizes = HashMap::new();
        let mut moved = 0usize;

        while let Some(entry) = entries.next_entry().await.map_err(|e| self.drain_err(e))? {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Raced with a writer deleting the file; skip it.
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }

            let path = entry.path();
            let size = meta.len();

            if self.seen_sizes.get(&path) != Some(&size) {
                // New or still growing; revisit on the next drain.
                current_sizes.insert(path, size);
                continue;
            }

            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let dest = storage::unique_destination(&self.originals_dir, &file_name);
            fs::rename(&path, &dest)
                .await
                .map_err(|e| self.drain_err(e))?;
            debug!(from = %path.display(), to = %dest.display(), "Consumed document");
            moved += 1;
        }

        self.seen_sizes = current_sizes;

        if moved > 0 {
            info!("Consumed {moved} document(s) from the intake queue");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn consumer_in(tmp: &tempfile::TempDir) -> DirConsumer {
        let consume_dir = tmp.path().join("consume");
        let originals = tmp.path().join("originals");
        std::fs::create_dir_all(&consume_dir).unwrap();
        std::fs::create_dir_all(&originals).unwrap();
        DirConsumer::new(consume_dir, originals).unwrap()
    }

    #[test]
    fn missing_dir_is_misconfiguration() {
        let err = DirConsumer::new("/no/such/dir", "/tmp/originals").unwrap_err();
        assert!(matches!(err, ConsumerError::Misconfigured { .. }));
    }

    #[tokio::test]
    async fn empty_queue_is_a_successful_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut consumer = consumer_in(&tmp).await;
        consumer.consume().await.unwrap();
        consumer.consume().await.unwrap();
    }

    #[tokio::test]
    async fn stable_file_moves_on_second_drain() {
        let tmp = tempfile::tempdir().unwrap();
        let mut consumer = consumer_in(&tmp).await;

        let doc = tmp.path().join("consume/invoice.pdf");
        std::fs::write(&doc, b"pdf bytes").unwrap();

        // First drain only observes the file.
        consumer.consume().await.unwrap();
        assert!(doc.exists());

        // Second drain moves it.
        consumer.consume().await.unwrap();
        assert!(!doc.exists());
        assert!(tmp.path().join("originals/invoice.pdf").is_file());
    }

    #[tokio::test]
    async fn growing_file_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let mut consumer = consumer_in(&tmp).await;

        let doc = tmp.path().join("consume/scan.png");
        std::fs::write(&doc, b"partial").unwrap();
        consumer.consume().await.unwrap();

        // Writer appends between drains.
        std::fs::write(&doc, b"partial plus more").unwrap();
        consumer.consume().await.unwrap();
        assert!(doc.exists(), "still-growing file must not be moved");

        // Size held steady; next drain takes it.
        consumer.consume().await.unwrap();
        assert!(!doc.exists());
    }

    #[tokio::test]
    async fn name_collisions_get_a_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let mut consumer = consumer_in(&tmp).await;

        std::fs::write(tmp.path().join("originals/invoice.pdf"), b"earlier").unwrap();
        std::fs::write(tmp.path().join("consume/invoice.pdf"), b"later").unwrap();

        consumer.consume().await.unwrap();
        consumer.consume().await.unwrap();

        assert!(tmp.path().join("originals/invoice.pdf").is_file());
        assert!(tmp.path().join("originals/invoice-1.pdf").is_file());
    }
}
