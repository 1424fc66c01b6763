//! Background write-back of blocks served by a slower tier into the local
//! archive, so replays hit disk instead of the network.

use crate::streamer_core::archive::ArchiveFetcher;
use crate::streamer_core::types::BlockMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct UploadQueue {
    tx: mpsc::Sender<BlockMessage>,
}

impl UploadQueue {
    /// Spawn the writer task. The task ends once every queue handle is dropped.
    pub fn spawn(archive: Arc<ArchiveFetcher>, capacity: usize) -> (Self, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::channel::<BlockMessage>(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut stored = 0u64;
            while let Some(block) = rx.recv().await {
                match archive.store(&block).await {
                    Ok(()) => {
                        stored += 1;
                        log::debug!("💾 Archived block {}", block.height());
                    }
                    Err(e) => log::warn!("⚠️  Failed to archive block {}: {}", block.height(), e),
                }
            }
            log::info!("✅ Upload queue drained ({} blocks archived)", stored);
            stored
        });

        (Self { tx }, handle)
    }

    /// Best effort: a full queue drops the block rather than stalling ingestion.
    pub fn enqueue(&self, block: BlockMessage) {
        let height = block.height();
        if let Err(e) = self.tx.try_send(block) {
            log::warn!("⚠️  Upload queue full, not archiving block {}: {}", height, e);
        }
    }
}
