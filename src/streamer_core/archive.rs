//! Packaged historical archive on local disk: `{dir}/{height:012}.json`.
//!
//! Also the write-back target for blocks that had to come from a slower tier.

use crate::streamer_core::fetcher::{BlockFetcher, FetchError, FetchOutcome};
use crate::streamer_core::types::BlockMessage;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct ArchiveFetcher {
    dir: PathBuf,
}

impl ArchiveFetcher {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, height: u64) -> PathBuf {
        self.dir.join(format!("{:012}.json", height))
    }

    /// Persist a block. Writes to a temp file first so readers never observe
    /// a partial file.
    pub async fn store(&self, block: &BlockMessage) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = self.path_for(block.height());
        let tmp_path = final_path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(block)?;
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }
}

#[async_trait]
impl BlockFetcher for ArchiveFetcher {
    fn tier(&self) -> &'static str {
        "archive"
    }

    async fn fetch(&self, height: u64) -> Result<FetchOutcome, FetchError> {
        match tokio::fs::read(self.path_for(height)).await {
            Ok(bytes) => Ok(FetchOutcome::Found(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FetchOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer_core::types::test_blocks;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_then_fetch() {
        let dir = tempdir().unwrap();
        let archive = ArchiveFetcher::new(dir.path().join("blocks"));

        assert_eq!(archive.fetch(42).await.unwrap(), FetchOutcome::NotFound);

        let block = test_blocks::block(42, 4_200, Vec::new());
        archive.store(&block).await.unwrap();

        assert!(dir.path().join("blocks/000000000042.json").exists());
        assert_eq!(archive.fetch(42).await.unwrap(), FetchOutcome::Found(block));
    }
}
