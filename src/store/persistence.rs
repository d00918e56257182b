//! File persistence for the mirror.
//!
//! The orchestrator saves the full mirror state after successful cycles and
//! restores it on startup, so an interrupted process resumes from its last
//! committed cursor instead of refetching from zero. Persistence is
//! abstracted behind a repository trait; the shipped implementation writes
//! JSON to the configured data directory alongside a small metadata file.

use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};

use super::{MirrorState, StoreError};

/// Repository for mirror state persistence.
#[async_trait::async_trait]
pub trait StateRepository: Send + Sync {
    async fn save(&self, state: &MirrorState) -> Result<(), StoreError>;
    async fn load(&self) -> Result<Option<MirrorState>, StoreError>;
}

/// File-based implementation of [`StateRepository`].
pub struct FileStateRepository {
    data_dir: PathBuf,
}

impl FileStateRepository {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir.join("mirror_state.json")
    }

    fn meta_path(&self) -> PathBuf {
        self.data_dir.join("mirror_state.meta.json")
    }
}

#[async_trait::async_trait]
impl StateRepository for FileStateRepository {
    async fn save(&self, state: &MirrorState) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let metadata = serde_json::json!({
            "saved_at": Utc::now().to_rfc3339(),
            "vouchers": state.vouchers.len(),
            "history_snapshots": state.history.len(),
        });
        tokio::fs::write(self.meta_path(), serde_json::to_string_pretty(&metadata)?).await?;

        let body = serde_json::to_vec(state)?;
        tokio::fs::write(self.state_path(), &body).await?;

        info!(
            path = %self.state_path().display(),
            vouchers = state.vouchers.len(),
            "Saved mirror state"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<MirrorState>, StoreError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }

        let body = tokio::fs::read(&path).await?;
        match serde_json::from_slice::<MirrorState>(&body) {
            Ok(state) => {
                info!(
                    path = %path.display(),
                    vouchers = state.vouchers.len(),
                    "Restored mirror state"
                );
                Ok(Some(state))
            }
            Err(e) => {
                // A corrupt state file should not brick startup; resync
                // rebuilds the mirror from the remote.
                warn!(path = %path.display(), error = %e, "Discarding unreadable mirror state");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::{SyncCursor, SyncDomain};

    #[tokio::test]
    async fn missing_state_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path().to_path_buf());
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_cursor_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path().to_path_buf());

        let mut cursor = SyncCursor::new(SyncDomain::Vouchers);
        cursor.high_water = 812;
        let state = MirrorState {
            cursors: vec![cursor],
            ..Default::default()
        };
        repo.save(&state).await.unwrap();

        let restored = repo.load().await.unwrap().unwrap();
        assert_eq!(restored.cursors.len(), 1);
        assert_eq!(restored.cursors[0].high_water, 812);
    }

    #[tokio::test]
    async fn corrupt_state_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path().to_path_buf());
        tokio::fs::write(dir.path().join("mirror_state.json"), b"not json")
            .await
            .unwrap();
        assert!(repo.load().await.unwrap().is_none());
    }
}
