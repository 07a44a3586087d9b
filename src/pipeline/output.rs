//! Writing artifacts to disk

use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::FileCollisionAction;
use crate::error::Result;
use crate::types::Artifact;
use crate::utils::get_unique_path;

use super::LabelDownloader;

impl Artifact {
    /// Write the artifact into `dir` under its suggested filename
    ///
    /// `dir` is created if missing. Returns the path actually written, which
    /// differs from the suggested name when `collision` is
    /// [`FileCollisionAction::Rename`] and the name is taken.
    pub async fn save_to(&self, dir: &Path, collision: FileCollisionAction) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = get_unique_path(&dir.join(&self.filename), collision)?;
        tokio::fs::write(&path, &self.bytes).await?;
        info!(
            path = %path.display(),
            size = self.bytes.len(),
            kind = %self.kind,
            "artifact saved"
        );
        Ok(path)
    }
}

impl LabelDownloader {
    /// Save `artifact` to the configured output directory
    pub async fn save(&self, artifact: &Artifact) -> Result<PathBuf> {
        artifact
            .save_to(&self.config.output.output_dir, self.config.output.file_collision)
            .await
    }
}
