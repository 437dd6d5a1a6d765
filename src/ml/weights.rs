//! Filesystem weights source

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::registry::ModelKind;
use crate::common::errors::Result;
use crate::common::traits::WeightsSource;

/// Reads `<dir>/<kind>.json` for each model kind
#[derive(Debug, Clone)]
pub struct DirectoryWeightsSource {
    dir: PathBuf,
    name: String,
}

impl DirectoryWeightsSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = format!("dir:{}", dir.display());
        Self { dir, name }
    }

    pub fn path_for(&self, kind: ModelKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }
}

#[async_trait]
impl WeightsSource for DirectoryWeightsSource {
    async fn fetch(&self, kind: ModelKind) -> Result<Option<String>> {
        let path = self.path_for(kind);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                debug!(path = %path.display(), bytes = text.len(), "Read model weights");
                Ok(Some(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
