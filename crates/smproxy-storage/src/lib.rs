use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const MODELS_FILE: &str = "models.json";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encode error on {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk shape of the credential pool snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub credentials: Vec<String>,
    #[serde(default)]
    pub index: usize,
}

/// Flat-file JSON store rooted at the data directory.
///
/// Reads are forgiving: a missing or unparseable file reads as `None`.
/// Writes go through a sibling `.tmp` file and a rename so a crashed write
/// never leaves a torn file behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.dir.join(name);
        let raw = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable store file ignored");
                None
            }
        }
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let raw = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            path: path.clone(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &raw)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }

    pub async fn delete(&self, name: &str) -> bool {
        tokio::fs::remove_file(self.dir.join(name)).await.is_ok()
    }
}
