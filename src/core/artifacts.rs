//! JSON artifacts written by the workflow steps.
//!
//! Each artifact is a fixed-name file, fully overwritten on every write and
//! pretty-printed with a 4-space indent.

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tokio::fs;

/// Artifact written by profile retrieval
pub const USER_PROFILE_ARTIFACT: &str = "github_user_profile.json";

/// Artifact written by repository retrieval
pub const REPOSITORIES_ARTIFACT: &str = "github_repositories.json";

/// Artifact written by aggregation
pub const SUMMARY_STATS_ARTIFACT: &str = "github_summary_stats.json";

/// Failure to persist an artifact
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to serialize artifact {name}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write artifact {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Directory that receives step artifacts
#[derive(Debug, Clone)]
pub struct OutputSink {
    dir: PathBuf,
}

impl OutputSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path an artifact of this name is written to
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Serialize `value` and overwrite the named artifact with it
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, ArtifactError> {
        let bytes = to_pretty_json(value).map_err(|source| ArtifactError::Serialize {
            name: name.to_string(),
            source,
        })?;

        let path = self.path_for(name);
        let write_err = |source| ArtifactError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        fs::write(&path, bytes).await.map_err(write_err)?;

        Ok(path)
    }
}

/// Pretty JSON with a 4-space indent
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}
