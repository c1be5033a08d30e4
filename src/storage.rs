use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid content in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Reads a whole JSON document. A missing file yields `None`.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| Error::Json {
            path: path.display().to_string(),
            source,
        })
}

/// Rewrites the whole document. Goes through a sibling temp file so a crash
/// never leaves a half-written file behind.
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let io_err = |source| Error::Io {
        path: path.display().to_string(),
        source,
    };

    let content = serde_json::to_vec_pretty(value).map_err(|source| Error::Json {
        path: path.display().to_string(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    tokio::fs::write(&tmp, content).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}
