//! Destinations for finalized objects.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::receiver::ReceivedObject;

#[derive(Debug, Error)]
#[error("failed to write {}: {source}", .path.display())]
pub struct SinkError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Somewhere to put a finalized object.
pub trait ObjectSink {
    /// Persist `object`, returning where it went.
    fn store(&mut self, object: &ReceivedObject) -> Result<PathBuf, SinkError>;
}

/// Writes each object into a directory under [`ReceivedObject::file_name`].
///
/// The corrupt tag is part of the name at first write; files are never
/// renamed afterwards.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Use `dir`, creating it (and parents) if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ObjectSink for FileSink {
    fn store(&mut self, object: &ReceivedObject) -> Result<PathBuf, SinkError> {
        let path = self.dir.join(object.file_name());
        std::fs::write(&path, &object.data).map_err(|source| SinkError {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Keeps objects in memory.  Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub objects: Vec<ReceivedObject>,
}

impl ObjectSink for MemorySink {
    fn store(&mut self, object: &ReceivedObject) -> Result<PathBuf, SinkError> {
        self.objects.push(object.clone());
        Ok(PathBuf::from(object.file_name()))
    }
}
