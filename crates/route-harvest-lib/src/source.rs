//! Route sources: a unique key plus a way to get at the file bytes

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the bytes of a source come from
#[derive(Clone, Debug)]
pub enum SourceContent {
    /// A file on disk, read fully when the worker starts
    File(PathBuf),
    /// Bytes already in memory
    Bytes(Arc<[u8]>),
}

/// One input route, identified by a key that is unique within a pipeline run
#[derive(Clone, Debug)]
pub struct Source {
    key: Arc<str>,
    content: SourceContent,
}

impl Source {
    /// A source backed by a file. The key is the path as given.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            key: Arc::from(path.display().to_string()),
            content: SourceContent::File(path.to_path_buf()),
        }
    }

    /// A source backed by in-memory bytes
    pub fn from_bytes(key: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            key: Arc::from(key.into()),
            content: SourceContent::Bytes(bytes.into()),
        }
    }

    /// A source with an explicit key and content
    pub fn new(key: impl Into<String>, content: SourceContent) -> Self {
        Self {
            key: Arc::from(key.into()),
            content,
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shared handle to the key, cloned into every tagged coordinate
    #[inline]
    pub(crate) fn shared_key(&self) -> &Arc<str> {
        &self.key
    }

    #[inline]
    pub fn content(&self) -> &SourceContent {
        &self.content
    }

    /// Read the whole content asynchronously
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.content {
            SourceContent::File(path) => tokio::fs::read(path).await,
            SourceContent::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// Read the whole content on the calling thread
    pub fn read_blocking(&self) -> std::io::Result<Vec<u8>> {
        match &self.content {
            SourceContent::File(path) => std::fs::read(path),
            SourceContent::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }
}
