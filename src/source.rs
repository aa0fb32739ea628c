/*!
 * Byte sources for uploads
 *
 * An upload reads from any finite input whose length is known up front:
 * a file, an in-memory buffer, or an arbitrary async reader.
 */

use bytes::Bytes;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::error::{UploadError, UploadResult};

/// A finite byte source with a declared length
pub struct UploadSource {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    len: u64,
}

impl UploadSource {
    /// Open a file; its length is taken from metadata at open time
    pub async fn from_path(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            UploadError::Source(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let metadata = file.metadata().await.map_err(|e| {
            UploadError::Source(format!("Failed to stat {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(UploadError::Source(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        Ok(Self::from_reader(file, metadata.len()))
    }

    /// Upload an in-memory buffer
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self::from_reader(Cursor::new(data), len)
    }

    /// Upload from any reader that will yield exactly `len` bytes.
    ///
    /// Bytes past `len` are never read. A reader that ends early fails the
    /// upload with a source error.
    pub fn from_reader<R>(reader: R, len: u64) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            len,
        }
    }

    /// Declared length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.reader
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSource").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_from_path_reads_length() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 1500]).unwrap();
        file.flush().unwrap();

        let source = UploadSource::from_path(file.path()).await.unwrap();
        assert_eq!(source.len(), 1500);
        assert!(!source.is_empty());
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let err = UploadSource::from_path("/definitely/not/here.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Source(_)));
    }

    #[tokio::test]
    async fn test_from_path_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadSource::from_path(dir.path()).await.unwrap_err();
        assert!(matches!(err, UploadError::Source(_)));
    }

    #[tokio::test]
    async fn test_from_bytes_yields_buffer() {
        let source = UploadSource::from_bytes(Bytes::from_static(b"hello"));
        assert_eq!(source.len(), 5);

        let mut reader = source.into_reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_empty_source() {
        assert!(UploadSource::from_bytes(Vec::new()).is_empty());
    }
}
