/*!
 * Splits a byte source into numbered parts
 *
 * Only the part currently being read is held in memory; the caller decides
 * how many materialized parts may exist at once.
 */

use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::error::{UploadError, UploadResult};

/// One part of an object, ready to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTask {
    /// Part number (1-based, contiguous)
    pub part_number: u32,
    /// Byte offset of the part within the object
    pub offset: u64,
    /// Part contents
    pub data: Bytes,
    /// Upload attempts made so far
    pub attempts: u32,
}

impl PartTask {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Number of parts an object of `total_size` bytes splits into
pub fn part_count(total_size: u64, part_size: u64) -> u64 {
    if part_size == 0 {
        return 0;
    }
    total_size.div_ceil(part_size)
}

/// Lazy producer of [`PartTask`]s
#[derive(Debug)]
pub struct Chunker<R> {
    reader: R,
    total_size: u64,
    part_size: u64,
    offset: u64,
    next_part: u32,
}

impl<R: AsyncRead + Unpin> Chunker<R> {
    /// Create a chunker over `reader`, which must yield `total_size` bytes
    pub fn new(reader: R, total_size: u64, part_size: u64) -> UploadResult<Self> {
        if part_size == 0 {
            return Err(UploadError::InvalidConfiguration(
                "part_size must be greater than zero".to_string(),
            ));
        }
        if part_count(total_size, part_size) > u32::MAX as u64 {
            return Err(UploadError::InvalidConfiguration(format!(
                "{} bytes at part_size {} needs more parts than can be numbered",
                total_size, part_size
            )));
        }

        Ok(Self {
            reader,
            total_size,
            part_size,
            offset: 0,
            next_part: 1,
        })
    }

    /// Total number of parts this chunker produces
    pub fn part_count(&self) -> u64 {
        part_count(self.total_size, self.part_size)
    }

    /// Bytes handed out so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next part, or `None` once the declared length is consumed
    pub async fn next_part(&mut self) -> UploadResult<Option<PartTask>> {
        if self.offset >= self.total_size {
            return Ok(None);
        }

        let len = (self.total_size - self.offset).min(self.part_size);
        let len = usize::try_from(len).map_err(|_| {
            UploadError::InvalidConfiguration(format!(
                "part of {} bytes does not fit in memory",
                len
            ))
        })?;

        let mut buffer = BytesMut::zeroed(len);
        self.reader.read_exact(&mut buffer).await.map_err(|e| {
            UploadError::Source(format!(
                "failed to read part {} at offset {}: {}",
                self.next_part, self.offset, e
            ))
        })?;

        let task = PartTask {
            part_number: self.next_part,
            offset: self.offset,
            data: buffer.freeze(),
            attempts: 0,
        };
        self.offset += len as u64;
        self.next_part += 1;

        Ok(Some(task))
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> Chunker<R> {
    /// Rewind or skip ahead so the next part produced is `part_number`
    pub async fn restart_at(&mut self, part_number: u32) -> UploadResult<()> {
        if part_number == 0 || part_number as u64 > self.part_count().max(1) {
            return Err(UploadError::InvalidConfiguration(format!(
                "part {} outside 1..={}",
                part_number,
                self.part_count()
            )));
        }

        let offset = (part_number as u64 - 1) * self.part_size;
        self.reader
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| UploadError::Source(format!("failed to seek to {}: {}", offset, e)))?;

        self.offset = offset;
        self.next_part = part_number;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn collect<R: AsyncRead + Unpin>(chunker: &mut Chunker<R>) -> Vec<PartTask> {
        let mut parts = Vec::new();
        while let Some(part) = chunker.next_part().await.unwrap() {
            parts.push(part);
        }
        parts
    }

    #[test]
    fn test_part_count() {
        assert_eq!(part_count(20, 8), 3);
        assert_eq!(part_count(16, 8), 2);
        assert_eq!(part_count(1, 8), 1);
        assert_eq!(part_count(0, 8), 0);
        assert_eq!(part_count(10, 0), 0);
    }

    #[test]
    fn test_zero_part_size_rejected() {
        let err = Chunker::new(Cursor::new(vec![1u8]), 1, 0).unwrap_err();
        assert!(matches!(err, UploadError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_splits_into_bounded_contiguous_parts() {
        let bytes = data(20);
        let mut chunker = Chunker::new(Cursor::new(bytes.clone()), 20, 8).unwrap();
        assert_eq!(chunker.part_count(), 3);

        let parts = collect(&mut chunker).await;
        let sizes: Vec<u64> = parts.iter().map(PartTask::len).collect();
        assert_eq!(sizes, vec![8, 8, 4]);

        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(parts[2].offset, 16);

        let joined: Vec<u8> = parts.iter().flat_map(|p| p.data.to_vec()).collect();
        assert_eq!(joined, bytes);
        assert!(parts.iter().all(|p| p.attempts == 0));
    }

    #[tokio::test]
    async fn test_short_source_is_source_error() {
        let mut chunker = Chunker::new(Cursor::new(data(10)), 20, 8).unwrap();
        assert!(chunker.next_part().await.unwrap().is_some());
        let err = chunker.next_part().await.unwrap_err();
        assert!(matches!(err, UploadError::Source(_)));
    }

    #[tokio::test]
    async fn test_stops_at_declared_length() {
        let mut chunker = Chunker::new(Cursor::new(data(100)), 10, 4).unwrap();
        let parts = collect(&mut chunker).await;
        assert_eq!(parts.len(), 3);
        assert_eq!(chunker.offset(), 10);
    }

    #[tokio::test]
    async fn test_empty_source_has_no_parts() {
        let mut chunker = Chunker::new(Cursor::new(Vec::new()), 0, 4).unwrap();
        assert!(chunker.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restart_at_rereads_from_part_offset() {
        let bytes = data(20);
        let mut chunker = Chunker::new(Cursor::new(bytes.clone()), 20, 8).unwrap();
        let first = collect(&mut chunker).await;

        chunker.restart_at(2).await.unwrap();
        let again = collect(&mut chunker).await;
        assert_eq!(again.len(), 2);
        assert_eq!(again[0], first[1]);
        assert_eq!(again[1], first[2]);

        assert!(chunker.restart_at(0).await.is_err());
        assert!(chunker.restart_at(4).await.is_err());
    }
}
