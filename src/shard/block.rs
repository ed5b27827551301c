//! Data blocks
//!
//! A block is a run of records addressed by one index entry. The writer
//! accumulates records in a `BlockBuilder`; the reader walks a loaded block
//! with a `RecordCursor`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{compress_block, decompress_block};
use crate::config::Compression;
use crate::error::{Result, ShardError};

use super::{read_u32, BLOCK_HEADER_SIZE, RECORD_HEADER_SIZE};

/// Accumulates encoded records for the block being written
pub(crate) struct BlockBuilder {
    buf: BytesMut,
    records: usize,
    first_key: Option<Vec<u8>>,
}

impl BlockBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            records: 0,
            first_key: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn raw_len(&self) -> usize {
        self.buf.len()
    }

    /// Append one record: [KeyLen u32][ValLen u32][Key][Value]
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key_len = len_u32(key.len(), "key")?;
        let val_len = len_u32(value.len(), "value")?;
        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }
        self.buf.put_u32_le(key_len);
        self.buf.put_u32_le(val_len);
        self.buf.put_slice(key);
        self.buf.put_slice(value);
        self.records += 1;
        Ok(())
    }

    /// Seal the block into its on-disk frame, returning (first key, frame)
    ///
    /// Frame: [RawLen u32][StoredLen u32][CRC32 u32][stored payload]
    pub fn finish(&mut self, compression: Compression) -> Result<(Vec<u8>, Vec<u8>)> {
        let raw = self.buf.split().freeze();
        let first_key = self.first_key.take().unwrap_or_default();
        self.records = 0;

        let stored = compress_block(compression, &raw)?;
        let raw_len = len_u32(raw.len(), "block")?;
        let stored_len = len_u32(stored.len(), "block")?;

        let mut frame = Vec::with_capacity(BLOCK_HEADER_SIZE + stored.len());
        frame.put_u32_le(raw_len);
        frame.put_u32_le(stored_len);
        frame.put_u32_le(crc32fast::hash(&stored));
        frame.put_slice(&stored);
        Ok((first_key, frame))
    }
}

/// Turn an on-disk block frame back into its raw record payload
pub(crate) fn open_block(frame: &[u8], compression: Compression, verify: bool) -> Result<Bytes> {
    if frame.len() < BLOCK_HEADER_SIZE {
        return Err(ShardError::CorruptRecord(format!(
            "block frame of {} bytes is shorter than its header",
            frame.len()
        )));
    }
    let raw_len = read_u32(&frame[0..4]) as usize;
    let stored_len = read_u32(&frame[4..8]) as usize;
    let crc = read_u32(&frame[8..12]);
    let stored = &frame[BLOCK_HEADER_SIZE..];

    if stored.len() != stored_len {
        return Err(ShardError::CorruptRecord(format!(
            "block payload is {} bytes, header says {}",
            stored.len(),
            stored_len
        )));
    }
    if verify {
        let actual = crc32fast::hash(stored);
        if actual != crc {
            return Err(ShardError::CorruptRecord(format!(
                "block checksum mismatch: stored {:08x}, computed {:08x}",
                crc, actual
            )));
        }
    }
    Ok(Bytes::from(decompress_block(compression, stored, raw_len)?))
}

/// Sequential reader over the records of one raw block
pub(crate) struct RecordCursor {
    data: Bytes,
    pos: usize,
}

impl RecordCursor {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Next (key bytes, value bytes), or `None` at the end of the block
    pub fn next_record(&mut self) -> Result<Option<(Bytes, Bytes)>> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        let remaining = self.data.len() - self.pos;
        if remaining < RECORD_HEADER_SIZE {
            return Err(ShardError::CorruptRecord(format!(
                "{} stray bytes at end of block",
                remaining
            )));
        }
        let key_len = read_u32(&self.data[self.pos..self.pos + 4]) as usize;
        let val_len = read_u32(&self.data[self.pos + 4..self.pos + 8]) as usize;
        let body = remaining - RECORD_HEADER_SIZE;
        if key_len > body || val_len > body - key_len {
            return Err(ShardError::CorruptRecord(format!(
                "record lengths {}+{} overrun block ({} bytes left)",
                key_len, val_len, body
            )));
        }
        let key_start = self.pos + RECORD_HEADER_SIZE;
        let val_start = key_start + key_len;
        let end = val_start + val_len;
        let key = self.data.slice(key_start..val_start);
        let value = self.data.slice(val_start..end);
        self.pos = end;
        Ok(Some((key, value)))
    }
}

fn len_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| ShardError::Serialization(format!("{} of {} bytes exceeds 4 GiB", what, len)))
}
