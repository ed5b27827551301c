//! Shard Iterator
//!
//! Sequential iteration over all records of a shard, block by block.

use crate::codec;
use crate::error::Result;
use crate::schema::Value;

use super::block::RecordCursor;
use super::reader::ShardReader;

/// Iterator over shard records in sorted key order
pub struct ShardIterator<'a> {
    reader: &'a ShardReader,
    /// Next block to load
    next_block: usize,
    /// Records of the block being walked
    cursor: Option<RecordCursor>,
    /// Set after the first error; iteration stops there
    failed: bool,
}

impl<'a> ShardIterator<'a> {
    pub(super) fn new(reader: &'a ShardReader) -> Self {
        Self {
            reader,
            next_block: 0,
            cursor: None,
            failed: false,
        }
    }

    fn advance(&mut self) -> Result<Option<(Value, Value)>> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                if let Some((key, value)) = cursor.next_record()? {
                    let key = codec::decode(&key, self.reader.key_schema())?;
                    let value = codec::decode(&value, self.reader.value_schema())?;
                    return Ok(Some((key, value)));
                }
            }
            if self.next_block >= self.reader.block_count() {
                return Ok(None);
            }
            let data = self.reader.load_block(self.next_block)?;
            self.next_block += 1;
            self.cursor = Some(RecordCursor::new(data));
        }
    }
}

impl<'a> Iterator for ShardIterator<'a> {
    type Item = Result<(Value, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
