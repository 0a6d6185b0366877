use bytes::{Buf, BytesMut};
use crate::compression::varint;
use crate::core::error::Result;
use crate::core::types::{DocId, FieldMask, FIELD_MASK_ALL};

pub mod index_flags {
    /// Store per-document term frequency.
    pub const STORE_FREQS: u32 = 1 << 0;
    /// Store the field mask of each hit.
    pub const STORE_FIELD_MASK: u32 = 1 << 1;
    /// Store the term position offsets of each hit.
    pub const STORE_OFFSETS: u32 = 1 << 2;
    /// Entries carry a numeric value instead of term data.
    pub const STORE_NUMERIC: u32 = 1 << 3;
}

/// Record shape written into a block. Chosen once per index from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEncoder {
    DocIdsOnly,
    Freqs,
    FreqsFields,
    /// Frequency, field mask and offsets - the full-text default.
    Full,
    Numeric,
}

impl IndexEncoder {
    pub fn for_flags(flags: u32) -> IndexEncoder {
        if flags & index_flags::STORE_NUMERIC != 0 {
            IndexEncoder::Numeric
        } else if flags & index_flags::STORE_OFFSETS != 0 {
            IndexEncoder::Full
        } else if flags & index_flags::STORE_FIELD_MASK != 0 {
            IndexEncoder::FreqsFields
        } else if flags & index_flags::STORE_FREQS != 0 {
            IndexEncoder::Freqs
        } else {
            IndexEncoder::DocIdsOnly
        }
    }
}

/// One decoded posting.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingRecord {
    pub doc_id: DocId,
    pub freq: u32,
    pub field_mask: FieldMask,
    pub offsets: Vec<u32>,
    pub value: f64,
}

impl PostingRecord {
    pub fn id_only(doc_id: DocId) -> Self {
        PostingRecord {
            doc_id,
            freq: 1,
            field_mask: FIELD_MASK_ALL,
            offsets: Vec::new(),
            value: 0.0,
        }
    }
}

/// A contiguous, delta-encoded span of postings. The final block of an index
/// is the only one still open for append.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    pub first_id: u64,
    pub last_id: u64,
    pub num_entries: u32,
    pub buffer: BytesMut,
}

impl IndexBlock {
    fn new(first_id: u64) -> Self {
        IndexBlock {
            first_id,
            last_id: first_id,
            num_entries: 0,
            buffer: BytesMut::new(),
        }
    }
}

/// Entry handed to `write_entry`; built from a forward-index entry or a
/// numeric/tag insertion.
#[derive(Debug)]
pub struct IndexWriteEntry<'a> {
    pub doc_id: DocId,
    pub freq: u32,
    pub field_mask: FieldMask,
    pub offsets: &'a [u32],
    pub value: f64,
}

impl<'a> IndexWriteEntry<'a> {
    pub fn id_only(doc_id: DocId) -> Self {
        IndexWriteEntry {
            doc_id,
            freq: 1,
            field_mask: FIELD_MASK_ALL,
            offsets: &[],
            value: 0.0,
        }
    }

    pub fn numeric(doc_id: DocId, value: f64) -> Self {
        IndexWriteEntry {
            doc_id,
            freq: 1,
            field_mask: FIELD_MASK_ALL,
            offsets: &[],
            value,
        }
    }
}

/// Append-only blocked posting list. Within the index, blocks are strictly
/// ordered by `first_id`; within a block, docIds are strictly increasing.
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    pub blocks: Vec<IndexBlock>,
    pub encoder: IndexEncoder,
    pub last_doc_id: u64,
    pub num_docs: u32,
}

impl InvertedIndex {
    pub fn new(encoder: IndexEncoder) -> Self {
        InvertedIndex {
            blocks: Vec::new(),
            encoder,
            last_doc_id: 0,
            num_docs: 0,
        }
    }

    /// Append one posting. Returns the number of bytes written; a write for
    /// a docId at or below the current tail is ignored.
    pub fn write_entry(
        &mut self,
        entry: &IndexWriteEntry,
        max_block_entries: usize,
        max_block_bytes: usize,
    ) -> usize {
        let doc_id = entry.doc_id.0;
        if doc_id <= self.last_doc_id {
            return 0;
        }

        let need_new = match self.blocks.last() {
            None => true,
            Some(b) => {
                b.num_entries as usize >= max_block_entries || b.buffer.len() >= max_block_bytes
            }
        };
        if need_new {
            self.blocks.push(IndexBlock::new(doc_id));
        }
        let block = self.blocks.last_mut().unwrap();
        let delta = if block.num_entries == 0 {
            0
        } else {
            doc_id - block.last_id
        };

        let before = block.buffer.len();
        let buf = &mut block.buffer;
        varint::write_u64(buf, delta);
        match self.encoder {
            IndexEncoder::DocIdsOnly => {}
            IndexEncoder::Freqs => {
                varint::write_u32(buf, entry.freq);
            }
            IndexEncoder::FreqsFields => {
                varint::write_u32(buf, entry.freq);
                varint::write_u64(buf, entry.field_mask);
            }
            IndexEncoder::Full => {
                varint::write_u32(buf, entry.freq);
                varint::write_u64(buf, entry.field_mask);
                varint::write_u32(buf, entry.offsets.len() as u32);
                varint::write_deltas(buf, entry.offsets);
            }
            IndexEncoder::Numeric => {
                buf.extend_from_slice(&entry.value.to_le_bytes());
            }
        }

        block.last_id = doc_id;
        block.num_entries += 1;
        self.last_doc_id = doc_id;
        self.num_docs += 1;
        block.buffer.len() - before
    }

    /// Decode one whole block. Readers buffer a block at a time so the index
    /// lock can be released between blocks.
    pub fn decode_block(&self, block_idx: usize) -> Result<Vec<PostingRecord>> {
        let block = &self.blocks[block_idx];
        let mut records = Vec::with_capacity(block.num_entries as usize);
        let mut cur = &block.buffer[..];
        let mut doc_id = 0u64;

        for i in 0..block.num_entries {
            let delta = varint::read_u64(&mut cur)?;
            doc_id = if i == 0 { block.first_id } else { doc_id + delta };
            let mut rec = PostingRecord::id_only(DocId(doc_id));
            match self.encoder {
                IndexEncoder::DocIdsOnly => {}
                IndexEncoder::Freqs => {
                    rec.freq = varint::read_u32(&mut cur)?;
                }
                IndexEncoder::FreqsFields => {
                    rec.freq = varint::read_u32(&mut cur)?;
                    rec.field_mask = varint::read_u64(&mut cur)?;
                }
                IndexEncoder::Full => {
                    rec.freq = varint::read_u32(&mut cur)?;
                    rec.field_mask = varint::read_u64(&mut cur)?;
                    let n = varint::read_u32(&mut cur)? as usize;
                    rec.offsets = varint::read_deltas(&mut cur, n)?;
                }
                IndexEncoder::Numeric => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&cur[..8]);
                    cur.advance(8);
                    rec.value = f64::from_le_bytes(raw);
                }
            }
            records.push(rec);
        }
        Ok(records)
    }

    /// Index of the first block that may contain `doc_id`, found by binary
    /// search over the block bounds.
    pub fn find_block(&self, doc_id: u64) -> usize {
        self.blocks
            .partition_point(|b| b.last_id < doc_id)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_ids(idx: &mut InvertedIndex, ids: &[u64]) {
        for &id in ids {
            let entry = IndexWriteEntry {
                doc_id: DocId(id),
                freq: 2,
                field_mask: 1,
                offsets: &[1, 5, 9],
                value: 0.0,
            };
            assert!(idx.write_entry(&entry, 4, 1 << 20) > 0);
        }
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut idx = InvertedIndex::new(IndexEncoder::Full);
        write_ids(&mut idx, &[1, 3, 8, 20, 21, 300]);
        assert_eq!(idx.num_blocks(), 2); // rollover after 4 entries
        assert_eq!(idx.num_docs, 6);

        let mut all = Vec::new();
        for b in 0..idx.num_blocks() {
            all.extend(idx.decode_block(b).unwrap());
        }
        let ids: Vec<u64> = all.iter().map(|r| r.doc_id.0).collect();
        assert_eq!(ids, vec![1, 3, 8, 20, 21, 300]);
        assert_eq!(all[0].offsets, vec![1, 5, 9]);
        assert_eq!(all[0].freq, 2);
    }

    #[test]
    fn test_block_invariants() {
        let mut idx = InvertedIndex::new(IndexEncoder::Freqs);
        write_ids(&mut idx, &[2, 5, 9, 11, 12, 17, 40]);
        for b in &idx.blocks {
            assert!(b.first_id <= b.last_id);
        }
        for w in idx.blocks.windows(2) {
            assert!(w[0].last_id < w[1].first_id);
        }
    }

    #[test]
    fn test_out_of_order_write_ignored() {
        let mut idx = InvertedIndex::new(IndexEncoder::DocIdsOnly);
        write_ids(&mut idx, &[5]);
        assert_eq!(idx.write_entry(&IndexWriteEntry::id_only(DocId(5)), 4, 1 << 20), 0);
        assert_eq!(idx.write_entry(&IndexWriteEntry::id_only(DocId(3)), 4, 1 << 20), 0);
        assert_eq!(idx.num_docs, 1);
    }

    #[test]
    fn test_find_block() {
        let mut idx = InvertedIndex::new(IndexEncoder::DocIdsOnly);
        write_ids(&mut idx, &[1, 2, 3, 4, 10, 11, 12, 13, 20]);
        assert_eq!(idx.find_block(1), 0);
        assert_eq!(idx.find_block(4), 0);
        assert_eq!(idx.find_block(5), 1);
        assert_eq!(idx.find_block(13), 1);
        assert_eq!(idx.find_block(20), 2);
        assert_eq!(idx.find_block(21), 3);
    }

    #[test]
    fn test_numeric_encoder() {
        let mut idx = InvertedIndex::new(IndexEncoder::Numeric);
        idx.write_entry(&IndexWriteEntry::numeric(DocId(1), 10.5), 100, 1 << 20);
        idx.write_entry(&IndexWriteEntry::numeric(DocId(2), -3.0), 100, 1 << 20);
        let recs = idx.decode_block(0).unwrap();
        assert_eq!(recs[0].value, 10.5);
        assert_eq!(recs[1].value, -3.0);
    }
}
