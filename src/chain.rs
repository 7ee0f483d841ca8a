//! Block index arena
//!
//! Each accepted block gets a [`BlockIndex`] record in a [`ChainIndex`]
//! arena. Parents are referenced by [`BlockId`], so walking back towards
//! genesis is a sequence of vector lookups and records never own each other.
//!
//! Every record also keeps a skip pointer to one earlier ancestor, chosen so
//! that [`ChainIndex::ancestor`] reaches any height in O(log n) hops.

use crate::constants::MEDIAN_TIME_SPAN;
use crate::error::{ConsensusError, Result};
use crate::hash::{calculate_block_hash, hash_to_hex, is_null};
use crate::types::*;
use std::collections::HashMap;

/// Position of a record in a [`ChainIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    pub hash: Hash,
    pub header: BlockHeader,
    pub height: Natural,
    pub parent: Option<BlockId>,
    /// Ancestor at [`skip_height`] of this record's height
    pub skip: Option<BlockId>,
}

/// Clear the lowest set bit
fn invert_lowest_one(n: Natural) -> Natural {
    n & n.wrapping_sub(1)
}

/// Height the skip pointer of a record at `height` jumps to
pub fn skip_height(height: Natural) -> Natural {
    if height < 2 {
        return 0;
    }
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainIndex {
    entries: Vec<BlockIndex>,
    by_hash: HashMap<Hash, BlockId>,
    tip: Option<BlockId>,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a header. A null previous hash starts a new genesis record;
    /// otherwise the parent must already be indexed. Inserting a known header
    /// returns its existing id.
    pub fn insert(&mut self, header: &BlockHeader) -> Result<BlockId> {
        let hash = calculate_block_hash(header);
        if let Some(&id) = self.by_hash.get(&hash) {
            return Ok(id);
        }

        let (parent, height, skip) = if is_null(&header.prev_block_hash) {
            (None, 0, None)
        } else {
            let parent = self.lookup(&header.prev_block_hash).ok_or_else(|| {
                ConsensusError::BlockValidation(
                    format!("unknown parent {}", hash_to_hex(&header.prev_block_hash)).into(),
                )
            })?;
            let height = self.get(parent)?.height + 1;
            let skip = self.ancestor(parent, skip_height(height))?;
            (Some(parent), height, skip)
        };

        let id = BlockId(self.entries.len());
        self.entries.push(BlockIndex {
            hash,
            header: header.clone(),
            height,
            parent,
            skip,
        });
        self.by_hash.insert(hash, id);

        if self.tip.map_or(true, |tip| height > self.entries[tip.0].height) {
            self.tip = Some(id);
        }
        Ok(id)
    }

    pub fn get(&self, id: BlockId) -> Result<&BlockIndex> {
        self.entries.get(id.0).ok_or_else(|| {
            ConsensusError::BlockValidation(format!("unknown block id {}", id.0).into())
        })
    }

    pub fn lookup(&self, hash: &Hash) -> Option<BlockId> {
        self.by_hash.get(hash).copied()
    }

    pub fn parent(&self, id: BlockId) -> Result<Option<BlockId>> {
        Ok(self.get(id)?.parent)
    }

    /// Highest record inserted so far; the first one wins ties
    pub fn tip(&self) -> Option<BlockId> {
        self.tip
    }

    /// Ancestor of `id` at `height`; `None` if `height` is above the block.
    ///
    /// Follows skip pointers whenever they do not overshoot, falling back to
    /// the parent otherwise.
    pub fn ancestor(&self, id: BlockId, height: Natural) -> Result<Option<BlockId>> {
        let mut current = id;
        let mut entry = self.get(current)?;
        if height > entry.height {
            return Ok(None);
        }

        while entry.height > height {
            let walk = entry.height;
            let jump = skip_height(walk);
            let jump_prev = skip_height(walk - 1);

            // Skip unless the parent's pointer would land closer without passing `height`
            let take_skip = jump == height
                || (jump > height && !(jump_prev + 2 < jump && jump_prev >= height));

            current = match (entry.skip, entry.parent) {
                (Some(skip), _) if take_skip => skip,
                (_, Some(parent)) => parent,
                (_, None) => return Ok(None),
            };
            entry = self.get(current)?;
        }
        Ok(Some(current))
    }

    /// Median timestamp of the block and up to ten of its ancestors
    pub fn median_time_past(&self, id: BlockId) -> Result<Natural> {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut current = Some(id);
        while let Some(block) = current {
            if timestamps.len() == MEDIAN_TIME_SPAN {
                break;
            }
            let entry = self.get(block)?;
            timestamps.push(entry.header.timestamp);
            current = entry.parent;
        }

        timestamps.sort_unstable();
        Ok(timestamps[timestamps.len() / 2])
    }
}
