//! Partial Merkle trees: compact proofs that a subset of transactions is
//! committed to by a block's Merkle root.
//!
//! The tree is never materialized. A node is addressed by `(height, position)`
//! and the width of each level follows from the leaf count alone. Building
//! walks the tree depth-first, emitting one flag bit per visited node and one
//! hash per node where descent stops. Extraction replays the same walk,
//! consuming bits and hashes in order.
//!
//! Wire form: `u32 LE` transaction count, `varint + 32-byte hashes`,
//! `varint + flag bytes` (flags packed least-significant bit first).

use crate::constants::{MAX_BLOCK_WEIGHT, MIN_TRANSACTION_WEIGHT};
use crate::encoding::{encode_varint, Reader};
use crate::error::Result;
use crate::hash::{combine, NULL_HASH};
use crate::types::Hash;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on the leaf count a proof may claim
pub const MAX_PROOF_TRANSACTIONS: u32 = (MAX_BLOCK_WEIGHT / MIN_TRANSACTION_WEIGHT) as u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMerkleTree {
    transaction_count: u32,
    bits: Vec<bool>,
    hashes: Vec<Hash>,
}

/// Outcome of [`PartialMerkleTree::extract_matches`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMerkleMatches {
    /// Reconstructed root, or the null digest if the proof was rejected
    pub root: Hash,
    /// `(leaf index, txid)` for every matched leaf, in tree order
    pub matches: Vec<(u32, Hash)>,
}

impl PartialMerkleMatches {
    fn rejected() -> Self {
        Self {
            root: NULL_HASH,
            matches: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.root != NULL_HASH
    }
}

impl PartialMerkleTree {
    /// Build a proof for the leaves whose `matches` flag is set.
    ///
    /// # Panics
    ///
    /// If `txids` and `matches` differ in length, or if there are more than
    /// `u32::MAX` leaves.
    pub fn new(txids: &[Hash], matches: &[bool]) -> Self {
        assert_eq!(
            txids.len(),
            matches.len(),
            "every txid needs exactly one match flag"
        );
        assert!(txids.len() <= u32::MAX as usize, "leaf count exceeds u32 range");

        let mut tree = Self {
            transaction_count: txids.len() as u32,
            bits: Vec::new(),
            hashes: Vec::new(),
        };
        if txids.is_empty() {
            return tree;
        }

        let height = tree.height();
        tree.traverse_and_build(height, 0, txids, matches);
        tree
    }

    /// Reassemble a proof from its parts, e.g. after decoding. No validation
    /// happens here; malformed parts are rejected by `extract_matches`.
    pub fn from_parts(transaction_count: u32, bits: Vec<bool>, hashes: Vec<Hash>) -> Self {
        Self {
            transaction_count,
            bits,
            hashes,
        }
    }

    pub fn transaction_count(&self) -> u32 {
        self.transaction_count
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn hashes(&self) -> &[Hash] {
        &self.hashes
    }

    /// Number of nodes at `height` (leaves are height 0)
    fn tree_width(&self, height: u32) -> u64 {
        let count = self.transaction_count as u64;
        (count + (1u64 << height) - 1) >> height
    }

    /// Height of the root node
    fn height(&self) -> u32 {
        let mut height = 0;
        while self.tree_width(height) > 1 {
            height += 1;
        }
        height
    }

    fn calc_hash(&self, height: u32, position: u64, txids: &[Hash]) -> Hash {
        if height == 0 {
            return txids[position as usize];
        }
        let left = self.calc_hash(height - 1, position * 2, txids);
        let right = if position * 2 + 1 < self.tree_width(height - 1) {
            self.calc_hash(height - 1, position * 2 + 1, txids)
        } else {
            left
        };
        combine(&left, &right)
    }

    fn traverse_and_build(&mut self, height: u32, position: u64, txids: &[Hash], matches: &[bool]) {
        let start = (position << height) as usize;
        let end = (((position + 1) << height) as usize).min(txids.len());
        let parent_of_match = matches[start..end].iter().any(|&m| m);
        self.bits.push(parent_of_match);

        if height == 0 || !parent_of_match {
            let hash = self.calc_hash(height, position, txids);
            self.hashes.push(hash);
        } else {
            self.traverse_and_build(height - 1, position * 2, txids, matches);
            if position * 2 + 1 < self.tree_width(height - 1) {
                self.traverse_and_build(height - 1, position * 2 + 1, txids, matches);
            }
        }
    }

    /// Reconstruct the root and the matched leaves.
    ///
    /// Any structural problem (implausible leaf count, too few bits or hashes,
    /// leftover bits or hashes, two distinct siblings with equal hashes)
    /// yields the null root and no matches.
    pub fn extract_matches(&self) -> PartialMerkleMatches {
        if self.transaction_count == 0 {
            debug!("partial merkle tree rejected: no transactions");
            return PartialMerkleMatches::rejected();
        }
        if self.transaction_count > MAX_PROOF_TRANSACTIONS {
            debug!(
                "partial merkle tree rejected: {} transactions exceed {}",
                self.transaction_count, MAX_PROOF_TRANSACTIONS
            );
            return PartialMerkleMatches::rejected();
        }
        if self.hashes.len() > self.transaction_count as usize {
            debug!(
                "partial merkle tree rejected: {} hashes for {} transactions",
                self.hashes.len(),
                self.transaction_count
            );
            return PartialMerkleMatches::rejected();
        }
        if self.bits.len() < self.hashes.len() {
            debug!(
                "partial merkle tree rejected: {} bits for {} hashes",
                self.bits.len(),
                self.hashes.len()
            );
            return PartialMerkleMatches::rejected();
        }

        let mut extraction = Extraction {
            tree: self,
            bits_used: 0,
            hashes_used: 0,
            matches: Vec::new(),
            bad: false,
        };
        let root = extraction.traverse(self.height(), 0);

        if extraction.bad {
            debug!("partial merkle tree rejected: traversal overran or found duplicate siblings");
            return PartialMerkleMatches::rejected();
        }
        // Flags arrive padded to a byte boundary, so only whole bytes must be consumed
        if (extraction.bits_used + 7) / 8 != (self.bits.len() + 7) / 8 {
            debug!(
                "partial merkle tree rejected: used {} of {} bits",
                extraction.bits_used,
                self.bits.len()
            );
            return PartialMerkleMatches::rejected();
        }
        if extraction.hashes_used != self.hashes.len() {
            debug!(
                "partial merkle tree rejected: used {} of {} hashes",
                extraction.hashes_used,
                self.hashes.len()
            );
            return PartialMerkleMatches::rejected();
        }

        PartialMerkleMatches {
            root,
            matches: extraction.matches,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let flags = bits_to_bytes(&self.bits);
        let mut data = Vec::with_capacity(4 + 9 + self.hashes.len() * 32 + 9 + flags.len());

        data.extend_from_slice(&self.transaction_count.to_le_bytes());
        data.extend_from_slice(&encode_varint(self.hashes.len() as u64));
        for hash in &self.hashes {
            data.extend_from_slice(hash);
        }
        data.extend_from_slice(&encode_varint(flags.len() as u64));
        data.extend_from_slice(&flags);

        data
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let tree = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(tree)
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let transaction_count = reader.read_u32_le()?;

        let hash_count = reader.read_length(32)?;
        let mut hashes = Vec::with_capacity(hash_count);
        for _ in 0..hash_count {
            hashes.push(reader.read_hash()?);
        }

        let flag_len = reader.read_length(1)?;
        let bits = bytes_to_bits(reader.read_bytes(flag_len)?);

        Ok(Self {
            transaction_count,
            bits,
            hashes,
        })
    }
}

/// Cursor state for one extraction pass
struct Extraction<'a> {
    tree: &'a PartialMerkleTree,
    bits_used: usize,
    hashes_used: usize,
    matches: Vec<(u32, Hash)>,
    bad: bool,
}

impl Extraction<'_> {
    fn traverse(&mut self, height: u32, position: u64) -> Hash {
        let Some(&parent_of_match) = self.tree.bits.get(self.bits_used) else {
            self.bad = true;
            return NULL_HASH;
        };
        self.bits_used += 1;

        if height == 0 || !parent_of_match {
            let Some(&hash) = self.tree.hashes.get(self.hashes_used) else {
                self.bad = true;
                return NULL_HASH;
            };
            self.hashes_used += 1;
            if height == 0 && parent_of_match {
                self.matches.push((position as u32, hash));
            }
            return hash;
        }

        let left = self.traverse(height - 1, position * 2);
        let right = if position * 2 + 1 < self.tree.tree_width(height - 1) {
            let right = self.traverse(height - 1, position * 2 + 1);
            if right == left {
                // A real right sibling equal to the left one would let a
                // duplicated subtree pass as distinct transactions
                self.bad = true;
            }
            right
        } else {
            left
        };
        combine(&left, &right)
    }
}

/// Pack flags eight per byte, least-significant bit first, zero padded
pub fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; (bits.len() + 7) / 8];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack every bit of `bytes`, padding included
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    (0..bytes.len() * 8)
        .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}
